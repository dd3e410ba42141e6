use super::{record_validation_errors, ARTICLE_IDS, PIP_PATH, SIP_PATH};
use crate::collaborators::PipTransformer;
use anyhow::Context;
use distiller_kanban::{Stage, Token};
use std::path::{Path, PathBuf};

/// First stage: renders a harvested issue into a fresh SIP directory.
pub struct HtmlStage {
    sip_output: PathBuf,
    transformer: Box<dyn PipTransformer>,
}

impl HtmlStage {
    pub fn new(sip_output: &Path, transformer: Box<dyn PipTransformer>) -> Self {
        Self {
            sip_output: sip_output.to_path_buf(),
            transformer,
        }
    }
}

impl Stage for HtmlStage {
    fn name(&self) -> &str {
        "html"
    }

    fn is_applicable(&self, token: &Token) -> bool {
        token.require_str(PIP_PATH).is_some()
    }

    fn execute(&self, token: &mut Token) -> anyhow::Result<bool> {
        let pip_path = PathBuf::from(token.require_str(PIP_PATH).unwrap_or_default());
        let sip_path = self.sip_output.join(token.id());
        std::fs::create_dir_all(&sip_path)
            .with_context(|| format!("Failed to create SIP directory: {:?}", sip_path))?;
        // Later stages may run from another working directory.
        let sip_path = std::fs::canonicalize(&sip_path)
            .with_context(|| format!("Failed to resolve SIP directory: {:?}", sip_path))?;

        let manifest = self.transformer.transform(&pip_path, &sip_path)?;

        token.put(SIP_PATH, sip_path.display().to_string())?;
        token.put(ARTICLE_IDS, manifest.article_ids())?;
        record_validation_errors(token, &manifest)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{SipArticle, SipManifest};
    use crate::stages::VALIDATION_ERRORS;
    use serial_test::serial;
    use tempfile::tempdir;

    fn transformer(pip: &Path, sip: &Path) -> anyhow::Result<SipManifest> {
        assert!(sip.is_dir(), "SIP directory must exist before the call");
        Ok(SipManifest {
            id: sip.file_name().unwrap().to_string_lossy().to_string(),
            pip_id: pip.display().to_string(),
            articles: vec![SipArticle {
                ceo_id: "12345".to_string(),
                html_path: Some("articles/12345.html".to_string()),
                pdf_path: None,
                mods_path: None,
            }],
            validation_errors: vec!["article 12345 has no byline".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_requires_pip_path() {
        let stage = HtmlStage::new(Path::new("/sips"), Box::new(transformer));
        let mut token = Token::new("2026-01-29").unwrap();
        assert!(!stage.is_applicable(&token));
        token.put(PIP_PATH, "").unwrap();
        assert!(!stage.is_applicable(&token));
        token.put(PIP_PATH, "/pips/2026-01-29").unwrap();
        assert!(stage.is_applicable(&token));
    }

    #[test]
    fn test_creates_sip_and_records_results() {
        let dir = tempdir().unwrap();
        let stage = HtmlStage::new(dir.path(), Box::new(transformer));
        let mut token = Token::new("2026-01-29").unwrap();
        token.put(PIP_PATH, "/pips/2026-01-29").unwrap();

        assert!(stage.execute(&mut token).unwrap());

        let sip = dir.path().join("2026-01-29").canonicalize().unwrap();
        assert!(sip.is_dir());
        assert_eq!(token.get_str(SIP_PATH), Some(sip.display().to_string().as_str()));
        assert_eq!(token.get_str_list(ARTICLE_IDS), vec!["12345"]);
        assert_eq!(
            token.get_str_list(VALIDATION_ERRORS),
            vec!["article 12345 has no byline"]
        );
    }

    #[test]
    fn test_collaborator_fault_propagates() {
        let dir = tempdir().unwrap();
        let failing = |_: &Path, _: &Path| -> anyhow::Result<SipManifest> {
            anyhow::bail!("template missing")
        };
        let stage = HtmlStage::new(dir.path(), Box::new(failing));
        let mut token = Token::new("x").unwrap();
        token.put(PIP_PATH, "/pips/x").unwrap();

        let err = stage.execute(&mut token).unwrap_err();
        assert_eq!(err.to_string(), "template missing");
        assert!(!token.contains(SIP_PATH));
    }

    #[test]
    #[serial]
    fn test_relative_sip_output_is_stored_absolute() {
        let dir = tempdir().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let stage = HtmlStage::new(Path::new("./workspace/sips"), Box::new(transformer));
        let mut token = Token::new("2026-01-29").unwrap();
        token.put(PIP_PATH, "/pips/2026-01-29").unwrap();
        let result = stage.execute(&mut token);
        std::env::set_current_dir(previous).unwrap();

        assert!(result.unwrap());
        let stored = PathBuf::from(token.get_str(SIP_PATH).unwrap());
        assert!(stored.is_absolute(), "{stored:?} is relative");
        assert_eq!(
            stored,
            dir.path()
                .join("workspace/sips/2026-01-29")
                .canonicalize()
                .unwrap()
        );
    }
}
