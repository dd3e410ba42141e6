//! Conversion collaborators.
//!
//! Stages never convert anything themselves. Each delegates to a
//! collaborator that takes a package location and returns the updated SIP
//! manifest. Production wiring runs external commands; tests plug in
//! closures.

mod command;
pub mod manifest;
mod template;
mod tools;

pub use command::{CommandCollaborator, CommandError, UnconfiguredCollaborator};
pub use manifest::{PackageStatus, PipArticle, PipManifest, SipArticle, SipManifest};
pub use template::TemplateContext;
pub use tools::{check_tools, ToolInfo};

use crate::config::StagesConfig;
use anyhow::Result;
use std::path::Path;

/// Builds the initial SIP for an issue from its PIP.
pub trait PipTransformer: Send + Sync {
    fn transform(&self, pip_path: &Path, sip_path: &Path) -> Result<SipManifest>;
}

/// Adds one kind of derivative (PDF, ALTO, MODS, images) to a SIP.
pub trait SipTransformer: Send + Sync {
    fn transform(&self, sip_path: &Path) -> Result<SipManifest>;
}

/// Writes the METS document and seals the SIP.
pub trait SipCompiler: Send + Sync {
    fn compile(&self, sip_path: &Path) -> Result<SipManifest>;
}

impl<F> PipTransformer for F
where
    F: Fn(&Path, &Path) -> Result<SipManifest> + Send + Sync,
{
    fn transform(&self, pip_path: &Path, sip_path: &Path) -> Result<SipManifest> {
        self(pip_path, sip_path)
    }
}

impl<F> SipTransformer for F
where
    F: Fn(&Path) -> Result<SipManifest> + Send + Sync,
{
    fn transform(&self, sip_path: &Path) -> Result<SipManifest> {
        self(sip_path)
    }
}

impl<F> SipCompiler for F
where
    F: Fn(&Path) -> Result<SipManifest> + Send + Sync,
{
    fn compile(&self, sip_path: &Path) -> Result<SipManifest> {
        self(sip_path)
    }
}

/// One collaborator per conversion stage.
pub struct Collaborators {
    pub html: Box<dyn PipTransformer>,
    pub pdf: Box<dyn SipTransformer>,
    pub alto: Box<dyn SipTransformer>,
    pub mods: Box<dyn SipTransformer>,
    pub image: Box<dyn SipTransformer>,
    pub mets: Box<dyn SipCompiler>,
}

impl Collaborators {
    /// Command collaborators for every configured stage; the rest fault
    /// when reached.
    pub fn from_config(stages: &StagesConfig) -> Self {
        fn sip(stages: &StagesConfig, name: &str) -> Box<dyn SipTransformer> {
            match stages.get(name) {
                Some(config) => Box::new(CommandCollaborator::new(name, config.clone())),
                None => Box::new(UnconfiguredCollaborator::new(name)),
            }
        }

        let html: Box<dyn PipTransformer> = match stages.get("html") {
            Some(config) => Box::new(CommandCollaborator::new("html", config.clone())),
            None => Box::new(UnconfiguredCollaborator::new("html")),
        };
        let mets: Box<dyn SipCompiler> = match stages.get("mets") {
            Some(config) => Box::new(CommandCollaborator::new("mets", config.clone())),
            None => Box::new(UnconfiguredCollaborator::new("mets")),
        };

        Self {
            html,
            pdf: sip(stages, "pdf"),
            alto: sip(stages, "alto"),
            mods: sip(stages, "mods"),
            image: sip(stages, "image"),
            mets,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_stages_fault() {
        let collaborators = Collaborators::from_config(&StagesConfig::default());
        let err = collaborators.mets.compile(Path::new("/sips/x")).unwrap_err();
        assert_eq!(err.to_string(), "no collaborator configured for stage mets");

        let err = collaborators
            .html
            .transform(Path::new("/pips/x"), Path::new("/sips/x"))
            .unwrap_err();
        assert!(err.to_string().ends_with("stage html"));
    }

    #[test]
    fn test_closures_are_collaborators() {
        let pdf = |sip: &Path| -> Result<SipManifest> {
            Ok(SipManifest {
                id: sip.display().to_string(),
                ..Default::default()
            })
        };
        let boxed: Box<dyn SipTransformer> = Box::new(pdf);
        assert_eq!(boxed.transform(Path::new("a")).unwrap().id, "a");
    }
}
