//! Package manifests exchanged with the conversion collaborators.
//!
//! A PIP (primary information package) is the harvested, immutable source for
//! one issue. A SIP (submission information package) is built up stage by
//! stage and sealed by the METS compiler.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const PIP_MANIFEST: &str = "pip-manifest.json";
pub const SIP_MANIFEST: &str = "sip-manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    #[default]
    Building,
    Sealed,
}

impl PackageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageStatus::Building => "building",
            PackageStatus::Sealed => "sealed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipArticle {
    pub ceo_id: String,

    #[serde(default)]
    pub ceo_record_path: Option<String>,
}

/// Manifest of a harvested issue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipManifest {
    pub id: String,

    pub title: String,

    pub date_range: (String, String),

    #[serde(default)]
    pub articles: Vec<PipArticle>,

    #[serde(default)]
    pub status: PackageStatus,
}

impl PipManifest {
    /// Read `pip-manifest.json` from a PIP directory.
    pub fn load(pip_path: &Path) -> Result<Self> {
        read_json(&pip_path.join(PIP_MANIFEST))
    }

    pub fn article_ids(&self) -> Vec<String> {
        self.articles.iter().map(|a| a.ceo_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SipArticle {
    pub ceo_id: String,

    #[serde(default)]
    pub html_path: Option<String>,

    #[serde(default)]
    pub pdf_path: Option<String>,

    #[serde(default)]
    pub mods_path: Option<String>,
}

/// Manifest of a submission package under construction.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SipManifest {
    pub id: String,

    #[serde(default)]
    pub pip_id: String,

    #[serde(default)]
    pub articles: Vec<SipArticle>,

    #[serde(default)]
    pub mets_path: Option<String>,

    #[serde(default)]
    pub status: PackageStatus,

    /// Non-fatal problems found while producing this stage's output.
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

impl SipManifest {
    /// Read `sip-manifest.json` from a SIP directory.
    pub fn load(sip_path: &Path) -> Result<Self> {
        read_json(&sip_path.join(SIP_MANIFEST))
    }

    pub fn article_ids(&self) -> Vec<String> {
        self.articles.iter().map(|a| a.ceo_id.clone()).collect()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid manifest: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pip_manifest_ignores_unknown_fields() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(PIP_MANIFEST),
            r#"{
                "id": "2026-01-29",
                "version": "1.0",
                "title": "The Daily Princetonian",
                "date_range": ["2026-01-29", "2026-01-29"],
                "articles": [{"ceo_id": "12345", "ceo_record_path": "articles/12345/ceo_record.json", "media": []}],
                "pdi": {"source_system": "CEO3"},
                "status": "sealed"
            }"#,
        )
        .unwrap();

        let manifest = PipManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.id, "2026-01-29");
        assert_eq!(manifest.article_ids(), vec!["12345"]);
        assert_eq!(manifest.status, PackageStatus::Sealed);
    }

    #[test]
    fn test_sip_manifest_defaults() {
        let manifest: SipManifest = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(manifest.status, PackageStatus::Building);
        assert!(manifest.validation_errors.is_empty());
        assert!(manifest.mets_path.is_none());
    }

    #[test]
    fn test_missing_manifest_mentions_path() {
        let dir = tempdir().unwrap();
        let err = SipManifest::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(SIP_MANIFEST));
    }
}
