//! Concrete pipeline stages.
//!
//! Each stage checks that the token carries the path it needs, hands that
//! path to its collaborator and copies the collaborator's results back into
//! the token under the keys below.

mod html;
mod mets;
mod sip_transform;

pub use html::HtmlStage;
pub use mets::MetsStage;
pub use sip_transform::SipTransformStage;

use crate::collaborators::{Collaborators, SipManifest};
use distiller_kanban::{Stage, Token};
use std::path::Path;

// Token property keys shared between stages.
pub const PIP_PATH: &str = "pip_path";
pub const SIP_PATH: &str = "sip_path";
pub const TITLE: &str = "title";
pub const DATE_RANGE: &str = "date_range";
pub const ARTICLE_IDS: &str = "article_ids";
pub const VALIDATION_ERRORS: &str = "validation_errors";
pub const METS_PATH: &str = "mets_path";
pub const STATUS: &str = "status";

/// Output bucket of every stage, in pipeline order, after the intake bucket.
pub const STAGE_BUCKETS: [(&str, &str); 6] = [
    ("html", "html_transform"),
    ("pdf", "pdf_transform"),
    ("alto", "alto_transform"),
    ("mods", "mods_transform"),
    ("image", "image_transform"),
    ("mets", "sip_complete"),
];

/// Bucket the orchestrator seeds.
pub const INTAKE_BUCKET: &str = "pip_harvested";

/// Every bucket of the standard topology, intake first.
pub fn bucket_names() -> impl Iterator<Item = &'static str> {
    std::iter::once(INTAKE_BUCKET).chain(STAGE_BUCKETS.iter().map(|(_, bucket)| *bucket))
}

/// Input and output bucket of a named stage.
pub fn stage_buckets(stage: &str) -> Option<(&'static str, &'static str)> {
    let position = STAGE_BUCKETS.iter().position(|(name, _)| *name == stage)?;
    let input = match position {
        0 => INTAKE_BUCKET,
        n => STAGE_BUCKETS[n - 1].1,
    };
    Some((input, STAGE_BUCKETS[position].1))
}

/// Build the six conversion stages in pipeline order, paired with their
/// output bucket names.
pub fn standard_stages(
    sip_output: &Path,
    collaborators: Collaborators,
) -> Vec<(String, Box<dyn Stage>)> {
    let Collaborators {
        html,
        pdf,
        alto,
        mods,
        image,
        mets,
    } = collaborators;

    let stages: [Box<dyn Stage>; 6] = [
        Box::new(HtmlStage::new(sip_output, html)),
        Box::new(SipTransformStage::pdf(pdf)),
        Box::new(SipTransformStage::alto(alto)),
        Box::new(SipTransformStage::mods(mods)),
        Box::new(SipTransformStage::image(image)),
        Box::new(MetsStage::new(mets)),
    ];

    STAGE_BUCKETS
        .iter()
        .zip(stages)
        .map(|((_, bucket), stage)| (bucket.to_string(), stage))
        .collect()
}

/// Append the collaborator's validation errors to the token, skipping any
/// the token already records. Collaborators may report errors carried over
/// from earlier stages.
fn record_validation_errors(token: &mut Token, manifest: &SipManifest) -> anyhow::Result<()> {
    let existing = token.get_str_list(VALIDATION_ERRORS);
    let new: Vec<&String> = manifest
        .validation_errors
        .iter()
        .filter(|e| !existing.contains(e))
        .collect();
    token.push_errors(VALIDATION_ERRORS, new.into_iter().cloned())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StagesConfig;

    #[test]
    fn test_standard_stage_order() {
        let stages = standard_stages(
            Path::new("/sips"),
            Collaborators::from_config(&StagesConfig::default()),
        );
        let names: Vec<_> = stages.iter().map(|(_, s)| s.name().to_string()).collect();
        assert_eq!(names, vec!["html", "pdf", "alto", "mods", "image", "mets"]);
        assert_eq!(stages.last().unwrap().0, "sip_complete");
    }

    #[test]
    fn test_stage_buckets() {
        assert_eq!(stage_buckets("html"), Some(("pip_harvested", "html_transform")));
        assert_eq!(stage_buckets("mets"), Some(("image_transform", "sip_complete")));
        assert_eq!(stage_buckets("unknown"), None);
        assert_eq!(bucket_names().count(), 7);
        assert!(!bucket_names().any(|b| b == "mets_compile"));
    }

    #[test]
    fn test_validation_errors_accumulate() {
        let mut token = Token::new("x").unwrap();
        token.put(VALIDATION_ERRORS, vec!["html: missing byline"]).unwrap();

        let manifest = SipManifest {
            validation_errors: vec![
                "html: missing byline".to_string(),
                "pdf: font fallback".to_string(),
            ],
            ..Default::default()
        };
        record_validation_errors(&mut token, &manifest).unwrap();
        assert_eq!(
            token.get_str_list(VALIDATION_ERRORS),
            vec!["html: missing byline", "pdf: font fallback"]
        );
    }

    #[test]
    fn test_no_errors_leaves_key_absent() {
        let mut token = Token::new("x").unwrap();
        record_validation_errors(&mut token, &SipManifest::default()).unwrap();
        assert!(!token.contains(VALIDATION_ERRORS));
    }
}
