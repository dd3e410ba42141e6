use super::{record_validation_errors, SIP_PATH};
use crate::collaborators::SipTransformer;
use distiller_kanban::{Stage, Token};
use std::path::Path;

/// A stage that adds one kind of derivative to an existing SIP.
///
/// The PDF, ALTO, MODS and image stages differ only in their name and
/// collaborator.
pub struct SipTransformStage {
    name: &'static str,
    transformer: Box<dyn SipTransformer>,
}

impl SipTransformStage {
    pub fn new(name: &'static str, transformer: Box<dyn SipTransformer>) -> Self {
        Self { name, transformer }
    }

    pub fn pdf(transformer: Box<dyn SipTransformer>) -> Self {
        Self::new("pdf", transformer)
    }

    pub fn alto(transformer: Box<dyn SipTransformer>) -> Self {
        Self::new("alto", transformer)
    }

    pub fn mods(transformer: Box<dyn SipTransformer>) -> Self {
        Self::new("mods", transformer)
    }

    pub fn image(transformer: Box<dyn SipTransformer>) -> Self {
        Self::new("image", transformer)
    }
}

impl Stage for SipTransformStage {
    fn name(&self) -> &str {
        self.name
    }

    fn is_applicable(&self, token: &Token) -> bool {
        token.require_str(SIP_PATH).is_some()
    }

    fn execute(&self, token: &mut Token) -> anyhow::Result<bool> {
        let sip_path = token.require_str(SIP_PATH).unwrap_or_default().to_string();
        let manifest = self.transformer.transform(Path::new(&sip_path))?;
        record_validation_errors(token, &manifest)?;
        Ok(true)
    }
}
