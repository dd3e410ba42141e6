use super::{record_validation_errors, METS_PATH, SIP_PATH, STATUS};
use crate::collaborators::SipCompiler;
use distiller_kanban::{Stage, Token};
use std::path::Path;

/// Final stage: compiles the METS document and seals the SIP.
///
/// Records the collaborator's status as reported. A compiler that returns
/// without sealing still counts as a stage success; the operator surface
/// treats anything other than `sealed` as not done.
pub struct MetsStage {
    compiler: Box<dyn SipCompiler>,
}

impl MetsStage {
    pub fn new(compiler: Box<dyn SipCompiler>) -> Self {
        Self { compiler }
    }
}

impl Stage for MetsStage {
    fn name(&self) -> &str {
        "mets"
    }

    fn is_applicable(&self, token: &Token) -> bool {
        token.require_str(SIP_PATH).is_some()
    }

    fn execute(&self, token: &mut Token) -> anyhow::Result<bool> {
        let sip_path = token.require_str(SIP_PATH).unwrap_or_default().to_string();
        let manifest = self.compiler.compile(Path::new(&sip_path))?;

        if let Some(mets_path) = &manifest.mets_path {
            token.put(METS_PATH, mets_path.as_str())?;
        }
        token.put(STATUS, manifest.status.as_str())?;
        record_validation_errors(token, &manifest)?;
        Ok(true)
    }
}
