//! Detection of configured stage commands.

use crate::config::StagesConfig;
use std::path::PathBuf;

/// Whether one stage's command can be found.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Stage the command belongs to.
    pub stage: &'static str,
    /// Configured command, if any.
    pub command: Option<String>,
    /// Resolved executable path.
    pub path: Option<PathBuf>,
}

impl ToolInfo {
    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

/// Resolve every configured stage command on `PATH`.
///
/// Commands are looked up, never run.
pub fn check_tools(stages: &StagesConfig) -> Vec<ToolInfo> {
    stages
        .iter()
        .map(|(stage, command)| ToolInfo {
            stage,
            command: command.map(|c| c.command.clone()),
            path: command.and_then(|c| which::which(&c.command).ok()),
        })
        .collect()
}
