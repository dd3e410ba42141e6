use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub stages: StagesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Directory holding one sub-directory per bucket
    #[serde(default = "default_bucket_root")]
    pub root: PathBuf,

    /// Base directory where SIPs are assembled
    #[serde(default = "default_sip_output")]
    pub sip_output: PathBuf,
}

fn default_bucket_root() -> PathBuf {
    PathBuf::from("./workspace/pipeline")
}

fn default_sip_output() -> PathBuf {
    PathBuf::from("./workspace/sips")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_bucket_root(),
            sip_output: default_sip_output(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    /// Seconds a continuous-mode filter sleeps when its bucket is empty
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// External command per conversion stage. A missing entry leaves the stage
/// without a collaborator; tokens reaching it are quarantined.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub html: Option<CommandConfig>,

    #[serde(default)]
    pub pdf: Option<CommandConfig>,

    #[serde(default)]
    pub alto: Option<CommandConfig>,

    #[serde(default)]
    pub mods: Option<CommandConfig>,

    #[serde(default)]
    pub image: Option<CommandConfig>,

    #[serde(default)]
    pub mets: Option<CommandConfig>,
}

impl StagesConfig {
    /// Configured commands keyed by stage name, in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&CommandConfig>)> {
        [
            ("html", self.html.as_ref()),
            ("pdf", self.pdf.as_ref()),
            ("alto", self.alto.as_ref()),
            ("mods", self.mods.as_ref()),
            ("image", self.image.as_ref()),
            ("mets", self.mets.as_ref()),
        ]
        .into_iter()
    }

    pub fn get(&self, stage: &str) -> Option<&CommandConfig> {
        self.iter()
            .find(|(name, _)| *name == stage)
            .and_then(|(_, command)| command)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Executable to run; `{var}` templates are expanded
    pub command: String,

    /// Arguments; `{pip_path}`, `{sip_path}`, `{token_id}` and `{stage}` are expanded
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
