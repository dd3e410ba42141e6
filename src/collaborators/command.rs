//! Collaborators backed by external commands.
//!
//! The conversion tools (HTML rendering, PDF generation, OCR layout, MODS,
//! page imaging, METS compilation) live outside this program. Each is invoked
//! as a command that updates the SIP directory in place and leaves an updated
//! `sip-manifest.json` behind.

use super::manifest::SipManifest;
use super::template::TemplateContext;
use super::{PipTransformer, SipCompiler, SipTransformer};
use crate::config::CommandConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

const STDERR_LIMIT: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{program} exited with {}: {stderr}", exit_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("no collaborator configured for stage {stage}")]
    Unconfigured { stage: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Runs a configured command for one stage.
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    stage: String,
    config: CommandConfig,
}

impl CommandCollaborator {
    pub fn new(stage: impl Into<String>, config: CommandConfig) -> Self {
        Self {
            stage: stage.into(),
            config,
        }
    }

    fn run(&self, ctx: TemplateContext, sip_path: &Path) -> Result<SipManifest> {
        let program = ctx.substitute(&self.config.command);
        let args = ctx.substitute_all(&self.config.args);

        tracing::info!("[{}] executing {} {:?}", self.stage, program, args);

        let output = Command::new(&program)
            .args(&args)
            .envs(&self.config.env)
            .output()
            .with_context(|| format!("Failed to execute: {}", program))?;

        tracing::debug!(
            "[{}] command output: {}",
            self.stage,
            String::from_utf8_lossy(&output.stdout)
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let stderr = match stderr.char_indices().nth(STDERR_LIMIT) {
                Some((cut, _)) => format!("{}...", &stderr[..cut]),
                None => stderr.to_string(),
            };
            return Err(CommandError::Failed {
                program,
                code: output.status.code(),
                stderr,
            }
            .into());
        }

        SipManifest::load(sip_path)
    }

    fn context(&self, sip_path: &Path) -> TemplateContext {
        let token_id = sip_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        TemplateContext::new()
            .with_token(&token_id, &self.stage)
            .with_sip(sip_path)
    }
}

impl PipTransformer for CommandCollaborator {
    fn transform(&self, pip_path: &Path, sip_path: &Path) -> Result<SipManifest> {
        let ctx = self.context(sip_path).with_pip(pip_path);
        self.run(ctx, sip_path)
    }
}

impl SipTransformer for CommandCollaborator {
    fn transform(&self, sip_path: &Path) -> Result<SipManifest> {
        self.run(self.context(sip_path), sip_path)
    }
}

impl SipCompiler for CommandCollaborator {
    fn compile(&self, sip_path: &Path) -> Result<SipManifest> {
        self.run(self.context(sip_path), sip_path)
    }
}

/// Stand-in for a stage with no command configured. Always faults, so the
/// token is quarantined at that stage rather than the process refusing to
/// start.
#[derive(Debug, Clone)]
pub struct UnconfiguredCollaborator {
    stage: String,
}

impl UnconfiguredCollaborator {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
        }
    }

    fn fail(&self) -> Result<SipManifest> {
        Err(CommandError::Unconfigured {
            stage: self.stage.clone(),
        }
        .into())
    }
}

impl PipTransformer for UnconfiguredCollaborator {
    fn transform(&self, _pip_path: &Path, _sip_path: &Path) -> Result<SipManifest> {
        self.fail()
    }
}

impl SipTransformer for UnconfiguredCollaborator {
    fn transform(&self, _sip_path: &Path) -> Result<SipManifest> {
        self.fail()
    }
}

impl SipCompiler for UnconfiguredCollaborator {
    fn compile(&self, _sip_path: &Path) -> Result<SipManifest> {
        self.fail()
    }
}
