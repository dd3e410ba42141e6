//! One-shot driver: seeds a token and walks it through every stage once.

use crate::collaborators::{Collaborators, PipManifest};
use crate::config::Config;
use crate::stages::{
    bucket_names, standard_stages, ARTICLE_IDS, DATE_RANGE, INTAKE_BUCKET, PIP_PATH, STATUS,
    TITLE, VALIDATION_ERRORS,
};
use anyhow::{Context, Result};
use distiller_kanban::{
    dump_token, find_state, load_token, BucketSnapshot, Filter, LogLevel, Pipeline, RunOutcome,
    Stage, Token, TokenState,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Terminal status of a successfully compiled package.
pub const SEALED: &str = "sealed";

/// Bucket registry of the standard topology under `root`, without building
/// any filters. Read-only callers use this so no recovery runs.
pub fn standard_pipeline(root: &Path) -> Pipeline {
    Pipeline::from_buckets(bucket_names().map(|name| (name, root.join(name))))
}

/// Where a token came to rest after a pass.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub bucket: String,
    pub state: TokenState,
    pub token: Token,
    /// The token is waiting in the terminal bucket.
    pub complete: bool,
}

impl RunReport {
    pub fn id(&self) -> &str {
        self.token.id()
    }

    pub fn status(&self) -> Option<&str> {
        self.token.get_str(STATUS)
    }

    pub fn is_sealed(&self) -> bool {
        self.complete && self.status() == Some(SEALED)
    }

    /// Validation errors followed by the messages of ERROR log entries.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = self.token.get_str_list(VALIDATION_ERRORS);
        errors.extend(
            self.token
                .log()
                .iter()
                .filter(|entry| entry.level == LogLevel::Error)
                .map(|entry| format!("[{}] {}", entry.stage, entry.message)),
        );
        errors
    }
}

/// Outcome of one PIP in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub pip_path: PathBuf,
    pub result: Result<RunReport>,
}

/// Per-PIP outcomes of [`Orchestrator::run_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn all_sealed(&self) -> bool {
        self.items
            .iter()
            .all(|item| matches!(&item.result, Ok(report) if report.is_sealed()))
    }

    pub fn sealed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(&item.result, Ok(report) if report.is_sealed()))
            .count()
    }

    /// Every error across the batch, prefixed with the token id or PIP path.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for item in &self.items {
            match &item.result {
                Ok(report) => errors.extend(
                    report
                        .errors()
                        .into_iter()
                        .map(|e| format!("{}: {}", report.id(), e)),
                ),
                Err(e) => errors.push(format!("{}: {:#}", item.pip_path.display(), e)),
            }
        }
        errors
    }
}

/// A linear pipeline of filters over a fixed bucket sequence.
pub struct Orchestrator {
    pipeline: Pipeline,
    buckets: Vec<String>,
    filters: Vec<Filter>,
}

impl Orchestrator {
    /// Wire `stages` pairwise between `intake` and each stage's output bucket.
    ///
    /// Bucket directories are created under `root`. Building the filters
    /// runs orphan recovery on every input bucket.
    pub fn new(
        root: &Path,
        intake: &str,
        stages: Vec<(String, Box<dyn Stage>)>,
    ) -> Result<Self> {
        let mut buckets = vec![intake.to_string()];
        buckets.extend(stages.iter().map(|(output, _)| output.clone()));

        let pipeline =
            Pipeline::from_buckets(buckets.iter().map(|name| (name.clone(), root.join(name))));
        pipeline
            .ensure_dirs()
            .with_context(|| format!("Failed to create bucket directories under {:?}", root))?;

        let mut filters = Vec::with_capacity(stages.len());
        for (i, (_, stage)) in stages.into_iter().enumerate() {
            let pipe = pipeline.pipe(&buckets[i], &buckets[i + 1])?;
            filters.push(Filter::new(pipe, stage)?);
        }

        Ok(Self {
            pipeline,
            buckets,
            filters,
        })
    }

    /// The newspaper topology: `pip_harvested` through `sip_complete`.
    pub fn standard(config: &Config, collaborators: Collaborators) -> Result<Self> {
        let stages = standard_stages(&config.workspace.sip_output, collaborators);
        Self::new(&config.workspace.root, INTAKE_BUCKET, stages)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Bucket names in pipeline order.
    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, BucketSnapshot>> {
        Ok(self.pipeline.snapshot()?)
    }

    /// Seed a token from the PIP at `pip_path` and drive it through.
    pub fn run(&mut self, pip_path: &Path) -> Result<RunReport> {
        let manifest = PipManifest::load(pip_path)?;
        let pip_path = std::fs::canonicalize(pip_path).unwrap_or_else(|_| pip_path.to_path_buf());

        let mut token = Token::new(manifest.id.as_str())
            .with_context(|| format!("PIP {:?} has an unusable id", pip_path))?;
        token.put(TITLE, manifest.title.as_str())?;
        token.put(
            DATE_RANGE,
            vec![manifest.date_range.0.as_str(), manifest.date_range.1.as_str()],
        )?;
        token.put(ARTICLE_IDS, manifest.article_ids())?;
        token.put(PIP_PATH, pip_path.display().to_string())?;

        self.run_seeded(token)
    }

    /// Persist `token` as waiting in the intake bucket, run every filter once
    /// for it and report where it settled.
    ///
    /// Refuses an id already present anywhere in the pipeline; an existing
    /// token is re-driven, not re-seeded.
    pub fn run_seeded(&mut self, token: Token) -> Result<RunReport> {
        let id = token.id().to_string();
        for name in &self.buckets {
            let location = self.pipeline.bucket(name)?;
            if let Some(state) = find_state(location, &id) {
                anyhow::bail!("token {} already exists in bucket {} ({:?})", id, name, state);
            }
        }

        let intake = self.pipeline.bucket(&self.buckets[0])?;
        dump_token(&token, &TokenState::Waiting.path(intake, &id))?;
        tracing::info!("Seeded token {} into {}", id, self.buckets[0]);

        self.drive(&id)?;
        self.find_token(&id)
    }

    /// Run each filter once for `id`, stopping at the first that does not
    /// succeed.
    fn drive(&mut self, id: &str) -> Result<()> {
        for filter in &mut self.filters {
            match filter.run_token(id)? {
                RunOutcome::Succeeded => {
                    tracing::debug!("{} advanced token {}", filter.name(), id);
                }
                RunOutcome::NoWork => {
                    tracing::warn!("{} found no work for token {}, stopping", filter.name(), id);
                    break;
                }
                RunOutcome::Failed => {
                    tracing::warn!("{} failed token {}, stopping", filter.name(), id);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Locate `id`: the terminal bucket first, then each bucket from last to
    /// first, errored before waiting.
    ///
    /// A token left in-process is an error of its own, distinct from one
    /// that is in no bucket at all.
    pub fn find_token(&self, id: &str) -> Result<RunReport> {
        let Some(terminal) = self.buckets.last() else {
            anyhow::bail!("pipeline has no buckets");
        };

        let terminal_path = TokenState::Waiting.path(self.pipeline.bucket(terminal)?, id);
        if terminal_path.is_file() {
            return self.report(terminal, TokenState::Waiting, &terminal_path, true);
        }

        for name in self.buckets.iter().rev() {
            let location = self.pipeline.bucket(name)?;
            for state in [TokenState::Errored, TokenState::Waiting] {
                let path = state.path(location, id);
                if path.is_file() {
                    return self.report(name, state, &path, false);
                }
            }
        }

        for name in self.buckets.iter().rev() {
            if TokenState::InProcess.path(self.pipeline.bucket(name)?, id).is_file() {
                anyhow::bail!("token {} is stuck in-process in bucket {}", id, name);
            }
        }

        anyhow::bail!("token {} not found in any bucket", id)
    }

    fn report(
        &self,
        bucket: &str,
        state: TokenState,
        path: &Path,
        complete: bool,
    ) -> Result<RunReport> {
        let token = load_token(path)?;
        Ok(RunReport {
            bucket: bucket.to_string(),
            state,
            token,
            complete,
        })
    }

    /// Run every PIP in turn. A failing PIP never stops the batch.
    pub fn run_batch<P: AsRef<Path>>(&mut self, pips: &[P]) -> BatchReport {
        let mut report = BatchReport::default();
        for pip in pips {
            let pip_path = pip.as_ref().to_path_buf();
            let result = self.run(&pip_path);
            match &result {
                Ok(run) if run.is_sealed() => {
                    tracing::info!("{} sealed", run.id());
                }
                Ok(run) => {
                    tracing::warn!("{} stopped in {} ({:?})", run.id(), run.bucket, run.state);
                }
                Err(e) => {
                    tracing::error!("Failed to run {:?}: {:#}", pip_path, e);
                }
            }
            report.items.push(BatchItem { pip_path, result });
        }
        report
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("buckets", &self.buckets)
            .field("filters", &self.filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    struct Always(&'static str, bool);

    impl Stage for Always {
        fn name(&self) -> &str {
            self.0
        }

        fn is_applicable(&self, _token: &Token) -> bool {
            true
        }

        fn execute(&self, token: &mut Token) -> anyhow::Result<bool> {
            token.put(self.0, true)?;
            Ok(self.1)
        }
    }

    fn stages(second_ok: bool) -> Vec<(String, Box<dyn Stage>)> {
        vec![
            ("one".to_string(), Box::new(Always("s1", true)) as Box<dyn Stage>),
            ("two".to_string(), Box::new(Always("s2", second_ok)) as Box<dyn Stage>),
        ]
    }

    #[test]
    fn test_find_token_prefers_errored_over_waiting() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(dir.path(), "intake", stages(true)).unwrap();
        let intake = orchestrator.pipeline().bucket("intake").unwrap();
        let one = orchestrator.pipeline().bucket("one").unwrap();

        dump_token(&Token::new("x").unwrap(), &TokenState::Waiting.path(intake, "x")).unwrap();
        dump_token(&Token::new("x").unwrap(), &TokenState::Errored.path(one, "x")).unwrap();

        let found = orchestrator.find_token("x").unwrap();
        assert_matches!(found, RunReport { ref bucket, state: TokenState::Errored, .. } if bucket == "one");
        assert!(!found.complete);
    }

    #[test]
    fn test_find_token_missing() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(dir.path(), "intake", stages(true)).unwrap();
        let err = orchestrator.find_token("ghost").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_find_token_reports_in_process_separately() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(dir.path(), "intake", stages(true)).unwrap();
        let one = orchestrator.pipeline().bucket("one").unwrap();
        dump_token(&Token::new("x").unwrap(), &TokenState::InProcess.path(one, "x")).unwrap();

        let err = orchestrator.find_token("x").unwrap_err().to_string();
        assert!(err.contains("in-process in bucket one"), "{err}");
        assert!(!err.contains("not found"));
    }

    #[test]
    fn test_reseeding_existing_id_is_refused() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(dir.path(), "intake", stages(false)).unwrap();

        let first = orchestrator.run_seeded(Token::new("dup").unwrap()).unwrap();
        assert_eq!(first.bucket, "one");
        assert_eq!(first.state, TokenState::Errored);

        let err = orchestrator.run_seeded(Token::new("dup").unwrap()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_report_errors_include_log_and_validation() {
        let mut token = Token::new("x").unwrap();
        token.put(VALIDATION_ERRORS, vec!["pdf: font fallback"]).unwrap();
        token.write_log(LogLevel::Info, "html", "Stage completed successfully");
        token.write_log(LogLevel::Error, "alto", "in alto: no text layer");
        let report = RunReport {
            bucket: "pdf_transform".to_string(),
            state: TokenState::Errored,
            token,
            complete: false,
        };

        assert_eq!(
            report.errors(),
            vec!["pdf: font fallback", "[alto] in alto: no text layer"]
        );
        assert!(!report.is_sealed());
    }
}
