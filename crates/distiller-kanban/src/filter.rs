//! Filters: one named processing stage bound to one pipe.

use crate::pipe::{Pipe, RecoveryReport};
use crate::shutdown::ShutdownSignal;
use crate::token::{LogLevel, Token};
use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default sleep between polls of an empty bucket.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The work a concrete stage plugs into a [`Filter`].
pub trait Stage: Send {
    /// Stage name written into log entries.
    fn name(&self) -> &str;

    /// Whether the token carries everything this stage needs.
    ///
    /// Must not mutate anything or touch the filesystem.
    fn is_applicable(&self, token: &Token) -> bool;

    /// Run the transformation, recording results in the token's properties.
    ///
    /// `Ok(false)` and `Err(_)` are both failures; the error text ends up in
    /// the token log.
    fn execute(&self, token: &mut Token) -> anyhow::Result<bool>;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_applicable(&self, token: &Token) -> bool {
        (**self).is_applicable(token)
    }

    fn execute(&self, token: &mut Token) -> anyhow::Result<bool> {
        (**self).execute(token)
    }
}

/// Result of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was waiting.
    NoWork,
    /// The token was committed to the output bucket.
    Succeeded,
    /// The token was quarantined in the input bucket.
    Failed,
}

/// Counters returned by [`Filter::run_forever`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub succeeded: u64,
    pub failed: u64,
}

/// A processing stage bound to a pipe.
pub struct Filter {
    pipe: Pipe,
    stage: Box<dyn Stage>,
    poll_interval: Duration,
    recovery: RecoveryReport,
}

impl Filter {
    /// Bind `stage` to `pipe`, healing any orphaned in-process tokens in the
    /// input bucket first.
    pub fn new(pipe: Pipe, stage: impl Stage + 'static) -> Result<Self> {
        let stage: Box<dyn Stage> = Box::new(stage);
        let recovery = pipe.recover_orphans(stage.name())?;
        if !recovery.is_empty() {
            info!(
                stage = stage.name(),
                requeued = recovery.requeued.len(),
                conflicts = recovery.conflicts.len(),
                "orphan recovery finished"
            );
        }

        Ok(Self {
            pipe,
            stage,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recovery,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }

    pub fn pipe(&self) -> &Pipe {
        &self.pipe
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// What the startup orphan scan did.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Take some waiting token, process it and settle it.
    ///
    /// Stage failures come back as `Ok(RunOutcome::Failed)`. `Err` is reserved
    /// for bucket I/O faults.
    pub fn run_once(&mut self) -> Result<RunOutcome> {
        if self.pipe.take()?.is_none() {
            return Ok(RunOutcome::NoWork);
        }
        self.process_held()
    }

    /// Like [`Filter::run_once`], but only for the token `id`.
    pub fn run_token(&mut self, id: &str) -> Result<RunOutcome> {
        match self.pipe.take_id(id) {
            Ok(_) => self.process_held(),
            Err(Error::TokenNotFound { .. }) => Ok(RunOutcome::NoWork),
            Err(e) => Err(e),
        }
    }

    /// Process tokens until `shutdown` is requested.
    ///
    /// Sleeps the poll interval only when the bucket is empty. The flag is
    /// checked between iterations.
    pub fn run_forever(&mut self, shutdown: &ShutdownSignal) -> Result<RunStats> {
        info!(stage = self.name(), input = %self.pipe.input().display(), "filter started");
        let mut stats = RunStats::default();

        while !shutdown.is_requested() {
            match self.run_once()? {
                RunOutcome::NoWork => {
                    shutdown.sleep(self.poll_interval);
                }
                RunOutcome::Succeeded => stats.succeeded += 1,
                RunOutcome::Failed => stats.failed += 1,
            }
        }

        info!(
            stage = self.name(),
            succeeded = stats.succeeded,
            failed = stats.failed,
            "shutdown requested, exiting gracefully"
        );
        Ok(stats)
    }

    fn process_held(&mut self) -> Result<RunOutcome> {
        let stage = self.stage.name().to_string();
        let Some(token) = self.pipe.held_mut() else {
            return Ok(RunOutcome::NoWork);
        };
        let id = token.id().to_string();

        if !self.stage.is_applicable(token) {
            error!(stage = %stage, id = %id, "token did not validate");
            token.write_log(LogLevel::Error, &stage, "Token did not validate");
            self.quarantine()?;
            return Ok(RunOutcome::Failed);
        }

        match self.stage.execute(token) {
            Ok(true) => {
                debug!(stage = %stage, id = %id, "processed token");
                token.write_log(LogLevel::Info, &stage, "Stage completed successfully");
                self.commit()
            }
            Ok(false) => {
                error!(stage = %stage, id = %id, "did not process token");
                token.write_log(LogLevel::Error, &stage, "Stage did not run successfully");
                self.quarantine()?;
                Ok(RunOutcome::Failed)
            }
            Err(e) => {
                error!(stage = %stage, id = %id, error = %format!("{e:#}"), "error processing token");
                token.write_log(LogLevel::Error, &stage, format!("in {stage}: {e:#}"));
                self.quarantine()?;
                Ok(RunOutcome::Failed)
            }
        }
    }

    fn commit(&mut self) -> Result<RunOutcome> {
        let err = match self.pipe.commit() {
            Ok(()) => return Ok(RunOutcome::Succeeded),
            Err(e) => e,
        };

        // The output copy may already exist; the marker is then left for
        // orphan recovery, which flags the duplicate.
        let stage = self.stage.name().to_string();
        let Some(token) = self.pipe.held_mut() else {
            return Err(err);
        };
        warn!(stage = %stage, id = token.id(), error = %err, "commit failed, quarantining");
        token.write_log(LogLevel::Error, &stage, format!("commit failed: {err}"));
        self.quarantine()?;
        Ok(RunOutcome::Failed)
    }

    /// Quarantine the held token. If even that cannot be persisted, drop the
    /// in-memory copy so nothing stays held; the on-disk marker is healed at
    /// the next startup.
    fn quarantine(&mut self) -> Result<()> {
        if let Err(e) = self.pipe.quarantine() {
            if let Some(token) = self.pipe.abandon() {
                error!(
                    stage = self.stage.name(),
                    id = token.id(),
                    error = %e,
                    "could not persist token, leaving in-process marker for recovery"
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("stage", &self.stage.name())
            .field("pipe", &self.pipe)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
