//! Pipes move tokens between the states of an input and an output bucket.
//!
//! The claim (`<id>.json` renamed to `<id>.bak`) is the only cross-process
//! synchronization in the system. Whichever process renames first owns the
//! token; everybody else sees `NotFound` and moves on.

use crate::codec::{dump_token, load_token};
use crate::state::{find_state, list_ids, TokenState};
use crate::token::{validate_id, LogLevel, Token};
use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of the startup orphan scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// In-process markers demoted back to waiting.
    pub requeued: Vec<String>,
    /// Markers whose token already reached the output bucket; moved to errored.
    pub conflicts: Vec<String>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.conflicts.is_empty()
    }
}

/// Couples one input bucket to one output bucket and holds at most one token.
#[derive(Debug)]
pub struct Pipe {
    input: PathBuf,
    output: PathBuf,
    token: Option<Token>,
}

impl Pipe {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            token: None,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn held(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn held_mut(&mut self) -> Option<&mut Token> {
        self.token.as_mut()
    }

    pub fn is_holding(&self) -> bool {
        self.token.is_some()
    }

    /// Claim some waiting token from the input bucket.
    ///
    /// Selection follows directory iteration order, which is unspecified.
    /// Returns `Ok(None)` when nothing is waiting.
    pub fn take(&mut self) -> Result<Option<&mut Token>> {
        self.ensure_empty()?;

        for id in list_ids(&self.input, TokenState::Waiting)? {
            match self.claim(&id) {
                Ok(Some(token)) => {
                    self.token = Some(token);
                    return Ok(self.token.as_mut());
                }
                // Lost the race or the file was poisoned; try the next one.
                Ok(None) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Claim a specific waiting token.
    pub fn take_id(&mut self, id: &str) -> Result<&mut Token> {
        self.ensure_empty()?;
        validate_id(id)?;

        match self.claim(id)? {
            Some(token) => {
                self.token = Some(token);
                self.token.as_mut().ok_or(Error::NotHolding)
            }
            None => Err(Error::token_not_found(id, &self.input)),
        }
    }

    /// Persist the held token as waiting in the output bucket and drop the
    /// in-process marker.
    ///
    /// The marker is first rewritten with a commit flag, so a crash anywhere
    /// before the marker is removed is seen by [`Pipe::recover_orphans`] as a
    /// possible duplicate, even after a later stage has moved the output copy
    /// on.
    pub fn commit(&mut self) -> Result<()> {
        let mut token = self.token.take().ok_or(Error::NotHolding)?;
        let marker = TokenState::InProcess.path(&self.input, token.id());

        token.set_committing(true);
        let flagged = dump_token(&token, &marker);
        token.set_committing(false);
        if let Err(e) = flagged {
            // Keep holding so the caller can still quarantine.
            self.token = Some(token);
            return Err(e);
        }

        let written = dump_token(&token, &TokenState::Waiting.path(&self.output, token.id()));
        if let Err(e) = written {
            self.token = Some(token);
            return Err(e);
        }
        fs::remove_file(&marker)?;
        debug!(id = token.id(), output = %self.output.display(), "token committed");
        Ok(())
    }

    /// Persist the held token as errored in the input bucket.
    pub fn quarantine(&mut self) -> Result<()> {
        self.settle_locally(TokenState::Errored)
    }

    /// Return the held token to waiting in the input bucket.
    pub fn release(&mut self) -> Result<()> {
        self.settle_locally(TokenState::Waiting)
    }

    /// Forget the held token without touching the filesystem.
    ///
    /// The in-process marker stays on disk and is healed by the next orphan
    /// scan. Used only when persisting has already failed.
    pub fn abandon(&mut self) -> Option<Token> {
        self.token.take()
    }

    /// Load every waiting token in the input bucket without claiming it.
    ///
    /// Tokens claimed by another process between listing and loading are
    /// skipped.
    pub fn list_waiting(&self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        for id in list_ids(&self.input, TokenState::Waiting)? {
            match load_token(&TokenState::Waiting.path(&self.input, &id)) {
                Ok(token) => tokens.push(token),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(tokens)
    }

    /// Demote in-process markers left by a dead process back to waiting.
    ///
    /// A marker carrying the commit flag, or whose id is already present in
    /// the output bucket, died inside a commit. Running the stage again is
    /// only safe for idempotent collaborators, so that token goes to errored
    /// for an operator to resolve instead.
    pub fn recover_orphans(&self, stage: &str) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for id in list_ids(&self.input, TokenState::InProcess)? {
            let marker = TokenState::InProcess.path(&self.input, &id);
            let loaded = load_token(&marker);
            let committing = matches!(&loaded, Ok(token) if token.is_committing());
            let downstream = find_state(&self.output, &id);

            if committing || downstream.is_some() {
                warn!(
                    stage,
                    id = %id,
                    committing,
                    output_state = ?downstream,
                    "in-process token was interrupted mid-commit, quarantining"
                );
                let conflict = Error::CommitConflict {
                    id: id.clone(),
                    input: self.input.clone(),
                    output: self.output.clone(),
                };
                if let Ok(mut token) = loaded {
                    token.set_committing(false);
                    token.write_log(LogLevel::Error, stage, conflict.to_string());
                    dump_token(&token, &marker)?;
                }
                rename_if_present(&marker, &TokenState::Errored.path(&self.input, &id))?;
                report.conflicts.push(id);
                continue;
            }

            warn!(stage, id = %id, "recovering orphaned token");
            if rename_if_present(&marker, &TokenState::Waiting.path(&self.input, &id))? {
                report.requeued.push(id);
            }
        }

        Ok(report)
    }

    fn ensure_empty(&self) -> Result<()> {
        match &self.token {
            Some(token) => Err(Error::already_holding(token.id())),
            None => Ok(()),
        }
    }

    /// Rename waiting to in-process and load the claimed file.
    ///
    /// `Ok(None)` means the token was not there to claim, or was claimed but
    /// could not be decoded and has been moved to errored.
    fn claim(&self, id: &str) -> Result<Option<Token>> {
        let waiting = TokenState::Waiting.path(&self.input, id);
        let marker = TokenState::InProcess.path(&self.input, id);

        if !rename_if_present(&waiting, &marker)? {
            return Ok(None);
        }

        match load_token(&marker) {
            Ok(token) if token.id() == id => Ok(Some(token)),
            Ok(token) => {
                warn!(file = %marker.display(), content_id = token.id(), "token id does not match file name");
                rename_if_present(&marker, &TokenState::Errored.path(&self.input, id))?;
                Ok(None)
            }
            Err(e @ Error::CorruptToken { .. }) => {
                warn!(error = %e, "quarantining undecodable token");
                rename_if_present(&marker, &TokenState::Errored.path(&self.input, id))?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Rewrite the marker with the held token, then rename it in place.
    fn settle_locally(&mut self, state: TokenState) -> Result<()> {
        let token = self.token.take().ok_or(Error::NotHolding)?;
        let marker = TokenState::InProcess.path(&self.input, token.id());

        if let Err(e) = dump_token(&token, &marker) {
            self.token = Some(token);
            return Err(e);
        }
        fs::rename(&marker, state.path(&self.input, token.id()))?;
        debug!(id = token.id(), ?state, input = %self.input.display(), "token settled");
        Ok(())
    }
}

/// Rename `from` to `to`; `Ok(false)` if `from` no longer exists.
fn rename_if_present(from: &Path, to: &Path) -> Result<bool> {
    match fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
