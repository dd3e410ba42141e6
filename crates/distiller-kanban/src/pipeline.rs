//! Bucket registry and pipe factory.

use crate::codec::{dump_token, load_token};
use crate::pipe::Pipe;
use crate::state::{list_ids, TokenState};
use crate::token::{validate_id, LogLevel};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Token ids per state in one bucket, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketSnapshot {
    pub waiting: Vec<String>,
    pub errored: Vec<String>,
    pub in_process: Vec<String>,
}

impl BucketSnapshot {
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty() && self.errored.is_empty() && self.in_process.is_empty()
    }
}

/// Maps bucket names to directories and builds pipes between them.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    buckets: BTreeMap<String, PathBuf>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pipeline from `(name, location)` pairs.
    pub fn from_buckets<I, N, P>(buckets: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: Into<PathBuf>,
    {
        let mut pipeline = Self::new();
        for (name, location) in buckets {
            pipeline.register_bucket(name, location);
        }
        pipeline
    }

    /// Register (or re-point) a bucket.
    pub fn register_bucket(&mut self, name: impl Into<String>, location: impl Into<PathBuf>) {
        self.buckets.insert(name.into(), location.into());
    }

    /// Location of a registered bucket.
    pub fn bucket(&self, name: &str) -> Result<&Path> {
        self.buckets
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::NoSuchBucket(name.to_string()))
    }

    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// A pipe from `input` to `output`.
    pub fn pipe(&self, input: &str, output: &str) -> Result<Pipe> {
        Ok(Pipe::new(self.bucket(input)?, self.bucket(output)?))
    }

    /// Create every registered bucket directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        for location in self.buckets.values() {
            fs::create_dir_all(location)?;
        }
        Ok(())
    }

    /// Per-bucket token ids by state. Read-only.
    ///
    /// A bucket whose directory does not exist yet reports as empty.
    pub fn snapshot(&self) -> Result<BTreeMap<String, BucketSnapshot>> {
        let mut out = BTreeMap::new();
        for (name, location) in &self.buckets {
            let snapshot = if location.is_dir() {
                let sorted = |state: TokenState| -> Result<Vec<String>> {
                    let mut ids = list_ids(location, state)?;
                    ids.sort();
                    Ok(ids)
                };
                BucketSnapshot {
                    waiting: sorted(TokenState::Waiting)?,
                    errored: sorted(TokenState::Errored)?,
                    in_process: sorted(TokenState::InProcess)?,
                }
            } else {
                BucketSnapshot::default()
            };
            out.insert(name.clone(), snapshot);
        }
        Ok(out)
    }

    /// Return errored tokens in `bucket` to waiting.
    ///
    /// With `id` set only that token is re-driven; it must be errored.
    /// Returns the ids moved.
    pub fn redrive(&self, bucket: &str, id: Option<&str>) -> Result<Vec<String>> {
        let location = self.bucket(bucket)?;
        let ids = match id {
            Some(id) => {
                validate_id(id)?;
                if !TokenState::Errored.path(location, id).is_file() {
                    return Err(Error::token_not_found(id, location));
                }
                vec![id.to_string()]
            }
            None => list_ids(location, TokenState::Errored)?,
        };

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            let errored = TokenState::Errored.path(location, &id);
            let waiting = TokenState::Waiting.path(location, &id);
            if waiting.exists() || TokenState::InProcess.path(location, &id).exists() {
                tracing::warn!(bucket, id = %id, "token already active, not re-driving");
                continue;
            }
            match load_token(&errored) {
                Ok(mut token) => {
                    token.write_log(LogLevel::Warning, "redrive", format!("re-driven in {bucket}"));
                    dump_token(&token, &errored)?;
                }
                // Undecodable tokens are left for manual repair.
                Err(Error::CorruptToken { .. }) => continue,
                Err(e) => return Err(e),
            }
            fs::rename(&errored, &waiting)?;
            info!(bucket, id = %id, "re-driven errored token");
            moved.push(id);
        }
        Ok(moved)
    }
}
