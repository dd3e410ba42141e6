//! # distiller-kanban
//!
//! A durable, file-system-backed work queue that moves tokens through a
//! sequence of named stages.
//!
//! - **Token**: an id, an open JSON property map and an audit log
//! - **Bucket**: a directory holding tokens as `<id>.json` (waiting),
//!   `<id>.bak` (in-process) or `<id>.err` (errored)
//! - **Pipe**: the only thing that moves a token between those states
//! - **Filter**: a [`Stage`] bound to a pipe, with orphan recovery and
//!   cooperative shutdown
//! - **Pipeline**: bucket registry, pipe factory and snapshot
//!
//! Claiming a token is a single `rename` inside the input bucket, so several
//! processes may poll the same bucket safely as long as it lives on one local
//! volume.
//!
//! ## Example
//!
//! ```no_run
//! use distiller_kanban::{Filter, Pipeline, RunOutcome, Stage, Token};
//!
//! struct Upper;
//!
//! impl Stage for Upper {
//!     fn name(&self) -> &str {
//!         "upper"
//!     }
//!
//!     fn is_applicable(&self, token: &Token) -> bool {
//!         token.require_str("text").is_some()
//!     }
//!
//!     fn execute(&self, token: &mut Token) -> anyhow::Result<bool> {
//!         let text = token.get_str("text").unwrap_or_default().to_uppercase();
//!         token.put("text", text)?;
//!         Ok(true)
//!     }
//! }
//!
//! let pipeline = Pipeline::from_buckets([("in", "/srv/in"), ("out", "/srv/out")]);
//! let mut filter = Filter::new(pipeline.pipe("in", "out")?, Upper)?;
//! if filter.run_once()? == RunOutcome::Failed {
//!     eprintln!("see /srv/in for the quarantined token");
//! }
//! # Ok::<(), distiller_kanban::Error>(())
//! ```

pub mod codec;
mod error;
pub mod filter;
pub mod pipe;
pub mod pipeline;
pub mod shutdown;
pub mod state;
pub mod token;

pub use codec::{dump_token, load_token};
pub use error::{Error, Result};
pub use filter::{Filter, RunOutcome, RunStats, Stage, DEFAULT_POLL_INTERVAL};
pub use pipe::{Pipe, RecoveryReport};
pub use pipeline::{BucketSnapshot, Pipeline};
pub use shutdown::ShutdownSignal;
pub use state::{find_state, TokenState};
pub use token::{LogEntry, LogLevel, Token};
