//! Token file codec.
//!
//! Writes go through a temporary file in the destination directory and are
//! renamed over the final name only after an fsync, so a reader never sees a
//! partial token under a bucket-state name.

use crate::token::Token;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Load a token from a JSON file.
pub fn load_token(path: &Path) -> Result<Token> {
    let file = File::open(path)?;
    let token: Token = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::corrupt_token(path, e.to_string()))?;
    token
        .validate()
        .map_err(|e| Error::corrupt_token(path, e.to_string()))?;
    Ok(token)
}

/// Atomically write a token to `destination`, replacing any existing file.
pub fn dump_token(token: &Token, destination: &Path) -> Result<()> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // Default tempfile names start with '.', which bucket listings skip.
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, token)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(destination)?;
    Ok(())
}
