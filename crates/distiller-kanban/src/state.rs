//! Physical token states inside a bucket directory.

use std::path::{Path, PathBuf};

/// The three mutually exclusive states a token id can occupy in a bucket.
///
/// Each state is a file suffix: `<id>.json` waiting, `<id>.bak` in-process,
/// `<id>.err` errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenState {
    Waiting,
    InProcess,
    Errored,
}

impl TokenState {
    pub const ALL: [TokenState; 3] = [
        TokenState::Waiting,
        TokenState::InProcess,
        TokenState::Errored,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            TokenState::Waiting => "json",
            TokenState::InProcess => "bak",
            TokenState::Errored => "err",
        }
    }

    /// Path of `id` in this state inside `bucket`.
    pub fn path(self, bucket: &Path, id: &str) -> PathBuf {
        // Not Path::with_extension: ids like "issue.v2" contain dots.
        bucket.join(format!("{}.{}", id, self.extension()))
    }

    /// Split a bucket file name into token id and state.
    ///
    /// Hidden files (temporary writes) and unknown suffixes yield `None`.
    pub fn parse_file_name(name: &str) -> Option<(&str, TokenState)> {
        if name.starts_with('.') {
            return None;
        }
        Self::ALL.into_iter().find_map(|state| {
            name.strip_suffix(state.extension())
                .and_then(|rest| rest.strip_suffix('.'))
                .filter(|id| !id.is_empty())
                .map(|id| (id, state))
        })
    }
}

/// List the ids in `bucket` that are in `state`, in directory order.
pub(crate) fn list_ids(bucket: &Path, state: TokenState) -> std::io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(bucket)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((id, found)) = TokenState::parse_file_name(name) {
            if found == state {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

/// Which state, if any, `id` currently occupies in `bucket`.
pub fn find_state(bucket: &Path, id: &str) -> Option<TokenState> {
    TokenState::ALL
        .into_iter()
        .find(|state| state.path(bucket, id).is_file())
}
