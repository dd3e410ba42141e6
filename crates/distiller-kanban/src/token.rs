//! The unit of work: an identifier, an open property map and an audit log.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const RESERVED_KEYS: &[&str] = &["id", "log", "committing"];

/// Severity of an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One entry in a token's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub level: LogLevel,
    pub message: String,
}

/// A unit of work moving through the pipeline.
///
/// Serialized as one flat JSON object: `id`, `log`, then every property as a
/// top-level key. Properties carry no schema; stages agree on key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    id: String,
    #[serde(default)]
    log: Vec<LogEntry>,
    /// Set only on an in-process marker while its commit is under way.
    #[serde(default, skip_serializing_if = "is_false")]
    committing: bool,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

impl Token {
    /// Create an empty token.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self {
            id,
            log: Vec::new(),
            committing: false,
            properties: Map::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a property as a string; `None` if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Get a non-empty string property.
    ///
    /// Stages use this for their "required input" checks: an empty path is
    /// as useless as a missing one.
    pub fn require_str(&self, key: &str) -> Option<&str> {
        self.get_str(key).filter(|s| !s.is_empty())
    }

    /// Get a property as a list of strings, skipping non-string elements.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.properties.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Set a property, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(Error::ReservedProperty(key));
        }
        self.properties.insert(key, value.into());
        Ok(())
    }

    /// Append strings to a list property, creating it if needed.
    ///
    /// A non-list value under `key` is replaced by the new list.
    pub fn push_errors<I, S>(&mut self, key: &str, errors: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let new: Vec<String> = errors.into_iter().map(Into::into).collect();
        if new.is_empty() {
            return Ok(());
        }
        let mut existing = self.get_str_list(key);
        existing.extend(new);
        self.put(key, existing)
    }

    /// Append an audit entry stamped with the current time.
    pub fn write_log(&mut self, level: LogLevel, stage: impl Into<String>, message: impl Into<String>) {
        self.log.push(LogEntry {
            timestamp: Utc::now(),
            stage: stage.into(),
            level,
            message: message.into(),
        });
    }

    /// The most recent audit entry, if any.
    pub fn last_log(&self) -> Option<&LogEntry> {
        self.log.last()
    }

    pub(crate) fn is_committing(&self) -> bool {
        self.committing
    }

    pub(crate) fn set_committing(&mut self, committing: bool) {
        self.committing = committing;
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id(&self.id)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.id)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Check that an identifier can serve as a bucket file stem.
pub fn validate_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
        || id.chars().any(char::is_control);
    if bad {
        return Err(Error::InvalidTokenId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_new_rejects_bad_ids() {
        assert!(Token::new("2026-01-29").is_ok());
        assert!(Token::new("issue.v2").is_ok());
        assert_matches!(Token::new(""), Err(Error::InvalidTokenId(_)));
        assert_matches!(Token::new("../escape"), Err(Error::InvalidTokenId(_)));
        assert_matches!(Token::new(".hidden"), Err(Error::InvalidTokenId(_)));
        assert_matches!(Token::new("a/b"), Err(Error::InvalidTokenId(_)));
    }

    #[test]
    fn test_reserved_keys() {
        let mut token = Token::new("t").unwrap();
        assert_matches!(token.put("id", "other"), Err(Error::ReservedProperty(_)));
        assert_matches!(token.put("log", json!([])), Err(Error::ReservedProperty(_)));
        assert_matches!(token.put("committing", true), Err(Error::ReservedProperty(_)));
        assert_eq!(token.id(), "t");
    }

    #[test]
    fn test_flat_serialization() {
        let mut token = Token::new("2026-01-29").unwrap();
        token.put("pip_path", "/pips/2026-01-29").unwrap();
        token.write_log(LogLevel::Info, "html", "done");

        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["id"], "2026-01-29");
        assert_eq!(value["pip_path"], "/pips/2026-01-29");
        assert_eq!(value["log"][0]["level"], "INFO");
        assert_eq!(value["log"][0]["stage"], "html");
    }

    #[test]
    fn test_commit_flag_only_serialized_when_set() {
        let mut token = Token::new("x").unwrap();
        assert!(serde_json::to_value(&token).unwrap().get("committing").is_none());

        token.set_committing(true);
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["committing"], true);
        let loaded: Token = serde_json::from_value(value).unwrap();
        assert!(loaded.is_committing());
        assert!(!loaded.contains("committing"));
    }

    #[test]
    fn test_missing_log_defaults_to_empty() {
        let token: Token =
            serde_json::from_value(json!({"id": "x", "pip_path": "/p"})).unwrap();
        assert!(token.log().is_empty());
        assert_eq!(token.get_str("pip_path"), Some("/p"));
    }

    #[test]
    fn test_require_str_treats_empty_as_missing() {
        let mut token = Token::new("x").unwrap();
        token.put("sip_path", "").unwrap();
        assert_eq!(token.require_str("sip_path"), None);
        token.put("sip_path", "/sips/x").unwrap();
        assert_eq!(token.require_str("sip_path"), Some("/sips/x"));
        token.put("sip_path", 3).unwrap();
        assert_eq!(token.require_str("sip_path"), None);
    }

    #[test]
    fn test_push_errors_accumulates() {
        let mut token = Token::new("x").unwrap();
        token.push_errors("validation_errors", ["a"]).unwrap();
        token
            .push_errors("validation_errors", vec!["b".to_string()])
            .unwrap();
        token
            .push_errors("validation_errors", Vec::<String>::new())
            .unwrap();
        assert_eq!(token.get_str_list("validation_errors"), vec!["a", "b"]);
    }

    #[test]
    fn test_push_nothing_leaves_key_absent() {
        let mut token = Token::new("x").unwrap();
        token
            .push_errors("validation_errors", Vec::<String>::new())
            .unwrap();
        assert!(!token.contains("validation_errors"));
    }
}
