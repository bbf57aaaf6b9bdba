//! Entity keys and stored record envelopes

use crate::error::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Hierarchical, slash-separated identity of a persisted entity
///
/// Keys look like `league/42/season/2021/team/5`. Each segment is limited to
/// ASCII alphanumerics, `-` and `_` so a key maps onto a relative file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey(String);

impl EntityKey {
    /// Parse and validate a key
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PersistenceError::invalid_operation("entity key must not be empty"));
        }

        for segment in raw.split('/') {
            let valid = !segment.is_empty()
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(PersistenceError::invalid_operation(format!(
                    "invalid segment {segment:?} in entity key {raw:?}"
                )));
            }
        }

        Ok(Self(raw))
    }

    /// Build a key from already-formatted segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments.into_iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>();
        Self::parse(joined.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key lies at or below `prefix`
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        prefix.is_empty()
            || self.0 == prefix
            || (self.0.starts_with(prefix) && self.0[prefix.len()..].starts_with('/'))
    }

    /// Relative file path of the JSON document holding this entity
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.0.split('/').collect();
        path.set_extension("json");
        path
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityKey {
    type Error = PersistenceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.0
    }
}

/// Envelope written for every entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: EntityKey,

    /// Record type tag supplied by the writer
    pub kind: String,

    /// Number of writes that changed the document
    pub revision: u64,

    pub updated_at: DateTime<Utc>,

    pub data: serde_json::Value,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    /// No record existed under the key
    Inserted,
    /// A record existed and its data differed
    Updated,
    /// A record with identical data already existed; nothing was written
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_key() {
        let key = EntityKey::parse("league/42/season/2021/team/5").unwrap();
        assert_eq!(key.as_str(), "league/42/season/2021/team/5");
        assert_eq!(key.relative_path(), PathBuf::from("league/42/season/2021/team/5.json"));
    }

    #[test]
    fn test_reject_traversal_and_empty_segments() {
        assert!(EntityKey::parse("").is_err());
        assert!(EntityKey::parse("league//2021").is_err());
        assert!(EntityKey::parse("league/../etc").is_err());
        assert!(EntityKey::parse("league/4 2").is_err());
    }

    #[test]
    fn test_prefix_matching_respects_segments() {
        let key = EntityKey::parse("league/42/season/2021").unwrap();
        assert!(key.starts_with("league/42"));
        assert!(key.starts_with("league/42/"));
        assert!(key.starts_with("league/42/season/2021"));
        assert!(!key.starts_with("league/4"));
        assert!(key.starts_with(""));
    }

    #[test]
    fn test_key_serializes_as_string() {
        let key = EntityKey::from_segments(["league", "42"]).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"league/42\"");
        let back: EntityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<EntityKey>("\"a/../b\"").is_err());
    }
}
