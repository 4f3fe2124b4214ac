//! Tag collections shared by pipelines and memory records.
//!
//! Tags are a multi-map: a key may carry several values, and the same
//! value may be repeated under different keys. Order is not significant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key for the reserved `__document_id` tag.
pub const TAG_DOCUMENT_ID: &str = "__document_id";
/// Key for the reserved `__file_id` tag.
pub const TAG_FILE_ID: &str = "__file_id";
/// Key for the reserved `__file_partition` tag.
pub const TAG_FILE_PARTITION: &str = "__file_partition";
/// Key for the reserved `__file_type` tag.
pub const TAG_FILE_TYPE: &str = "__file_type";

const RESERVED_PREFIX: &str = "__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
  #[error("tag key '{0}' is reserved and may not be set by callers")]
  ReservedTagKey(String),
}

/// A multi-valued tag collection.
///
/// Backed by a `BTreeMap` so serialized output (and iteration order in
/// tests) is stable regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, Vec<String>>);

impl Tags {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a value under `key`, rejecting the reserved `__`-prefixed namespace.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), TagError> {
    let key = key.into();
    if key.starts_with(RESERVED_PREFIX) {
      return Err(TagError::ReservedTagKey(key));
    }
    self.0.entry(key).or_default().push(value.into());
    Ok(())
  }

  /// Insert a value under a reserved key. Meant for the orchestrator/handlers
  /// stamping `__document_id` etc. onto pipeline tags, never for caller input.
  pub fn insert_reserved(&mut self, key: &str, value: impl Into<String>) {
    debug_assert!(key.starts_with(RESERVED_PREFIX));
    self.0.entry(key.to_string()).or_default().push(value.into());
  }

  pub fn values(&self, key: &str) -> &[String] {
    self.0.get(key).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn contains(&self, key: &str, value: &str) -> bool {
    self.values(key).iter().any(|v| v == value)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Merge `other` into `self`, including reserved keys (used when the
  /// orchestrator stamps `__document_id` etc. onto caller-supplied tags).
  pub fn merge(&mut self, other: &Tags) {
    for (k, vs) in other.iter() {
      for v in vs {
        self.0.entry(k.clone()).or_default().push(v.clone());
      }
    }
  }

  /// Build from caller-supplied pairs, validating the reserved namespace.
  pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, TagError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut tags = Tags::new();
    for (k, v) in pairs {
      tags.insert(k, v)?;
    }
    Ok(tags)
  }

  /// True if every `(key, value)` pair in `filters` is present in `self` for at
  /// least one matching value (union semantics: passing the same key twice
  /// means "either value matches").
  pub fn matches_filters(&self, filters: &[(String, String)]) -> bool {
    use std::collections::HashMap;
    if filters.is_empty() {
      return true;
    }
    let mut by_key: HashMap<&str, Vec<&str>> = HashMap::new();
    for (k, v) in filters {
      by_key.entry(k.as_str()).or_default().push(v.as_str());
    }
    by_key
      .into_iter()
      .all(|(key, values)| values.iter().any(|v| self.contains(key, v)))
  }
}
