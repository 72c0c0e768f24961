// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Generic document persistence capability.
//!
//! This core treats persistence as an opaque key/value document store and
//! never assumes a wire format. Keys are structured composite identifiers
//! that serialize deterministically; `find` matches any document whose key
//! contains the queried fields, so partial keys enumerate children.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Deterministic composite key: field order is lexicographic regardless of
/// insertion order, so equal keys always render equal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocKey(BTreeMap<String, String>);

impl DocKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// True when every field of `query` is present with an equal value.
    pub fn contains(&self, query: &DocKey) -> bool {
        query
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).map(|mine| mine == v).unwrap_or(false))
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // BTreeMap ordering makes this deterministic.
        let rendered = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// Opaque document store capability.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the document at (store, key, tag).
    async fn insert(
        &self,
        store: &str,
        key: &DocKey,
        tag: &str,
        value: &[u8],
    ) -> Result<(), DocumentError>;

    /// All documents whose key contains `key` and whose tag matches.
    async fn find(&self, store: &str, key: &DocKey, tag: &str)
        -> Result<Vec<Vec<u8>>, DocumentError>;

    /// Remove every tag of the document with exactly `key`.
    async fn remove(&self, store: &str, key: &DocKey) -> Result<(), DocumentError>;
}

/// Decode one stored document.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DocumentError> {
    serde_json::from_slice(bytes).map_err(|e| DocumentError::Serialization(e.to_string()))
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document store error: {0}")]
    Backend(String),

    #[error("document serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = DocKey::new().with("project", "p").with("app", "web");
        let b = DocKey::new().with("app", "web").with("project", "p");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), r#"{"app":"web","project":"p"}"#);
    }

    #[test]
    fn test_partial_key_containment() {
        let full = DocKey::new()
            .with("project", "p")
            .with("app", "web")
            .with("cluster", "edge+site1");
        let partial = DocKey::new().with("project", "p").with("app", "web");
        assert!(full.contains(&partial));
        assert!(!partial.contains(&full));
        assert!(full.contains(&DocKey::new()));

        let other = DocKey::new().with("project", "q");
        assert!(!full.contains(&other));
    }
}
