// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory context backend.
//!
//! Versioned key/value store over a concurrent map. Compare-and-swap is
//! implemented with the map's entry API, so shared-parent mutations from
//! concurrent workers are linearizable per key.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::context::{ContextBackend, ContextError};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    data: Vec<u8>,
}

#[derive(Default)]
pub struct InMemoryContextBackend {
    entries: DashMap<String, Versioned>,
}

impl InMemoryContextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ContextBackend for InMemoryContextBackend {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ContextError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut o) => {
                let version = o.get().version + 1;
                o.insert(Versioned {
                    version,
                    data: value,
                });
            }
            Entry::Vacant(v) => {
                v.insert(Versioned {
                    version: 1,
                    data: value,
                });
            }
        }
        Ok(())
    }

    async fn put_if_version(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<bool, ContextError> {
        match (self.entries.entry(key.to_string()), expected) {
            (Entry::Vacant(v), None) => {
                v.insert(Versioned {
                    version: 1,
                    data: value,
                });
                Ok(true)
            }
            (Entry::Vacant(_), Some(_)) => Ok(false),
            (Entry::Occupied(_), None) => Ok(false),
            (Entry::Occupied(mut o), Some(expected)) => {
                if o.get().version != expected {
                    return Ok(false);
                }
                o.insert(Versioned {
                    version: expected + 1,
                    data: value,
                });
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, ContextError> {
        Ok(self
            .entries
            .get(key)
            .map(|e| (e.data.clone(), e.version)))
    }

    async fn exists(&self, key: &str) -> Result<bool, ContextError> {
        Ok(self.entries.contains_key(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, ContextError> {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        let mut removed: u64 = 0;
        for key in doomed {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ContextError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_versions() {
        let store = InMemoryContextBackend::new();
        store.put("/a/", b"one".to_vec()).await.unwrap();
        let (data, v1) = store.get("/a/").await.unwrap().unwrap();
        assert_eq!(data, b"one".to_vec());

        store.put("/a/", b"two".to_vec()).await.unwrap();
        let (data, v2) = store.get("/a/").await.unwrap().unwrap();
        assert_eq!(data, b"two".to_vec());
        assert!(v2 > v1);
    }

    #[tokio::test]
    async fn test_cas_create_and_update() {
        let store = InMemoryContextBackend::new();
        assert!(store
            .put_if_version("/a/", b"one".to_vec(), None)
            .await
            .unwrap());
        // Create-if-absent fails once present.
        assert!(!store
            .put_if_version("/a/", b"dup".to_vec(), None)
            .await
            .unwrap());

        let (_, version) = store.get("/a/").await.unwrap().unwrap();
        assert!(store
            .put_if_version("/a/", b"two".to_vec(), Some(version))
            .await
            .unwrap());
        // Stale version loses.
        assert!(!store
            .put_if_version("/a/", b"three".to_vec(), Some(version))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_prefix_operations() {
        let store = InMemoryContextBackend::new();
        store.put("/ctx/app/a/", b"".to_vec()).await.unwrap();
        store.put("/ctx/app/a/cluster/c/", b"".to_vec()).await.unwrap();
        store.put("/ctx/meta/", b"".to_vec()).await.unwrap();

        let keys = store.list_prefix("/ctx/app/").await.unwrap();
        assert_eq!(
            keys,
            vec!["/ctx/app/a/".to_string(), "/ctx/app/a/cluster/c/".to_string()]
        );

        assert_eq!(store.delete_prefix("/ctx/app/").await.unwrap(), 2);
        assert!(store.get("/ctx/meta/").await.unwrap().is_some());
        assert_eq!(store.delete_prefix("/ctx/app/").await.unwrap(), 0);
    }
}
