// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Document store adapters.
//!
//! The in-memory store backs development and tests; the PostgreSQL store
//! (jsonb keys, containment matching) is the production adapter. Both are
//! selected at wiring time behind the `DocumentStore` capability.

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;

use crate::domain::document::{DocKey, DocumentError, DocumentStore};

// ============================================================================
// In-memory
// ============================================================================

struct DocEntry {
    key: DocKey,
    tag: String,
    value: Vec<u8>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    stores: RwLock<HashMap<String, Vec<DocEntry>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(
        &self,
        store: &str,
        key: &DocKey,
        tag: &str,
        value: &[u8],
    ) -> Result<(), DocumentError> {
        let mut stores = self.stores.write();
        let entries = stores.entry(store.to_string()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.key == *key && e.tag == tag)
        {
            existing.value = value.to_vec();
        } else {
            entries.push(DocEntry {
                key: key.clone(),
                tag: tag.to_string(),
                value: value.to_vec(),
            });
        }
        Ok(())
    }

    async fn find(
        &self,
        store: &str,
        key: &DocKey,
        tag: &str,
    ) -> Result<Vec<Vec<u8>>, DocumentError> {
        let stores = self.stores.read();
        Ok(stores
            .get(store)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.tag == tag && e.key.contains(key))
                    .map(|e| e.value.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove(&self, store: &str, key: &DocKey) -> Result<(), DocumentError> {
        let mut stores = self.stores.write();
        let entries = stores
            .get_mut(store)
            .ok_or_else(|| DocumentError::NotFound(key.to_string()))?;
        let before = entries.len();
        entries.retain(|e| e.key != *key);
        if entries.len() == before {
            return Err(DocumentError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// jsonb-backed document store. Partial-key `find` uses containment
/// (`key @> query`), mirroring the in-memory semantics.
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table when it does not exist yet.
    pub async fn migrate(&self) -> Result<(), DocumentError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS armada_documents (
                store TEXT NOT NULL,
                key JSONB NOT NULL,
                tag TEXT NOT NULL,
                value JSONB NOT NULL,
                PRIMARY KEY (store, key, tag)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DocumentError::Backend(e.to_string()))?;
        Ok(())
    }

    fn key_json(key: &DocKey) -> Result<serde_json::Value, DocumentError> {
        serde_json::to_value(key.fields()).map_err(|e| DocumentError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert(
        &self,
        store: &str,
        key: &DocKey,
        tag: &str,
        value: &[u8],
    ) -> Result<(), DocumentError> {
        let value: serde_json::Value = serde_json::from_slice(value)
            .map_err(|e| DocumentError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO armada_documents (store, key, tag, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (store, key, tag) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(store)
        .bind(Self::key_json(key)?)
        .bind(tag)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| DocumentError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn find(
        &self,
        store: &str,
        key: &DocKey,
        tag: &str,
    ) -> Result<Vec<Vec<u8>>, DocumentError> {
        let rows = sqlx::query(
            r#"
            SELECT value FROM armada_documents
            WHERE store = $1 AND tag = $2 AND key @> $3
            "#,
        )
        .bind(store)
        .bind(tag)
        .bind(Self::key_json(key)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocumentError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let value: serde_json::Value = row.get("value");
                serde_json::to_vec(&value)
                    .map_err(|e| DocumentError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn remove(&self, store: &str, key: &DocKey) -> Result<(), DocumentError> {
        let result = sqlx::query(
            r#"DELETE FROM armada_documents WHERE store = $1 AND key = $2"#,
        )
        .bind(store)
        .bind(Self::key_json(key)?)
        .execute(&self.pool)
        .await
        .map_err(|e| DocumentError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(DocumentError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_is_upsert() {
        let store = InMemoryDocumentStore::new();
        let key = DocKey::new().with("project", "p").with("app", "web");

        store.insert("resources", &key, "content", b"{\"v\":1}").await.unwrap();
        store.insert("resources", &key, "content", b"{\"v\":2}").await.unwrap();

        let found = store.find("resources", &key, "content").await.unwrap();
        assert_eq!(found, vec![b"{\"v\":2}".to_vec()]);
    }

    #[tokio::test]
    async fn test_partial_key_find() {
        let store = InMemoryDocumentStore::new();
        let base = DocKey::new().with("project", "p");
        store
            .insert("resources", &base.clone().with("app", "web"), "content", b"{}")
            .await
            .unwrap();
        store
            .insert("resources", &base.clone().with("app", "db"), "content", b"{}")
            .await
            .unwrap();
        store
            .insert(
                "resources",
                &DocKey::new().with("project", "other").with("app", "web"),
                "content",
                b"{}",
            )
            .await
            .unwrap();

        assert_eq!(store.find("resources", &base, "content").await.unwrap().len(), 2);
        assert_eq!(
            store
                .find("resources", &DocKey::new(), "content")
                .await
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn test_tags_kept_separate() {
        let store = InMemoryDocumentStore::new();
        let key = DocKey::new().with("cluster", "edge+site1");
        store.insert("cluster", &key, "syncdata", b"{\"a\":1}").await.unwrap();
        store.insert("cluster", &key, "clusterlabel", b"{\"b\":2}").await.unwrap();

        let sync = store.find("cluster", &key, "syncdata").await.unwrap();
        assert_eq!(sync, vec![b"{\"a\":1}".to_vec()]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let key = DocKey::new().with("cluster", "edge+site1");
        assert!(matches!(
            store.remove("cluster", &key).await.unwrap_err(),
            DocumentError::NotFound(_)
        ));

        store.insert("cluster", &key, "syncdata", b"{}").await.unwrap();
        store.remove("cluster", &key).await.unwrap();
        assert!(store.find("cluster", &key, "syncdata").await.unwrap().is_empty());
    }
}
