// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Document-backed cluster registry.
//!
//! Reads cluster sync objects and label memberships out of the document
//! store. Credential fields are sealed at rest through the injected
//! cipher; the registry opens them on read and never hands sealed values
//! to callers.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::domain::cipher::{open_fields, seal_fields, ValueCipher, SYNC_CONFIG_SEALED_FIELDS};
use crate::domain::cluster::{ClusterRef, ClusterRegistry, ClusterSyncConfig};
use crate::domain::document::{DocKey, DocumentStore};
use crate::domain::sync::SyncError;

const CLUSTER_STORE: &str = "cluster";
const SYNC_TAG: &str = "syncdata";
const LABEL_TAG: &str = "clusterlabel";

pub struct DocClusterRegistry {
    store: Arc<dyn DocumentStore>,
    cipher: Arc<dyn ValueCipher>,
}

impl DocClusterRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, cipher: Arc<dyn ValueCipher>) -> Self {
        Self { store, cipher }
    }

    fn cluster_key(cluster: &ClusterRef) -> DocKey {
        DocKey::new()
            .with("clusterProvider", &cluster.provider)
            .with("cluster", &cluster.name)
    }

    /// Record a cluster's sync object, sealing credential fields.
    pub async fn register_cluster(
        &self,
        cluster: &ClusterRef,
        config: &ClusterSyncConfig,
    ) -> Result<(), SyncError> {
        let mut doc = serde_json::to_value(config)
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        seal_fields(&mut doc, SYNC_CONFIG_SEALED_FIELDS, self.cipher.as_ref())
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        let bytes =
            serde_json::to_vec(&doc).map_err(|e| SyncError::Internal(e.to_string()))?;
        self.store
            .insert(CLUSTER_STORE, &Self::cluster_key(cluster), SYNC_TAG, &bytes)
            .await?;
        Ok(())
    }

    /// Attach a provider label to a cluster.
    pub async fn add_cluster_label(
        &self,
        cluster: &ClusterRef,
        label: &str,
    ) -> Result<(), SyncError> {
        let key = Self::cluster_key(cluster).with("label", label);
        let doc = json!({ "cluster": cluster.name, "label": label });
        let bytes =
            serde_json::to_vec(&doc).map_err(|e| SyncError::Internal(e.to_string()))?;
        self.store.insert(CLUSTER_STORE, &key, LABEL_TAG, &bytes).await?;
        Ok(())
    }

    pub async fn remove_cluster(&self, cluster: &ClusterRef) -> Result<(), SyncError> {
        self.store
            .remove(CLUSTER_STORE, &Self::cluster_key(cluster))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterRegistry for DocClusterRegistry {
    async fn sync_config(&self, cluster: &ClusterRef) -> Result<ClusterSyncConfig, SyncError> {
        let docs = self
            .store
            .find(CLUSTER_STORE, &Self::cluster_key(cluster), SYNC_TAG)
            .await?;
        let bytes = docs
            .first()
            .ok_or_else(|| SyncError::NotFound(format!("sync object for {}", cluster)))?;
        let mut doc: Value = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        open_fields(&mut doc, SYNC_CONFIG_SEALED_FIELDS, self.cipher.as_ref())
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        serde_json::from_value(doc).map_err(|e| SyncError::Internal(e.to_string()))
    }

    async fn clusters_with_label(
        &self,
        provider: &str,
        label: &str,
    ) -> Result<Vec<String>, SyncError> {
        let key = DocKey::new()
            .with("clusterProvider", provider)
            .with("label", label);
        let docs = self.store.find(CLUSTER_STORE, &key, LABEL_TAG).await?;
        let mut names = Vec::with_capacity(docs.len());
        for bytes in docs {
            let doc: Value = serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::Internal(e.to_string()))?;
            if let Some(name) = doc.get("cluster").and_then(Value::as_str) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::{GitOpsType, GitProviderConfig};
    use crate::infrastructure::cipher::PassthroughCipher;
    use crate::infrastructure::document::InMemoryDocumentStore;

    fn registry() -> DocClusterRegistry {
        DocClusterRegistry::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(PassthroughCipher),
        )
    }

    fn git_config() -> ClusterSyncConfig {
        ClusterSyncConfig {
            gitops_type: GitOpsType::Git,
            git: Some(GitProviderConfig {
                host_type: "github".to_string(),
                user: "bot".to_string(),
                token: "s3cret".to_string(),
                repo: "deployments".to_string(),
                branch: "main".to_string(),
                url: None,
            }),
            azure: None,
        }
    }

    #[tokio::test]
    async fn test_sync_config_roundtrip() {
        let reg = registry();
        let cluster = ClusterRef::new("edge", "site1");
        reg.register_cluster(&cluster, &git_config()).await.unwrap();

        let config = reg.sync_config(&cluster).await.unwrap();
        assert_eq!(config.gitops_type, GitOpsType::Git);
        assert_eq!(config.git.unwrap().token, "s3cret");
    }

    #[tokio::test]
    async fn test_unknown_cluster_not_found() {
        let reg = registry();
        let err = reg
            .sync_config(&ClusterRef::new("edge", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_label_membership() {
        let reg = registry();
        let site1 = ClusterRef::new("edge", "site1");
        let site2 = ClusterRef::new("edge", "site2");
        reg.add_cluster_label(&site1, "zone-a").await.unwrap();
        reg.add_cluster_label(&site2, "zone-a").await.unwrap();
        reg.add_cluster_label(&site2, "big").await.unwrap();

        assert_eq!(
            reg.clusters_with_label("edge", "zone-a").await.unwrap(),
            vec!["site1".to_string(), "site2".to_string()]
        );
        assert_eq!(
            reg.clusters_with_label("edge", "big").await.unwrap(),
            vec!["site2".to_string()]
        );
        assert!(reg
            .clusters_with_label("edge", "none")
            .await
            .unwrap()
            .is_empty());
    }
}
