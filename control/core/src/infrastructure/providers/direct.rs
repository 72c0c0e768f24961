// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Direct sync backend: applies decoded objects straight to a live
//! cluster API through the consumed `ClusterClient` capability. State
//! lives only in the cluster — `create` and `commit` are no-ops.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::domain::cluster::ClusterClient;
use crate::domain::resource::split_qualified;
use crate::domain::sync::{StagedChanges, SyncError, SyncProvider, SyncSession};
use crate::infrastructure::providers::decorate_manifest;

pub struct DirectProvider {
    client: Arc<dyn ClusterClient>,
    session: SyncSession,
}

impl DirectProvider {
    pub fn new(client: Arc<dyn ClusterClient>, session: SyncSession) -> Self {
        Self { client, session }
    }
}

#[async_trait]
impl SyncProvider for DirectProvider {
    async fn create(
        &self,
        name: &str,
        stage: StagedChanges,
        _content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        debug!(resource = name, cluster = %self.session.cluster, "create is a no-op for direct sync");
        Ok(stage)
    }

    async fn apply(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        let manifest = decorate_manifest(content, &self.session)?;
        debug!(resource = name, cluster = %self.session.cluster, "applying object");
        self.client.apply(&manifest).await?;
        Ok(stage)
    }

    async fn delete(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        let manifest = decorate_manifest(content, &self.session)?;
        debug!(resource = name, cluster = %self.session.cluster, "deleting object");
        self.client.delete(&manifest).await?;
        Ok(stage)
    }

    async fn get(&self, name: &str, _selector: Option<&str>) -> Result<Vec<u8>, SyncError> {
        let (k8s_name, kind) = split_qualified(name).ok_or_else(|| {
            SyncError::InvalidInput(format!("resource name '{}' is not <name>+<kind>", name))
        })?;
        match self
            .client
            .get(k8s_name, kind, Some(&self.session.namespace))
            .await?
        {
            Some(value) => {
                serde_yaml::to_string(&value)
                    .map(String::into_bytes)
                    .map_err(|e| SyncError::Internal(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Already applied; nothing staged.
    async fn commit(&self, _stage: StagedChanges) -> Result<(), SyncError> {
        Ok(())
    }

    async fn is_reachable(&self) -> Result<(), SyncError> {
        self.client.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::ClusterRef;
    use crate::domain::context::ContextId;
    use crate::domain::sync::DEPLOYMENT_ID_LABEL;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct FakeCluster {
        applied: Mutex<Vec<Value>>,
        deleted: Mutex<Vec<Value>>,
        healthy: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ClusterClient for FakeCluster {
        async fn apply(&self, manifest: &Value) -> Result<(), SyncError> {
            self.applied.lock().push(manifest.clone());
            Ok(())
        }

        async fn delete(&self, manifest: &Value) -> Result<(), SyncError> {
            self.deleted.lock().push(manifest.clone());
            Ok(())
        }

        async fn get(
            &self,
            name: &str,
            kind: &str,
            _namespace: Option<&str>,
        ) -> Result<Option<Value>, SyncError> {
            Ok(self
                .applied
                .lock()
                .iter()
                .find(|m| {
                    m["metadata"]["name"] == name && m["kind"] == kind
                })
                .cloned())
        }

        async fn health(&self) -> Result<(), SyncError> {
            if self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SyncError::BackendUnavailable("api server down".to_string()))
            }
        }
    }

    fn session() -> SyncSession {
        SyncSession {
            context: ContextId::new(),
            app: "web".to_string(),
            cluster: ClusterRef::new("edge", "site1"),
            namespace: "retail".to_string(),
        }
    }

    #[tokio::test]
    async fn test_apply_decorates_and_pushes() {
        let cluster = Arc::new(FakeCluster::default());
        let p = DirectProvider::new(cluster.clone(), session());

        p.apply(
            "web+Deployment",
            StagedChanges::default(),
            b"apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
        )
        .await
        .unwrap();

        let applied = cluster.applied.lock();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0]["metadata"]["namespace"], "retail");
        assert!(applied[0]["metadata"]["labels"][DEPLOYMENT_ID_LABEL]
            .as_str()
            .is_some());
    }

    #[tokio::test]
    async fn test_get_reads_back_applied_object() {
        let cluster = Arc::new(FakeCluster::default());
        let p = DirectProvider::new(cluster, session());

        p.apply(
            "web+Deployment",
            StagedChanges::default(),
            b"apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
        )
        .await
        .unwrap();

        let content = p.get("web+Deployment", None).await.unwrap();
        let value: Value = serde_yaml::from_slice(&content).unwrap();
        assert_eq!(value["kind"], "Deployment");

        assert!(p.get("ghost+Service", None).await.unwrap().is_empty());
        assert!(p.get("malformed", None).await.is_err());
    }

    #[tokio::test]
    async fn test_reachability_probes_health() {
        let cluster = Arc::new(FakeCluster::default());
        let p = DirectProvider::new(cluster.clone(), session());
        assert!(p.is_reachable().await.is_err());

        cluster
            .healthy
            .store(true, std::sync::atomic::Ordering::SeqCst);
        p.is_reachable().await.unwrap();
    }
}
