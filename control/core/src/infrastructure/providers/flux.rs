// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Flux v2 sync backend.
//!
//! Resources flow through the generic git staging; `apply_config` commits
//! the reconciler's own `GitRepository` + `Kustomization` custom
//! resources so the in-cluster Flux controllers pick up the tree.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::cluster::GitProviderConfig;
use crate::domain::sync::{StagedChanges, SyncError, SyncProvider};
use crate::infrastructure::providers::git::GitOpsProvider;

const FLUX_NAMESPACE: &str = "flux-system";

pub struct FluxProvider {
    inner: GitOpsProvider,
    git: GitProviderConfig,
}

impl FluxProvider {
    pub fn new(inner: GitOpsProvider, git: GitProviderConfig) -> Self {
        Self { inner, git }
    }

    fn config_name(&self) -> String {
        self.inner.session().deployment_id().to_lowercase()
    }

    fn config_dir(&self) -> String {
        format!(
            "clusters/{}/flux-system",
            self.inner.session().cluster
        )
    }

    fn source_path(&self) -> String {
        format!("{}/{}-source.yaml", self.config_dir(), self.config_name())
    }

    fn kustomization_path(&self) -> String {
        format!("{}/{}-kustomization.yaml", self.config_dir(), self.config_name())
    }

    fn repo_url(&self) -> String {
        self.git.url.clone().unwrap_or_else(|| self.git.repo.clone())
    }

    fn render(value: &serde_json::Value) -> Result<Vec<u8>, SyncError> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| SyncError::Internal(e.to_string()))
    }
}

#[async_trait]
impl SyncProvider for FluxProvider {
    async fn create(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        self.inner.create(name, stage, content).await
    }

    async fn apply(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        self.inner.apply(name, stage, content).await
    }

    async fn delete(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        self.inner.delete(name, stage, content).await
    }

    async fn get(&self, name: &str, selector: Option<&str>) -> Result<Vec<u8>, SyncError> {
        self.inner.get(name, selector).await
    }

    async fn commit(&self, stage: StagedChanges) -> Result<(), SyncError> {
        self.inner.commit(stage).await
    }

    async fn is_reachable(&self) -> Result<(), SyncError> {
        self.inner.is_reachable().await
    }

    async fn apply_config(&self) -> Result<(), SyncError> {
        let name = self.config_name();
        let session = self.inner.session();

        let source = json!({
            "apiVersion": "source.toolkit.fluxcd.io/v1",
            "kind": "GitRepository",
            "metadata": { "name": name, "namespace": FLUX_NAMESPACE },
            "spec": {
                "interval": "1m",
                "url": self.repo_url(),
                "ref": { "branch": self.inner.branch() },
            },
        });
        let kustomization = json!({
            "apiVersion": "kustomize.toolkit.fluxcd.io/v1",
            "kind": "Kustomization",
            "metadata": { "name": name, "namespace": FLUX_NAMESPACE },
            "spec": {
                "interval": "1m",
                "path": format!("./{}", self.inner.layout().app_dir(session)),
                "prune": true,
                "sourceRef": { "kind": "GitRepository", "name": name },
            },
        });

        let stage = StagedChanges {
            adds: vec![
                (self.source_path(), Self::render(&source)?),
                (self.kustomization_path(), Self::render(&kustomization)?),
            ],
            deletes: Vec::new(),
        };
        self.inner.commit_staged(&stage).await
    }

    async fn delete_config(&self) -> Result<(), SyncError> {
        let stage = StagedChanges {
            adds: Vec::new(),
            deletes: vec![self.source_path(), self.kustomization_path()],
        };
        self.inner.commit_staged(&stage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::ClusterRef;
    use crate::domain::context::ContextId;
    use crate::domain::sync::SyncSession;
    use crate::infrastructure::git::InMemoryGitHost;
    use crate::infrastructure::providers::git::{CommitPolicy, RepoLayout};
    use std::sync::Arc;

    fn provider(host: Arc<InMemoryGitHost>) -> FluxProvider {
        let session = SyncSession {
            context: ContextId::new(),
            app: "web".to_string(),
            cluster: ClusterRef::new("edge", "site1"),
            namespace: "retail".to_string(),
        };
        let git = GitProviderConfig {
            host_type: "github".to_string(),
            user: "bot".to_string(),
            token: "t".to_string(),
            repo: "deployments".to_string(),
            branch: "main".to_string(),
            url: Some("https://example.com/org/deployments.git".to_string()),
        };
        FluxProvider::new(
            GitOpsProvider::new(
                host,
                session,
                "main".to_string(),
                CommitPolicy::default(),
                RepoLayout::Flux,
            ),
            git,
        )
    }

    #[tokio::test]
    async fn test_apply_config_commits_reconciler_objects() {
        let host = Arc::new(InMemoryGitHost::new());
        let p = provider(host.clone());

        p.apply_config().await.unwrap();

        let files = host.files("main");
        assert_eq!(files.len(), 2);
        let source_path = files
            .keys()
            .find(|k| k.ends_with("-source.yaml"))
            .unwrap()
            .clone();
        assert!(source_path.starts_with("clusters/edge+site1/flux-system/"));

        let source: serde_json::Value =
            serde_yaml::from_slice(&files[&source_path]).unwrap();
        assert_eq!(source["kind"], "GitRepository");
        assert_eq!(source["spec"]["url"], "https://example.com/org/deployments.git");
        assert_eq!(source["spec"]["ref"]["branch"], "main");

        let kustomization_path = files
            .keys()
            .find(|k| k.ends_with("-kustomization.yaml"))
            .unwrap()
            .clone();
        let kustomization: serde_json::Value =
            serde_yaml::from_slice(&files[&kustomization_path]).unwrap();
        assert_eq!(kustomization["kind"], "Kustomization");
        assert_eq!(kustomization["spec"]["prune"], true);
        assert!(kustomization["spec"]["path"]
            .as_str()
            .unwrap()
            .starts_with("./clusters/edge+site1/context/"));
    }

    #[tokio::test]
    async fn test_delete_config_removes_reconciler_objects() {
        let host = Arc::new(InMemoryGitHost::new());
        let p = provider(host.clone());

        p.apply_config().await.unwrap();
        assert_eq!(host.files("main").len(), 2);

        p.delete_config().await.unwrap();
        assert!(host.files("main").is_empty());
    }
}
