// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sync provider backends and their factory.
//!
//! One implementation per configured `GitOpsType`, selected here — callers
//! only ever see the `SyncProvider` trait.

pub mod direct;
pub mod git;
pub mod flux;
pub mod azure_arc;

pub use azure_arc::{ArcApiVersion, AzureArcProvider, AzureClient, AzureEndpoints};
pub use direct::DirectProvider;
pub use flux::FluxProvider;
pub use git::{CommitPolicy, GitOpsProvider, RepoLayout};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::application::sync_engine::ProviderFactory;
use crate::domain::cluster::{ClusterClientFactory, ClusterSyncConfig, GitOpsType};
use crate::domain::git::GitHostFactory;
use crate::domain::resource::is_cluster_scoped;
use crate::domain::sync::{SyncError, SyncProvider, SyncSession, DEPLOYMENT_ID_LABEL};

/// Decode a manifest and decorate it for one (context, app, cluster):
/// inject the deployment-tracking label on the object (and its pod
/// template), and set/override the namespace unless the kind lives at
/// cluster scope.
pub fn decorate_manifest(content: &[u8], session: &SyncSession) -> Result<Value, SyncError> {
    let mut manifest: Value = serde_yaml::from_slice(content)
        .map_err(|e| SyncError::InvalidInput(format!("manifest decode: {}", e)))?;
    if !manifest.is_object() {
        return Err(SyncError::InvalidInput(
            "manifest is not a mapping".to_string(),
        ));
    }

    let kind = manifest
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = session.deployment_id();

    {
        let root = manifest
            .as_object_mut()
            .ok_or_else(|| SyncError::InvalidInput("manifest is not a mapping".to_string()))?;
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| SyncError::InvalidInput("metadata is not a mapping".to_string()))?;
        if !is_cluster_scoped(&kind) {
            metadata.insert("namespace".to_string(), json!(session.namespace));
        }
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| SyncError::InvalidInput("labels is not a mapping".to_string()))?;
        labels.insert(DEPLOYMENT_ID_LABEL.to_string(), json!(id));
    }

    // Workload kinds carry the label on their pod template as well.
    if let Some(template) = manifest.pointer_mut("/spec/template") {
        if let Some(template) = template.as_object_mut() {
            let labels = template
                .entry("metadata")
                .or_insert_with(|| json!({}))
                .as_object_mut()
                .and_then(|m| {
                    m.entry("labels")
                        .or_insert_with(|| json!({}))
                        .as_object_mut()
                });
            if let Some(labels) = labels {
                labels.insert(DEPLOYMENT_ID_LABEL.to_string(), json!(id));
            }
        }
    }

    Ok(manifest)
}

/// Standard factory wiring every backend kind from per-cluster
/// configuration.
pub struct StandardProviderFactory {
    git_hosts: Arc<dyn GitHostFactory>,
    clients: Arc<dyn ClusterClientFactory>,
    commit_policy: CommitPolicy,
    azure_endpoints: AzureEndpoints,
}

impl StandardProviderFactory {
    pub fn new(git_hosts: Arc<dyn GitHostFactory>, clients: Arc<dyn ClusterClientFactory>) -> Self {
        Self {
            git_hosts,
            clients,
            commit_policy: CommitPolicy::default(),
            azure_endpoints: AzureEndpoints::default(),
        }
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    pub fn with_azure_endpoints(mut self, endpoints: AzureEndpoints) -> Self {
        self.azure_endpoints = endpoints;
        self
    }

    async fn gitops_provider(
        &self,
        session: &SyncSession,
        config: &ClusterSyncConfig,
        layout: RepoLayout,
    ) -> Result<GitOpsProvider, SyncError> {
        let git = config.git_config()?;
        let host = self.git_hosts.host_for(git).await?;
        Ok(GitOpsProvider::new(
            host,
            session.clone(),
            git.branch.clone(),
            self.commit_policy.clone(),
            layout,
        ))
    }
}

#[async_trait]
impl ProviderFactory for StandardProviderFactory {
    async fn provider_for(
        &self,
        session: &SyncSession,
        config: &ClusterSyncConfig,
    ) -> Result<Arc<dyn SyncProvider>, SyncError> {
        match config.gitops_type {
            GitOpsType::None => {
                let client = self.clients.client_for(&session.cluster).await?;
                Ok(Arc::new(DirectProvider::new(client, session.clone())))
            }
            GitOpsType::Git => Ok(Arc::new(
                self.gitops_provider(session, config, RepoLayout::Plain).await?,
            )),
            GitOpsType::Anthos => Ok(Arc::new(
                self.gitops_provider(session, config, RepoLayout::Anthos).await?,
            )),
            GitOpsType::Fluxcd => {
                let inner = self
                    .gitops_provider(session, config, RepoLayout::Flux)
                    .await?;
                Ok(Arc::new(FluxProvider::new(inner, config.git_config()?.clone())))
            }
            GitOpsType::AzureArc | GitOpsType::AzureArcV2 => {
                let api = if config.gitops_type == GitOpsType::AzureArc {
                    ArcApiVersion::V1
                } else {
                    ArcApiVersion::V2
                };
                let inner = self
                    .gitops_provider(session, config, RepoLayout::Plain)
                    .await?;
                let client =
                    AzureClient::new(self.azure_endpoints.clone(), config.azure_config()?.clone());
                Ok(Arc::new(AzureArcProvider::new(
                    inner,
                    client,
                    api,
                    config.git_config()?.clone(),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::ClusterRef;
    use crate::domain::context::ContextId;

    fn session() -> SyncSession {
        SyncSession {
            context: ContextId::new(),
            app: "web".to_string(),
            cluster: ClusterRef::new("edge", "site1"),
            namespace: "retail".to_string(),
        }
    }

    #[test]
    fn test_namespaced_kind_decoration() {
        let s = session();
        let manifest = decorate_manifest(
            b"apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  template:\n    spec: {}\n",
            &s,
        )
        .unwrap();

        assert_eq!(manifest["metadata"]["namespace"], "retail");
        assert_eq!(
            manifest["metadata"]["labels"][DEPLOYMENT_ID_LABEL],
            s.deployment_id()
        );
        assert_eq!(
            manifest["spec"]["template"]["metadata"]["labels"][DEPLOYMENT_ID_LABEL],
            s.deployment_id()
        );
    }

    #[test]
    fn test_cluster_scoped_kind_keeps_no_namespace() {
        let s = session();
        let manifest = decorate_manifest(
            b"apiVersion: rbac.authorization.k8s.io/v1\nkind: ClusterRole\nmetadata:\n  name: ops\n",
            &s,
        )
        .unwrap();

        assert!(manifest["metadata"].get("namespace").is_none());
        assert_eq!(
            manifest["metadata"]["labels"][DEPLOYMENT_ID_LABEL],
            s.deployment_id()
        );
    }

    #[test]
    fn test_namespace_is_overridden() {
        let s = session();
        let manifest = decorate_manifest(
            b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n  namespace: elsewhere\n",
            &s,
        )
        .unwrap();
        assert_eq!(manifest["metadata"]["namespace"], "retail");
    }

    #[test]
    fn test_non_mapping_rejected() {
        assert!(decorate_manifest(b"- just\n- a\n- list\n", &session()).is_err());
    }
}
