// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cluster identity, per-cluster synchronization configuration, and the
//! capabilities consumed from the cluster registry and live clusters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::sync::SyncError;

/// A cluster is owned by a provider; the pair is the global identity and
/// renders as `<provider>+<name>` wherever a single segment is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    pub provider: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.provider, self.name)
    }
}

impl FromStr for ClusterRef {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('+') {
            Some((provider, name)) if !provider.is_empty() && !name.is_empty() => {
                Ok(Self::new(provider, name))
            }
            _ => Err(SyncError::InvalidInput(format!(
                "cluster reference '{}' is not <provider>+<name>",
                s
            ))),
        }
    }
}

/// How a cluster receives desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitOpsType {
    /// Direct apply against the live API server.
    #[serde(rename = "none")]
    None,
    /// Generic git repository, external reconciler unspecified.
    #[serde(rename = "git")]
    Git,
    #[serde(rename = "fluxcd")]
    Fluxcd,
    #[serde(rename = "anthos")]
    Anthos,
    #[serde(rename = "azureArc")]
    AzureArc,
    #[serde(rename = "azureArcV2")]
    AzureArcV2,
}

impl GitOpsType {
    pub fn is_gitops(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Git => "git",
            Self::Fluxcd => "fluxcd",
            Self::Anthos => "anthos",
            Self::AzureArc => "azureArc",
            Self::AzureArcV2 => "azureArcV2",
        }
    }
}

/// Git hosting coordinates for one cluster's GitOps channel.
///
/// Credentials are configuration-sourced only; the registry seals the
/// token field at rest (see `domain::cipher`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitProviderConfig {
    /// Hosting flavor, e.g. "github", "gitlab", "local".
    pub host_type: String,
    pub user: String,
    pub token: String,
    pub repo: String,
    pub branch: String,
    /// Remote URL where applicable; local hosts derive it from `repo`.
    #[serde(default)]
    pub url: Option<String>,
}

/// Azure Arc management-plane coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
    pub resource_group: String,
    /// Connected-cluster resource name in Azure.
    pub cluster_name: String,
}

/// One cluster's sync object, read from the cluster registry at the start
/// of a synchronization session and cached for its duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSyncConfig {
    pub gitops_type: GitOpsType,
    #[serde(default)]
    pub git: Option<GitProviderConfig>,
    #[serde(default)]
    pub azure: Option<AzureConfig>,
}

impl ClusterSyncConfig {
    pub fn direct() -> Self {
        Self {
            gitops_type: GitOpsType::None,
            git: None,
            azure: None,
        }
    }

    pub fn git_config(&self) -> Result<&GitProviderConfig, SyncError> {
        self.git.as_ref().ok_or_else(|| {
            SyncError::InvalidInput(format!(
                "gitops type {} requires git provider configuration",
                self.gitops_type.as_str()
            ))
        })
    }

    pub fn azure_config(&self) -> Result<&AzureConfig, SyncError> {
        self.azure.as_ref().ok_or_else(|| {
            SyncError::InvalidInput(format!(
                "gitops type {} requires azure configuration",
                self.gitops_type.as_str()
            ))
        })
    }
}

// ============================================================================
// Consumed capabilities
// ============================================================================

/// Read access to the cluster registry collaborator.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// The cluster's sync object.
    async fn sync_config(&self, cluster: &ClusterRef) -> Result<ClusterSyncConfig, SyncError>;

    /// Names of the provider's clusters carrying `label`.
    async fn clusters_with_label(
        &self,
        provider: &str,
        label: &str,
    ) -> Result<Vec<String>, SyncError>;
}

/// Live-cluster apply capability. The wire protocol is owned by a standard
/// apply library behind this seam.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create-or-patch one decoded object.
    async fn apply(&self, manifest: &Value) -> Result<(), SyncError>;

    async fn delete(&self, manifest: &Value) -> Result<(), SyncError>;

    async fn get(
        &self,
        name: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Value>, SyncError>;

    /// API-server health probe.
    async fn health(&self) -> Result<(), SyncError>;
}

/// Hands out a live client per cluster for the direct backend.
#[async_trait]
pub trait ClusterClientFactory: Send + Sync {
    async fn client_for(&self, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_ref_roundtrip() {
        let c = ClusterRef::new("edge", "site1");
        assert_eq!(c.to_string(), "edge+site1");
        assert_eq!("edge+site1".parse::<ClusterRef>().unwrap(), c);
        assert!("siteonly".parse::<ClusterRef>().is_err());
        assert!("+site".parse::<ClusterRef>().is_err());
    }

    #[test]
    fn test_gitops_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&GitOpsType::AzureArcV2).unwrap(),
            "\"azureArcV2\""
        );
        let t: GitOpsType = serde_json::from_str("\"fluxcd\"").unwrap();
        assert_eq!(t, GitOpsType::Fluxcd);
        assert!(GitOpsType::Fluxcd.is_gitops());
        assert!(!GitOpsType::None.is_gitops());
    }

    #[test]
    fn test_sync_config_requirements() {
        let cfg = ClusterSyncConfig {
            gitops_type: GitOpsType::Fluxcd,
            git: None,
            azure: None,
        };
        assert!(cfg.git_config().is_err());
        assert!(ClusterSyncConfig::direct().git_config().is_err());
    }
}
