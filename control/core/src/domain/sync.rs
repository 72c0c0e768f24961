// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Synchronization provider abstraction and the error taxonomy every
//! externally triggered operation reports through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::cluster::ClusterRef;
use crate::domain::context::{ContextError, ContextId, LifecycleStatus};
use crate::domain::document::DocumentError;
use crate::domain::git::GitHostError;

/// Label injected into every managed object (and its pod template) so
/// external reconcilers can select what one deployment produced.
pub const DEPLOYMENT_ID_LABEL: &str = "emco/deployment-id";

/// Value of [`DEPLOYMENT_ID_LABEL`] for one (context, app) pair.
pub fn deployment_id(context: &ContextId, app: &str) -> String {
    format!("{}-{}", context, app)
}

/// Externally triggered lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOp {
    Instantiate,
    Terminate,
}

impl LifecycleOp {
    /// Status recorded while the operation runs.
    pub fn active_status(&self) -> LifecycleStatus {
        match self {
            Self::Instantiate => LifecycleStatus::Instantiating,
            Self::Terminate => LifecycleStatus::Terminating,
        }
    }

    /// Terminal marker on success; the dependency waiter polls for this.
    pub fn terminal_status(&self) -> LifecycleStatus {
        match self {
            Self::Instantiate => LifecycleStatus::Instantiated,
            Self::Terminate => LifecycleStatus::Terminated,
        }
    }

    pub fn failed_status(&self) -> LifecycleStatus {
        match self {
            Self::Instantiate => LifecycleStatus::InstantiateFailed,
            Self::Terminate => LifecycleStatus::TerminateFailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synchronization worker's identity: which (context, app, cluster)
/// it pushes, and the namespace its namespaced resources land in.
#[derive(Debug, Clone)]
pub struct SyncSession {
    pub context: ContextId,
    pub app: String,
    pub cluster: ClusterRef,
    pub namespace: String,
}

impl SyncSession {
    pub fn deployment_id(&self) -> String {
        deployment_id(&self.context, &self.app)
    }
}

/// In-flight commit set threaded through provider calls. Git backends
/// accumulate file adds/deletes here; the direct backend passes it through
/// untouched. Worker-local, never shared.
#[derive(Debug, Clone, Default)]
pub struct StagedChanges {
    pub adds: Vec<(String, Vec<u8>)>,
    pub deletes: Vec<String>,
}

impl StagedChanges {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.deletes.is_empty()
    }
}

/// Capability set every sync backend implements. Selected per cluster by
/// the configured `GitOpsType` through a factory — never by inspecting
/// concrete types.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Stage/record a brand-new resource without decoration.
    async fn create(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError>;

    /// Decode, decorate (tracking label, namespace) and stage/apply.
    async fn apply(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError>;

    /// Stage a file delete or issue a live delete.
    async fn delete(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError>;

    /// Read back current state. GitOps backends return empty — their
    /// state is reconciled externally, eventually.
    async fn get(&self, name: &str, selector: Option<&str>) -> Result<Vec<u8>, SyncError>;

    /// Flush staged changes. No-op for the direct backend.
    async fn commit(&self, stage: StagedChanges) -> Result<(), SyncError>;

    /// Liveness probe of the backend.
    async fn is_reachable(&self) -> Result<(), SyncError>;

    /// Install the external reconciler's own configuration objects.
    /// No-op for backends without one.
    async fn apply_config(&self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn delete_config(&self) -> Result<(), SyncError> {
        Ok(())
    }
}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Taxonomy every externally triggered operation reports through; the
/// boundary layer maps kinds to transport status codes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{requested} rejected while {current}")]
    StateConflict {
        requested: LifecycleOp,
        current: String,
    },

    #[error("{} synchronization failure(s): [{}]", .0.len(), summarize(.0))]
    Aggregate(Vec<SyncError>),

    #[error("internal error: {0}")]
    Internal(String),
}

fn summarize(errors: &[SyncError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ContextError> for SyncError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::NotFound(s) => SyncError::NotFound(s),
            ContextError::DuplicateChild { parent, name } => {
                SyncError::Conflict(format!("duplicate child '{}' under {}", name, parent))
            }
            ContextError::Conflict(s) => SyncError::Conflict(s),
            ContextError::InvalidParent(s) | ContextError::InvalidHandle(s) => {
                SyncError::InvalidInput(s)
            }
            other => SyncError::Internal(other.to_string()),
        }
    }
}

impl From<DocumentError> for SyncError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound(s) => SyncError::NotFound(s),
            DocumentError::Backend(s) => SyncError::BackendUnavailable(s),
            DocumentError::Serialization(s) => SyncError::Internal(s),
        }
    }
}

impl From<GitHostError> for SyncError {
    fn from(err: GitHostError) -> Self {
        match err {
            GitHostError::MergeConflict { .. } => SyncError::Conflict(err.to_string()),
            GitHostError::BranchNotFound(s) | GitHostError::RepoNotFound(s) => {
                SyncError::NotFound(s)
            }
            GitHostError::Backend(s) => SyncError::BackendUnavailable(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_status_mapping() {
        assert_eq!(
            LifecycleOp::Instantiate.active_status(),
            LifecycleStatus::Instantiating
        );
        assert_eq!(
            LifecycleOp::Instantiate.terminal_status(),
            LifecycleStatus::Instantiated
        );
        assert_eq!(
            LifecycleOp::Terminate.failed_status(),
            LifecycleStatus::TerminateFailed
        );
    }

    #[test]
    fn test_deployment_id_format() {
        let ctx = ContextId::new();
        assert_eq!(deployment_id(&ctx, "web"), format!("{}-web", ctx));
    }

    #[test]
    fn test_git_conflict_maps_to_conflict() {
        let err: SyncError = GitHostError::MergeConflict {
            source_branch: "stage".to_string(),
            target: "main".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[test]
    fn test_aggregate_display_counts() {
        let agg = SyncError::Aggregate(vec![
            SyncError::NotFound("a".to_string()),
            SyncError::Conflict("b".to_string()),
        ]);
        let msg = agg.to_string();
        assert!(msg.contains("2 synchronization failure(s)"));
        assert!(msg.contains("not found: a"));
    }
}
