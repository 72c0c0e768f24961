// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Git hosting capability consumed by the GitOps sync backends.
//!
//! One `GitHost` instance is bound to a single repository. The merge
//! operation must report conflicts as a distinguishable error — the commit
//! cycle retries on it.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::cluster::GitProviderConfig;

/// One file add staged into a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    /// Repository-relative path.
    pub path: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub id: String,
    pub message: String,
}

#[async_trait]
pub trait GitHost: Send + Sync {
    /// Create the repository with an initial empty commit on `branch`.
    /// Succeeds if it already exists.
    async fn ensure_repo(&self, branch: &str) -> Result<(), GitHostError>;

    async fn delete_repo(&self) -> Result<(), GitHostError>;

    /// Commit id at the tip of `branch`.
    async fn branch_tip(&self, branch: &str) -> Result<String, GitHostError>;

    /// Create `name` pointing at the current tip of `from`.
    async fn create_branch(&self, name: &str, from: &str) -> Result<(), GitHostError>;

    async fn delete_branch(&self, name: &str) -> Result<(), GitHostError>;

    /// Commit file adds and deletes onto `branch` in one commit; returns
    /// the new commit id. Deleting an absent path is not an error.
    async fn commit_files(
        &self,
        branch: &str,
        message: &str,
        adds: &[CommitFile],
        deletes: &[String],
    ) -> Result<String, GitHostError>;

    /// Merge `source` into `target`. A content conflict surfaces as
    /// [`GitHostError::MergeConflict`].
    async fn merge(&self, source: &str, target: &str) -> Result<(), GitHostError>;

    /// Most recent commits on `branch`, newest first, optionally filtered
    /// to commits touching `path`.
    async fn list_commits(
        &self,
        branch: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, GitHostError>;

    /// Current file paths at the tip of `branch` under `prefix`.
    async fn list_files(&self, branch: &str, prefix: &str) -> Result<Vec<String>, GitHostError>;
}

/// Hands out a host per git provider configuration; constructed once per
/// synchronization session.
#[async_trait]
pub trait GitHostFactory: Send + Sync {
    async fn host_for(&self, config: &GitProviderConfig) -> Result<Arc<dyn GitHost>, GitHostError>;
}

#[derive(Debug, Error)]
pub enum GitHostError {
    #[error("merge of '{source_branch}' into '{target}' conflicted")]
    MergeConflict { source_branch: String, target: String },

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("git backend error: {0}")]
    Backend(String),
}

impl GitHostError {
    pub fn is_merge_conflict(&self) -> bool {
        matches!(self, Self::MergeConflict { .. })
    }
}

impl From<git2::Error> for GitHostError {
    fn from(err: git2::Error) -> Self {
        GitHostError::Backend(err.to_string())
    }
}
