// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Git host adapters.
//!
//! `Git2Host` drives a real repository through libgit2; the in-memory
//! host backs unit tests and can be rigged to report merge conflicts for
//! exercising the commit retry cycle.

pub mod git2_host;

pub use git2_host::{Git2Host, Git2HostFactory};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::cluster::GitProviderConfig;
use crate::domain::git::{CommitFile, CommitSummary, GitHost, GitHostError, GitHostFactory};

#[derive(Debug, Clone)]
struct InMemoryCommit {
    summary: CommitSummary,
    touched: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct BranchState {
    files: BTreeMap<String, Vec<u8>>,
    commits: Vec<InMemoryCommit>,
}

/// Test double for the git hosting capability.
#[derive(Default)]
pub struct InMemoryGitHost {
    branches: Mutex<HashMap<String, BranchState>>,
    /// Number of upcoming merges that report a conflict.
    conflicts_remaining: Mutex<u32>,
}

impl InMemoryGitHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rig the next `n` merges to conflict.
    pub fn fail_next_merges(&self, n: u32) {
        *self.conflicts_remaining.lock() = n;
    }

    pub fn branch_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.branches.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Files at the tip of `branch` (test assertion helper).
    pub fn files(&self, branch: &str) -> BTreeMap<String, Vec<u8>> {
        self.branches
            .lock()
            .get(branch)
            .map(|b| b.files.clone())
            .unwrap_or_default()
    }

    fn new_commit(message: &str, touched: Vec<String>) -> InMemoryCommit {
        InMemoryCommit {
            summary: CommitSummary {
                id: Uuid::new_v4().simple().to_string(),
                message: message.to_string(),
            },
            touched,
        }
    }
}

#[async_trait]
impl GitHost for InMemoryGitHost {
    async fn ensure_repo(&self, branch: &str) -> Result<(), GitHostError> {
        let mut branches = self.branches.lock();
        branches.entry(branch.to_string()).or_insert_with(|| BranchState {
            files: BTreeMap::new(),
            commits: vec![Self::new_commit("initial", Vec::new())],
        });
        Ok(())
    }

    async fn delete_repo(&self) -> Result<(), GitHostError> {
        self.branches.lock().clear();
        Ok(())
    }

    async fn branch_tip(&self, branch: &str) -> Result<String, GitHostError> {
        let branches = self.branches.lock();
        let state = branches
            .get(branch)
            .ok_or_else(|| GitHostError::BranchNotFound(branch.to_string()))?;
        Ok(state
            .commits
            .last()
            .map(|c| c.summary.id.clone())
            .unwrap_or_default())
    }

    async fn create_branch(&self, name: &str, from: &str) -> Result<(), GitHostError> {
        let mut branches = self.branches.lock();
        let source = branches
            .get(from)
            .ok_or_else(|| GitHostError::BranchNotFound(from.to_string()))?
            .clone();
        branches.insert(name.to_string(), source);
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), GitHostError> {
        self.branches.lock().remove(name);
        Ok(())
    }

    async fn commit_files(
        &self,
        branch: &str,
        message: &str,
        adds: &[CommitFile],
        deletes: &[String],
    ) -> Result<String, GitHostError> {
        let mut branches = self.branches.lock();
        let state = branches
            .get_mut(branch)
            .ok_or_else(|| GitHostError::BranchNotFound(branch.to_string()))?;
        let mut touched = Vec::new();
        for add in adds {
            state.files.insert(add.path.clone(), add.content.clone());
            touched.push(add.path.clone());
        }
        for path in deletes {
            state.files.remove(path);
            touched.push(path.clone());
        }
        let commit = Self::new_commit(message, touched);
        let id = commit.summary.id.clone();
        state.commits.push(commit);
        Ok(id)
    }

    async fn merge(&self, source: &str, target: &str) -> Result<(), GitHostError> {
        {
            let mut remaining = self.conflicts_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GitHostError::MergeConflict {
                    source_branch: source.to_string(),
                    target: target.to_string(),
                });
            }
        }
        let mut branches = self.branches.lock();
        let merged = branches
            .get(source)
            .ok_or_else(|| GitHostError::BranchNotFound(source.to_string()))?
            .clone();
        let state = branches
            .get_mut(target)
            .ok_or_else(|| GitHostError::BranchNotFound(target.to_string()))?;
        state.files = merged.files;
        state.commits.push(Self::new_commit(
            &format!("Merge {} into {}", source, target),
            Vec::new(),
        ));
        Ok(())
    }

    async fn list_commits(
        &self,
        branch: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, GitHostError> {
        let branches = self.branches.lock();
        let state = branches
            .get(branch)
            .ok_or_else(|| GitHostError::BranchNotFound(branch.to_string()))?;
        Ok(state
            .commits
            .iter()
            .rev()
            .filter(|c| match path {
                Some(p) => c.touched.iter().any(|t| t.starts_with(p)),
                None => true,
            })
            .take(limit)
            .map(|c| c.summary.clone())
            .collect())
    }

    async fn list_files(&self, branch: &str, prefix: &str) -> Result<Vec<String>, GitHostError> {
        let branches = self.branches.lock();
        let state = branches
            .get(branch)
            .ok_or_else(|| GitHostError::BranchNotFound(branch.to_string()))?;
        Ok(state
            .files
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Factory that shares one in-memory host per repository name, so tests
/// can assert against the same instance workers used.
#[derive(Default)]
pub struct InMemoryGitHostFactory {
    hosts: DashMap<String, Arc<InMemoryGitHost>>,
}

impl InMemoryGitHostFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self, repo: &str) -> Arc<InMemoryGitHost> {
        self.hosts
            .entry(repo.to_string())
            .or_insert_with(|| Arc::new(InMemoryGitHost::new()))
            .clone()
    }
}

#[async_trait]
impl GitHostFactory for InMemoryGitHostFactory {
    async fn host_for(&self, config: &GitProviderConfig) -> Result<Arc<dyn GitHost>, GitHostError> {
        Ok(self.host(&config.repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_and_tip_advance() {
        let host = InMemoryGitHost::new();
        host.ensure_repo("main").await.unwrap();
        let before = host.branch_tip("main").await.unwrap();

        host.commit_files(
            "main",
            "add file",
            &[CommitFile {
                path: "a/b.yaml".to_string(),
                content: b"x".to_vec(),
            }],
            &[],
        )
        .await
        .unwrap();

        assert_ne!(host.branch_tip("main").await.unwrap(), before);
        assert_eq!(
            host.list_files("main", "a/").await.unwrap(),
            vec!["a/b.yaml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rigged_conflicts_then_success() {
        let host = InMemoryGitHost::new();
        host.ensure_repo("main").await.unwrap();
        host.create_branch("stage", "main").await.unwrap();
        host.fail_next_merges(2);

        assert!(host.merge("stage", "main").await.unwrap_err().is_merge_conflict());
        assert!(host.merge("stage", "main").await.unwrap_err().is_merge_conflict());
        host.merge("stage", "main").await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_listing_with_path_filter() {
        let host = InMemoryGitHost::new();
        host.ensure_repo("main").await.unwrap();
        host.commit_files(
            "main",
            "one",
            &[CommitFile {
                path: "apps/a.yaml".to_string(),
                content: b"1".to_vec(),
            }],
            &[],
        )
        .await
        .unwrap();
        host.commit_files(
            "main",
            "two",
            &[CommitFile {
                path: "other/b.yaml".to_string(),
                content: b"2".to_vec(),
            }],
            &[],
        )
        .await
        .unwrap();

        let all = host.list_commits("main", None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let apps = host.list_commits("main", Some("apps/"), 10).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].message, "one");
    }
}
