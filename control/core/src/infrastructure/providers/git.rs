// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Generic git sync backend.
//!
//! Resources are staged as file adds/deletes onto an in-flight commit set
//! and flushed by `commit`: open a short-lived branch from the tracked
//! branch's tip, commit the staged changes, merge back. A merge conflict
//! retries the whole cycle up to the policy bound before promoting to
//! `Conflict`; the short-lived branch is deleted on every exit path.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::git::{CommitFile, GitHost, GitHostError};
use crate::domain::sync::{StagedChanges, SyncError, SyncProvider, SyncSession};
use crate::infrastructure::providers::decorate_manifest;

/// Commit/merge retry policy. The retry count bounds attempts *beyond*
/// the first; it is a tunable, not an SLA.
#[derive(Debug, Clone)]
pub struct CommitPolicy {
    pub merge_retries: u32,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self { merge_retries: 3 }
    }
}

/// Repository layout per reconciler flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoLayout {
    /// Plain per-cluster context tree; also used by the Azure Arc flavors.
    Plain,
    /// Flux v2 watches the same tree through a Kustomization.
    Flux,
    /// Anthos Config Management root repository.
    Anthos,
}

impl RepoLayout {
    /// Directory every resource of the session lands in.
    pub fn app_dir(&self, session: &SyncSession) -> String {
        match self {
            RepoLayout::Plain | RepoLayout::Flux => format!(
                "clusters/{}/context/{}/app/{}",
                session.cluster, session.context, session.app
            ),
            RepoLayout::Anthos => format!(
                "config-root/{}/namespaces/{}/{}",
                session.cluster,
                session.namespace,
                session.deployment_id()
            ),
        }
    }

    pub fn resource_path(&self, session: &SyncSession, name: &str) -> String {
        format!("{}/{}.yaml", self.app_dir(session), name)
    }
}

pub struct GitOpsProvider {
    host: Arc<dyn GitHost>,
    session: SyncSession,
    branch: String,
    policy: CommitPolicy,
    layout: RepoLayout,
}

impl GitOpsProvider {
    pub fn new(
        host: Arc<dyn GitHost>,
        session: SyncSession,
        branch: String,
        policy: CommitPolicy,
        layout: RepoLayout,
    ) -> Self {
        Self {
            host,
            session,
            branch,
            policy,
            layout,
        }
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn layout(&self) -> RepoLayout {
        self.layout
    }

    fn commit_message(&self) -> String {
        format!(
            "sync {} app {} for cluster {}",
            self.session.context, self.session.app, self.session.cluster
        )
    }

    /// Flush one staged change set through the branch/commit/merge cycle.
    pub async fn commit_staged(&self, stage: &StagedChanges) -> Result<(), SyncError> {
        if stage.is_empty() {
            return Ok(());
        }
        self.host.ensure_repo(&self.branch).await?;

        let mut attempts: u32 = 0;
        loop {
            let staging = format!("stage-{}", Uuid::new_v4().simple());
            let outcome = self.commit_once(&staging, stage).await;
            // The short-lived branch goes away on every path.
            if let Err(err) = self.host.delete_branch(&staging).await {
                debug!(branch = %staging, error = %err, "staging branch cleanup failed");
            }
            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if err.is_merge_conflict() && attempts < self.policy.merge_retries => {
                    attempts += 1;
                    warn!(
                        branch = %self.branch,
                        attempt = attempts,
                        "merge conflict, retrying commit cycle"
                    );
                }
                Err(err) if err.is_merge_conflict() => {
                    return Err(SyncError::Conflict(format!(
                        "merge into {} still conflicting after {} attempts",
                        self.branch,
                        attempts + 1
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn commit_once(
        &self,
        staging: &str,
        stage: &StagedChanges,
    ) -> Result<(), GitHostError> {
        self.host.create_branch(staging, &self.branch).await?;
        let adds: Vec<CommitFile> = stage
            .adds
            .iter()
            .map(|(path, content)| CommitFile {
                path: path.clone(),
                content: content.clone(),
            })
            .collect();
        self.host
            .commit_files(staging, &self.commit_message(), &adds, &stage.deletes)
            .await?;
        self.host.merge(staging, &self.branch).await
    }
}

#[async_trait]
impl SyncProvider for GitOpsProvider {
    async fn create(
        &self,
        name: &str,
        mut stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        stage
            .adds
            .push((self.layout.resource_path(&self.session, name), content.to_vec()));
        Ok(stage)
    }

    async fn apply(
        &self,
        name: &str,
        mut stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        let manifest = decorate_manifest(content, &self.session)?;
        let rendered = serde_yaml::to_string(&manifest)
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        stage.adds.push((
            self.layout.resource_path(&self.session, name),
            rendered.into_bytes(),
        ));
        Ok(stage)
    }

    async fn delete(
        &self,
        name: &str,
        mut stage: StagedChanges,
        _content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        stage
            .deletes
            .push(self.layout.resource_path(&self.session, name));
        Ok(stage)
    }

    /// State is reconciled externally; there is nothing to read back.
    async fn get(&self, _name: &str, _selector: Option<&str>) -> Result<Vec<u8>, SyncError> {
        Ok(Vec::new())
    }

    async fn commit(&self, stage: StagedChanges) -> Result<(), SyncError> {
        self.commit_staged(&stage).await
    }

    /// Git connectivity is validated where the repository is registered;
    /// the backend itself is vacuously reachable.
    async fn is_reachable(&self) -> Result<(), SyncError> {
        Ok(())
    }
}
