// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! libgit2-backed git host.
//!
//! Operates on a repository on the local filesystem; trees are edited
//! directly, no working-tree checkout. Calls are short and synchronous
//! inside the async trait surface.

use async_trait::async_trait;
use git2::{BranchType, DiffOptions, ObjectType, Oid, Repository, Signature, Tree, TreeWalkMode, TreeWalkResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::cluster::GitProviderConfig;
use crate::domain::git::{CommitFile, CommitSummary, GitHost, GitHostError, GitHostFactory};

const FILE_MODE: i32 = 0o100644;
const TREE_MODE: i32 = 0o040000;

pub struct Git2Host {
    path: PathBuf,
    author_name: String,
    author_email: String,
}

impl Git2Host {
    pub fn new(path: impl Into<PathBuf>, author_name: &str, author_email: &str) -> Self {
        Self {
            path: path.into(),
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
        }
    }

    fn open(&self) -> Result<Repository, GitHostError> {
        Repository::open(&self.path)
            .map_err(|_| GitHostError::RepoNotFound(self.path.display().to_string()))
    }

    fn open_or_init(&self) -> Result<Repository, GitHostError> {
        match Repository::open(&self.path) {
            Ok(repo) => Ok(repo),
            Err(_) => {
                std::fs::create_dir_all(&self.path)
                    .map_err(|e| GitHostError::Backend(e.to_string()))?;
                Ok(Repository::init(&self.path)?)
            }
        }
    }

    fn signature(&self) -> Result<Signature<'static>, GitHostError> {
        Ok(Signature::now(&self.author_name, &self.author_email)?)
    }

    fn tip_commit<'r>(
        repo: &'r Repository,
        branch: &str,
    ) -> Result<git2::Commit<'r>, GitHostError> {
        let branch_ref = repo
            .find_branch(branch, BranchType::Local)
            .map_err(|_| GitHostError::BranchNotFound(branch.to_string()))?;
        Ok(branch_ref.get().peel_to_commit()?)
    }

    fn split_path(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Insert `blob` at `parts` under `tree`, writing new trees bottom-up.
fn upsert_blob(
    repo: &Repository,
    tree: Option<&Tree<'_>>,
    parts: &[&str],
    blob: Oid,
) -> Result<Oid, git2::Error> {
    let mut builder = repo.treebuilder(tree)?;
    if parts.len() == 1 {
        builder.insert(parts[0], blob, FILE_MODE)?;
    } else {
        let sub_tree = match tree.and_then(|t| t.get_name(parts[0])) {
            Some(entry) => entry.to_object(repo)?.into_tree().ok(),
            None => None,
        };
        let sub_oid = upsert_blob(repo, sub_tree.as_ref(), &parts[1..], blob)?;
        builder.insert(parts[0], sub_oid, TREE_MODE)?;
    }
    builder.write()
}

/// Remove the entry at `parts`; absent paths are a no-op.
fn remove_blob(repo: &Repository, tree: &Tree<'_>, parts: &[&str]) -> Result<Oid, git2::Error> {
    let mut builder = repo.treebuilder(Some(tree))?;
    if parts.len() == 1 {
        if builder.get(parts[0])?.is_some() {
            builder.remove(parts[0])?;
        }
    } else if let Some(entry) = tree.get_name(parts[0]) {
        if let Ok(sub) = entry.to_object(repo)?.into_tree() {
            let sub_oid = remove_blob(repo, &sub, &parts[1..])?;
            builder.insert(parts[0], sub_oid, TREE_MODE)?;
        }
    }
    builder.write()
}

#[async_trait]
impl GitHost for Git2Host {
    async fn ensure_repo(&self, branch: &str) -> Result<(), GitHostError> {
        let repo = self.open_or_init()?;
        if repo.find_branch(branch, BranchType::Local).is_err() {
            let tree_oid = repo.treebuilder(None)?.write()?;
            let tree = repo.find_tree(tree_oid)?;
            let sig = self.signature()?;
            repo.commit(
                Some(&format!("refs/heads/{}", branch)),
                &sig,
                &sig,
                "initial",
                &tree,
                &[],
            )?;
            repo.set_head(&format!("refs/heads/{}", branch))?;
        }
        Ok(())
    }

    async fn delete_repo(&self) -> Result<(), GitHostError> {
        std::fs::remove_dir_all(&self.path).map_err(|e| GitHostError::Backend(e.to_string()))
    }

    async fn branch_tip(&self, branch: &str) -> Result<String, GitHostError> {
        let repo = self.open()?;
        let tip = Self::tip_commit(&repo, branch)?.id().to_string();
        Ok(tip)
    }

    async fn create_branch(&self, name: &str, from: &str) -> Result<(), GitHostError> {
        let repo = self.open()?;
        let commit = Self::tip_commit(&repo, from)?;
        repo.branch(name, &commit, false)?;
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), GitHostError> {
        let repo = self.open()?;
        if let Ok(mut branch) = repo.find_branch(name, BranchType::Local) {
            branch.delete()?;
        }
        Ok(())
    }

    async fn commit_files(
        &self,
        branch: &str,
        message: &str,
        adds: &[CommitFile],
        deletes: &[String],
    ) -> Result<String, GitHostError> {
        let repo = self.open()?;
        let parent = Self::tip_commit(&repo, branch)?;
        let mut tree_oid = parent.tree()?.id();

        for add in adds {
            let blob = repo.blob(&add.content)?;
            let tree = repo.find_tree(tree_oid)?;
            tree_oid = upsert_blob(&repo, Some(&tree), &Self::split_path(&add.path), blob)?;
        }
        for path in deletes {
            let tree = repo.find_tree(tree_oid)?;
            tree_oid = remove_blob(&repo, &tree, &Self::split_path(path))?;
        }

        let tree = repo.find_tree(tree_oid)?;
        let sig = self.signature()?;
        let oid = repo.commit(
            Some(&format!("refs/heads/{}", branch)),
            &sig,
            &sig,
            message,
            &tree,
            &[&parent],
        )?;
        Ok(oid.to_string())
    }

    async fn merge(&self, source: &str, target: &str) -> Result<(), GitHostError> {
        let repo = self.open()?;
        let src = Self::tip_commit(&repo, source)?;
        let dst = Self::tip_commit(&repo, target)?;

        // Target already contains the source tip.
        if repo.graph_descendant_of(dst.id(), src.id())? || dst.id() == src.id() {
            return Ok(());
        }

        let mut index = repo.merge_commits(&dst, &src, None)?;
        if index.has_conflicts() {
            return Err(GitHostError::MergeConflict {
                source_branch: source.to_string(),
                target: target.to_string(),
            });
        }
        let tree_oid = index.write_tree_to(&repo)?;
        let tree = repo.find_tree(tree_oid)?;
        let sig = self.signature()?;
        repo.commit(
            Some(&format!("refs/heads/{}", target)),
            &sig,
            &sig,
            &format!("Merge {} into {}", source, target),
            &tree,
            &[&dst, &src],
        )?;
        Ok(())
    }

    async fn list_commits(
        &self,
        branch: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, GitHostError> {
        let repo = self.open()?;
        let tip = Self::tip_commit(&repo, branch)?;
        let mut walk = repo.revwalk()?;
        walk.push(tip.id())?;

        let mut out = Vec::new();
        for oid in walk {
            if out.len() >= limit {
                break;
            }
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            if let Some(path) = path {
                let tree = commit.tree()?;
                let parent_tree = match commit.parent(0) {
                    Ok(parent) => Some(parent.tree()?),
                    Err(_) => None,
                };
                let mut opts = DiffOptions::new();
                opts.pathspec(path);
                let diff = repo.diff_tree_to_tree(
                    parent_tree.as_ref(),
                    Some(&tree),
                    Some(&mut opts),
                )?;
                if diff.deltas().len() == 0 {
                    continue;
                }
            }
            out.push(CommitSummary {
                id: oid.to_string(),
                message: commit.message().unwrap_or_default().to_string(),
            });
        }
        Ok(out)
    }

    async fn list_files(&self, branch: &str, prefix: &str) -> Result<Vec<String>, GitHostError> {
        let repo = self.open()?;
        let tree = Self::tip_commit(&repo, branch)?.tree()?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                let path = format!("{}{}", root, entry.name().unwrap_or_default());
                if path.starts_with(prefix) {
                    files.push(path);
                }
            }
            TreeWalkResult::Ok
        })?;
        files.sort();
        Ok(files)
    }
}

/// Creates hosts rooted under one directory, one repository per
/// configured repo name.
pub struct Git2HostFactory {
    root: PathBuf,
}

impl Git2HostFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn repo_path(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }
}

#[async_trait]
impl GitHostFactory for Git2HostFactory {
    async fn host_for(&self, config: &GitProviderConfig) -> Result<Arc<dyn GitHost>, GitHostError> {
        let email = format!("{}@armada.local", config.user);
        Ok(Arc::new(Git2Host::new(
            self.repo_path(&config.repo),
            &config.user,
            &email,
        )))
    }
}

impl AsRef<Path> for Git2HostFactory {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}
