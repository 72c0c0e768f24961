// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The AppContext API: handle-addressed access to one deployment's
//! hierarchical state tree.
//!
//! The tree is shared by concurrent per-cluster synchronization workers.
//! Exactly one worker owns a given cluster subtree, so plain whole-value
//! replacement is safe there; mutations of shared parents (instruction
//! lists) go through compare-and-swap with optimistic retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::context::{
    CompositeAppMeta, ContextBackend, ContextError, ContextId, HandlePath, InstructionKind,
    LifecycleStatus, Scope,
};
use crate::domain::dependency::DependencySpec;

/// Marker stored at structural nodes that carry no payload of their own.
const NODE_MARKER: &[u8] = b"{}";

/// Bound on optimistic-retry rounds for shared-parent mutations.
const CAS_ATTEMPTS: usize = 64;

pub struct AppContext {
    backend: Arc<dyn ContextBackend>,
    id: Option<ContextId>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").field("id", &self.id).finish()
    }
}

impl AppContext {
    /// A context shell not yet bound to any deployment instance.
    pub fn new(backend: Arc<dyn ContextBackend>) -> Self {
        Self { backend, id: None }
    }

    /// Bind to an existing context. Any process holding the id can
    /// reconstruct handles this way.
    pub async fn load(
        backend: Arc<dyn ContextBackend>,
        id: ContextId,
    ) -> Result<Self, ContextError> {
        let root = HandlePath::context_root(id);
        if !backend.exists(&root.to_string()).await? {
            return Err(ContextError::NotFound(root.to_string()));
        }
        Ok(Self {
            backend,
            id: Some(id),
        })
    }

    /// Allocate a fresh context tree and record its immutable meta.
    pub async fn create_composite_app(
        &mut self,
        meta: &CompositeAppMeta,
    ) -> Result<HandlePath, ContextError> {
        if let Some(id) = self.id {
            return Err(ContextError::AlreadyInitialized(id));
        }
        let id = ContextId::new();
        let root = HandlePath::context_root(id);
        if !self
            .backend
            .put_if_version(&root.to_string(), NODE_MARKER.to_vec(), None)
            .await?
        {
            return Err(ContextError::AlreadyInitialized(id));
        }
        self.backend
            .put(&Self::meta_key(id), serde_json::to_vec(meta)?)
            .await?;
        self.id = Some(id);
        Ok(root)
    }

    pub fn context_id(&self) -> Result<ContextId, ContextError> {
        self.id.ok_or(ContextError::NotInitialized)
    }

    pub fn root_handle(&self) -> Result<HandlePath, ContextError> {
        Ok(HandlePath::context_root(self.context_id()?))
    }

    fn meta_key(id: ContextId) -> String {
        format!("/context/{}/meta/", id)
    }

    /// The immutable composite-app identity recorded at creation.
    pub async fn meta(&self) -> Result<CompositeAppMeta, ContextError> {
        let key = Self::meta_key(self.context_id()?);
        let (bytes, _) = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| ContextError::NotFound(key))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    pub async fn add_app(
        &self,
        parent: &HandlePath,
        name: &str,
    ) -> Result<HandlePath, ContextError> {
        self.check_parent(parent, |s| matches!(s, Scope::Context))
            .await?;
        let child = HandlePath {
            context: parent.context,
            scope: Scope::App {
                app: name.to_string(),
            },
        };
        self.put_new(&child, NODE_MARKER.to_vec()).await?;
        Ok(child)
    }

    pub async fn add_cluster(
        &self,
        parent: &HandlePath,
        name: &str,
    ) -> Result<HandlePath, ContextError> {
        self.check_parent(parent, |s| matches!(s, Scope::App { .. }))
            .await?;
        let Scope::App { app } = &parent.scope else {
            unreachable!("checked above");
        };
        let child = HandlePath {
            context: parent.context,
            scope: Scope::Cluster {
                app: app.clone(),
                cluster: name.to_string(),
            },
        };
        self.put_new(&child, NODE_MARKER.to_vec()).await?;
        Ok(child)
    }

    /// A (cluster, resource-name) pair is unique within an app; a second
    /// add under the same cluster is a `DuplicateChild`.
    pub async fn add_resource(
        &self,
        parent: &HandlePath,
        name: &str,
        value: &[u8],
    ) -> Result<HandlePath, ContextError> {
        self.check_parent(parent, |s| matches!(s, Scope::Cluster { .. }))
            .await?;
        let Scope::Cluster { app, cluster } = &parent.scope else {
            unreachable!("checked above");
        };
        let child = HandlePath {
            context: parent.context,
            scope: Scope::Resource {
                app: app.clone(),
                cluster: cluster.clone(),
                resource: name.to_string(),
            },
        };
        self.put_new(&child, value.to_vec()).await?;
        Ok(child)
    }

    pub async fn add_instruction(
        &self,
        parent: &HandlePath,
        kind: InstructionKind,
        value: &[u8],
    ) -> Result<HandlePath, ContextError> {
        self.check_parent(parent, |s| matches!(s, Scope::Cluster { .. }))
            .await?;
        let Scope::Cluster { app, cluster } = &parent.scope else {
            unreachable!("checked above");
        };
        let child = HandlePath {
            context: parent.context,
            scope: Scope::Instruction {
                app: app.clone(),
                cluster: cluster.clone(),
                kind,
            },
        };
        self.put_new(&child, value.to_vec()).await?;
        Ok(child)
    }

    async fn put_new(&self, handle: &HandlePath, value: Vec<u8>) -> Result<(), ContextError> {
        let created = self
            .backend
            .put_if_version(&handle.to_string(), value, None)
            .await?;
        if !created {
            return Err(ContextError::DuplicateChild {
                parent: handle
                    .parent()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "/".to_string()),
                name: handle.to_string(),
            });
        }
        Ok(())
    }

    async fn check_parent(
        &self,
        parent: &HandlePath,
        shape: impl Fn(&Scope) -> bool,
    ) -> Result<(), ContextError> {
        if parent.context != self.context_id()? || !shape(&parent.scope) {
            return Err(ContextError::InvalidParent(parent.to_string()));
        }
        if !self.backend.exists(&parent.to_string()).await? {
            return Err(ContextError::InvalidParent(parent.to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Reads and whole-value updates
    // ========================================================================

    /// Validate a selector against the persisted tree and return its
    /// handle.
    pub async fn get_handle(&self, scope: Scope) -> Result<HandlePath, ContextError> {
        let handle = HandlePath {
            context: self.context_id()?,
            scope,
        };
        if !self.backend.exists(&handle.to_string()).await? {
            return Err(ContextError::NotFound(handle.to_string()));
        }
        Ok(handle)
    }

    pub async fn get_value(&self, handle: &HandlePath) -> Result<Vec<u8>, ContextError> {
        let key = handle.to_string();
        self.backend
            .get(&key)
            .await?
            .map(|(bytes, _)| bytes)
            .ok_or(ContextError::NotFound(key))
    }

    /// Whole-value replacement; resources are versioned by overwrite, not
    /// append.
    pub async fn update_value(
        &self,
        handle: &HandlePath,
        value: &[u8],
    ) -> Result<(), ContextError> {
        let key = handle.to_string();
        if !self.backend.exists(&key).await? {
            return Err(ContextError::NotFound(key));
        }
        self.backend.put(&key, value.to_vec()).await
    }

    /// Remove a node and cascade over its descendants.
    pub async fn delete_handle(&self, handle: &HandlePath) -> Result<(), ContextError> {
        let key = handle.to_string();
        let removed = self.backend.delete_prefix(&key).await?;
        if removed == 0 {
            return Err(ContextError::NotFound(key));
        }
        Ok(())
    }

    /// Drop the whole tree.
    pub async fn delete_context(&self) -> Result<(), ContextError> {
        let prefix = format!("/context/{}/", self.context_id()?);
        self.backend.delete_prefix(&prefix).await?;
        Ok(())
    }

    // ========================================================================
    // Tree enumeration
    // ========================================================================

    pub async fn get_app_names(&self) -> Result<Vec<String>, ContextError> {
        let prefix = format!("/context/{}/app/", self.context_id()?);
        self.child_segments(&prefix).await
    }

    pub async fn get_cluster_names(&self, app: &str) -> Result<Vec<String>, ContextError> {
        let prefix = format!("/context/{}/app/{}/cluster/", self.context_id()?, app);
        self.child_segments(&prefix).await
    }

    async fn child_segments(&self, prefix: &str) -> Result<Vec<String>, ContextError> {
        let keys = self.backend.list_prefix(prefix).await?;
        let names: BTreeSet<String> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub async fn get_status(
        &self,
        scope: &HandlePath,
    ) -> Result<Option<LifecycleStatus>, ContextError> {
        match self.backend.get(&scope.status_key()).await? {
            None => Ok(None),
            Some((bytes, _)) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }

    pub async fn set_status(
        &self,
        scope: &HandlePath,
        status: LifecycleStatus,
    ) -> Result<(), ContextError> {
        self.backend
            .put(&scope.status_key(), serde_json::to_vec(&status)?)
            .await
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn instruction_handle(
        &self,
        app: &str,
        cluster: &str,
        kind: InstructionKind,
    ) -> Result<HandlePath, ContextError> {
        Ok(HandlePath {
            context: self.context_id()?,
            scope: Scope::Instruction {
                app: app.to_string(),
                cluster: cluster.to_string(),
                kind,
            },
        })
    }

    /// Append a resource name to the cluster's order instruction unless
    /// already present. The accumulated set is monotonic within one
    /// instantiate pass; concurrent appends use CAS with retry.
    pub async fn append_order(
        &self,
        app: &str,
        cluster: &str,
        resource: &str,
    ) -> Result<(), ContextError> {
        let key = self
            .instruction_handle(app, cluster, InstructionKind::Order)?
            .to_string();
        for _ in 0..CAS_ATTEMPTS {
            match self.backend.get(&key).await? {
                None => {
                    let initial = serde_json::to_vec(&vec![resource.to_string()])?;
                    if self.backend.put_if_version(&key, initial, None).await? {
                        return Ok(());
                    }
                }
                Some((bytes, version)) => {
                    let mut order: Vec<String> = serde_json::from_slice(&bytes)?;
                    if order.iter().any(|r| r == resource) {
                        return Ok(());
                    }
                    order.push(resource.to_string());
                    let updated = serde_json::to_vec(&order)?;
                    if self
                        .backend
                        .put_if_version(&key, updated, Some(version))
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
        }
        Err(ContextError::Conflict(key))
    }

    /// Resource names in recorded submission order; empty when the
    /// instruction node was never created.
    pub async fn get_order(&self, app: &str, cluster: &str) -> Result<Vec<String>, ContextError> {
        let key = self
            .instruction_handle(app, cluster, InstructionKind::Order)?
            .to_string();
        match self.backend.get(&key).await? {
            None => Ok(Vec::new()),
            Some((bytes, _)) => Ok(serde_json::from_slice(&bytes)?),
        }
    }

    pub async fn set_dependencies(
        &self,
        app: &str,
        cluster: &str,
        deps: &[DependencySpec],
    ) -> Result<(), ContextError> {
        let key = self
            .instruction_handle(app, cluster, InstructionKind::Dependency)?
            .to_string();
        self.backend.put(&key, serde_json::to_vec(deps)?).await
    }

    pub async fn get_dependencies(
        &self,
        app: &str,
        cluster: &str,
    ) -> Result<Vec<DependencySpec>, ContextError> {
        let key = self
            .instruction_handle(app, cluster, InstructionKind::Dependency)?
            .to_string();
        match self.backend.get(&key).await? {
            None => Ok(Vec::new()),
            Some((bytes, _)) => Ok(serde_json::from_slice(&bytes)?),
        }
    }
}
