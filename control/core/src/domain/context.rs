// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AppContext domain model.
//!
//! One hierarchical tree per composite-application deployment instance:
//! CompositeApp → App → Cluster → Resource, plus a per-cluster instruction
//! node ("order", "dependency"). Every node is addressed by a [`HandlePath`]
//! obtained at creation time; a handle never changes meaning and is the only
//! way to read or mutate the node. Handles are typed, serializable paths
//! over a persisted store, never process-local pointers — any process
//! holding the [`ContextId`] can reconstruct and validate them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for one composite-application deployment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable identity of the composite application a context deploys.
///
/// This is the join key every external collaborator (template and
/// customization registries) uses to look up deployment inputs. It is
/// written once at context creation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeAppMeta {
    pub project: String,
    pub composite_app: String,
    pub version: String,
    pub deployment_intent_group: String,
    /// Target namespace for namespaced resources on every cluster.
    pub namespace: String,
}

/// Per-cluster instruction node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionKind {
    /// Ordered set of resource names; synchronization preserves this order.
    Order,
    /// Contexts this deployment waits on before advancing a cluster.
    Dependency,
}

impl InstructionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Dependency => "dependency",
        }
    }
}

impl FromStr for InstructionKind {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            "dependency" => Ok(Self::Dependency),
            other => Err(ContextError::InvalidHandle(format!(
                "unknown instruction kind '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Lifecycle status
// ============================================================================

/// Deployment lifecycle status carried by the whole context and by each
/// app/cluster scope within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStatus {
    Instantiating,
    Instantiated,
    InstantiateFailed,
    Terminating,
    Terminated,
    TerminateFailed,
}

impl LifecycleStatus {
    /// Whether an instantiate request is legal from this status.
    pub fn accepts_instantiate(&self) -> bool {
        !matches!(
            self,
            Self::Instantiating | Self::Terminating | Self::TerminateFailed
        )
    }

    /// Whether a terminate request is legal from this status.
    pub fn accepts_terminate(&self) -> bool {
        !matches!(self, Self::Terminating | Self::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instantiating => "Instantiating",
            Self::Instantiated => "Instantiated",
            Self::InstantiateFailed => "InstantiateFailed",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
            Self::TerminateFailed => "TerminateFailed",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Node scope within one context tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Context,
    App {
        app: String,
    },
    Cluster {
        app: String,
        cluster: String,
    },
    Resource {
        app: String,
        cluster: String,
        resource: String,
    },
    Instruction {
        app: String,
        cluster: String,
        kind: InstructionKind,
    },
}

/// Opaque, stable reference to a node in the AppContext tree.
///
/// Structured as (context id, scope); renders to the storage key the
/// backend persists the node under. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlePath {
    pub context: ContextId,
    pub scope: Scope,
}

impl HandlePath {
    pub fn context_root(context: ContextId) -> Self {
        Self {
            context,
            scope: Scope::Context,
        }
    }

    pub fn app(&self) -> Option<&str> {
        match &self.scope {
            Scope::Context => None,
            Scope::App { app }
            | Scope::Cluster { app, .. }
            | Scope::Resource { app, .. }
            | Scope::Instruction { app, .. } => Some(app),
        }
    }

    pub fn cluster(&self) -> Option<&str> {
        match &self.scope {
            Scope::Cluster { cluster, .. }
            | Scope::Resource { cluster, .. }
            | Scope::Instruction { cluster, .. } => Some(cluster),
            _ => None,
        }
    }

    /// Handle of the parent node, `None` at the context root.
    pub fn parent(&self) -> Option<HandlePath> {
        let scope = match &self.scope {
            Scope::Context => return None,
            Scope::App { .. } => Scope::Context,
            Scope::Cluster { app, .. } => Scope::App { app: app.clone() },
            Scope::Resource { app, cluster, .. } | Scope::Instruction { app, cluster, .. } => {
                Scope::Cluster {
                    app: app.clone(),
                    cluster: cluster.clone(),
                }
            }
        };
        Some(HandlePath {
            context: self.context,
            scope,
        })
    }

    /// Storage key of the node's status entry.
    pub fn status_key(&self) -> String {
        format!("{}status/", self)
    }
}

impl fmt::Display for HandlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/context/{}/", self.context)?;
        match &self.scope {
            Scope::Context => Ok(()),
            Scope::App { app } => write!(f, "app/{}/", app),
            Scope::Cluster { app, cluster } => write!(f, "app/{}/cluster/{}/", app, cluster),
            Scope::Resource {
                app,
                cluster,
                resource,
            } => write!(f, "app/{}/cluster/{}/resource/{}/", app, cluster, resource),
            Scope::Instruction { app, cluster, kind } => write!(
                f,
                "app/{}/cluster/{}/instruction/{}/",
                app,
                cluster,
                kind.as_str()
            ),
        }
    }
}

impl FromStr for HandlePath {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContextError::InvalidHandle(s.to_string());
        let parts: Vec<&str> = s.trim_matches('/').split('/').collect();
        if parts.len() < 2 || parts[0] != "context" {
            return Err(invalid());
        }
        let context = ContextId::from_string(parts[1]).map_err(|_| invalid())?;
        let scope = match &parts[2..] {
            [] => Scope::Context,
            ["app", app] => Scope::App {
                app: app.to_string(),
            },
            ["app", app, "cluster", cluster] => Scope::Cluster {
                app: app.to_string(),
                cluster: cluster.to_string(),
            },
            ["app", app, "cluster", cluster, "resource", resource] => Scope::Resource {
                app: app.to_string(),
                cluster: cluster.to_string(),
                resource: resource.to_string(),
            },
            ["app", app, "cluster", cluster, "instruction", kind] => Scope::Instruction {
                app: app.to_string(),
                cluster: cluster.to_string(),
                kind: kind.parse()?,
            },
            _ => return Err(invalid()),
        };
        Ok(HandlePath { context, scope })
    }
}

// ============================================================================
// Backend capability
// ============================================================================

/// Versioned key/value persistence the AppContext tree lives on.
///
/// Keys are handle paths. Values carry a monotonically increasing version
/// used for compare-and-swap so concurrent per-cluster workers never lose
/// updates on shared parents (status, instruction lists).
#[async_trait]
pub trait ContextBackend: Send + Sync {
    /// Unconditional whole-value replace (creates the key if absent).
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ContextError>;

    /// Compare-and-swap put. `expected = None` means create-if-absent.
    /// Returns `false` when the version check (or absence check) failed.
    async fn put_if_version(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<bool, ContextError>;

    /// Current value and version, `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, ContextError>;

    async fn exists(&self, key: &str) -> Result<bool, ContextError>;

    /// Remove every key under `prefix`; returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, ContextError>;

    /// All keys under `prefix`, sorted.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ContextError>;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context {0} is already initialized")]
    AlreadyInitialized(ContextId),

    #[error("context is not initialized")]
    NotInitialized,

    #[error("duplicate child '{name}' under {parent}")]
    DuplicateChild { parent: String, name: String },

    #[error("invalid parent handle {0}")]
    InvalidParent(String),

    #[error("handle not found: {0}")]
    NotFound(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("concurrent update conflict on {0}")]
    Conflict(String),

    #[error("context backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        ContextError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_roundtrip() {
        let ctx = ContextId::new();
        let handle = HandlePath {
            context: ctx,
            scope: Scope::Resource {
                app: "collector".to_string(),
                cluster: "edge+site1".to_string(),
                resource: "collector+Deployment".to_string(),
            },
        };
        let rendered = handle.to_string();
        assert!(rendered.starts_with(&format!("/context/{}/", ctx)));
        let parsed: HandlePath = rendered.parse().unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn test_handle_parent_chain() {
        let ctx = ContextId::new();
        let handle = HandlePath {
            context: ctx,
            scope: Scope::Instruction {
                app: "a".to_string(),
                cluster: "c".to_string(),
                kind: InstructionKind::Order,
            },
        };
        let cluster = handle.parent().unwrap();
        assert!(matches!(cluster.scope, Scope::Cluster { .. }));
        let app = cluster.parent().unwrap();
        assert!(matches!(app.scope, Scope::App { .. }));
        let root = app.parent().unwrap();
        assert!(matches!(root.scope, Scope::Context));
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_handle_rejects_garbage() {
        assert!("/nonsense/".parse::<HandlePath>().is_err());
        assert!("/context/not-a-uuid/".parse::<HandlePath>().is_err());
        let ctx = ContextId::new();
        assert!(format!("/context/{}/app/a/cluster/c/instruction/bogus/", ctx)
            .parse::<HandlePath>()
            .is_err());
    }

    #[test]
    fn test_instantiate_rejections() {
        assert!(!LifecycleStatus::Instantiating.accepts_instantiate());
        assert!(!LifecycleStatus::Terminating.accepts_instantiate());
        assert!(!LifecycleStatus::TerminateFailed.accepts_instantiate());

        assert!(LifecycleStatus::Instantiated.accepts_instantiate());
        assert!(LifecycleStatus::InstantiateFailed.accepts_instantiate());
        assert!(LifecycleStatus::Terminated.accepts_instantiate());
    }

    #[test]
    fn test_terminate_rejections() {
        assert!(!LifecycleStatus::Terminating.accepts_terminate());
        assert!(!LifecycleStatus::Terminated.accepts_terminate());

        assert!(LifecycleStatus::Instantiating.accepts_terminate());
        assert!(LifecycleStatus::Instantiated.accepts_terminate());
        assert!(LifecycleStatus::InstantiateFailed.accepts_terminate());
        assert!(LifecycleStatus::TerminateFailed.accepts_terminate());
    }
}
