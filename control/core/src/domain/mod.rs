// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: aggregate types, capability traits and their errors.
//!
//! Capabilities consumed from the outside world (document store, git
//! hosting, live-cluster apply, value cipher) are declared here as traits
//! and implemented in `crate::infrastructure`.

pub mod context;
pub mod resource;
pub mod customization;
pub mod cluster;
pub mod document;
pub mod git;
pub mod sync;
pub mod dependency;
pub mod cipher;

pub use context::{
    CompositeAppMeta, ContextBackend, ContextError, ContextId, HandlePath, InstructionKind,
    LifecycleStatus, Scope,
};
pub use resource::{GroupVersionKind, ResourceEntry, TemplateSource};
pub use customization::{Customization, CustomizationSource, IntentRef, PatchType};
pub use cluster::{ClusterClient, ClusterRef, ClusterRegistry, ClusterSyncConfig, GitOpsType};
pub use document::{DocKey, DocumentError, DocumentStore};
pub use git::{GitHost, GitHostError, GitHostFactory};
pub use sync::{LifecycleOp, StagedChanges, SyncError, SyncProvider, SyncSession};
pub use dependency::{DependencySpec, DependencyState, WaitPolicy};
pub use cipher::ValueCipher;
