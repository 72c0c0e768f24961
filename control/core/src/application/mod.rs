// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services over the domain capabilities.

pub mod appcontext;
pub mod resolver;
pub mod strategic_merge;
pub mod sync_engine;
pub mod dependency_wait;

pub use appcontext::AppContext;
pub use dependency_wait::DependencyWaiter;
pub use resolver::{ResolveError, ResourceContentResolver};
pub use strategic_merge::{strategic_merge, MergeError, MergeRegistry};
pub use sync_engine::{ProviderFactory, SyncEngine};
