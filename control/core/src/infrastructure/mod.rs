// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer: concrete implementations of the domain
//! capabilities.
//!
//! # Available Implementations
//!
//! - **Context store** — `InMemoryContextBackend`
//! - **Document store** — `InMemoryDocumentStore`, `PostgresDocumentStore`
//! - **Git hosts** — `Git2Host` (libgit2), `InMemoryGitHost` (tests)
//! - **Sync providers** — direct, generic git, Flux v2, Anthos,
//!   Azure Arc v1/v2, behind `StandardProviderFactory`
//! - **Registries** — `DocClusterRegistry`, `DocIntentSource`
//! - **Lookup** — `HttpValueResolver` for patch-value placeholders
//! - **Cipher** — `PassthroughCipher`

pub mod context_store;
pub mod document;
pub mod registry;
pub mod intent;
pub mod http_lookup;
pub mod cipher;
pub mod git;
pub mod providers;

pub use cipher::PassthroughCipher;
pub use context_store::InMemoryContextBackend;
pub use document::{InMemoryDocumentStore, PostgresDocumentStore};
pub use git::{Git2Host, Git2HostFactory, InMemoryGitHost, InMemoryGitHostFactory};
pub use http_lookup::HttpValueResolver;
pub use intent::DocIntentSource;
pub use providers::{
    ArcApiVersion, AzureArcProvider, AzureClient, AzureEndpoints, CommitPolicy, DirectProvider,
    FluxProvider, GitOpsProvider, RepoLayout, StandardProviderFactory,
};
pub use registry::DocClusterRegistry;
