// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ARMADA control-plane core
//!
//! Deploys composite applications (a graph of Kubernetes resources spread
//! across independently owned clusters) and tracks per-cluster, per-resource
//! deployment state through instantiate/terminate lifecycles.
//!
//! # Architecture
//!
//! - **domain** — aggregate types, capability traits, per-module errors
//! - **application** — the AppContext API, resource content resolver,
//!   synchronization engine and dependency waiter
//! - **infrastructure** — concrete backends: context store, document store,
//!   git hosts, sync providers, cluster registry

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
