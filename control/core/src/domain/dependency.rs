// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cross-deployment dependency declarations and wait policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::context::ContextId;

/// One declared dependency: this deployment's cluster waits until the
/// referenced context records the operation's terminal status for the same
/// (app, cluster).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub context: ContextId,
}

/// Engine-side resolution state per (context, operation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Unresolved,
    Matched,
}

/// Polling policy for the wait engine. The interval is a tunable, not an
/// SLA; callers bound the wait through cancellation.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
        }
    }
}
