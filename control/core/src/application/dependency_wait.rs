// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dependency Wait Engine.
//!
//! Cooperative, polling-based sequencing across deployments: before a
//! cluster's resources advance under an operation, every context listed in
//! the cluster's dependency instruction must have recorded the operation's
//! terminal status for the same (app, cluster). This is not a lock — it
//! assumes one outstanding operation per (app, cluster) and degrades to
//! proceeding when a dependent cannot be read.

use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::appcontext::AppContext;
use crate::domain::context::{ContextBackend, ContextId, HandlePath, LifecycleStatus, Scope};
use crate::domain::dependency::WaitPolicy;
use crate::domain::sync::LifecycleOp;

pub struct DependencyWaiter {
    backend: Arc<dyn ContextBackend>,
    policy: WaitPolicy,
    /// (dependent context, operation) pairs already seen terminal;
    /// Unresolved → Matched, never back.
    matched: DashMap<(ContextId, LifecycleOp), ()>,
}

impl DependencyWaiter {
    pub fn new(backend: Arc<dyn ContextBackend>, policy: WaitPolicy) -> Self {
        Self {
            backend,
            policy,
            matched: DashMap::new(),
        }
    }

    /// Block until every declared dependency of (app, cluster) matches
    /// `op`'s terminal status, the token is cancelled (abandon, no error —
    /// the enclosing operation fails on its own), or a dependent becomes
    /// unreadable (ignored, proceeds).
    pub async fn wait_for_dependencies(
        &self,
        ctx: &AppContext,
        app: &str,
        cluster: &str,
        op: LifecycleOp,
        cancel: &CancellationToken,
    ) {
        let deps = match ctx.get_dependencies(app, cluster).await {
            Ok(deps) => deps,
            Err(err) => {
                warn!(app, cluster, error = %err, "dependency instruction unreadable, proceeding");
                return;
            }
        };
        for dep in deps {
            if cancel.is_cancelled() {
                return;
            }
            self.wait_for(dep.context, app, cluster, op, cancel).await;
        }
    }

    async fn wait_for(
        &self,
        dependent: ContextId,
        app: &str,
        cluster: &str,
        op: LifecycleOp,
        cancel: &CancellationToken,
    ) {
        if self.matched.contains_key(&(dependent, op)) {
            return;
        }

        let status_key = HandlePath {
            context: dependent,
            scope: Scope::Cluster {
                app: app.to_string(),
                cluster: cluster.to_string(),
            },
        }
        .status_key();
        let expected = op.terminal_status();

        loop {
            match self.backend.get(&status_key).await {
                Ok(Some((bytes, _))) => {
                    match serde_json::from_slice::<LifecycleStatus>(&bytes) {
                        Ok(status) if status == expected => {
                            debug!(%dependent, app, cluster, "dependency matched");
                            self.matched.insert((dependent, op), ());
                            return;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(%dependent, error = %err, "unreadable dependent status, ignoring dependency");
                            return;
                        }
                    }
                }
                // Not recorded yet; the dependent has not reached this
                // cluster. Keep polling.
                Ok(None) => {}
                Err(err) => {
                    warn!(%dependent, error = %err, "dependent lookup failed, ignoring dependency");
                    return;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }
        }
    }
}
