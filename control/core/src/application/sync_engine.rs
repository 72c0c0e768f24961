// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Synchronization engine: the externally triggered entry point that
//! drives one deployment end-to-end for a lifecycle operation.
//!
//! One worker task per cluster; workers run in parallel across clusters
//! and serialize resource operations within a cluster, replaying the
//! recorded order instruction. A single cancellation token threads the
//! pass; every store write is a complete idempotent replace, so
//! cancellation never leaves state needing repair.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::appcontext::AppContext;
use crate::application::dependency_wait::DependencyWaiter;
use crate::domain::cluster::{ClusterRef, ClusterRegistry, ClusterSyncConfig};
use crate::domain::context::{ContextBackend, ContextId, HandlePath, Scope};
use crate::domain::sync::{LifecycleOp, StagedChanges, SyncError, SyncProvider, SyncSession};

/// Builds the per-cluster sync backend from the cluster's registered
/// configuration. One trait, one implementation per backend kind.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn provider_for(
        &self,
        session: &SyncSession,
        config: &ClusterSyncConfig,
    ) -> Result<Arc<dyn SyncProvider>, SyncError>;
}

pub struct SyncEngine {
    backend: Arc<dyn ContextBackend>,
    registry: Arc<dyn ClusterRegistry>,
    providers: Arc<dyn ProviderFactory>,
    waiter: Arc<DependencyWaiter>,
}

impl SyncEngine {
    pub fn new(
        backend: Arc<dyn ContextBackend>,
        registry: Arc<dyn ClusterRegistry>,
        providers: Arc<dyn ProviderFactory>,
        waiter: Arc<DependencyWaiter>,
    ) -> Self {
        Self {
            backend,
            registry,
            providers,
            waiter,
        }
    }

    pub async fn synchronize(&self, id: ContextId, op: LifecycleOp) -> Result<(), SyncError> {
        self.synchronize_with_cancel(id, op, CancellationToken::new())
            .await
    }

    /// Drive `op` for every (app, cluster) of the deployment. Success
    /// transitions the context to the operation's terminal status;
    /// any failure leaves the matching `*Failed` marker.
    pub async fn synchronize_with_cancel(
        &self,
        id: ContextId,
        op: LifecycleOp,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        let ctx = Arc::new(AppContext::load(self.backend.clone(), id).await?);
        let root = ctx.root_handle()?;

        self.gate_status(&ctx, &root, op).await?;

        // Every fallible read happens before the status flips active, so a
        // setup failure never strands the context mid-transition.
        let meta = ctx.meta().await?;
        let apps = ctx.get_app_names().await?;
        let mut sessions = Vec::new();
        for app in &apps {
            for cluster in ctx.get_cluster_names(app).await? {
                let cluster_ref: ClusterRef = cluster.parse()?;
                sessions.push(SyncSession {
                    context: id,
                    app: app.clone(),
                    cluster: cluster_ref,
                    namespace: meta.namespace.clone(),
                });
            }
        }

        ctx.set_status(&root, op.active_status()).await?;
        info!(context = %id, op = op.as_str(), composite_app = %meta.composite_app, "synchronization started");

        let mut failures = Vec::new();
        for app in &apps {
            if let Ok(handle) = ctx.get_handle(Scope::App { app: app.clone() }).await {
                if let Err(err) = ctx.set_status(&handle, op.active_status()).await {
                    failures.push(err.into());
                }
            }
        }

        let mut workers: JoinSet<Result<(), SyncError>> = JoinSet::new();
        for session in sessions {
            workers.spawn(sync_cluster(
                ctx.clone(),
                self.registry.clone(),
                self.providers.clone(),
                self.waiter.clone(),
                session,
                op,
                cancel.child_token(),
            ));
        }
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push(err),
                Err(err) => failures.push(SyncError::Internal(format!("worker panicked: {}", err))),
            }
        }

        let final_status = if failures.is_empty() {
            op.terminal_status()
        } else {
            op.failed_status()
        };
        for app in &apps {
            if let Ok(handle) = ctx.get_handle(Scope::App { app: app.clone() }).await {
                ctx.set_status(&handle, final_status).await?;
            }
        }
        ctx.set_status(&root, final_status).await?;

        if failures.is_empty() {
            info!(context = %id, op = op.as_str(), "synchronization finished");
            metrics::counter!("armada_sync_passes_total", "op" => op.as_str(), "outcome" => "ok")
                .increment(1);
            Ok(())
        } else {
            warn!(context = %id, op = op.as_str(), failures = failures.len(), "synchronization failed");
            metrics::counter!("armada_sync_passes_total", "op" => op.as_str(), "outcome" => "failed")
                .increment(1);
            Err(SyncError::Aggregate(failures))
        }
    }

    /// Enforce the lifecycle transition table at the context scope.
    async fn gate_status(
        &self,
        ctx: &AppContext,
        root: &HandlePath,
        op: LifecycleOp,
    ) -> Result<(), SyncError> {
        let current = ctx.get_status(root).await?;
        let accepted = match (op, current) {
            (LifecycleOp::Instantiate, None) => true,
            (LifecycleOp::Instantiate, Some(s)) => s.accepts_instantiate(),
            // Nothing was ever instantiated; there is nothing to terminate.
            (LifecycleOp::Terminate, None) => false,
            (LifecycleOp::Terminate, Some(s)) => s.accepts_terminate(),
        };
        if accepted {
            Ok(())
        } else {
            Err(SyncError::StateConflict {
                requested: op,
                current: current
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "Uninitialized".to_string()),
            })
        }
    }
}

/// One cluster's synchronization step, serial over the recorded resource
/// order.
async fn sync_cluster(
    ctx: Arc<AppContext>,
    registry: Arc<dyn ClusterRegistry>,
    providers: Arc<dyn ProviderFactory>,
    waiter: Arc<DependencyWaiter>,
    session: SyncSession,
    op: LifecycleOp,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    let cluster_name = session.cluster.to_string();
    let cluster_handle = ctx
        .get_handle(Scope::Cluster {
            app: session.app.clone(),
            cluster: cluster_name.clone(),
        })
        .await?;

    waiter
        .wait_for_dependencies(&ctx, &session.app, &cluster_name, op, &cancel)
        .await;
    if cancel.is_cancelled() {
        return Err(SyncError::Internal(format!(
            "synchronization of {} cancelled",
            cluster_name
        )));
    }

    let config = registry.sync_config(&session.cluster).await?;
    let provider = providers.provider_for(&session, &config).await?;
    provider.is_reachable().await?;

    ctx.set_status(&cluster_handle, op.active_status()).await?;
    let pushed = push_cluster(&ctx, provider.as_ref(), &session, op, &cancel).await;
    match pushed {
        Ok(()) => {
            ctx.set_status(&cluster_handle, op.terminal_status()).await?;
            debug!(cluster = %cluster_name, app = %session.app, "cluster synchronized");
            Ok(())
        }
        Err(err) => {
            warn!(cluster = %cluster_name, app = %session.app, error = %err, "cluster synchronization failed");
            ctx.set_status(&cluster_handle, op.failed_status()).await?;
            Err(err)
        }
    }
}

async fn push_cluster(
    ctx: &AppContext,
    provider: &dyn SyncProvider,
    session: &SyncSession,
    op: LifecycleOp,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    let cluster_name = session.cluster.to_string();
    if op == LifecycleOp::Instantiate {
        provider.apply_config().await?;
    }

    let order = ctx.get_order(&session.app, &cluster_name).await?;
    let mut stage = StagedChanges::default();
    for resource in &order {
        if cancel.is_cancelled() {
            return Err(SyncError::Internal(format!(
                "synchronization of {} cancelled",
                cluster_name
            )));
        }
        let handle = ctx
            .get_handle(Scope::Resource {
                app: session.app.clone(),
                cluster: cluster_name.clone(),
                resource: resource.clone(),
            })
            .await?;
        let content = ctx.get_value(&handle).await?;
        stage = match op {
            LifecycleOp::Instantiate => provider.apply(resource, stage, &content).await?,
            LifecycleOp::Terminate => provider.delete(resource, stage, &content).await?,
        };
        metrics::counter!("armada_sync_resources_total", "op" => op.as_str()).increment(1);
    }
    provider.commit(stage).await?;

    if op == LifecycleOp::Terminate {
        provider.delete_config().await?;
    }
    Ok(())
}
