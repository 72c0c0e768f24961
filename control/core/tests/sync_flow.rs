// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end synchronization: resolve templates and customizations into
//! an AppContext, instantiate through the git backend, terminate, and
//! sequence two deployments through the dependency waiter.

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use armada_control_core::application::{
    AppContext, DependencyWaiter, ResourceContentResolver, SyncEngine,
};
use armada_control_core::domain::cipher::ValueCipher;
use armada_control_core::domain::cluster::{
    ClusterClient, ClusterClientFactory, ClusterRef, ClusterSyncConfig, GitOpsType,
    GitProviderConfig,
};
use armada_control_core::domain::context::{CompositeAppMeta, ContextBackend, LifecycleStatus};
use armada_control_core::domain::customization::{
    ClusterInfo, Customization, CustomizationError, CustomizationFile, IntentRef,
    PlaceholderResolver, SelectorMode, SelectorScope,
};
use armada_control_core::domain::dependency::DependencySpec;
use armada_control_core::domain::document::DocumentStore;
use armada_control_core::domain::resource::ResourceEntry;
use armada_control_core::domain::sync::{LifecycleOp, SyncError, DEPLOYMENT_ID_LABEL};
use armada_control_core::infrastructure::{
    DocClusterRegistry, DocIntentSource, InMemoryContextBackend, InMemoryDocumentStore,
    InMemoryGitHostFactory, PassthroughCipher, StandardProviderFactory,
};

struct NoLiveClusters;

#[async_trait]
impl ClusterClientFactory for NoLiveClusters {
    async fn client_for(&self, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, SyncError> {
        Err(SyncError::BackendUnavailable(format!(
            "no live client for {}",
            cluster
        )))
    }
}

struct NoLookups;

#[async_trait]
impl PlaceholderResolver for NoLookups {
    async fn resolve(&self, url: &str) -> Result<Value, CustomizationError> {
        Err(CustomizationError::Lookup(format!("unexpected lookup {}", url)))
    }
}

fn b64(s: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(s)
}

fn meta() -> CompositeAppMeta {
    CompositeAppMeta {
        project: "proj".to_string(),
        composite_app: "shop".to_string(),
        version: "v1".to_string(),
        deployment_intent_group: "default".to_string(),
        namespace: "retail".to_string(),
    }
}

fn intent() -> IntentRef {
    IntentRef {
        meta: meta(),
        intent: "gac".to_string(),
    }
}

fn git_config(repo: &str) -> ClusterSyncConfig {
    ClusterSyncConfig {
        gitops_type: GitOpsType::Git,
        git: Some(GitProviderConfig {
            host_type: "local".to_string(),
            user: "bot".to_string(),
            token: "configured-token".to_string(),
            repo: repo.to_string(),
            branch: "main".to_string(),
            url: None,
        }),
        azure: None,
    }
}

struct Harness {
    context_backend: Arc<dyn ContextBackend>,
    resolver: ResourceContentResolver,
    engine: SyncEngine,
    git_hosts: Arc<InMemoryGitHostFactory>,
    intents: Arc<DocIntentSource>,
}

async fn harness() -> Harness {
    let context_backend: Arc<dyn ContextBackend> = Arc::new(InMemoryContextBackend::new());
    let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let cipher: Arc<dyn ValueCipher> = Arc::new(PassthroughCipher);

    let registry = Arc::new(DocClusterRegistry::new(documents.clone(), cipher));
    for (cluster, repo) in [("site1", "repo-site1"), ("site2", "repo-site2")] {
        registry
            .register_cluster(&ClusterRef::new("edge", cluster), &git_config(repo))
            .await
            .unwrap();
    }

    let intents = Arc::new(DocIntentSource::new(documents.clone()));
    let git_hosts = Arc::new(InMemoryGitHostFactory::new());
    let providers = Arc::new(StandardProviderFactory::new(
        git_hosts.clone(),
        Arc::new(NoLiveClusters),
    ));
    let waiter = Arc::new(DependencyWaiter::new(
        context_backend.clone(),
        Default::default(),
    ));

    Harness {
        context_backend: context_backend.clone(),
        resolver: ResourceContentResolver::new(
            intents.clone(),
            intents.clone(),
            registry.clone(),
            Arc::new(NoLookups),
        ),
        engine: SyncEngine::new(context_backend, registry, providers, waiter),
        git_hosts,
        intents,
    }
}

async fn seed_intent(intents: &DocIntentSource) {
    let deployment = ResourceEntry {
        app: "web".to_string(),
        k8s_name: "web".to_string(),
        kind: "Deployment".to_string(),
        new_object: true,
        template: Some(b64(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 1\n",
        )),
    };
    let configmap = ResourceEntry {
        app: "web".to_string(),
        k8s_name: "settings".to_string(),
        kind: "ConfigMap".to_string(),
        new_object: true,
        template: None,
    };
    intents.put_resource(&intent(), &deployment).await.unwrap();
    intents.put_resource(&intent(), &configmap).await.unwrap();

    let inject = Customization {
        name: "conf".to_string(),
        cluster_specific: false,
        cluster_info: ClusterInfo {
            scope: SelectorScope::Label,
            provider: "edge".to_string(),
            name: String::new(),
            label: String::new(),
            mode: SelectorMode::Allow,
        },
        patch_type: None,
        patch_json: vec![],
        files: vec![CustomizationFile {
            name: "app.conf".to_string(),
            content: b64("x=1"),
        }],
    };
    intents
        .put_customization(&intent(), "settings+ConfigMap", &inject)
        .await
        .unwrap();
}

async fn deployment_context(h: &Harness, clusters: &[&str]) -> AppContext {
    let mut ctx = AppContext::new(h.context_backend.clone());
    let root = ctx.create_composite_app(&meta()).await.unwrap();
    let app = ctx.add_app(&root, "web").await.unwrap();
    for cluster in clusters {
        ctx.add_cluster(&app, &format!("edge+{}", cluster))
            .await
            .unwrap();
    }
    ctx
}

#[tokio::test]
async fn test_instantiate_then_terminate_through_git() {
    let h = harness().await;
    seed_intent(&h.intents).await;
    let ctx = deployment_context(&h, &["site1", "site2"]).await;
    let id = ctx.context_id().unwrap();

    h.resolver.resolve(&ctx, &intent()).await.unwrap();
    h.engine
        .synchronize(id, LifecycleOp::Instantiate)
        .await
        .unwrap();

    for repo in ["repo-site1", "repo-site2"] {
        let host = h.git_hosts.host(repo);
        let files = host.files("main");
        assert_eq!(files.len(), 2, "both resources land in {}", repo);

        let deployment_path = files
            .keys()
            .find(|k| k.ends_with("web+Deployment.yaml"))
            .expect("deployment manifest committed");
        let manifest: Value = serde_yaml::from_slice(&files[deployment_path]).unwrap();
        assert_eq!(manifest["metadata"]["namespace"], "retail");
        assert_eq!(
            manifest["metadata"]["labels"][DEPLOYMENT_ID_LABEL],
            format!("{}-web", id)
        );

        let configmap_path = files
            .keys()
            .find(|k| k.ends_with("settings+ConfigMap.yaml"))
            .expect("configmap manifest committed");
        let manifest: Value = serde_yaml::from_slice(&files[configmap_path]).unwrap();
        assert_eq!(manifest["data"]["app.conf"], "x=1");
    }

    let root = ctx.root_handle().unwrap();
    assert_eq!(
        ctx.get_status(&root).await.unwrap(),
        Some(LifecycleStatus::Instantiated)
    );

    h.engine
        .synchronize(id, LifecycleOp::Terminate)
        .await
        .unwrap();
    for repo in ["repo-site1", "repo-site2"] {
        assert!(h.git_hosts.host(repo).files("main").is_empty());
    }
    assert_eq!(
        ctx.get_status(&root).await.unwrap(),
        Some(LifecycleStatus::Terminated)
    );

    // Terminating a terminated deployment is a state conflict.
    let err = h
        .engine
        .synchronize(id, LifecycleOp::Terminate)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::StateConflict { .. }));
}

#[tokio::test]
async fn test_dependent_deployment_waits_for_upstream() {
    let h = harness().await;
    seed_intent(&h.intents).await;

    let upstream = deployment_context(&h, &["site1"]).await;
    let downstream = deployment_context(&h, &["site1"]).await;
    let upstream_id = upstream.context_id().unwrap();
    let downstream_id = downstream.context_id().unwrap();

    h.resolver.resolve(&upstream, &intent()).await.unwrap();
    h.resolver.resolve(&downstream, &intent()).await.unwrap();
    downstream
        .set_dependencies(
            "web",
            "edge+site1",
            &[DependencySpec {
                context: upstream_id,
            }],
        )
        .await
        .unwrap();

    let engine = Arc::new(h.engine);
    let downstream_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .synchronize(downstream_id, LifecycleOp::Instantiate)
                .await
        })
    };

    // The downstream pass polls while the upstream has not completed.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!downstream_task.is_finished());

    engine
        .synchronize(upstream_id, LifecycleOp::Instantiate)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), downstream_task)
        .await
        .expect("downstream must finish once upstream instantiates")
        .unwrap()
        .unwrap();
}
