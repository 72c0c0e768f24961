// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `armada` — run a composite-application deployment bundle locally.
//!
//! Wires the core engine with in-memory stores and a libgit2 host, so a
//! bundle can be resolved and synchronized into local git repositories
//! that an external reconciler (or a human) can inspect.

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use armada_control_core::application::{
    AppContext, DependencyWaiter, ResourceContentResolver, SyncEngine,
};
use armada_control_core::domain::cluster::{
    ClusterClient, ClusterClientFactory, ClusterRef, ClusterSyncConfig, GitOpsType,
    GitProviderConfig,
};
use armada_control_core::domain::context::{CompositeAppMeta, ContextBackend};
use armada_control_core::domain::customization::{
    ClusterInfo, Customization, CustomizationFile, IntentRef, PatchType, SelectorMode,
    SelectorScope,
};
use armada_control_core::domain::document::DocumentStore;
use armada_control_core::domain::resource::ResourceEntry;
use armada_control_core::domain::sync::{LifecycleOp, SyncError};
use armada_control_core::infrastructure::{
    DocClusterRegistry, DocIntentSource, Git2HostFactory, HttpValueResolver,
    InMemoryContextBackend, InMemoryDocumentStore, PassthroughCipher, StandardProviderFactory,
};

#[derive(Parser)]
#[command(name = "armada", version, about = "ARMADA multi-cluster control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve and instantiate a deployment bundle.
    Run {
        /// Bundle description (YAML).
        bundle: PathBuf,
        /// Directory the per-cluster git repositories live under.
        #[arg(long, default_value = "./repos")]
        repo_root: PathBuf,
        /// Terminate the deployment again after instantiating.
        #[arg(long)]
        terminate: bool,
    },
}

// ============================================================================
// Bundle format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Bundle {
    project: String,
    composite_app: String,
    version: String,
    #[serde(default = "default_dig")]
    deployment_intent_group: String,
    namespace: String,
    #[serde(default = "default_intent")]
    intent: String,
    apps: Vec<BundleApp>,
    clusters: Vec<BundleCluster>,
    #[serde(default)]
    resources: Vec<BundleResource>,
    #[serde(default)]
    customizations: Vec<BundleCustomization>,
}

fn default_dig() -> String {
    "default".to_string()
}

fn default_intent() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BundleApp {
    name: String,
    clusters: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BundleCluster {
    provider: String,
    name: String,
    #[serde(default)]
    labels: Vec<String>,
    repo: String,
    #[serde(default = "default_branch")]
    branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BundleResource {
    app: String,
    name: String,
    kind: String,
    #[serde(default = "default_true")]
    new_object: bool,
    /// Manifest file, relative to the bundle.
    #[serde(default)]
    template: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BundleCustomization {
    resource: String,
    name: String,
    #[serde(default)]
    cluster_specific: bool,
    #[serde(default)]
    cluster_provider: Option<String>,
    #[serde(default)]
    cluster_name: Option<String>,
    #[serde(default)]
    cluster_label: Option<String>,
    #[serde(default)]
    patch_type: Option<PatchType>,
    #[serde(default)]
    patch: Vec<serde_json::Value>,
    /// Inline data files (name → content).
    #[serde(default)]
    files: std::collections::BTreeMap<String, String>,
}

impl BundleCustomization {
    fn into_domain(self) -> Result<(String, Customization)> {
        let scope = if self.cluster_label.is_some() {
            SelectorScope::Label
        } else {
            SelectorScope::Name
        };
        let customization = Customization {
            name: self.name,
            cluster_specific: self.cluster_specific,
            cluster_info: ClusterInfo {
                scope,
                provider: self.cluster_provider.unwrap_or_default(),
                name: self.cluster_name.unwrap_or_default(),
                label: self.cluster_label.unwrap_or_default(),
                mode: SelectorMode::Allow,
            },
            patch_type: self.patch_type,
            patch_json: self.patch,
            files: self
                .files
                .into_iter()
                .map(|(name, content)| CustomizationFile {
                    name,
                    content: base64::engine::general_purpose::STANDARD.encode(content),
                })
                .collect(),
        };
        Ok((self.resource, customization))
    }
}

// ============================================================================
// Wiring
// ============================================================================

struct NoLiveClusters;

#[async_trait::async_trait]
impl ClusterClientFactory for NoLiveClusters {
    async fn client_for(&self, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, SyncError> {
        Err(SyncError::BackendUnavailable(format!(
            "cluster {} is registered for direct sync; the local runner only supports gitops clusters",
            cluster
        )))
    }
}

async fn run(bundle_path: &Path, repo_root: &Path, terminate: bool) -> Result<()> {
    let raw = std::fs::read_to_string(bundle_path)
        .with_context(|| format!("reading bundle {}", bundle_path.display()))?;
    let bundle: Bundle = serde_yaml::from_str(&raw).context("parsing bundle")?;
    let bundle_dir = bundle_path.parent().unwrap_or_else(|| Path::new("."));

    let context_backend: Arc<dyn ContextBackend> = Arc::new(InMemoryContextBackend::new());
    let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let registry = Arc::new(DocClusterRegistry::new(
        documents.clone(),
        Arc::new(PassthroughCipher),
    ));
    let intents = Arc::new(DocIntentSource::new(documents));

    for cluster in &bundle.clusters {
        let cluster_ref = ClusterRef::new(&cluster.provider, &cluster.name);
        let config = ClusterSyncConfig {
            gitops_type: GitOpsType::Git,
            git: Some(GitProviderConfig {
                host_type: "local".to_string(),
                user: "armada".to_string(),
                token: String::new(),
                repo: cluster.repo.clone(),
                branch: cluster.branch.clone(),
                url: None,
            }),
            azure: None,
        };
        registry
            .register_cluster(&cluster_ref, &config)
            .await
            .map_err(|e| anyhow::anyhow!("registering {}: {}", cluster_ref, e))?;
        for label in &cluster.labels {
            registry
                .add_cluster_label(&cluster_ref, label)
                .await
                .map_err(|e| anyhow::anyhow!("labeling {}: {}", cluster_ref, e))?;
        }
    }

    let meta = CompositeAppMeta {
        project: bundle.project.clone(),
        composite_app: bundle.composite_app.clone(),
        version: bundle.version.clone(),
        deployment_intent_group: bundle.deployment_intent_group.clone(),
        namespace: bundle.namespace.clone(),
    };
    let intent = IntentRef {
        meta: meta.clone(),
        intent: bundle.intent.clone(),
    };

    for resource in &bundle.resources {
        let template = match &resource.template {
            Some(rel) => {
                let manifest = std::fs::read(bundle_dir.join(rel))
                    .with_context(|| format!("reading template {}", rel.display()))?;
                Some(base64::engine::general_purpose::STANDARD.encode(manifest))
            }
            None => None,
        };
        let entry = ResourceEntry {
            app: resource.app.clone(),
            k8s_name: resource.name.clone(),
            kind: resource.kind.clone(),
            new_object: resource.new_object,
            template,
        };
        intents
            .put_resource(&intent, &entry)
            .await
            .map_err(|e| anyhow::anyhow!("storing resource {}: {}", entry.qualified_name(), e))?;
    }
    for customization in bundle.customizations {
        let (resource, customization) = customization.into_domain()?;
        intents
            .put_customization(&intent, &resource, &customization)
            .await
            .map_err(|e| anyhow::anyhow!("storing customization: {}", e))?;
    }

    let mut ctx = AppContext::new(context_backend.clone());
    let root = ctx
        .create_composite_app(&meta)
        .await
        .map_err(|e| anyhow::anyhow!("creating context: {}", e))?;
    for app in &bundle.apps {
        let app_handle = ctx
            .add_app(&root, &app.name)
            .await
            .map_err(|e| anyhow::anyhow!("adding app {}: {}", app.name, e))?;
        for cluster in &app.clusters {
            if !cluster.contains('+') {
                bail!("app cluster '{}' must be <provider>+<name>", cluster);
            }
            ctx.add_cluster(&app_handle, cluster)
                .await
                .map_err(|e| anyhow::anyhow!("adding cluster {}: {}", cluster, e))?;
        }
    }
    let id = ctx.context_id().map_err(|e| anyhow::anyhow!("{}", e))?;
    info!(context = %id, "context created");

    let resolver = ResourceContentResolver::new(
        intents.clone(),
        intents.clone(),
        registry.clone(),
        Arc::new(HttpValueResolver::new()),
    );
    resolver
        .resolve(&ctx, &intent)
        .await
        .map_err(|e| anyhow::anyhow!("resolve failed: {}", e))?;

    let engine = SyncEngine::new(
        context_backend.clone(),
        registry,
        Arc::new(StandardProviderFactory::new(
            Arc::new(Git2HostFactory::new(repo_root)),
            Arc::new(NoLiveClusters),
        )),
        Arc::new(DependencyWaiter::new(context_backend, Default::default())),
    );

    engine
        .synchronize(id, LifecycleOp::Instantiate)
        .await
        .map_err(|e| anyhow::anyhow!("instantiate failed: {}", e))?;
    println!("instantiated {} ({} apps)", id, bundle.apps.len());
    println!("repositories under {}", repo_root.display());

    if terminate {
        engine
            .synchronize(id, LifecycleOp::Terminate)
            .await
            .map_err(|e| anyhow::anyhow!("terminate failed: {}", e))?;
        println!("terminated {}", id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            bundle,
            repo_root,
            terminate,
        } => run(&bundle, &repo_root, terminate).await,
    }
}
