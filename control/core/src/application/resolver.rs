// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Resource Content Resolver.
//!
//! Turns (template, customizations) pairs into the final per-cluster
//! manifests and records them in the AppContext under cluster/resource
//! handles, together with the ordering instruction synchronization
//! replays.
//!
//! Processing is at-least-once: a failure aborts the current
//! (intent, resource) pair and is reported in the aggregated error list,
//! but clusters already written by earlier customizations are not rolled
//! back — re-running is safe because every write is a whole-value
//! replacement keyed by the same handle.

use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::appcontext::AppContext;
use crate::application::strategic_merge::{strategic_merge, MergeError, MergeRegistry};
use crate::domain::cluster::{ClusterRef, ClusterRegistry};
use crate::domain::context::{ContextError, Scope};
use crate::domain::customization::{
    Customization, CustomizationError, CustomizationSource, IntentRef, PatchType,
    PlaceholderResolver, SelectorMode, SelectorScope,
};
use crate::domain::document::DocumentError;
use crate::domain::resource::{GroupVersionKind, ResourceEntry, ResourceError, TemplateSource};
use crate::domain::sync::SyncError;

pub struct ResourceContentResolver {
    templates: Arc<dyn TemplateSource>,
    customizations: Arc<dyn CustomizationSource>,
    registry: Arc<dyn ClusterRegistry>,
    lookup: Arc<dyn PlaceholderResolver>,
    merge_registry: MergeRegistry,
}

impl ResourceContentResolver {
    pub fn new(
        templates: Arc<dyn TemplateSource>,
        customizations: Arc<dyn CustomizationSource>,
        registry: Arc<dyn ClusterRegistry>,
        lookup: Arc<dyn PlaceholderResolver>,
    ) -> Self {
        Self {
            templates,
            customizations,
            registry,
            lookup,
            merge_registry: MergeRegistry::kubernetes_core(),
        }
    }

    pub fn with_merge_registry(mut self, merge_registry: MergeRegistry) -> Self {
        self.merge_registry = merge_registry;
        self
    }

    /// Resolve every resource of `intent` into `ctx`. Per-resource
    /// failures abort that resource only and aggregate.
    pub async fn resolve(&self, ctx: &AppContext, intent: &IntentRef) -> Result<(), ResolveError> {
        let entries = self.templates.resources(intent).await?;
        let mut failures = Vec::new();
        for entry in &entries {
            if let Err(err) = self.resolve_resource(ctx, intent, entry).await {
                warn!(
                    resource = %entry.qualified_name(),
                    app = %entry.app,
                    error = %err,
                    "resource resolution failed"
                );
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::Aggregate(failures))
        }
    }

    async fn resolve_resource(
        &self,
        ctx: &AppContext,
        intent: &IntentRef,
        entry: &ResourceEntry,
    ) -> Result<(), ResolveError> {
        let qname = entry.qualified_name();
        let customizations = self.customizations.customizations(intent, &qname).await?;
        for c in &customizations {
            c.validate()?;
        }

        let clusters = ctx.get_cluster_names(&entry.app).await?;
        if clusters.is_empty() {
            debug!(app = %entry.app, resource = %qname, "no clusters for app, skipping");
            return Ok(());
        }

        // Seed brand-new entries from the template (or synthesize the
        // minimal ConfigMap/Secret shell) before any customization runs.
        if entry.new_object {
            let base = self.base_manifest(entry)?;
            let rendered = render(&base)?;
            for cluster in &clusters {
                self.write_resource(ctx, &entry.app, cluster, &qname, &rendered)
                    .await?;
                ctx.append_order(&entry.app, cluster, &qname).await?;
            }
        }

        // Fold customizations one at a time, each persisting its result,
        // so later customizations see earlier ones' output.
        for customization in &customizations {
            for cluster in &clusters {
                let cluster_ref: ClusterRef = cluster
                    .parse()
                    .map_err(|e: SyncError| ResolveError::InvalidInput(e.to_string()))?;
                if !self.cluster_selected(customization, &cluster_ref).await? {
                    continue;
                }

                let handle = ctx
                    .get_handle(Scope::Resource {
                        app: entry.app.clone(),
                        cluster: cluster.clone(),
                        resource: qname.clone(),
                    })
                    .await?;
                let current = parse_manifest(&ctx.get_value(&handle).await?)?;
                let updated = self
                    .apply_customization(current, customization, entry, &cluster_ref)
                    .await?;
                ctx.update_value(&handle, &render(&updated)?).await?;
                ctx.append_order(&entry.app, cluster, &qname).await?;
            }
        }
        Ok(())
    }

    /// The value a brand-new entry starts from.
    fn base_manifest(&self, entry: &ResourceEntry) -> Result<Value, ResolveError> {
        match entry.decode_template()? {
            Some(bytes) => parse_manifest(&bytes),
            None if entry.is_synthesizable() => Ok(json!({
                "apiVersion": "v1",
                "kind": entry.kind,
                "metadata": { "name": entry.k8s_name },
            })),
            None => Err(ResolveError::MissingTemplate(entry.qualified_name())),
        }
    }

    async fn write_resource(
        &self,
        ctx: &AppContext,
        app: &str,
        cluster: &str,
        qname: &str,
        rendered: &[u8],
    ) -> Result<(), ResolveError> {
        // Re-runs overwrite rather than duplicate.
        match ctx
            .get_handle(Scope::Resource {
                app: app.to_string(),
                cluster: cluster.to_string(),
                resource: qname.to_string(),
            })
            .await
        {
            Ok(handle) => ctx.update_value(&handle, rendered).await?,
            Err(ContextError::NotFound(_)) => {
                let parent = ctx
                    .get_handle(Scope::Cluster {
                        app: app.to_string(),
                        cluster: cluster.to_string(),
                    })
                    .await?;
                ctx.add_resource(&parent, qname, rendered).await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Cluster selection per customization scope: only `allow` mode ever
    /// applies; clusters failing the filter are skipped, never an error.
    async fn cluster_selected(
        &self,
        customization: &Customization,
        cluster: &ClusterRef,
    ) -> Result<bool, ResolveError> {
        if !customization.cluster_specific {
            return Ok(true);
        }
        let info = &customization.cluster_info;
        if info.mode != SelectorMode::Allow {
            return Ok(false);
        }
        match info.scope {
            SelectorScope::Name => {
                Ok(info.provider == cluster.provider && info.name == cluster.name)
            }
            SelectorScope::Label => {
                if info.provider != cluster.provider {
                    return Ok(false);
                }
                let members = self
                    .registry
                    .clusters_with_label(&info.provider, &info.label)
                    .await
                    .map_err(|e| ResolveError::Registry(e.to_string()))?;
                Ok(members.iter().any(|m| *m == cluster.name))
            }
        }
    }

    async fn apply_customization(
        &self,
        value: Value,
        customization: &Customization,
        entry: &ResourceEntry,
        cluster: &ClusterRef,
    ) -> Result<Value, ResolveError> {
        match customization.patch_type {
            None => self.inject_data(value, customization, entry),
            Some(PatchType::Json) => self.apply_json_patch(value, customization, cluster).await,
            Some(PatchType::Merge) => self.apply_merge_patch(value, customization),
        }
    }

    /// ConfigMap/Secret data-key injection from uploaded files.
    fn inject_data(
        &self,
        mut value: Value,
        customization: &Customization,
        entry: &ResourceEntry,
    ) -> Result<Value, ResolveError> {
        if customization.files.is_empty() {
            return Ok(value);
        }
        if !entry.is_synthesizable() {
            return Err(ResolveError::InvalidInput(format!(
                "file-based data injection targets ConfigMap/Secret, not {}",
                entry.kind
            )));
        }

        if !value.is_object() {
            return Err(ResolveError::Malformed(
                "manifest is not a mapping".to_string(),
            ));
        }
        if value.get("data").is_none() {
            value["data"] = json!({});
        }
        let data = value["data"]
            .as_object_mut()
            .ok_or_else(|| ResolveError::Malformed("data is not a mapping".to_string()))?;

        for file in &customization.files {
            if !valid_data_key(&file.name) {
                return Err(ResolveError::InvalidDataKey {
                    resource: entry.qualified_name(),
                    key: file.name.clone(),
                });
            }
            if data.contains_key(&file.name) {
                return Err(ResolveError::DuplicateDataKey {
                    resource: entry.qualified_name(),
                    key: file.name.clone(),
                });
            }
            let raw = file.decode()?;
            let encoded = if entry.kind == "Secret" {
                // Secret data carries base64 values.
                Value::String(base64::engine::general_purpose::STANDARD.encode(&raw))
            } else {
                Value::String(String::from_utf8(raw).map_err(|_| {
                    ResolveError::InvalidInput(format!(
                        "ConfigMap key {} is not valid UTF-8",
                        file.name
                    ))
                })?)
            };
            data.insert(file.name.clone(), encoded);
        }
        Ok(value)
    }

    async fn apply_json_patch(
        &self,
        mut value: Value,
        customization: &Customization,
        cluster: &ClusterRef,
    ) -> Result<Value, ResolveError> {
        let mut ops = customization.patch_json.clone();
        for op in &mut ops {
            self.resolve_placeholder(op, cluster).await?;
        }
        let patch: json_patch::Patch = serde_json::from_value(Value::Array(ops))
            .map_err(|e| ResolveError::InvalidPatch(e.to_string()))?;
        json_patch::patch(&mut value, &patch)
            .map_err(|e| ResolveError::InvalidPatch(e.to_string()))?;
        Ok(value)
    }

    /// Resolve a `$(http…)$` placeholder in the operation's `value`
    /// before patch application. A failed lookup fails the whole step;
    /// no patch is applied.
    async fn resolve_placeholder(
        &self,
        op: &mut Value,
        cluster: &ClusterRef,
    ) -> Result<(), ResolveError> {
        let Some(raw) = op.get("value").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(url) = placeholder_url(raw) else {
            return Ok(());
        };
        let url = url
            .replace("{clusterProvider}", &cluster.provider)
            .replace("{cluster}", &cluster.name);
        let resolved = self
            .lookup
            .resolve(&url)
            .await
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;
        op["value"] = resolved;
        Ok(())
    }

    fn apply_merge_patch(
        &self,
        mut value: Value,
        customization: &Customization,
    ) -> Result<Value, ResolveError> {
        let gvk = GroupVersionKind::from_manifest(&value)?;
        for file in &customization.files {
            let fragment = parse_manifest(&file.decode()?)?;
            value = strategic_merge(&self.merge_registry, &gvk, &value, &fragment)?;
        }
        Ok(value)
    }
}

/// Extract the URL of a `$(…)$` placeholder value.
fn placeholder_url(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix("$(")?.strip_suffix(")$")?;
    inner.starts_with("http").then_some(inner)
}

/// ConfigMap/Secret data keys: alphanumerics, `-`, `_` and `.` only.
fn valid_data_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn parse_manifest(bytes: &[u8]) -> Result<Value, ResolveError> {
    serde_yaml::from_slice(bytes).map_err(|e| ResolveError::Malformed(e.to_string()))
}

fn render(value: &Value) -> Result<Vec<u8>, ResolveError> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| ResolveError::Malformed(e.to_string()))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("missing template for {0}")]
    MissingTemplate(String),

    #[error("duplicate data key '{key}' on {resource}")]
    DuplicateDataKey { resource: String, key: String },

    #[error("invalid data key '{key}' on {resource}")]
    InvalidDataKey { resource: String, key: String },

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("placeholder lookup failed: {0}")]
    Lookup(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed manifest: {0}")]
    Malformed(String),

    #[error("cluster registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("{} resource(s) failed to resolve", .0.len())]
    Aggregate(Vec<ResolveError>),
}

impl From<CustomizationError> for ResolveError {
    fn from(err: CustomizationError) -> Self {
        match err {
            CustomizationError::InvalidPatch(s) => ResolveError::InvalidPatch(s),
            CustomizationError::MalformedContent(s) => ResolveError::Malformed(s),
            CustomizationError::Lookup(s) => ResolveError::Lookup(s),
        }
    }
}

impl From<ResourceError> for ResolveError {
    fn from(err: ResourceError) -> Self {
        ResolveError::Malformed(err.to_string())
    }
}
