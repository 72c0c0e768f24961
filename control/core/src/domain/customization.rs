// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Customizations: named patch/override intents bound to one resource and a
//! cluster-selection scope. Created and mutated by an external CRUD API;
//! this core only reads them while resolving manifests.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::context::CompositeAppMeta;
use crate::domain::document::DocumentError;

/// Which patch semantics a customization carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    /// RFC 6902 JSON-Patch document.
    Json,
    /// Kubernetes strategic-merge-patch fragments, one per uploaded file.
    Merge,
}

/// Cluster selection axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorScope {
    Label,
    Name,
}

/// Cluster selection mode. Only `allow` ever applies a customization;
/// anything else skips the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorMode {
    Allow,
    Deny,
}

/// Cluster-selection scope of one customization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub scope: SelectorScope,
    pub provider: String,
    /// Concrete cluster name; used when `scope == Name`.
    #[serde(default)]
    pub name: String,
    /// Provider label; used when `scope == Label`.
    #[serde(default)]
    pub label: String,
    pub mode: SelectorMode,
}

/// One uploaded customization file (ConfigMap/Secret data key or a
/// strategic-merge fragment), base64 on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomizationFile {
    pub name: String,
    pub content: String,
}

impl CustomizationFile {
    pub fn decode(&self) -> Result<Vec<u8>, CustomizationError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.content.trim())
            .map_err(|e| CustomizationError::MalformedContent(format!("{}: {}", self.name, e)))
    }
}

/// A named override attached to one (intent, resource) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customization {
    pub name: String,
    /// When false the customization applies to every cluster of the app.
    #[serde(default)]
    pub cluster_specific: bool,
    pub cluster_info: ClusterInfo,
    /// Absent for pure ConfigMap/Secret data injection.
    #[serde(default)]
    pub patch_type: Option<PatchType>,
    /// RFC 6902 operations when `patch_type == Json`.
    #[serde(default)]
    pub patch_json: Vec<Value>,
    #[serde(default)]
    pub files: Vec<CustomizationFile>,
}

impl Customization {
    /// Structural validation; the resolver refuses malformed intents
    /// before touching any cluster.
    pub fn validate(&self) -> Result<(), CustomizationError> {
        match self.patch_type {
            Some(PatchType::Json) if self.patch_json.is_empty() => Err(
                CustomizationError::InvalidPatch(format!("{}: empty JSON patch", self.name)),
            ),
            Some(PatchType::Merge) if self.files.is_empty() => Err(
                CustomizationError::InvalidPatch(format!("{}: merge patch without files", self.name)),
            ),
            _ => Ok(()),
        }
    }
}

/// Identity of one deployment intent; scopes template and customization
/// lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRef {
    pub meta: CompositeAppMeta,
    pub intent: String,
}

/// Read-only view of the customization registry.
#[async_trait]
pub trait CustomizationSource: Send + Sync {
    /// All customizations scoped to `resource` (a qualified
    /// `<name>+<kind>` resource name) under the given intent, in
    /// application order.
    async fn customizations(
        &self,
        intent: &IntentRef,
        resource: &str,
    ) -> Result<Vec<Customization>, DocumentError>;
}

/// External value lookup used to resolve `$(http…)$` placeholders inside
/// JSON-Patch values before patch application.
#[async_trait]
pub trait PlaceholderResolver: Send + Sync {
    /// GET `url` and return the `value` field of the JSON response body.
    async fn resolve(&self, url: &str) -> Result<Value, CustomizationError>;
}

#[derive(Debug, Error)]
pub enum CustomizationError {
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("malformed customization content: {0}")]
    MalformedContent(String),

    #[error("placeholder lookup failed: {0}")]
    Lookup(String),
}
