// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Resource templates and Kubernetes kind knowledge.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::domain::customization::IntentRef;
use crate::domain::document::DocumentError;

/// Kinds that live at cluster scope and must never receive a namespace,
/// including the custom resources GitOps reconcilers install for
/// themselves.
pub const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "ClusterRole",
    "ClusterRoleBinding",
    "Namespace",
    "CustomResourceDefinition",
    "GitRepository",
    "Kustomization",
    "SourceControlConfiguration",
    "FluxConfiguration",
];

pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.iter().any(|k| *k == kind)
}

/// Resource names inside a cluster are `<k8sName>+<k8sKind>` so same-name
/// objects of different kinds never collide.
pub fn qualified_name(name: &str, kind: &str) -> String {
    format!("{}+{}", name, kind)
}

pub fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    qualified.rsplit_once('+')
}

// ============================================================================
// Group / version / kind
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Read the GVK out of a decoded manifest.
    pub fn from_manifest(manifest: &Value) -> Result<Self, ResourceError> {
        let api_version = manifest
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| ResourceError::MalformedManifest("missing apiVersion".to_string()))?;
        let kind = manifest
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ResourceError::MalformedManifest("missing kind".to_string()))?;
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        Ok(Self::new(group, version, kind))
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.api_version(), self.kind)
    }
}

// ============================================================================
// Templates
// ============================================================================

/// One deployable resource of an intent, as registered by the template
/// registry collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// App this resource belongs to.
    pub app: String,
    /// Kubernetes object name.
    pub k8s_name: String,
    /// Kubernetes kind.
    pub kind: String,
    /// Create a brand-new AppContext entry instead of patching the
    /// already-resolved value of an existing (cluster, resource) pair.
    pub new_object: bool,
    /// Base64 manifest; may be empty only for ConfigMap/Secret, which are
    /// synthesized when absent.
    #[serde(default)]
    pub template: Option<String>,
}

impl ResourceEntry {
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.k8s_name, &self.kind)
    }

    pub fn is_synthesizable(&self) -> bool {
        self.kind == "ConfigMap" || self.kind == "Secret"
    }

    /// Decode the transport-encoded template.
    pub fn decode_template(&self) -> Result<Option<Vec<u8>>, ResourceError> {
        match self.template.as_deref() {
            None | Some("") => Ok(None),
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map(Some)
                .map_err(|e| ResourceError::MalformedManifest(format!("template decode: {}", e))),
        }
    }
}

/// Read-only view of the template registry, keyed by the composite-app
/// identity. A thin CRUD service owns the writes; this core only reads.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn resources(&self, intent: &IntentRef) -> Result<Vec<ResourceEntry>, DocumentError>;
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_qualified_name_roundtrip() {
        let q = qualified_name("web", "Deployment");
        assert_eq!(q, "web+Deployment");
        assert_eq!(split_qualified(&q), Some(("web", "Deployment")));
    }

    #[test]
    fn test_cluster_scoped_kinds() {
        assert!(is_cluster_scoped("Namespace"));
        assert!(is_cluster_scoped("ClusterRoleBinding"));
        assert!(is_cluster_scoped("GitRepository"));
        assert!(!is_cluster_scoped("Deployment"));
        assert!(!is_cluster_scoped("ConfigMap"));
    }

    #[test]
    fn test_gvk_from_manifest() {
        let gvk = GroupVersionKind::from_manifest(&json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
        }))
        .unwrap();
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");
        assert_eq!(gvk.api_version(), "apps/v1");

        let core = GroupVersionKind::from_manifest(&json!({
            "apiVersion": "v1",
            "kind": "Service",
        }))
        .unwrap();
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");
    }

    #[test]
    fn test_template_decode() {
        let entry = ResourceEntry {
            app: "app".to_string(),
            k8s_name: "web".to_string(),
            kind: "Deployment".to_string(),
            new_object: true,
            template: Some(base64::engine::general_purpose::STANDARD.encode("kind: Deployment")),
        };
        assert_eq!(
            entry.decode_template().unwrap().unwrap(),
            b"kind: Deployment".to_vec()
        );

        let empty = ResourceEntry {
            template: Some(String::new()),
            ..entry.clone()
        };
        assert!(empty.decode_template().unwrap().is_none());
    }
}
