// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Strategic-merge-patch over unstructured manifests.
//!
//! List merge behavior is driven by a declarative registry mapping each
//! GroupVersionKind to {list field path → merge key} — the full set of
//! mergeable paths is known at compile time. Lists without a registered
//! key replace atomically; `$patch: delete` and `$patch: replace`
//! directives are honored; a null map value deletes the key.

use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::resource::GroupVersionKind;

const PATCH_DIRECTIVE: &str = "$patch";

/// Per-kind merge-key knowledge.
#[derive(Debug, Clone, Default)]
pub struct MergeRegistry {
    schemes: HashMap<String, HashMap<String, String>>,
}

impl MergeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry covering the core workload and service kinds.
    pub fn kubernetes_core() -> Self {
        const NO_KEYS: [(&str, &str); 0] = [];
        let mut r = Self::new();
        let workload = pod_paths("spec.template.spec");

        r.register(&GroupVersionKind::new("", "v1", "Pod"), &pod_paths("spec"));
        for kind in ["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet"] {
            r.register(&GroupVersionKind::new("apps", "v1", kind), &workload);
        }
        r.register(&GroupVersionKind::new("batch", "v1", "Job"), &workload);
        r.register(
            &GroupVersionKind::new("batch", "v1", "CronJob"),
            &pod_paths("spec.jobTemplate.spec.template.spec"),
        );
        r.register(
            &GroupVersionKind::new("", "v1", "Service"),
            &[("spec.ports", "port")],
        );
        r.register(&GroupVersionKind::new("", "v1", "ConfigMap"), &NO_KEYS);
        r.register(&GroupVersionKind::new("", "v1", "Secret"), &NO_KEYS);
        r.register(
            &GroupVersionKind::new("", "v1", "ServiceAccount"),
            &[("imagePullSecrets", "name"), ("secrets", "name")],
        );
        r.register(
            &GroupVersionKind::new("networking.k8s.io", "v1", "Ingress"),
            &[("spec.rules", "host"), ("spec.tls", "secretName")],
        );
        r.register(
            &GroupVersionKind::new("", "v1", "PersistentVolumeClaim"),
            &NO_KEYS,
        );
        r
    }

    pub fn register<P: AsRef<str>, K: AsRef<str>>(
        &mut self,
        gvk: &GroupVersionKind,
        paths: &[(P, K)],
    ) {
        let scheme = paths
            .iter()
            .map(|(p, k)| (p.as_ref().to_string(), k.as_ref().to_string()))
            .collect();
        self.schemes.insert(gvk.to_string(), scheme);
    }

    fn scheme_for(&self, gvk: &GroupVersionKind) -> Option<&HashMap<String, String>> {
        self.schemes.get(&gvk.to_string())
    }
}

/// Field paths under a pod spec rooted at `prefix`.
fn pod_paths(prefix: &str) -> Vec<(String, String)> {
    let p = |s: &str| format!("{}.{}", prefix, s);
    vec![
        (p("containers"), "name".to_string()),
        (p("initContainers"), "name".to_string()),
        (p("volumes"), "name".to_string()),
        (p("imagePullSecrets"), "name".to_string()),
        (p("tolerations"), "key".to_string()),
        (p("containers.env"), "name".to_string()),
        (p("containers.ports"), "containerPort".to_string()),
        (p("containers.volumeMounts"), "mountPath".to_string()),
        (p("initContainers.env"), "name".to_string()),
        (p("initContainers.ports"), "containerPort".to_string()),
        (p("initContainers.volumeMounts"), "mountPath".to_string()),
    ]
}

/// Fold `patch` into `base` under the kind's registered scheme.
pub fn strategic_merge(
    registry: &MergeRegistry,
    gvk: &GroupVersionKind,
    base: &Value,
    patch: &Value,
) -> Result<Value, MergeError> {
    let scheme = registry
        .scheme_for(gvk)
        .ok_or_else(|| MergeError::UnknownResourceType(gvk.to_string()))?;
    Ok(merge_value(base, patch, "", scheme))
}

fn merge_value(base: &Value, patch: &Value, path: &str, scheme: &HashMap<String, String>) -> Value {
    match (base, patch) {
        (Value::Object(b), Value::Object(p)) => merge_maps(b, p, path, scheme),
        (Value::Array(b), Value::Array(p)) => match scheme.get(path) {
            Some(key) => Value::Array(merge_list(b, p, key, path, scheme)),
            None => patch.clone(),
        },
        _ => patch.clone(),
    }
}

fn merge_maps(
    base: &Map<String, Value>,
    patch: &Map<String, Value>,
    path: &str,
    scheme: &HashMap<String, String>,
) -> Value {
    if patch.get(PATCH_DIRECTIVE).and_then(Value::as_str) == Some("replace") {
        let mut replaced = patch.clone();
        replaced.remove(PATCH_DIRECTIVE);
        return Value::Object(replaced);
    }

    let mut out = base.clone();
    for (field, pv) in patch {
        if field == PATCH_DIRECTIVE {
            continue;
        }
        let child_path = if path.is_empty() {
            field.clone()
        } else {
            format!("{}.{}", path, field)
        };
        match (out.get(field), pv) {
            (_, Value::Null) => {
                out.remove(field);
            }
            (Some(bv), _) => {
                let merged = merge_value(bv, pv, &child_path, scheme);
                out.insert(field.clone(), merged);
            }
            (None, _) => {
                out.insert(field.clone(), pv.clone());
            }
        }
    }
    Value::Object(out)
}

fn merge_list(
    base: &[Value],
    patch: &[Value],
    key: &str,
    path: &str,
    scheme: &HashMap<String, String>,
) -> Vec<Value> {
    let mut out: Vec<Value> = base.to_vec();
    for pv in patch {
        let pk = pv.get(key);
        if pv.get(PATCH_DIRECTIVE).and_then(Value::as_str) == Some("delete") {
            if let Some(pk) = pk {
                out.retain(|bv| bv.get(key) != Some(pk));
            }
            continue;
        }
        match pk.and_then(|pk| out.iter().position(|bv| bv.get(key) == Some(pk))) {
            Some(i) => {
                let merged = merge_value(&out[i], pv, path, scheme);
                out[i] = merged;
            }
            None => out.push(pv.clone()),
        }
    }
    out
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no merge scheme registered for resource type {0}")]
    UnknownResourceType(String),
}
