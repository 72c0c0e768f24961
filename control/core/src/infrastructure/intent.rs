// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Document-backed template and customization sources.
//!
//! The CRUD surface for these registries lives in external services; this
//! adapter reads (and, for wiring and tests, writes) their documents
//! through the `DocumentStore` capability, keyed by the composite-app
//! identity.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::customization::{Customization, CustomizationSource, IntentRef};
use crate::domain::document::{unmarshal, DocKey, DocumentError, DocumentStore};
use crate::domain::resource::{ResourceEntry, TemplateSource};

const RESOURCE_STORE: &str = "resources";
const RESOURCE_TAG: &str = "resourcecontent";
const CUSTOMIZATION_TAG: &str = "customizationcontent";

pub struct DocIntentSource {
    store: Arc<dyn DocumentStore>,
}

impl DocIntentSource {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn intent_key(intent: &IntentRef) -> DocKey {
        DocKey::new()
            .with("project", &intent.meta.project)
            .with("compositeApp", &intent.meta.composite_app)
            .with("compositeAppVersion", &intent.meta.version)
            .with("deploymentIntentGroup", &intent.meta.deployment_intent_group)
            .with("intent", &intent.intent)
    }

    pub async fn put_resource(
        &self,
        intent: &IntentRef,
        entry: &ResourceEntry,
    ) -> Result<(), DocumentError> {
        let key = Self::intent_key(intent).with("resource", entry.qualified_name());
        let bytes = serde_json::to_vec(entry)
            .map_err(|e| DocumentError::Serialization(e.to_string()))?;
        self.store.insert(RESOURCE_STORE, &key, RESOURCE_TAG, &bytes).await
    }

    pub async fn put_customization(
        &self,
        intent: &IntentRef,
        resource: &str,
        customization: &Customization,
    ) -> Result<(), DocumentError> {
        let key = Self::intent_key(intent)
            .with("resource", resource)
            .with("customization", &customization.name);
        let bytes = serde_json::to_vec(customization)
            .map_err(|e| DocumentError::Serialization(e.to_string()))?;
        self.store
            .insert(RESOURCE_STORE, &key, CUSTOMIZATION_TAG, &bytes)
            .await
    }
}

#[async_trait]
impl TemplateSource for DocIntentSource {
    async fn resources(&self, intent: &IntentRef) -> Result<Vec<ResourceEntry>, DocumentError> {
        let docs = self
            .store
            .find(RESOURCE_STORE, &Self::intent_key(intent), RESOURCE_TAG)
            .await?;
        let mut entries = docs
            .iter()
            .map(|bytes| unmarshal::<ResourceEntry>(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        // Document order is storage-defined; pin a deterministic order.
        entries.sort_by(|a, b| {
            (a.app.as_str(), a.qualified_name()).cmp(&(b.app.as_str(), b.qualified_name()))
        });
        Ok(entries)
    }
}

#[async_trait]
impl CustomizationSource for DocIntentSource {
    async fn customizations(
        &self,
        intent: &IntentRef,
        resource: &str,
    ) -> Result<Vec<Customization>, DocumentError> {
        let key = Self::intent_key(intent).with("resource", resource);
        let docs = self
            .store
            .find(RESOURCE_STORE, &key, CUSTOMIZATION_TAG)
            .await?;
        let mut customizations = docs
            .iter()
            .map(|bytes| unmarshal::<Customization>(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        // Applied in turn; name order is the registry's application order.
        customizations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(customizations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::CompositeAppMeta;
    use crate::domain::customization::{ClusterInfo, SelectorMode, SelectorScope};
    use crate::infrastructure::document::InMemoryDocumentStore;

    fn intent() -> IntentRef {
        IntentRef {
            meta: CompositeAppMeta {
                project: "proj".to_string(),
                composite_app: "shop".to_string(),
                version: "v1".to_string(),
                deployment_intent_group: "default".to_string(),
                namespace: "retail".to_string(),
            },
            intent: "gac".to_string(),
        }
    }

    fn entry(app: &str, name: &str, kind: &str) -> ResourceEntry {
        ResourceEntry {
            app: app.to_string(),
            k8s_name: name.to_string(),
            kind: kind.to_string(),
            new_object: true,
            template: None,
        }
    }

    fn customization(name: &str) -> Customization {
        Customization {
            name: name.to_string(),
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
            files: vec![],
        }
    }

    #[tokio::test]
    async fn test_resources_scoped_to_intent() {
        let source = DocIntentSource::new(Arc::new(InMemoryDocumentStore::new()));
        source
            .put_resource(&intent(), &entry("web", "settings", "ConfigMap"))
            .await
            .unwrap();
        let mut other = intent();
        other.intent = "other".to_string();
        source
            .put_resource(&other, &entry("web", "zz", "Secret"))
            .await
            .unwrap();

        let found = source.resources(&intent()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].qualified_name(), "settings+ConfigMap");
    }

    #[tokio::test]
    async fn test_customizations_sorted_by_name() {
        let source = DocIntentSource::new(Arc::new(InMemoryDocumentStore::new()));
        source
            .put_customization(&intent(), "settings+ConfigMap", &customization("20-late"))
            .await
            .unwrap();
        source
            .put_customization(&intent(), "settings+ConfigMap", &customization("10-early"))
            .await
            .unwrap();

        let found = source
            .customizations(&intent(), "settings+ConfigMap")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "10-early");
        assert_eq!(found[1].name, "20-late");

        assert!(source
            .customizations(&intent(), "other+ConfigMap")
            .await
            .unwrap()
            .is_empty());
    }
}
