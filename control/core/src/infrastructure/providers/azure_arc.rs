// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Azure Arc sync backends (v1 `sourceControlConfiguration`, v2
//! `fluxConfiguration`).
//!
//! Resources still travel through git staging; the Arc management plane
//! only carries the reconciler configuration, created/removed over the
//! Azure REST API with OAuth2 client-credentials bearer tokens. All
//! credentials are configuration-sourced.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::cluster::{AzureConfig, GitProviderConfig};
use crate::domain::sync::{StagedChanges, SyncError, SyncProvider};
use crate::infrastructure::providers::git::GitOpsProvider;

/// Azure cloud endpoints; overridable for sovereign clouds and tests.
#[derive(Debug, Clone)]
pub struct AzureEndpoints {
    pub management: String,
    pub login: String,
}

impl Default for AzureEndpoints {
    fn default() -> Self {
        Self {
            management: "https://management.azure.com".to_string(),
            login: "https://login.microsoftonline.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcApiVersion {
    V1,
    V2,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Thin client for the Arc configuration resources.
pub struct AzureClient {
    http: Client,
    endpoints: AzureEndpoints,
    config: AzureConfig,
}

impl AzureClient {
    pub fn new(endpoints: AzureEndpoints, config: AzureConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            endpoints,
            config,
        }
    }

    /// OAuth2 client-credentials token for the management scope.
    async fn token(&self) -> Result<String, SyncError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.endpoints.login, self.config.tenant_id
        );
        let scope = format!("{}/.default", self.endpoints.management);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::BackendUnavailable(format!("token endpoint: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::BackendUnavailable(format!(
                "token endpoint returned {}",
                status
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::BackendUnavailable(format!("token decode: {}", e)))?;
        Ok(token.access_token)
    }

    fn config_url(&self, api: ArcApiVersion, name: &str) -> String {
        let base = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Kubernetes/connectedClusters/{}/providers/Microsoft.KubernetesConfiguration",
            self.endpoints.management,
            self.config.subscription_id,
            self.config.resource_group,
            self.config.cluster_name,
        );
        match api {
            ArcApiVersion::V1 => format!(
                "{}/sourceControlConfigurations/{}?api-version=2021-03-01",
                base, name
            ),
            ArcApiVersion::V2 => format!(
                "{}/fluxConfigurations/{}?api-version=2022-03-01",
                base, name
            ),
        }
    }

    pub async fn put_config(
        &self,
        api: ArcApiVersion,
        name: &str,
        body: &Value,
    ) -> Result<(), SyncError> {
        let token = self.token().await?;
        let url = self.config_url(api, name);
        let response = self
            .http
            .put(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::BackendUnavailable(format!("PUT {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::BackendUnavailable(format!(
                "PUT {} returned {}",
                url, status
            )));
        }
        debug!(name, "arc configuration upserted");
        Ok(())
    }

    pub async fn delete_config(&self, api: ArcApiVersion, name: &str) -> Result<(), SyncError> {
        let token = self.token().await?;
        let url = self.config_url(api, name);
        let response = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SyncError::BackendUnavailable(format!("DELETE {}: {}", url, e)))?;
        let status = response.status();
        // Already gone is fine.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(SyncError::BackendUnavailable(format!(
                "DELETE {} returned {}",
                url, status
            )));
        }
        Ok(())
    }
}

pub struct AzureArcProvider {
    inner: GitOpsProvider,
    client: AzureClient,
    api: ArcApiVersion,
    git: GitProviderConfig,
}

impl AzureArcProvider {
    pub fn new(
        inner: GitOpsProvider,
        client: AzureClient,
        api: ArcApiVersion,
        git: GitProviderConfig,
    ) -> Self {
        Self {
            inner,
            client,
            api,
            git,
        }
    }

    /// Arc configuration names must be lowercase.
    fn config_name(&self) -> String {
        self.inner.session().deployment_id().to_lowercase()
    }

    fn repo_url(&self) -> String {
        self.git.url.clone().unwrap_or_else(|| self.git.repo.clone())
    }

    fn config_body(&self) -> Value {
        let session = self.inner.session();
        match self.api {
            ArcApiVersion::V1 => json!({
                "properties": {
                    "repositoryUrl": self.repo_url(),
                    "operatorInstanceName": self.config_name(),
                    "operatorNamespace": session.namespace,
                    "operatorScope": "cluster",
                    "enableHelmOperator": false,
                }
            }),
            ArcApiVersion::V2 => json!({
                "properties": {
                    "scope": "cluster",
                    "namespace": session.namespace,
                    "sourceKind": "GitRepository",
                    "gitRepository": {
                        "url": self.repo_url(),
                        "repositoryRef": { "branch": self.inner.branch() },
                    },
                    "kustomizations": {
                        "sync": {
                            "path": format!("./{}", self.inner.layout().app_dir(session)),
                            "prune": true,
                        }
                    },
                }
            }),
        }
    }
}

#[async_trait]
impl SyncProvider for AzureArcProvider {
    async fn create(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        self.inner.create(name, stage, content).await
    }

    async fn apply(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        self.inner.apply(name, stage, content).await
    }

    async fn delete(
        &self,
        name: &str,
        stage: StagedChanges,
        content: &[u8],
    ) -> Result<StagedChanges, SyncError> {
        self.inner.delete(name, stage, content).await
    }

    async fn get(&self, name: &str, selector: Option<&str>) -> Result<Vec<u8>, SyncError> {
        self.inner.get(name, selector).await
    }

    async fn commit(&self, stage: StagedChanges) -> Result<(), SyncError> {
        self.inner.commit(stage).await
    }

    async fn is_reachable(&self) -> Result<(), SyncError> {
        self.inner.is_reachable().await
    }

    async fn apply_config(&self) -> Result<(), SyncError> {
        self.client
            .put_config(self.api, &self.config_name(), &self.config_body())
            .await
    }

    async fn delete_config(&self) -> Result<(), SyncError> {
        self.client.delete_config(self.api, &self.config_name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn azure_config() -> AzureConfig {
        AzureConfig {
            tenant_id: "tenant1".to_string(),
            client_id: "client1".to_string(),
            client_secret: "secret1".to_string(),
            subscription_id: "sub1".to_string(),
            resource_group: "rg1".to_string(),
            cluster_name: "arc1".to_string(),
        }
    }

    fn client(server: &mockito::Server) -> AzureClient {
        AzureClient::new(
            AzureEndpoints {
                management: server.url(),
                login: server.url(),
            },
            azure_config(),
        )
    }

    #[test]
    fn test_config_urls() {
        let c = AzureClient::new(AzureEndpoints::default(), azure_config());
        let v1 = c.config_url(ArcApiVersion::V1, "dep-web");
        assert!(v1.contains("/subscriptions/sub1/resourceGroups/rg1/"));
        assert!(v1.contains("connectedClusters/arc1"));
        assert!(v1.contains("sourceControlConfigurations/dep-web"));
        assert!(v1.ends_with("api-version=2021-03-01"));

        let v2 = c.config_url(ArcApiVersion::V2, "dep-web");
        assert!(v2.contains("fluxConfigurations/dep-web"));
        assert!(v2.ends_with("api-version=2022-03-01"));
    }

    #[tokio::test]
    async fn test_put_config_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/tenant1/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok123","token_type":"Bearer","expires_in":3599}"#)
            .create_async()
            .await;
        let put_mock = server
            .mock(
                "PUT",
                "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Kubernetes/connectedClusters/arc1/providers/Microsoft.KubernetesConfiguration/sourceControlConfigurations/dep-web",
            )
            .match_query(Matcher::UrlEncoded(
                "api-version".to_string(),
                "2021-03-01".to_string(),
            ))
            .match_header("authorization", "Bearer tok123")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        client(&server)
            .put_config(ArcApiVersion::V1, "dep-web", &json!({"properties": {}}))
            .await
            .unwrap();
        token_mock.assert_async().await;
        put_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_token_is_backend_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant1/oauth2/v2.0/token")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server)
            .put_config(ArcApiVersion::V1, "dep-web", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_delete_tolerates_absent_config() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant1/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok123","token_type":"Bearer","expires_in":3599}"#)
            .create_async()
            .await;
        server
            .mock(
                "DELETE",
                Matcher::Regex("fluxConfigurations/dep-web".to_string()),
            )
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        client(&server)
            .delete_config(ArcApiVersion::V2, "dep-web")
            .await
            .unwrap();
    }
}
