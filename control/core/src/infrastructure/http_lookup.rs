// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP-backed placeholder value lookup.
//!
//! The resolver substitutes `{clusterProvider}`/`{cluster}` into the URL
//! before calling; this adapter owns the transport: GET the URL, require a
//! 2xx response, return the `value` field of the JSON body.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::domain::customization::{CustomizationError, PlaceholderResolver};

pub struct HttpValueResolver {
    client: Client,
}

impl HttpValueResolver {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpValueResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaceholderResolver for HttpValueResolver {
    async fn resolve(&self, url: &str) -> Result<Value, CustomizationError> {
        let url = url::Url::parse(url)
            .map_err(|e| CustomizationError::Lookup(format!("invalid lookup url '{}': {}", url, e)))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CustomizationError::Lookup(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CustomizationError::Lookup(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CustomizationError::Lookup(format!("GET {}: {}", url, e)))?;
        body.get("value")
            .cloned()
            .ok_or_else(|| CustomizationError::Lookup(format!("GET {}: response has no 'value'", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_value_extracted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/size")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": 7}"#)
            .create_async()
            .await;

        let resolver = HttpValueResolver::new();
        let value = resolver
            .resolve(&format!("{}/size", server.url()))
            .await
            .unwrap();
        assert_eq!(value, json!(7));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/size")
            .with_status(500)
            .create_async()
            .await;

        let resolver = HttpValueResolver::new();
        let err = resolver
            .resolve(&format!("{}/size", server.url()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_missing_value_field_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/size")
            .with_status(200)
            .with_body(r#"{"other": 1}"#)
            .create_async()
            .await;

        let resolver = HttpValueResolver::new();
        let err = resolver
            .resolve(&format!("{}/size", server.url()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("value"));
    }
}
