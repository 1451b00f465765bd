//! Gateway control API clients
//!
//! The gateway lists deployed functions, reports their replica counts and
//! accepts scale commands. Every request carries basic authentication.

mod inventory;
mod scale;


pub use scale::{ScaleClient, ScaleResult};

use crate::credentials::Credentials;
use crate::error::RequestError;
use crate::models::FunctionDescriptor;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub use async_trait::async_trait;

/// HTTP client shared by the gateway and metrics clients
pub fn build_http_client(timeout: Duration) -> anyhow::Result<Client> {
    use anyhow::Context;

    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Source of the function inventory
#[async_trait]
pub trait FunctionInventory: Send + Sync {
    /// All deployed functions
    async fn list_functions(&self) -> Result<Vec<FunctionDescriptor>, RequestError>;

    /// Live descriptor of one function, including its available replicas
    async fn get_replicas(&self, name: &str) -> Result<FunctionDescriptor, RequestError>;
}

/// Sink for scale commands
#[async_trait]
pub trait ScaleExecutor: Send + Sync {
    /// Scale `name` to `replicas`. Failures are logged, never returned.
    async fn send_scale_event(&self, name: &str, replicas: u64) -> ScaleResult;
}

/// Authenticated HTTP access to the gateway
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
    credentials: Arc<Credentials>,
}

impl GatewayClient {
    /// `base_url` must end with `/`; paths are resolved relative to it.
    pub fn new(client: Client, base_url: Url, credentials: Arc<Credentials>) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RequestError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let url = self.endpoint(path)?;

        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RequestError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| RequestError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
