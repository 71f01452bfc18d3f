//! Request/response channels to resource services.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{CapabilityManifest, Envelope, ExecuteRequest};
use crate::service::ResourceService;

/// Address of a resource service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap an address, dropping any trailing slash.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self(address.trim_end_matches('/').to_string())
    }

    /// The raw address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

/// Channel used by the orchestrator to reach resource services.
#[async_trait::async_trait]
pub trait ServiceTransport: Send + Sync {
    /// Fetch a service's capability manifest.
    async fn discover(&self, endpoint: &Endpoint) -> Result<CapabilityManifest>;

    /// Run an operation on a service.
    async fn execute(&self, endpoint: &Endpoint, request: &ExecuteRequest) -> Result<Envelope>;
}

/// JSON over HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }

    fn url(endpoint: &Endpoint, path: &str) -> String {
        format!("{}{}", endpoint.as_str(), path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        endpoint: &Endpoint,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Unreachable(format!("{} answered {}", endpoint, status)));
        }
        let bytes = response.bytes().await.map_err(|e| transport_error(endpoint, e))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Malformed(format!("{}: {}", endpoint, e)))
    }
}

fn transport_error(endpoint: &Endpoint, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Unreachable(format!("{} timed out", endpoint))
    } else {
        Error::Unreachable(format!("{}: {}", endpoint, err))
    }
}

#[async_trait::async_trait]
impl ServiceTransport for HttpTransport {
    async fn discover(&self, endpoint: &Endpoint) -> Result<CapabilityManifest> {
        let url = Self::url(endpoint, "/agent/capabilities");
        debug!(%url, "discovering");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        Self::decode(endpoint, response).await
    }

    async fn execute(&self, endpoint: &Endpoint, request: &ExecuteRequest) -> Result<Envelope> {
        let url = Self::url(endpoint, "/agent/execute");
        debug!(%url, tool = %request.tool_name, "executing remotely");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        Self::decode(endpoint, response).await
    }
}

/// In-process transport over locally owned services.
#[derive(Default)]
pub struct LocalTransport {
    services: HashMap<Endpoint, Arc<ResourceService>>,
}

impl LocalTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a service at an endpoint.
    pub fn mount(mut self, endpoint: impl Into<Endpoint>, service: Arc<ResourceService>) -> Self {
        self.services.insert(endpoint.into(), service);
        self
    }

    fn service(&self, endpoint: &Endpoint) -> Result<&Arc<ResourceService>> {
        self.services
            .get(endpoint)
            .ok_or_else(|| Error::Unreachable(format!("nothing mounted at {}", endpoint)))
    }
}

#[async_trait::async_trait]
impl ServiceTransport for LocalTransport {
    async fn discover(&self, endpoint: &Endpoint) -> Result<CapabilityManifest> {
        Ok(self.service(endpoint)?.manifest())
    }

    async fn execute(&self, endpoint: &Endpoint, request: &ExecuteRequest) -> Result<Envelope> {
        let service = self.service(endpoint)?;
        Ok(service
            .execute(&request.tool_name, request.parameters.clone())
            .await)
    }
}
