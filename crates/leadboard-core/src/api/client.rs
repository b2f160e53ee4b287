//! API client for communicating with the leadboard REST API.
//!
//! `ApiClient::get_json` is the single authenticated read used by both the
//! cache and the prefetcher. The auth calls use `post_json`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use super::ApiError;
use crate::config::Config;

/// API client for the leadboard backend.
/// Clone is cheap - the transport is shared behind an Arc.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    config: Arc<Config>,
    timeout: Duration,
}

impl ApiClient {
    /// Create a client backed by reqwest
    pub fn new(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            config: Arc::new(config.clone()),
            timeout: config.request_timeout(),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self, endpoint: &str) -> String {
        self.config.api_url(endpoint)
    }

    /// GET an endpoint with the given bearer token.
    ///
    /// Non-2xx responses fail with `ApiError::RequestFailed`. A success body
    /// that is not valid JSON yields `Value::Null` rather than an error.
    pub async fn get_json(&self, endpoint: &str, token: &str) -> Result<Value, ApiError> {
        let response = self.send(Method::GET, endpoint, Some(token), None).await?;
        Self::check_response(response)
    }

    /// POST a JSON body. The token is optional because login and register
    /// happen before one exists.
    pub async fn post_json(
        &self,
        endpoint: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let response = self
            .send(Method::POST, endpoint, token, Some(body.clone()))
            .await?;
        Self::check_response(response)
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.url(endpoint);
        debug!(method = %method, url = %url, "Sending request");

        let request = HttpRequest {
            method,
            url,
            bearer: token.map(str::to_owned),
            body,
        };

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    endpoint = endpoint,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(ApiError::Timeout)
            }
        }
    }

    fn parse_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap_or(Value::Null)
    }

    /// Check if response is successful, returning the parsed body or an error.
    fn check_response(response: HttpResponse) -> Result<Value, ApiError> {
        if response.is_success() {
            Ok(Self::parse_body(&response.body))
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
