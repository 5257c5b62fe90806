//! Authenticated requests against the profile backend.
//!
//! `ApiGateway` performs one HTTP exchange per call and turns every
//! outcome into either a decoded body or a classified `ApiError`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{HttpRequest, HttpTransport, RequestBody, ReqwestTransport};
use super::ApiError;
use crate::auth::TokenStore;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::models::ImageUpload;

// ============================================================================
// Constants
// ============================================================================

/// Profile resource (GET to read, PUT to update)
pub const PROFILE_ENDPOINT: &str = "/api/profile";

/// Profile image upload endpoint
pub const PROFILE_IMAGE_ENDPOINT: &str = "/api/profile/image";

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connect timeout in seconds for the underlying HTTP client.
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct ApiGateway {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenStore>,
    connectivity: Arc<ConnectivityMonitor>,
    base_url: String,
    timeout: Duration,
}

impl ApiGateway {
    /// Create a gateway talking to the configured backend over reqwest.
    pub fn new(
        config: &SyncConfig,
        tokens: Arc<dyn TokenStore>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(Duration::from_secs(CONNECT_TIMEOUT_SECS))?;
        Ok(Self::with_transport(
            config.api_base_url.clone(),
            Arc::new(transport),
            tokens,
            connectivity,
        )
        .with_timeout(config.request_timeout()))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenStore>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            transport,
            tokens,
            connectivity,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Set the deadline applied to every exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One authenticated exchange returning the raw JSON body.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let body = body.map(RequestBody::Json).unwrap_or(RequestBody::Empty);
        self.execute(method, endpoint, body).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, endpoint, RequestBody::Empty).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Unknown {
            status: super::error::TRANSPORT_FAILURE_STATUS,
            message: format!("Failed to encode request body: {}", e),
        })?;
        self.execute(Method::PUT, endpoint, RequestBody::Json(value)).await
    }

    /// Multipart POST of a single file field.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        field: &str,
        upload: &ImageUpload,
    ) -> Result<T, ApiError> {
        let body = RequestBody::Multipart {
            field: field.to_string(),
            upload: upload.clone(),
        };
        self.execute(Method::POST, endpoint, body).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
    ) -> Result<T, ApiError> {
        let token = match self.tokens.token() {
            Some(token) => token,
            None => {
                debug!(endpoint = endpoint, "No credential available, skipping request");
                return Err(ApiError::AuthRequired);
            }
        };

        let url = format!("{}{}", self.base_url, endpoint);
        debug!(method = %method, url = %url, "Sending request");

        let request = HttpRequest {
            method,
            url,
            bearer: token,
            body,
        };

        let response = match tokio::time::timeout(self.timeout, self.transport.send(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let offline = self.connectivity.is_offline();
                warn!(endpoint = endpoint, offline = offline, error = %e, "Request failed before a response");
                return Err(ApiError::from_transport(offline));
            }
            Err(_) => {
                warn!(endpoint = endpoint, timeout_secs = self.timeout.as_secs(), "Request timed out");
                return Err(ApiError::Timeout(self.timeout.as_secs()));
            }
        };

        if response.status == 401 {
            warn!(endpoint = endpoint, "Credential rejected, clearing session");
            self.tokens.clear();
            return Err(ApiError::Unauthorized);
        }

        if !response.is_success() {
            let err = ApiError::from_status(response.status, &response.body);
            warn!(
                endpoint = endpoint,
                status = response.status,
                body = %ApiError::truncate_body(&response.body),
                "Request rejected"
            );
            return Err(err);
        }

        let text = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| {
            warn!(endpoint = endpoint, error = %e, "Failed to parse JSON response");
            ApiError::invalid_response(response.status, e)
        })
    }
}
