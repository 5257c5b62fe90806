//! The single HTTP exchange underneath the gateway.
//!
//! `HttpTransport` is the seam between request classification (in
//! `ApiGateway`) and the wire. Production code uses `ReqwestTransport`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method};
use serde_json::Value;
use thiserror::Error;

use crate::models::ImageUpload;

/// Failure before any HTTP status was received (DNS, connect, reset, ...).
#[derive(Error, Debug, Clone)]
#[error("Transport failure: {0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart { field: String, upload: ImageUpload },
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: String,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let builder = self
            .client
            .request(request.method, &request.url)
            .bearer_auth(&request.bearer)
            .header(header::ACCEPT, "application/json");

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart { field, upload } => {
                let mime = upload.mime_type();
                let part = multipart::Part::bytes(upload.bytes)
                    .file_name(upload.file_name)
                    .mime_str(mime)
                    .map_err(|e| TransportError(e.to_string()))?;
                builder.multipart(multipart::Form::new().part(field, part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}
