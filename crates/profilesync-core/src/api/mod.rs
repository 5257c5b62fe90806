//! REST API access for the profile backend.
//!
//! This module provides the `ApiGateway` for performing authenticated
//! requests and the closed `ApiError` taxonomy every failure maps into.
//!
//! Requests carry a bearer token read from a `TokenStore`; a 401
//! response clears that token so the auth layer can send the user
//! back to login.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiGateway, IMAGE_FIELD, PROFILE_ENDPOINT, PROFILE_IMAGE_ENDPOINT};
pub use error::{ApiError, ErrorKind};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody, ReqwestTransport, TransportError};
