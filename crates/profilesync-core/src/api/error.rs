use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Status reported for transport failures that happen while the host
/// still looks online.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Every failure the sync layer can surface. The set is closed: any
/// failure path classifies into exactly one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("No authentication token found")]
    AuthRequired,

    #[error("Unauthorized - session is no longer valid")]
    Unauthorized,

    #[error("No internet connection")]
    NetworkUnavailable,

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Request rejected ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("{message}")]
    Unknown { status: u16, message: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),
}

/// Fieldless discriminant of [`ApiError`], handy for matching and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthRequired,
    Unauthorized,
    NetworkUnavailable,
    ServerError,
    ClientError,
    Unknown,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::ServerError => "server_error",
            ErrorKind::ClientError => "client_error",
            ErrorKind::Unknown => "unknown",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error bodies from the backend are JSON with an optional `msg` field.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::AuthRequired => ErrorKind::AuthRequired,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::NetworkUnavailable => ErrorKind::NetworkUnavailable,
            ApiError::ServerError { .. } => ErrorKind::ServerError,
            ApiError::ClientError { .. } => ErrorKind::ClientError,
            ApiError::Unknown { .. } => ErrorKind::Unknown,
            ApiError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::ServerError { status, .. }
            | ApiError::ClientError { status, .. }
            | ApiError::Unknown { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for errors the external auth collaborator has to act on.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthRequired | ApiError::Unauthorized)
    }

    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a non-2xx response. 401 wins over anything in the body.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::Unauthorized;
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.msg)
            .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            400..=499 => ApiError::ClientError { status, message },
            500..=599 => ApiError::ServerError { status, message },
            _ => ApiError::Unknown { status, message },
        }
    }

    /// Classify a failure that never produced an HTTP response.
    pub fn from_transport(offline: bool) -> Self {
        if offline {
            ApiError::NetworkUnavailable
        } else {
            ApiError::Unknown {
                status: TRANSPORT_FAILURE_STATUS,
                message: "Network error occurred".to_string(),
            }
        }
    }

    /// A 2xx response whose body did not have the expected shape.
    pub fn invalid_response(status: u16, detail: impl fmt::Display) -> Self {
        ApiError::Unknown {
            status,
            message: format!("Invalid response: {}", detail),
        }
    }
}
