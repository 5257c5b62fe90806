//! Credential access for authenticated requests.
//!
//! This module provides:
//! - `TokenStore`: the interface the API gateway reads bearer tokens from
//! - `MemoryTokenStore`: in-process token holder
//! - `SessionTokenStore`: token persisted to disk, expiring after an hour
//!
//! Acquiring a token (login) happens elsewhere; this layer only reads it
//! and asks for it to be cleared when the server rejects it.

pub mod session;

use std::sync::Mutex;

pub use session::{SessionData, SessionTokenStore};

/// Supplies the current bearer credential.
///
/// `token()` returning `None` means the credential is missing or expired.
/// `clear()` is the session teardown signal sent on a 401.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.into());
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
