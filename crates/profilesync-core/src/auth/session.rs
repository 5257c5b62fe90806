use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::TokenStore;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Token expiry time in minutes.
/// Backend access tokens are issued for one hour.
const TOKEN_EXPIRY_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String) -> Self {
        Self {
            token,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        Utc::now() > expiry
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        (expiry - Utc::now()).num_minutes().max(0)
    }
}

/// Bearer token persisted to `session.json` in the cache directory.
pub struct SessionTokenStore {
    cache_dir: PathBuf,
    data: Mutex<Option<SessionData>>,
}

impl SessionTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: Mutex::new(None),
        }
    }

    fn data(&self) -> MutexGuard<'_, Option<SessionData>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load session from disk. Returns true when a usable token was found.
    pub fn load(&self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            let data: SessionData = serde_json::from_str(&contents)
                .context("Failed to parse session file")?;

            if !data.is_expired() {
                *self.data() = Some(data);
                return Ok(true);
            }
            debug!("Stored session has expired");
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = *self.data() {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Store a freshly acquired token and persist it.
    pub fn login(&self, token: String) -> Result<()> {
        *self.data() = Some(SessionData::new(token));
        self.save()
    }

    /// Clear session data in memory and on disk
    pub fn logout(&self) -> Result<()> {
        *self.data() = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    pub fn session(&self) -> Option<SessionData> {
        self.data().clone()
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenStore for SessionTokenStore {
    fn token(&self) -> Option<String> {
        self.data()
            .as_ref()
            .filter(|d| !d.is_expired())
            .map(|d| d.token.clone())
    }

    fn clear(&self) {
        if let Err(e) = self.logout() {
            warn!(error = %e, "Failed to clear session");
        }
    }
}
