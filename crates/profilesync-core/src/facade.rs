//! Observable profile state for UI consumers.
//!
//! `ProfileHandle` forwards every operation to `ProfileService` and keeps a
//! `ProfileState` snapshot (profile, loading, error) in a watch channel so
//! a front end can re-render on change. It holds no caching policy.
//!
//! Concurrent `load`/`refresh` calls are not ordered: whichever finishes
//! last decides the displayed profile.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::api::ApiError;
use crate::models::{ImageUpload, ImageUrls, ProfilePatch, ProfileRecord};
use crate::service::{ProfileService, ProfileSource};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub profile: Option<ProfileRecord>,
    pub error: Option<ApiError>,
    /// Where the displayed profile came from
    pub source: Option<ProfileSource>,
    in_flight: usize,
}

impl ProfileState {
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    /// True when the displayed profile is a stale fallback.
    pub fn is_offline(&self) -> bool {
        self.source.map(|s| s.is_degraded()).unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct ProfileHandle {
    service: ProfileService,
    state: Arc<watch::Sender<ProfileState>>,
}

impl ProfileHandle {
    pub fn new(service: ProfileService) -> Self {
        let (tx, _rx) = watch::channel(ProfileState::default());
        Self {
            service,
            state: Arc::new(tx),
        }
    }

    pub fn service(&self) -> &ProfileService {
        &self.service
    }

    pub fn state(&self) -> ProfileState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.state.subscribe()
    }

    /// Read the profile, using the cache when it is fresh.
    pub async fn load(&self) -> Result<ProfileRecord, ApiError> {
        self.read(false).await
    }

    /// Read the profile from the backend regardless of cache age.
    pub async fn refresh(&self) -> Result<ProfileRecord, ApiError> {
        self.read(true).await
    }

    async fn read(&self, force_refresh: bool) -> Result<ProfileRecord, ApiError> {
        let in_flight = self.begin();
        let result = self.service.get_profile(force_refresh).await;
        in_flight.finish(|state| match &result {
            Ok(fetched) => {
                state.profile = Some(fetched.data.clone());
                state.source = Some(fetched.source);
            }
            Err(e) => {
                error!(error = %e, "Profile loading error");
                state.error = Some(e.clone());
            }
        });
        result.map(|fetched| fetched.data)
    }

    pub async fn update(&self, patch: &ProfilePatch) -> Result<ProfileRecord, ApiError> {
        let in_flight = self.begin();
        let result = self.service.update_profile(patch).await;
        in_flight.finish(|state| match &result {
            Ok(profile) => {
                state.profile = Some(profile.clone());
                state.source = Some(ProfileSource::Network);
            }
            Err(e) => {
                error!(error = %e, "Profile update error");
                state.error = Some(e.clone());
            }
        });
        result
    }

    pub async fn upload_image(&self, upload: &ImageUpload) -> Result<ImageUrls, ApiError> {
        let in_flight = self.begin();
        let result = self.service.upload_image(upload).await;
        let cached = self.service.cached_profile();
        in_flight.finish(|state| match &result {
            Ok(urls) => {
                if let Some(profile) = cached {
                    state.profile = Some(profile);
                } else if let Some(profile) = state.profile.as_mut() {
                    profile.apply(&ProfilePatch::images(urls));
                }
            }
            Err(e) => {
                error!(error = %e, "Image upload error");
                state.error = Some(e.clone());
            }
        });
        result
    }

    /// Dismiss the displayed error. Cache and pending work are unaffected.
    pub fn clear_error(&self) {
        self.state.send_modify(|state| state.error = None);
    }

    fn begin(&self) -> InFlight<'_> {
        self.state.send_modify(|state| {
            state.in_flight += 1;
            state.error = None;
        });
        InFlight {
            state: &self.state,
            done: false,
        }
    }

    /// Refresh in the background whenever connectivity comes back, as long
    /// as there is a cached profile worth reconciling. Errors only land in
    /// the observable state.
    pub fn spawn_reconnect_watcher(&self) -> JoinHandle<()> {
        let handle = self.clone();
        let mut rx = self.service.connectivity().subscribe();
        let mut seen = rx.borrow_and_update().reconnects;

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let reconnects = rx.borrow_and_update().reconnects;
                if reconnects == seen {
                    continue;
                }
                seen = reconnects;
                if handle.service.has_cached_profile() {
                    info!("Back online - refreshing cached profile");
                    if let Err(e) = handle.refresh().await {
                        debug!(error = %e, "Reconnect refresh failed");
                    }
                } else {
                    debug!("Back online - no cached profile to refresh");
                }
            }
        })
    }
}

/// One operation counted in `ProfileState::loading`. Dropping it without
/// `finish` (the operation's future was cancelled) still releases the count.
struct InFlight<'a> {
    state: &'a watch::Sender<ProfileState>,
    done: bool,
}

impl InFlight<'_> {
    fn finish(mut self, apply: impl FnOnce(&mut ProfileState)) {
        self.done = true;
        self.state.send_modify(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
            apply(state);
        });
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state.send_modify(|state| {
                state.in_flight = state.in_flight.saturating_sub(1);
            });
        }
    }
}
