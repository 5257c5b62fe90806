//! Profile synchronization: the policy deciding between cache and network.
//!
//! `ProfileService` owns the `ProfileCache` and runs three protocols:
//!
//! 1. **Read** (`get_profile`): serve a fresh cache hit without a request;
//!    otherwise fetch, store, and return. When a fetch fails while the
//!    monitor reports offline, a cached profile (even a stale one) is
//!    returned tagged `ProfileSource::Offline` instead of the error.
//! 2. **Write** (`update_profile`): always goes to the network; the record
//!    the server returns replaces the cache. Failures leave the cache alone.
//! 3. **Image upload** (`upload_image`): on success only the two image URL
//!    fields of the cached profile change.
//!
//! Concurrent reads can share one in-flight request (`coalesce_reads`).
//! With coalescing off, every read issues its own request and whichever
//! response completes last is what stays in the cache.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiGateway, IMAGE_FIELD, PROFILE_ENDPOINT, PROFILE_IMAGE_ENDPOINT};
use crate::cache::{CacheEntry, ProfileCache};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::models::{
    ImageUpload, ImageUploadResponse, ImageUrls, ProfilePatch, ProfileRecord, ProfileResponse,
};

/// Where a profile read was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Fresh data from the backend
    Network,
    /// Cached data still inside its TTL
    Cache,
    /// Network unavailable, serving cached data regardless of age
    Offline,
}

impl ProfileSource {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ProfileSource::Offline)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub source: ProfileSource,
    /// When the returned data was stored in the cache
    pub cached_at: DateTime<Utc>,
}

impl<T> Fetched<T> {
    fn from_network(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            source: ProfileSource::Network,
            cached_at,
        }
    }

    fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            source: ProfileSource::Cache,
            cached_at,
        }
    }

    fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            source: ProfileSource::Offline,
            cached_at,
        }
    }
}

pub type ReadResult = Result<Fetched<ProfileRecord>, ApiError>;
type SharedRead = Shared<BoxFuture<'static, ReadResult>>;

struct ServiceInner {
    gateway: ApiGateway,
    cache: ProfileCache,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    coalesce_reads: bool,
    in_flight_read: Mutex<Option<SharedRead>>,
}

/// Clone is cheap - all state is shared behind an Arc.
#[derive(Clone)]
pub struct ProfileService {
    inner: Arc<ServiceInner>,
}

impl ProfileService {
    pub fn new(gateway: ApiGateway, config: &SyncConfig) -> Self {
        Self::with_clock(gateway, config, Arc::new(SystemClock))
    }

    pub fn with_clock(gateway: ApiGateway, config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                gateway,
                cache: ProfileCache::new(),
                clock,
                ttl: config.ttl(),
                coalesce_reads: config.coalesce_reads,
                in_flight_read: Mutex::new(None),
            }),
        }
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        self.inner.gateway.connectivity()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Cache-aside read of the current user's profile.
    pub async fn get_profile(&self, force_refresh: bool) -> ReadResult {
        if !force_refresh {
            let now = self.inner.clock.now();
            if let Some(entry) = self.inner.cache.get() {
                if entry.is_fresh(now, self.inner.ttl) {
                    debug!(age_secs = entry.age(now).num_seconds(), "Profile cache hit");
                    return Ok(Fetched::from_cache(entry.value, entry.cached_at));
                }
                debug!("Cached profile is stale");
            }
        }

        if self.inner.coalesce_reads {
            self.shared_read().await
        } else {
            self.inner.fetch_profile().await
        }
    }

    /// Join the in-flight read, or start one that later callers can join.
    fn shared_read(&self) -> SharedRead {
        let mut slot = self.inner.in_flight_read();
        if let Some(existing) = slot.as_ref() {
            debug!("Joining in-flight profile fetch");
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let read = async move {
            let result = inner.fetch_profile().await;
            *inner.in_flight_read() = None;
            result
        }
        .boxed()
        .shared();

        *slot = Some(read.clone());
        read
    }

    /// Send a partial update. Never answered from cache.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<ProfileRecord, ApiError> {
        let response: ProfileResponse = self
            .inner
            .gateway
            .put_json(PROFILE_ENDPOINT, patch)
            .await?;

        self.inner
            .cache
            .set(response.profile.clone(), self.inner.clock.now());
        info!("Profile updated");
        Ok(response.profile)
    }

    /// Upload a new profile image and merge its URLs into the cached profile.
    pub async fn upload_image(&self, upload: &ImageUpload) -> Result<ImageUrls, ApiError> {
        upload.validate()?;

        let response: ImageUploadResponse = self
            .inner
            .gateway
            .upload(PROFILE_IMAGE_ENDPOINT, IMAGE_FIELD, upload)
            .await?;

        let merged = self.inner.cache.merge(
            &ProfilePatch::images(&response.image_urls),
            self.inner.clock.now(),
        );
        // Nothing cached yet: the next read picks the new URLs up from the server
        if !merged {
            debug!("No cached profile to merge image URLs into");
        }
        info!(original = %response.image_urls.original, "Profile image uploaded");
        Ok(response.image_urls)
    }

    /// Cached profile regardless of age, without touching the network.
    pub fn cached_profile(&self) -> Option<ProfileRecord> {
        self.inner.cache.get().map(|entry| entry.value)
    }

    pub fn cache_entry(&self) -> Option<CacheEntry> {
        self.inner.cache.get()
    }

    pub fn has_cached_profile(&self) -> bool {
        self.inner.cache.has_entry()
    }

    pub fn has_fresh_cache(&self) -> bool {
        self.inner
            .cache
            .is_fresh(self.inner.clock.now(), self.inner.ttl)
    }

    pub fn cache_age_display(&self) -> String {
        self.inner.cache.age_display(self.inner.clock.now())
    }

    pub fn clear_cache(&self) {
        self.inner.cache.invalidate();
    }
}

impl ServiceInner {
    fn in_flight_read(&self) -> MutexGuard<'_, Option<SharedRead>> {
        self.in_flight_read
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch_profile(&self) -> ReadResult {
        match self.gateway.get_json::<ProfileResponse>(PROFILE_ENDPOINT).await {
            Ok(response) => {
                let now = self.clock.now();
                self.cache.set(response.profile.clone(), now);
                Ok(Fetched::from_network(response.profile, now))
            }
            Err(err) => {
                if self.gateway.connectivity().is_offline() {
                    if let Some(entry) = self.cache.get() {
                        warn!(error = %err, "Using cached profile data (offline mode)");
                        return Ok(Fetched::offline(entry.value, entry.cached_at));
                    }
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ErrorKind, RequestBody};
    use crate::auth::TokenStore;
    use crate::connectivity::Connectivity;
    use crate::testing::{profile_json, Harness};
    use reqwest::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_network() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));

        let first = h.service.get_profile(false).await.expect("fetch");
        assert_eq!(first.source, ProfileSource::Network);

        h.clock.advance(Duration::minutes(4));
        let second = h.service.get_profile(false).await.expect("cached");
        assert_eq!(second.source, ProfileSource::Cache);
        assert_eq!(second.data, first.data);
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refetches_once() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        h.service.get_profile(false).await.expect("fetch");

        h.clock.advance(Duration::minutes(6));
        h.transport.respond(200, profile_json("B"));
        let result = h.service.get_profile(false).await.expect("refetch");
        assert_eq!(result.source, ProfileSource::Network);
        assert_eq!(result.data.full_name.as_deref(), Some("B"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_fresh_cache() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        h.transport.respond(200, profile_json("B"));

        h.service.get_profile(false).await.expect("fetch");
        let result = h.service.get_profile(true).await.expect("forced");
        assert_eq!(result.data.full_name.as_deref(), Some("B"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_offline_read_serves_stale_cache() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        let first = h.service.get_profile(false).await.expect("fetch");

        h.clock.advance(Duration::minutes(30));
        h.monitor.set(Connectivity::Offline);
        h.transport.fail();

        let result = h.service.get_profile(false).await.expect("degraded read");
        assert_eq!(result.source, ProfileSource::Offline);
        assert!(result.source.is_degraded());
        assert_eq!(result.data, first.data);
        assert_eq!(result.cached_at, first.cached_at);
    }

    #[tokio::test]
    async fn test_offline_without_cache_is_network_unavailable() {
        let h = Harness::new(Connectivity::Offline, true);
        h.transport.fail();

        let err = h.service.get_profile(false).await.unwrap_err();
        assert_eq!(err, ApiError::NetworkUnavailable);
    }

    #[tokio::test]
    async fn test_online_failure_with_cache_propagates() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        h.service.get_profile(false).await.expect("fetch");

        h.transport.respond(503, json!({"msg": "maintenance"}));
        let err = h.service.get_profile(true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
        // The failed read did not disturb the cache
        assert_eq!(
            h.service.cached_profile().and_then(|p| p.full_name),
            Some("A".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_always_hits_network() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        h.service.get_profile(false).await.expect("fetch");
        assert!(h.service.has_fresh_cache());

        h.transport.respond(
            200,
            json!({"profile": {"full_name": "A", "headline": "X", "skills": ["server"]}}),
        );
        let updated = h
            .service
            .update_profile(&ProfilePatch::headline("X"))
            .await
            .expect("update");

        assert_eq!(h.transport.calls(), 2);
        let requests = h.transport.requests();
        assert_eq!(requests[1].method, Method::PUT);
        assert_eq!(requests[1].body, RequestBody::Json(json!({"headline": "X"})));

        // The server's record is authoritative, not a local merge
        assert_eq!(updated.skills, vec!["server".to_string()]);
        assert_eq!(h.service.cached_profile(), Some(updated));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_cache_untouched() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        let before = h.service.get_profile(false).await.expect("fetch");
        let entry_before = h.service.cache_entry();

        h.monitor.set(Connectivity::Offline);
        h.transport.fail();
        let err = h
            .service
            .update_profile(&ProfilePatch::headline("X"))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NetworkUnavailable);
        assert_eq!(h.service.cached_profile(), Some(before.data));
        assert_eq!(h.service.cache_entry(), entry_before);
    }

    #[tokio::test]
    async fn test_image_upload_merges_only_image_fields() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(
            200,
            json!({"profile": {
                "full_name": "A",
                "skills": ["x"],
                "profile_image_url": "old.png",
                "experiences": [{"title": "Engineer"}]
            }}),
        );
        h.service.get_profile(false).await.expect("fetch");

        h.transport.respond(
            200,
            json!({"image_urls": {"original": "new.png", "thumbnail": "new_thumb.png"}}),
        );
        let urls = h
            .service
            .upload_image(&ImageUpload::new("me.png", vec![1, 2, 3]))
            .await
            .expect("upload");
        assert_eq!(urls.original, "new.png");

        let cached = serde_json::to_value(h.service.cached_profile().expect("cached"))
            .expect("serialize");
        assert_eq!(
            cached,
            json!({
                "full_name": "A",
                "skills": ["x"],
                "profile_image_url": "new.png",
                "profile_thumbnail_url": "new_thumb.png",
                "experiences": [{"title": "Engineer"}]
            })
        );
    }

    #[tokio::test]
    async fn test_upload_without_cache_still_succeeds() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(
            200,
            json!({"image_urls": {"original": "o.png", "thumbnail": "t.png"}}),
        );
        let urls = h
            .service
            .upload_image(&ImageUpload::new("me.png", vec![1]))
            .await
            .expect("upload");
        assert_eq!(urls.thumbnail, "t.png");
        assert!(!h.service.has_cached_profile());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_cache_untouched() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        h.service.get_profile(false).await.expect("fetch");
        let entry_before = h.service.cache_entry();

        h.transport.respond(400, json!({"msg": "No image file provided"}));
        let err = h
            .service
            .upload_image(&ImageUpload::new("me.png", vec![1]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(h.service.cache_entry(), entry_before);
    }

    #[tokio::test]
    async fn test_invalid_upload_rejected_locally() {
        let h = Harness::new(Connectivity::Online, true);
        let err = h
            .service
            .upload_image(&ImageUpload::new("notes.txt", vec![1]))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_read_clears_token() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(401, json!({"msg": "whatever"}));

        let err = h.service.get_profile(false).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized);
        assert_eq!(h.tokens.token(), None);

        let err = h.service.get_profile(false).await.unwrap_err();
        assert_eq!(err, ApiError::AuthRequired);
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_are_coalesced() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport
            .respond_after(std::time::Duration::from_millis(50), 200, profile_json("A"));

        let (a, b) = tokio::join!(h.service.get_profile(false), h.service.get_profile(false));
        let a = a.expect("first");
        let b = b.expect("second");
        assert_eq!(a, b);
        assert_eq!(h.transport.calls(), 1);

        // The slot is released once the shared read completes
        h.transport.respond(200, profile_json("B"));
        let c = h.service.get_profile(true).await.expect("third");
        assert_eq!(c.data.full_name.as_deref(), Some("B"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncoalesced_reads_last_response_wins() {
        let h = Harness::new(Connectivity::Online, false);
        // Issued first, completes last
        h.transport
            .respond_after(std::time::Duration::from_millis(80), 200, profile_json("first"));
        // Issued second, completes first
        h.transport
            .respond_after(std::time::Duration::from_millis(10), 200, profile_json("second"));

        let (a, b) = tokio::join!(h.service.get_profile(false), h.service.get_profile(false));
        assert_eq!(a.expect("a").data.full_name.as_deref(), Some("first"));
        assert_eq!(b.expect("b").data.full_name.as_deref(), Some("second"));
        assert_eq!(h.transport.calls(), 2);

        assert_eq!(
            h.service.cached_profile().and_then(|p| p.full_name),
            Some("first".to_string())
        );
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let h = Harness::new(Connectivity::Online, true);
        h.transport.respond(200, profile_json("A"));
        h.service.get_profile(false).await.expect("fetch");
        assert_eq!(h.service.cache_age_display(), "just now");

        h.service.clear_cache();
        assert!(!h.service.has_cached_profile());
        assert_eq!(h.service.cache_age_display(), "never");

        h.transport.respond(200, profile_json("A"));
        h.service.get_profile(false).await.expect("refetch");
        assert_eq!(h.transport.calls(), 2);
    }
}
