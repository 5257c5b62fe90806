//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::api::{ApiGateway, HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::auth::{MemoryTokenStore, TokenStore};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::service::ProfileService;

pub const BASE_URL: &str = "http://backend.test";

enum Scripted {
    Respond {
        status: u16,
        body: String,
        delay: Option<Duration>,
    },
    Fail,
}

/// Transport answering from a queue of scripted outcomes, recording
/// every request it receives.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) {
        self.push(Scripted::Respond {
            status,
            body: body.to_string(),
            delay: None,
        });
    }

    pub fn respond_raw(&self, status: u16, body: &str) {
        self.push(Scripted::Respond {
            status,
            body: body.to_string(),
            delay: None,
        });
    }

    pub fn respond_after(&self, delay: Duration, status: u16, body: Value) {
        self.push(Scripted::Respond {
            status,
            body: body.to_string(),
            delay: Some(delay),
        });
    }

    /// Next request fails without an HTTP response.
    pub fn fail(&self) {
        self.push(Scripted::Fail);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, scripted: Scripted) {
        self.script.lock().unwrap().push_back(scripted);
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond {
                status,
                body,
                delay,
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse { status, body })
            }
            Some(Scripted::Fail) => Err(TransportError("connection refused".to_string())),
            None => Err(TransportError("no scripted response".to_string())),
        }
    }
}

/// Token store that counts teardown signals.
pub struct CountingTokenStore {
    inner: MemoryTokenStore,
    clears: AtomicUsize,
}

impl CountingTokenStore {
    pub fn new(token: &str) -> Self {
        Self {
            inner: MemoryTokenStore::new(Some(token.to_string())),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl TokenStore for CountingTokenStore {
    fn token(&self) -> Option<String> {
        self.inner.token()
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear();
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn profile_json(name: &str) -> Value {
    json!({"profile": {"full_name": name, "skills": ["rust"]}})
}

/// A service wired to fakes, with handles to every collaborator.
pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub tokens: Arc<MemoryTokenStore>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub clock: Arc<ManualClock>,
    pub service: ProfileService,
}

impl Harness {
    pub fn new(initial: Connectivity, coalesce_reads: bool) -> Self {
        let transport = Arc::new(FakeTransport::new());
        let tokens = Arc::new(MemoryTokenStore::new(Some("test-token".to_string())));
        let monitor = Arc::new(ConnectivityMonitor::new(initial));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));

        let gateway =
            ApiGateway::with_transport(BASE_URL, transport.clone(), tokens.clone(), monitor.clone());
        let config = SyncConfig {
            coalesce_reads,
            ..Default::default()
        };
        let service = ProfileService::with_clock(gateway, &config, clock.clone());

        Self {
            transport,
            tokens,
            monitor,
            clock,
            service,
        }
    }
}
