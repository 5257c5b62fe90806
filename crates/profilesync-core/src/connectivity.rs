//! Online/offline tracking.
//!
//! `ConnectivityMonitor` holds the current state and broadcasts
//! transitions through a `tokio::sync::watch` channel. A watch channel only
//! keeps the latest value, so every published `ConnectivityStatus` carries a
//! running count of Offline→Online transitions; subscribers compare counts
//! instead of states and cannot miss a reconnect that was immediately
//! superseded. On hosts without
//! platform online/offline events, `TcpProbe` feeds the monitor by
//! periodically connecting to the API host.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connect timeout for a single reachability probe.
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Value published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub state: Connectivity,
    /// Offline→Online transitions recorded since the monitor was created
    pub reconnects: u64,
}

pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityStatus>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(ConnectivityStatus {
            state: initial,
            reconnects: 0,
        });
        Self { tx }
    }

    pub fn current(&self) -> Connectivity {
        self.tx.borrow().state
    }

    pub fn status(&self) -> ConnectivityStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    pub fn is_offline(&self) -> bool {
        self.current() == Connectivity::Offline
    }

    /// Record the platform's view of connectivity. Subscribers are only
    /// notified on an actual transition; returns whether one happened.
    pub fn set(&self, state: Connectivity) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if current.state == state {
                return false;
            }
            if state == Connectivity::Online {
                current.reconnects += 1;
            }
            current.state = state;
            true
        });
        if changed {
            info!(state = %state, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

/// Periodic TCP reachability check against the API host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    interval: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, interval: Duration) -> Self {
        Self {
            addr: addr.into(),
            interval,
        }
    }

    /// Probe the host and port of an API base URL.
    pub fn for_url(base_url: &Url, interval: Duration) -> Option<Self> {
        let host = base_url.host_str()?;
        let port = base_url.port_or_known_default()?;
        Some(Self::new(format!("{}:{}", host, port), interval))
    }

    /// Like `for_url`, parsing the URL first. Unparseable URLs get no probe.
    pub fn for_base_url(raw: &str, interval: Duration) -> Option<Self> {
        match Url::parse(raw) {
            Ok(url) => Self::for_url(&url, interval),
            Err(e) => {
                warn!(url = raw, error = %e, "Cannot probe invalid API base URL");
                None
            }
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn check(&self) -> Connectivity {
        match tokio::time::timeout(PROBE_CONNECT_TIMEOUT, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => Connectivity::Online,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "Reachability probe failed");
                Connectivity::Offline
            }
            Err(_) => {
                debug!(addr = %self.addr, "Reachability probe timed out");
                Connectivity::Offline
            }
        }
    }

    /// Run the probe forever, feeding results into `monitor`.
    pub fn spawn(self, monitor: Arc<ConnectivityMonitor>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                monitor.set(self.check().await);
            }
        })
    }
}
