//! Profile data cache & synchronization layer.
//!
//! Decides when a locally held profile can be trusted, when to go to the
//! network, what to serve while offline, and how partial updates (image
//! uploads in particular) are folded into cached state.
//!
//! Leaf-first:
//! - [`auth::TokenStore`]: bearer credential source
//! - [`connectivity::ConnectivityMonitor`]: online/offline state and transitions
//! - [`api::ApiGateway`]: authenticated requests, classified errors
//! - [`cache::ProfileCache`]: single profile entry with freshness checks
//! - [`service::ProfileService`]: cache-aside reads, writes, image merges
//! - [`facade::ProfileHandle`]: observable state for UI consumers

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod facade;
pub mod models;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, ApiGateway, ErrorKind};
pub use config::SyncConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor, ConnectivityStatus, TcpProbe};
pub use facade::{ProfileHandle, ProfileState};
pub use service::{Fetched, ProfileService, ProfileSource};
