//! Client code for liteproxy.
//!
//! This crate provides the upstream HTTP client and the health monitor
//! that decides whether requests are forwarded or served from the cache.

pub mod health;
pub mod upstream;

pub use health::{HealthCheck, HealthMonitor, Prober, UpstreamProber};
pub use upstream::UpstreamClient;
