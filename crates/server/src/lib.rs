//! liteproxy HTTP surface.
//!
//! Every request except `/healthz` goes through the dispatcher, which sends
//! it upstream while the upstream is healthy and to the local cache
//! otherwise.

pub mod dispatch;
pub mod error;
pub mod health;
pub mod local;
pub mod relay;
pub mod remote;
pub mod request_info;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use liteproxy_client::{HealthCheck, UpstreamClient};
use liteproxy_core::{AppConfig, CacheManager};

pub use local::LocalProxy;
pub use remote::RemoteProxy;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<dyn HealthCheck>,
    pub remote: Arc<RemoteProxy>,
    pub local: Arc<LocalProxy>,
}

impl AppState {
    pub fn new(config: &AppConfig, client: UpstreamClient, cache: CacheManager, health: Arc<dyn HealthCheck>) -> Self {
        Self {
            remote: Arc::new(RemoteProxy::new(client, cache.clone())),
            local: Arc::new(LocalProxy::new(cache, Arc::clone(&health), config)),
            health,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .fallback(dispatch::dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
