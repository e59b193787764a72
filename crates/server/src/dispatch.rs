//! Single routing decision per request.
//!
//! Healthy upstream: forward. Otherwise: serve from the cache. The health
//! flag is read once per request; a request already in flight is never
//! switched to the other path.

use axum::extract::{Request, State};
use axum::response::Response;

use crate::AppState;
use crate::request_info::RequestContext;

pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts);
    let request = Request::from_parts(parts, body);

    if state.health.check() {
        tracing::debug!(identity = %ctx.identity, uri = %request.uri(), "forwarding upstream");
        state.remote.forward(&ctx, request).await
    } else {
        state.local.serve(&ctx).await
    }
}
