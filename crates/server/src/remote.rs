//! Remote forwarding path.
//!
//! Requests go upstream verbatim and responses stream back unchanged. A
//! successful read of a resource is teed through [`crate::relay`] into a
//! background task that feeds the cache; that task never affects what the
//! client receives.

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{Method, header};
use axum::response::{IntoResponse, Response};

use liteproxy_client::UpstreamClient;
use liteproxy_client::upstream::end_to_end;
use liteproxy_core::codec::{self, ByteStream, ContentType};
use liteproxy_core::{CacheManager, ClientIdentity, Error, ResourceDescriptor, Verb};

use crate::error::ApiError;
use crate::relay;
use crate::request_info::RequestContext;

/// Request bodies are buffered before forwarding.
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

pub struct RemoteProxy {
    client: UpstreamClient,
    cache: CacheManager,
}

/// What to do with a successful upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheAction {
    Ingest,
    Remove,
    Skip,
}

impl RemoteProxy {
    pub fn new(client: UpstreamClient, cache: CacheManager) -> Self {
        Self { client, cache }
    }

    pub async fn forward(&self, ctx: &RequestContext, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let error_type = codec::negotiate(&ctx.accept).unwrap_or(ContentType::Json);

        let body = match to_bytes(body, MAX_REQUEST_BODY).await {
            Ok(body) => body,
            Err(e) => {
                let err = Error::InvalidRequest(format!("failed to read request body: {e}"));
                return ApiError::new(err, error_type).into_response();
            }
        };

        let upstream = match self.client.forward(parts.method.clone(), path_and_query, &parts.headers, body.into()).await
        {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(path = %path_and_query, error = %e, "upstream request failed");
                return ApiError::new(e, error_type).into_response();
            }
        };

        let status = upstream.status();
        let headers = end_to_end(upstream.headers());
        let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();

        let action = match ctx.info.descriptor() {
            Some(descriptor) if status.is_success() => cache_action(&parts.method, descriptor, &content_type),
            _ => CacheAction::Skip,
        };

        let body = match (action, ctx.info.descriptor()) {
            (CacheAction::Ingest, Some(descriptor)) => {
                let (client_stream, cache_stream) = relay::tee(upstream.bytes_stream());
                self.spawn_ingest(ctx.identity.clone(), descriptor.clone(), content_type, cache_stream);
                Body::from_stream(client_stream)
            }
            (CacheAction::Remove, Some(descriptor)) => {
                self.spawn_remove(ctx.identity.clone(), descriptor.clone());
                Body::from_stream(upstream.bytes_stream())
            }
            _ => Body::from_stream(upstream.bytes_stream()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn spawn_ingest(&self, identity: ClientIdentity, descriptor: ResourceDescriptor, content_type: String, body: ByteStream) {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let result = match descriptor.verb {
                Verb::List => cache.cache_list(&identity, &descriptor, &content_type, body).await,
                Verb::Watch => cache.cache_watch(&identity, &descriptor, &content_type, body).await,
                _ => cache.cache_object(&identity, &descriptor, &content_type, body).await,
            };
            match result {
                Ok(count) => tracing::debug!(
                    identity = %identity,
                    verb = %descriptor.verb,
                    resource = %descriptor.resource_key(),
                    namespace = %descriptor.namespace,
                    count,
                    "cached upstream response"
                ),
                Err(e) => tracing::warn!(
                    identity = %identity,
                    verb = %descriptor.verb,
                    resource = %descriptor.resource_key(),
                    namespace = %descriptor.namespace,
                    error = %e,
                    "failed to cache upstream response"
                ),
            }
        });
    }

    fn spawn_remove(&self, identity: ClientIdentity, descriptor: ResourceDescriptor) {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.remove_object(&identity, &descriptor).await {
                tracing::warn!(identity = %identity, resource = %descriptor.resource_key(), error = %e, "failed to drop deleted object");
            }
        });
    }
}

/// Reads of whole resources are cached; a delete of a named object drops
/// its record. Subresources and representations the cache cannot decode
/// (protobuf, server-side tables) pass through untouched.
fn cache_action(method: &Method, descriptor: &ResourceDescriptor, content_type: &str) -> CacheAction {
    if descriptor.subresource.is_some() {
        return CacheAction::Skip;
    }
    match (method, descriptor.verb) {
        (&Method::GET, Verb::Get | Verb::List | Verb::Watch) if codec::negotiate(content_type).is_ok() => {
            CacheAction::Ingest
        }
        (&Method::DELETE, Verb::Delete) => CacheAction::Remove,
        _ => CacheAction::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(verb: Verb, name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("", "v1", "pods", "ns", name, verb)
    }

    #[test]
    fn test_reads_are_ingested() {
        for verb in [Verb::Get, Verb::List, Verb::Watch] {
            assert_eq!(cache_action(&Method::GET, &descriptor(verb, "x"), "application/json"), CacheAction::Ingest);
        }
        assert_eq!(cache_action(&Method::GET, &descriptor(Verb::List, ""), ""), CacheAction::Ingest);
    }

    #[test]
    fn test_undecodable_responses_skipped() {
        let list = descriptor(Verb::List, "");
        assert_eq!(cache_action(&Method::GET, &list, "application/vnd.kubernetes.protobuf"), CacheAction::Skip);
        assert_eq!(
            cache_action(&Method::GET, &list, "application/json;as=Table;v=v1;g=meta.k8s.io"),
            CacheAction::Skip
        );
    }

    #[test]
    fn test_subresources_skipped() {
        let mut status = descriptor(Verb::Get, "x");
        status.subresource = Some("status".into());
        assert_eq!(cache_action(&Method::GET, &status, "application/json"), CacheAction::Skip);
    }

    #[test]
    fn test_delete_removes_and_writes_skip() {
        assert_eq!(cache_action(&Method::DELETE, &descriptor(Verb::Delete, "x"), ""), CacheAction::Remove);
        assert_eq!(cache_action(&Method::DELETE, &descriptor(Verb::DeleteCollection, ""), ""), CacheAction::Skip);
        assert_eq!(cache_action(&Method::POST, &descriptor(Verb::Create, ""), "application/json"), CacheAction::Skip);
        assert_eq!(cache_action(&Method::HEAD, &descriptor(Verb::Get, "x"), "application/json"), CacheAction::Skip);
    }
}
