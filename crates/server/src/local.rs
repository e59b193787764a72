//! Local serving path: answers reads from the cache while the upstream is
//! unreachable.
//!
//! - `get` returns the cached object, NotFound on a miss
//! - `list` rebuilds the list envelope from cached items
//! - `watch` holds the connection open without events until the upstream
//!   recovers or the watch times out
//! - mutating verbs are Forbidden

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{StreamExt, future, stream};
use serde_json::Value;
use tokio::time::Instant;

use liteproxy_client::HealthCheck;
use liteproxy_core::codec::{self, Codec, ContentType};
use liteproxy_core::resource::object::ListMeta;
use liteproxy_core::resource::{ListPayload, Object, ResourceDescriptor, ResourceKind, Selector, Verb};
use liteproxy_core::{AppConfig, CacheManager, ClientIdentity, Error};

use crate::error::ApiError;
use crate::request_info::{RequestContext, RequestInfo};

/// How often a held watch re-checks upstream health.
const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LocalProxy {
    cache: CacheManager,
    health: Arc<dyn HealthCheck>,
    config: AppConfig,
}

impl LocalProxy {
    pub fn new(cache: CacheManager, health: Arc<dyn HealthCheck>, config: &AppConfig) -> Self {
        Self { cache, health, config: config.clone() }
    }

    pub async fn serve(&self, ctx: &RequestContext) -> Response {
        let content_type = match codec::negotiate(&ctx.accept) {
            Ok(content_type) => content_type,
            Err(e) => return ApiError::from(e).into_response(),
        };

        let descriptor = match &ctx.info {
            RequestInfo::Resource(descriptor) => descriptor,
            RequestInfo::NonResource { path } => {
                let err = Error::InvalidRequest(format!("{path} cannot be served while the upstream is unavailable"));
                return ApiError::new(err, content_type).into_response();
            }
        };

        tracing::debug!(
            identity = %ctx.identity,
            verb = %descriptor.verb,
            resource = %descriptor.resource_key(),
            namespace = %descriptor.namespace,
            name = %descriptor.name,
            "serving from cache"
        );

        match self.handle(&ctx.identity, descriptor, content_type).await {
            Ok(response) => response,
            Err(e) => ApiError::new(e, content_type).for_descriptor(descriptor).into_response(),
        }
    }

    async fn handle(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, content_type: ContentType,
    ) -> Result<Response, Error> {
        match descriptor.verb {
            Verb::Delete | Verb::DeleteCollection | Verb::Create | Verb::Update | Verb::Patch => {
                return Err(Error::Forbidden(format!(
                    "{} {} is not allowed while serving from the local cache",
                    descriptor.verb,
                    descriptor.resource_key()
                )));
            }
            Verb::Get | Verb::List | Verb::Watch => {}
        }

        if let Some(subresource) = &descriptor.subresource
            && !(subresource == "status" && descriptor.verb == Verb::Get)
        {
            return Err(Error::Forbidden(format!(
                "{} {}/{subresource} is not available from the local cache",
                descriptor.verb, descriptor.resource
            )));
        }

        let codec = Codec::new(content_type, descriptor.group_version.clone());
        match descriptor.verb {
            Verb::List => self.list(identity, descriptor, &codec).await,
            Verb::Watch => Ok(self.watch(descriptor, content_type)),
            _ => self.get(identity, descriptor, &codec).await,
        }
    }

    async fn get(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, codec: &Codec,
    ) -> Result<Response, Error> {
        let key = descriptor.resource_key();
        if self.config.is_restricted(&key) || self.config.is_restricted(&descriptor.resource) {
            return Err(Error::Forbidden(format!("get {key} is not emulated by the local cache")));
        }

        let object = self.cache.query_object(identity, descriptor).await?;
        encoded(codec, &object.into_value())
    }

    async fn list(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, codec: &Codec,
    ) -> Result<Response, Error> {
        let labels = Selector::parse(descriptor.options.label_selector.as_deref().unwrap_or_default())?;
        let fields = Selector::parse(descriptor.options.field_selector.as_deref().unwrap_or_default())?;

        let items: Vec<Object> = self
            .cache
            .query_list(identity, descriptor)
            .await?
            .into_iter()
            .filter(|item| labels.matches_labels(item) && fields.matches_fields(item))
            .collect();

        let list = build_list(descriptor, items);
        let value = serde_json::to_value(&list).map_err(|e| Error::Encode(e.to_string()))?;
        encoded(codec, &value)
    }

    /// Chunked response that never carries an event. It ends when the
    /// upstream is healthy again, so the client reconnects to a live watch,
    /// or when the requested timeout elapses. Requested timeouts are capped
    /// at the configured watch timeout.
    fn watch(&self, descriptor: &ResourceDescriptor, content_type: ContentType) -> Response {
        let ceiling = self.config.watch_timeout();
        let timeout = descriptor
            .options
            .timeout_seconds
            .map(Duration::from_secs)
            .map_or(ceiling, |requested| requested.min(ceiling));
        let health = Arc::clone(&self.health);

        let hold = async move {
            // No representable deadline: hold until the upstream recovers.
            let deadline = Instant::now().checked_add(timeout);
            while !health.check() {
                let now = Instant::now();
                let wait = match deadline {
                    Some(deadline) if now >= deadline => {
                        tracing::debug!("local watch timed out");
                        return;
                    }
                    Some(deadline) => WATCH_POLL_INTERVAL.min(deadline - now),
                    None => WATCH_POLL_INTERVAL,
                };
                tokio::time::sleep(wait).await;
            }
            tracing::debug!("upstream recovered, closing local watch");
        };
        let body = stream::once(hold).filter_map(|()| future::ready(None::<Result<Bytes, io::Error>>));

        let mut response = Response::new(Body::from_stream(body));
        response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type.mime()));
        response
    }
}

/// List envelope whose resource version is the highest among its items.
pub fn build_list(descriptor: &ResourceDescriptor, items: Vec<Object>) -> ListPayload {
    let resource_version = items.iter().map(Object::resource_version_number).max().unwrap_or(0);
    let kind = ResourceKind::resolve(&descriptor.resource);

    ListPayload {
        api_version: Some(descriptor.group_version.api_version()),
        kind: Some(kind.list_kind),
        metadata: ListMeta {
            resource_version: Some(resource_version.to_string()),
            continue_token: None,
            self_link: Some(descriptor.collection_self_link()),
        },
        items,
    }
}

fn encoded(codec: &Codec, value: &Value) -> Result<Response, Error> {
    let body = codec.encode(value)?;
    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(codec.content_type().mime()));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(rv: &str) -> Object {
        Object::from_value(json!({"metadata": {"name": format!("p{rv}"), "namespace": "ns", "resourceVersion": rv}}))
            .unwrap()
    }

    #[test]
    fn test_build_list_max_resource_version() {
        let descriptor = ResourceDescriptor::new("", "v1", "pods", "ns", "", Verb::List);
        let list = build_list(&descriptor, vec![pod("5"), pod("9"), pod("3")]);

        assert_eq!(list.kind.as_deref(), Some("PodList"));
        assert_eq!(list.api_version.as_deref(), Some("v1"));
        assert_eq!(list.metadata.resource_version.as_deref(), Some("9"));
        assert_eq!(list.metadata.self_link.as_deref(), Some("/api/v1/namespaces/ns/pods"));
        assert_eq!(list.items.len(), 3);
    }

    #[test]
    fn test_build_list_unparsable_versions_count_as_zero() {
        let descriptor = ResourceDescriptor::new("apps", "v1", "deployments", "", "", Verb::List);
        let list = build_list(&descriptor, vec![pod("abc"), pod("")]);
        assert_eq!(list.metadata.resource_version.as_deref(), Some("0"));
        assert_eq!(list.kind.as_deref(), Some("DeploymentList"));
        assert_eq!(list.metadata.self_link.as_deref(), Some("/apis/apps/v1/deployments"));

        let empty = build_list(&descriptor, Vec::new());
        assert_eq!(empty.metadata.resource_version.as_deref(), Some("0"));
        assert!(empty.items.is_empty());
    }
}
