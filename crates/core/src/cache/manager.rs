//! Decode-then-store for observed responses, decode-on-read for queries.
//!
//! The manager is the only writer of the cache. It is fed by the remote
//! forwarding path (one call per successful response, run off the request
//! task) and read by the local serving path.
//!
//! - `cache_list` replaces the scope when the list is authoritative
//! - `cache_object` upserts every object in a get response
//! - `cache_watch` applies events until the stream ends or reports an error
//! - `query_list` / `query_object` decode canonical records back to objects

use std::sync::Arc;

use futures_util::StreamExt;

use super::store::{CacheStore, RecordKey, RecordScope};
use crate::Error;
use crate::codec::{self, ByteStream, EventType, FrameReader};
use crate::resource::{ClientIdentity, Object, ObjectMeta, ResourceDescriptor, ResourceKind};

#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Cache a list response.
    ///
    /// The whole payload is decoded before the store is touched, so a
    /// malformed body leaves existing records in place. An authoritative
    /// list (no selectors, no paging) replaces every record in its scope;
    /// any other list only upserts its items.
    ///
    /// Returns the number of items written.
    pub async fn cache_list(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, content_type: &str, body: ByteStream,
    ) -> Result<usize, Error> {
        let codec = codec::decoder(content_type, &descriptor.group_version)?;
        let bytes = read_body(body).await?;
        let list = codec.decode_list(&bytes, &descriptor.resource)?;

        let records = list
            .items
            .iter()
            .map(|item| Ok((record_key(identity, descriptor, item)?, codec::to_canonical(item)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        let count = records.len();

        if descriptor.options.is_partial() || list.has_more() {
            for (key, value) in &records {
                self.store.upsert(key, value).await?;
            }
            tracing::debug!(identity = %identity, resource = %descriptor.resource_key(), count, "cached partial list");
        } else {
            self.store.replace_scope(&list_scope(identity, descriptor), records).await?;
            tracing::debug!(
                identity = %identity,
                resource = %descriptor.resource_key(),
                namespace = %descriptor.namespace,
                count,
                "replaced cached list"
            );
        }

        Ok(count)
    }

    /// Cache every object in a (possibly chunked) get response.
    pub async fn cache_object(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, content_type: &str, body: ByteStream,
    ) -> Result<usize, Error> {
        let codec = codec::decoder(content_type, &descriptor.group_version)?;
        let kind = ResourceKind::resolve(&descriptor.resource);
        let api_version = descriptor.group_version.api_version();
        let mut frames = FrameReader::new(&codec, body);

        let mut count = 0;
        while let Some(value) = frames.next_value(&codec).await? {
            let mut object = Object::from_value(value)?;
            codec.stamp(&mut object, &kind.kind, &api_version);
            self.upsert(identity, descriptor, &object).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Apply watch events until the stream ends.
    ///
    /// An `ERROR` event stops ingestion without touching the cache. A decode
    /// failure stops it too and is returned; events applied before it stay.
    ///
    /// Returns the number of events applied.
    pub async fn cache_watch(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, content_type: &str, body: ByteStream,
    ) -> Result<usize, Error> {
        let mut decoder = codec::stream_decoder(content_type, &descriptor.group_version, body)?
            .for_resource(&descriptor.resource);

        let mut applied = 0;
        while let Some(event) = decoder.decode().await? {
            match event.event_type {
                EventType::Added | EventType::Modified => {
                    self.upsert(identity, descriptor, &event.object).await?;
                }
                EventType::Deleted => {
                    let key = record_key(identity, descriptor, &event.object)?;
                    self.store.delete(&key).await?;
                }
                EventType::Bookmark => continue,
                EventType::Error => {
                    tracing::warn!(
                        identity = %identity,
                        resource = %descriptor.resource_key(),
                        message = %event.object.field("message").unwrap_or_default(),
                        "watch stream reported an error, stopping ingestion"
                    );
                    break;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Drop the record a successful delete addressed.
    pub async fn remove_object(&self, identity: &ClientIdentity, descriptor: &ResourceDescriptor) -> Result<bool, Error> {
        self.store.delete(&descriptor_key(identity, descriptor)?).await
    }

    /// Cached objects in the descriptor's scope, ordered by namespace then
    /// name. Records that no longer decode are skipped.
    pub async fn query_list(
        &self, identity: &ClientIdentity, descriptor: &ResourceDescriptor,
    ) -> Result<Vec<Object>, Error> {
        let values = self.store.list(&list_scope(identity, descriptor)).await?;
        let objects = values
            .iter()
            .filter_map(|value| match codec::from_canonical(value) {
                Ok(object) => Some(object),
                Err(e) => {
                    tracing::warn!(identity = %identity, resource = %descriptor.resource_key(), error = %e, "skipping corrupt cache record");
                    None
                }
            })
            .collect();
        Ok(objects)
    }

    pub async fn query_object(&self, identity: &ClientIdentity, descriptor: &ResourceDescriptor) -> Result<Object, Error> {
        let key = descriptor_key(identity, descriptor)?;
        match self.store.get(&key).await? {
            Some(value) => codec::from_canonical(&value),
            None => Err(Error::not_found(&descriptor.resource, &descriptor.name)),
        }
    }

    async fn upsert(&self, identity: &ClientIdentity, descriptor: &ResourceDescriptor, object: &Object) -> Result<(), Error> {
        let key = record_key(identity, descriptor, object)?;
        self.store.upsert(&key, &codec::to_canonical(object)?).await
    }
}

async fn read_body(mut body: ByteStream) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

/// Key for an observed object: its own namespace wins over the request's,
/// which matters for cluster-wide lists of namespaced resources.
fn record_key(identity: &ClientIdentity, descriptor: &ResourceDescriptor, object: &Object) -> Result<RecordKey, Error> {
    let name = object
        .name()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Decode(format!("{} object without metadata.name", descriptor.resource)))?;
    let namespace = object.namespace().unwrap_or(&descriptor.namespace);
    Ok(RecordKey::new(identity.as_str(), descriptor.resource_key(), namespace, name))
}

fn descriptor_key(identity: &ClientIdentity, descriptor: &ResourceDescriptor) -> Result<RecordKey, Error> {
    if descriptor.name.is_empty() {
        return Err(Error::InvalidRequest(format!("{} request without a name", descriptor.verb)));
    }
    Ok(RecordKey::new(identity.as_str(), descriptor.resource_key(), &descriptor.namespace, &descriptor.name))
}

/// An empty namespace spans the whole resource type.
fn list_scope(identity: &ClientIdentity, descriptor: &ResourceDescriptor) -> RecordScope {
    RecordScope {
        identity: identity.as_str().to_string(),
        resource: descriptor.resource_key(),
        namespace: (!descriptor.namespace.is_empty()).then(|| descriptor.namespace.clone()),
    }
}
