//! Content negotiation and wire codecs.
//!
//! Turns a declared content type plus the request's group/version into a
//! [`Codec`], and wraps chunked watch bodies in a [`WatchDecoder`].
//!
//! Supported media types, in preference order:
//! - `application/json` (the default)
//! - `application/yaml`
//!
//! Media types carrying an `as=` parameter ask the server for a converted
//! representation (tables, partial metadata) and are never matched.

pub mod stream;

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde_json::Value;

use crate::Error;
use crate::resource::{GroupVersion, ListPayload, Object, ObjectMeta, ResourceKind};

pub use stream::{EventType, FrameReader, WatchDecoder, WatchEvent};

/// Chunked body as seen by the cache.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Json,
    Yaml,
}

const SUPPORTED: &[ContentType] = &[ContentType::Json, ContentType::Yaml];

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Yaml => "application/yaml",
        }
    }

    /// Parse a single media type, parameters allowed.
    ///
    /// Returns `None` for unknown types and for converted representations.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let mut parts = media_type.split(';').map(str::trim);
        let essence = parts.next()?.to_ascii_lowercase();
        if parts.any(|param| param.to_ascii_lowercase().starts_with("as=")) {
            return None;
        }
        match essence.as_str() {
            "application/json" => Some(ContentType::Json),
            "application/yaml" | "application/x-yaml" | "text/yaml" => Some(ContentType::Yaml),
            "*/*" | "application/*" => Some(SUPPORTED[0]),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Resolve a declared content type (or `Accept` list) to a supported type.
///
/// An empty declaration falls back to the default. A non-empty declaration
/// with no supported entry fails with `UnsupportedMediaType`.
pub fn negotiate(declared: &str) -> Result<ContentType, Error> {
    if declared.trim().is_empty() {
        return Ok(SUPPORTED[0]);
    }
    declared.split(',').find_map(|entry| ContentType::from_media_type(entry.trim())).ok_or_else(|| {
        let supported: Vec<_> = SUPPORTED.iter().map(ContentType::mime).collect();
        Error::UnsupportedMediaType(format!("only the following media types are accepted: {}", supported.join(", ")))
    })
}

/// Build a codec for a declared content type and group/version.
pub fn decoder(content_type: &str, group_version: &GroupVersion) -> Result<Codec, Error> {
    Ok(Codec { content_type: negotiate(content_type)?, group_version: group_version.clone() })
}

/// Build a watch decoder over a chunked body.
pub fn stream_decoder(
    content_type: &str, group_version: &GroupVersion, body: ByteStream,
) -> Result<WatchDecoder, Error> {
    let codec = decoder(content_type, group_version)?;
    Ok(WatchDecoder::new(codec, body))
}

/// Encoder/decoder bound to one content type and group/version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    content_type: ContentType,
    group_version: GroupVersion,
}

impl Codec {
    pub fn new(content_type: ContentType, group_version: GroupVersion) -> Self {
        Self { content_type, group_version }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn group_version(&self) -> &GroupVersion {
        &self.group_version
    }

    /// Decode an untyped value.
    pub fn decode_value(&self, bytes: &[u8]) -> Result<Value, Error> {
        match self.content_type {
            ContentType::Json => serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string())),
            ContentType::Yaml => serde_yaml::from_slice(bytes).map_err(|e| Error::Decode(e.to_string())),
        }
    }

    pub fn decode_object(&self, bytes: &[u8]) -> Result<Object, Error> {
        Object::from_value(self.decode_value(bytes)?)
    }

    /// Decode a list response, stamping `kind` and `apiVersion` on items
    /// that omit them.
    pub fn decode_list(&self, bytes: &[u8], resource: &str) -> Result<ListPayload, Error> {
        let mut list: ListPayload =
            serde_json::from_value(self.decode_value(bytes)?).map_err(|e| Error::Decode(e.to_string()))?;

        let kind = list
            .kind
            .as_deref()
            .and_then(ResourceKind::from_list_kind)
            .unwrap_or_else(|| ResourceKind::resolve(resource));
        let api_version = list.api_version.clone().unwrap_or_else(|| self.group_version.api_version());

        for item in &mut list.items {
            self.stamp(item, &kind.kind, &api_version);
        }
        Ok(list)
    }

    /// Fill in `kind`/`apiVersion` when absent.
    pub fn stamp(&self, object: &mut Object, kind: &str, api_version: &str) {
        if object.kind().is_none_or(str::is_empty) {
            object.set_kind(kind);
        }
        if object.api_version().is_none_or(str::is_empty) {
            object.set_api_version(api_version);
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, Error> {
        match self.content_type {
            ContentType::Json => serde_json::to_vec(value).map_err(|e| Error::Encode(e.to_string())),
            ContentType::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| Error::Encode(e.to_string())),
        }
    }
}

/// Canonical storage encoding: compact JSON regardless of wire format.
pub fn to_canonical(object: &Object) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(object).map_err(|e| Error::Encode(e.to_string()))
}

pub fn from_canonical(bytes: &[u8]) -> Result<Object, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn core_v1() -> GroupVersion {
        GroupVersion::new("", "v1")
    }

    #[test]
    fn test_negotiate_defaults_when_empty() {
        assert_eq!(negotiate("").unwrap(), ContentType::Json);
        assert_eq!(negotiate("*/*").unwrap(), ContentType::Json);
    }

    #[test]
    fn test_negotiate_accept_list() {
        assert_eq!(negotiate("application/yaml, application/json").unwrap(), ContentType::Yaml);
        assert_eq!(negotiate("application/json;charset=utf-8").unwrap(), ContentType::Json);
        assert_eq!(
            negotiate("application/json;as=Table;v=v1;g=meta.k8s.io,application/json").unwrap(),
            ContentType::Json
        );
    }

    #[test]
    fn test_negotiate_unsupported() {
        let err = negotiate("application/vnd.kubernetes.protobuf").unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType(_)));
        assert!(negotiate("application/json;as=Table;v=v1;g=meta.k8s.io").is_err());
    }

    #[test]
    fn test_decode_list_stamps_items() {
        let codec = decoder("application/json", &core_v1()).unwrap();
        let body = json!({
            "kind": "PodList",
            "apiVersion": "v1",
            "metadata": {"resourceVersion": "12"},
            "items": [
                {"metadata": {"name": "a", "namespace": "ns"}},
                {"kind": "Pod", "apiVersion": "v1", "metadata": {"name": "b", "namespace": "ns"}}
            ]
        });
        let list = codec.decode_list(&serde_json::to_vec(&body).unwrap(), "pods").unwrap();
        assert_eq!(list.items.len(), 2);
        assert!(list.items.iter().all(|i| i.kind() == Some("Pod") && i.api_version() == Some("v1")));
        assert_eq!(list.metadata.resource_version.as_deref(), Some("12"));
    }

    #[test]
    fn test_decode_list_without_kind_uses_resource() {
        let codec = decoder("", &GroupVersion::new("apps", "v1")).unwrap();
        let list = codec
            .decode_list(br#"{"items":[{"metadata":{"name":"web"}}]}"#, "deployments")
            .unwrap();
        assert_eq!(list.items[0].kind(), Some("Deployment"));
        assert_eq!(list.items[0].api_version(), Some("apps/v1"));
    }

    #[test]
    fn test_yaml_to_canonical_to_json() {
        let yaml = decoder("application/yaml", &core_v1()).unwrap();
        let object = yaml
            .decode_object(b"kind: Pod\napiVersion: v1\nmetadata:\n  name: x\n  labels:\n    app: web\nspec:\n  priority: 3\n")
            .unwrap();

        let stored = to_canonical(&object).unwrap();
        let restored = from_canonical(&stored).unwrap();

        let json = decoder("application/json", &core_v1()).unwrap();
        let encoded = json.encode(&restored.clone().into_value()).unwrap();
        let reparsed: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(reparsed["metadata"]["labels"]["app"], "web");
        assert_eq!(reparsed["spec"]["priority"], 3);
        assert_eq!(restored, object);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let codec = decoder("application/json", &core_v1()).unwrap();
        assert!(matches!(codec.decode_object(b"{not json"), Err(Error::Decode(_))));
    }
}
