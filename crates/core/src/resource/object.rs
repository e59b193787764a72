//! Decoded control-plane objects and the metadata accessors the cache needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Metadata accessors used to key, version and stamp cached objects.
pub trait ObjectMeta {
    fn name(&self) -> Option<&str>;
    fn namespace(&self) -> Option<&str>;
    fn resource_version(&self) -> Option<&str>;
    fn kind(&self) -> Option<&str>;
    fn api_version(&self) -> Option<&str>;
    fn set_kind(&mut self, kind: &str);
    fn set_api_version(&mut self, api_version: &str);
}

/// An unstructured object: any JSON map with optional `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Map<String, Value>);

impl Object {
    /// Wrap a decoded value, rejecting anything that is not a map.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Decode(format!("expected an object, got {}", type_name(&other)))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Resource version as a number; missing or unparsable versions count as 0.
    pub fn resource_version_number(&self) -> u64 {
        self.resource_version().and_then(|rv| rv.parse().ok()).unwrap_or(0)
    }

    /// Labels from `metadata.labels`.
    pub fn labels(&self) -> Option<&Map<String, Value>> {
        self.metadata()?.get("labels")?.as_object()
    }

    /// String value at a dotted path such as `spec.nodeName`.
    ///
    /// Scalars are rendered the way a field selector compares them.
    pub fn field(&self, path: &str) -> Option<String> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        match current {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata")?.as_object()
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata()?.get(key)?.as_str()
    }

}

impl ObjectMeta for Object {
    fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    fn resource_version(&self) -> Option<&str> {
        self.metadata_str("resourceVersion")
    }

    fn kind(&self) -> Option<&str> {
        self.0.get("kind")?.as_str()
    }

    fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion")?.as_str()
    }

    fn set_kind(&mut self, kind: &str) {
        self.0.insert("kind".into(), Value::String(kind.to_string()));
    }

    fn set_api_version(&mut self, api_version: &str) {
        self.0.insert("apiVersion".into(), Value::String(api_version.to_string()));
    }
}

/// A decoded list response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<Object>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

impl ListPayload {
    /// Whether the server indicated more pages follow.
    pub fn has_more(&self) -> bool {
        self.metadata.continue_token.as_deref().is_some_and(|c| !c.is_empty())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Object>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Object>>::deserialize(deserializer)?.unwrap_or_default())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
