//! Request-facing data model: who is asking, and for what.
//!
//! A [`ResourceDescriptor`] is attached to every resource request by the
//! routing layer and is read-only afterwards.

pub mod kind;
pub mod object;
pub mod selector;
pub mod status;

use std::fmt;

pub use kind::ResourceKind;
pub use object::{ListPayload, Object, ObjectMeta};
pub use selector::Selector;
pub use status::{Status, StatusDetails};

/// Identity used when a caller presents no `User-Agent`.
pub const DEFAULT_IDENTITY: &str = "default";

/// Cache partition key derived from the caller.
///
/// This is the raw `User-Agent` value. Two distinct clients presenting the
/// same string share a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Derive the identity from an optional `User-Agent` header value.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        match user_agent.map(str::trim) {
            Some(ua) if !ua.is_empty() => Self(ua.to_string()),
            _ => Self(DEFAULT_IDENTITY.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self(DEFAULT_IDENTITY.to_string())
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request verb, inferred from method, path and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Watch,
    Create,
    Update,
    Patch,
    Delete,
    DeleteCollection,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Watch => "watch",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "deletecollection",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API group and version. The core group has an empty group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into() }
    }

    /// Value of the `apiVersion` field for objects in this group/version.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

/// Query options carried by list and watch requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u64>,
    pub continue_token: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub resource_version: Option<String>,
}

impl ListOptions {
    /// Whether a list with these options can return a subset of the scope.
    ///
    /// `limit` alone does not count: a limited response without a continue
    /// token holds the whole scope.
    pub fn is_partial(&self) -> bool {
        self.label_selector.as_deref().is_some_and(|s| !s.is_empty())
            || self.field_selector.as_deref().is_some_and(|s| !s.is_empty())
            || self.continue_token.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Target of a resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// `api` for the core group, `apis` otherwise.
    pub api_prefix: String,
    pub group_version: GroupVersion,
    pub resource: String,
    pub subresource: Option<String>,
    pub namespace: String,
    pub name: String,
    pub verb: Verb,
    pub options: ListOptions,
}

impl ResourceDescriptor {
    /// Descriptor with default prefix and options, mostly useful in tests.
    pub fn new(
        group: &str, version: &str, resource: &str, namespace: &str, name: &str, verb: Verb,
    ) -> Self {
        Self {
            api_prefix: if group.is_empty() { "api".into() } else { "apis".into() },
            group_version: GroupVersion::new(group, version),
            resource: resource.to_string(),
            subresource: None,
            namespace: namespace.to_string(),
            name: name.to_string(),
            verb,
            options: ListOptions::default(),
        }
    }

    /// Resource type as stored in the cache: `pods`, `deployments.apps`.
    pub fn resource_key(&self) -> String {
        if self.group_version.group.is_empty() {
            self.resource.clone()
        } else {
            format!("{}.{}", self.resource, self.group_version.group)
        }
    }

    /// Self link for a collection of this resource, namespace-scoped only
    /// when the request named a namespace.
    pub fn collection_self_link(&self) -> String {
        let mut link = format!("/{}", self.api_prefix);
        if !self.group_version.group.is_empty() {
            link.push('/');
            link.push_str(&self.group_version.group);
        }
        link.push('/');
        link.push_str(&self.group_version.version);
        if !self.namespace.is_empty() {
            link.push_str("/namespaces/");
            link.push_str(&self.namespace);
        }
        link.push('/');
        link.push_str(&self.resource);
        link
    }
}
