//! Resolve inbound requests into resource descriptors.
//!
//! Resource paths follow the control-plane layout:
//!
//! - `/api/{version}/[watch/][namespaces/{ns}/]{resource}[/{name}[/{subresource}]]`
//! - `/apis/{group}/{version}/[watch/][namespaces/{ns}/]{resource}[/{name}[/{subresource}]]`
//!
//! Anything else (discovery, `/version`, `/openapi/...`) is a non-resource
//! request.

use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, header};

use liteproxy_core::resource::{ClientIdentity, GroupVersion, ListOptions, ResourceDescriptor, Verb};

/// Namespace-object subresources, which must not be read as a resource.
const NAMESPACE_SUBRESOURCES: &[&str] = &["status", "finalize"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestInfo {
    Resource(ResourceDescriptor),
    NonResource { path: String },
}

impl RequestInfo {
    pub fn descriptor(&self) -> Option<&ResourceDescriptor> {
        match self {
            RequestInfo::Resource(descriptor) => Some(descriptor),
            RequestInfo::NonResource { .. } => None,
        }
    }
}

/// What the routing layer knows about a request before it is served.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub info: RequestInfo,
    pub identity: ClientIdentity,
    /// Raw `Accept` header, empty when absent.
    pub accept: String,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        let info = resolve(&parts.method, parts.uri.path(), parts.uri.query());
        Self { info, identity: identity(&parts.headers), accept: header_str(&parts.headers, header::ACCEPT) }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string()
}

fn identity(headers: &HeaderMap) -> ClientIdentity {
    ClientIdentity::from_user_agent(headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()))
}

/// Resolve a method, path and query into request info.
pub fn resolve(method: &Method, path: &str, query: Option<&str>) -> RequestInfo {
    let non_resource = || RequestInfo::NonResource { path: path.to_string() };
    let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|p| !p.is_empty()).collect();

    let (api_prefix, group, version, mut rest) = match parts.as_slice() {
        ["api", version, rest @ ..] => ("api", "", *version, rest),
        ["apis", group, version, rest @ ..] => ("apis", *group, *version, rest),
        _ => return non_resource(),
    };

    let options = parse_options(query);
    let mut is_watch = query_flag(query, "watch");

    if rest.len() >= 2 && rest[0] == "watch" {
        is_watch = true;
        rest = &rest[1..];
    }

    let mut namespace = "";
    if rest.first() == Some(&"namespaces") && rest.len() > 1 {
        namespace = rest[1];
        if rest.len() > 2 && !NAMESPACE_SUBRESOURCES.contains(&rest[2]) {
            rest = &rest[2..];
        }
    }

    let (resource, name, subresource) = match rest {
        [] => return non_resource(),
        [resource] => (*resource, "", None),
        [resource, name] => (*resource, *name, None),
        [resource, name, subresource, ..] => (*resource, *name, Some(subresource.to_string())),
    };

    // Namespace objects are cluster-scoped even though their path names one.
    if resource == "namespaces" {
        namespace = "";
    }

    let verb = infer_verb(method, !name.is_empty(), is_watch);

    RequestInfo::Resource(ResourceDescriptor {
        api_prefix: api_prefix.to_string(),
        group_version: GroupVersion::new(group, version),
        resource: resource.to_string(),
        subresource,
        namespace: namespace.to_string(),
        name: name.to_string(),
        verb,
        options,
    })
}

/// Methods outside the standard set resolve to `get`.
fn infer_verb(method: &Method, has_name: bool, is_watch: bool) -> Verb {
    match *method {
        Method::GET | Method::HEAD if is_watch => Verb::Watch,
        Method::GET | Method::HEAD if has_name => Verb::Get,
        Method::GET | Method::HEAD => Verb::List,
        Method::POST => Verb::Create,
        Method::PUT => Verb::Update,
        Method::PATCH => Verb::Patch,
        Method::DELETE if has_name => Verb::Delete,
        Method::DELETE => Verb::DeleteCollection,
        _ => Verb::Get,
    }
}

fn query_pairs(query: Option<&str>) -> impl Iterator<Item = (String, String)> + '_ {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned()))
}

fn query_flag(query: Option<&str>, key: &str) -> bool {
    query_pairs(query).any(|(k, v)| k == key && matches!(v.as_str(), "true" | "1"))
}

fn parse_options(query: Option<&str>) -> ListOptions {
    let mut options = ListOptions::default();
    for (key, value) in query_pairs(query) {
        match key.as_str() {
            "labelSelector" => options.label_selector = Some(value),
            "fieldSelector" => options.field_selector = Some(value),
            "limit" => options.limit = value.parse().ok(),
            "continue" => options.continue_token = Some(value),
            "timeoutSeconds" => options.timeout_seconds = value.parse().ok(),
            "resourceVersion" => options.resource_version = Some(value),
            _ => {}
        }
    }
    options
}
