//! Header filtering between the client and upstream connections.

use reqwest::header::HeaderMap;

/// Checks if a header is a hop-by-hop header that should not be forwarded.
///
/// Hop-by-hop headers are defined in RFC 2616 Section 13.5.1. `host` is
/// included since it must name the upstream, not the proxy.
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}

/// Copy of `headers` without hop-by-hop entries. Repeated headers keep
/// every value.
pub fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop_header(name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}
