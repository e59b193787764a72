//! Upstream URL construction.

/// Error type for upstream URL failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse and normalize the configured upstream base URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http or https scheme
/// 3. Drop query and fragment
/// 4. Drop a trailing `/` from the path so joins do not double it
pub fn parse_base(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_query(None);
    parsed.set_fragment(None);
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);

    Ok(parsed)
}

/// Append an inbound request's path and query to the base URL, keeping any
/// path prefix the base carries. Path and query are passed through verbatim.
pub fn join(base: &url::Url, path_and_query: &str) -> Result<url::Url, UrlError> {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let mut joined = base.clone();
    let prefix = base.path().trim_end_matches('/');
    let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
    joined.set_path(&format!("{prefix}{path}"));
    joined.set_query(query.filter(|q| !q.is_empty()));

    Ok(joined)
}
