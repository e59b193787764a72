//! HTTP client for the upstream control plane.
//!
//! ### Transport
//! - rustls with an optional CA bundle and optional client certificate
//! - Connect timeout only; watches keep a response open indefinitely
//! - Redirects are returned to the caller, never followed
//! - No transparent decompression, bodies pass through byte for byte
//!
//! ### Headers
//! - Hop-by-hop headers are stripped in both directions

pub mod headers;
pub mod url;

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Body, Client, Method, Response, StatusCode};

pub use headers::{end_to_end, is_hop_by_hop_header};
pub use url::{UrlError, join, parse_base};

use liteproxy_core::{AppConfig, Error};

/// Client bound to one upstream base URL.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: ::url::Url,
}

impl UpstreamClient {
    /// Build a client from the proxy configuration, loading TLS material
    /// from disk.
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let base_url = parse_base(&config.remote_url).map_err(|e| Error::InvalidRequest(e.to_string()))?;

        let mut builder = Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.tls.insecure_skip_verify);

        if let Some(ca_file) = &config.tls.ca_file {
            let pem = std::fs::read(ca_file)?;
            for cert in reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| Error::Upstream(format!("invalid CA bundle {}: {e}", ca_file.display())))?
            {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let (Some(cert_file), Some(key_file)) = (&config.tls.cert_file, &config.tls.key_file) {
            let mut pem = std::fs::read(cert_file)?;
            pem.push(b'\n');
            pem.extend(std::fs::read(key_file)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| Error::Upstream(format!("invalid client certificate {}: {e}", cert_file.display())))?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(base_url = %base_url, "upstream client ready");

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &::url::Url {
        &self.base_url
    }

    /// Forward one request. Hop-by-hop headers are dropped on the way out;
    /// callers drop them from the response with [`end_to_end`].
    ///
    /// Any status the upstream answers with is returned as `Ok`. Only a
    /// failure to get a response at all is an error.
    pub async fn forward(
        &self, method: Method, path_and_query: &str, headers: &HeaderMap, body: Body,
    ) -> Result<Response, Error> {
        let url = join(&self.base_url, path_and_query).map_err(|e| Error::InvalidRequest(e.to_string()))?;

        self.http
            .request(method, url)
            .headers(end_to_end(headers))
            .body(body)
            .send()
            .await
            .map_err(|e| upstream_error(path_and_query, &e))
    }

    /// GET `path` with a per-request timeout and return the status.
    pub async fn probe(&self, path: &str, timeout: Duration) -> Result<StatusCode, Error> {
        let url = join(&self.base_url, path).map_err(|e| Error::InvalidRequest(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| upstream_error(path, &e))?;

        Ok(response.status())
    }
}

fn upstream_error(path: &str, err: &reqwest::Error) -> Error {
    let cause = if err.is_connect() {
        "connection failed"
    } else if err.is_timeout() {
        "timed out"
    } else {
        "request failed"
    };
    Error::Upstream(format!("{cause} for {path}: {err}"))
}
