//! Errors rendered as control-plane `Status` envelopes.
//!
//! Both serving paths answer failures with the same envelope the upstream
//! would produce, in the content type the caller negotiated.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use liteproxy_core::Error;
use liteproxy_core::codec::{Codec, ContentType};
use liteproxy_core::resource::{GroupVersion, ResourceDescriptor, Status, StatusDetails};

/// A failed request, ready to be written to the client.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    content_type: ContentType,
    details: Option<StatusDetails>,
}

impl ApiError {
    pub fn new(error: Error, content_type: ContentType) -> Self {
        Self { error, content_type, details: None }
    }

    /// Attach the target object to the envelope.
    pub fn for_descriptor(mut self, descriptor: &ResourceDescriptor) -> Self {
        self.details = Some(StatusDetails {
            name: descriptor.name.clone(),
            group: descriptor.group_version.group.clone(),
            kind: descriptor.resource.clone(),
        });
        self
    }

    pub fn status(&self) -> Status {
        Status::failure(&self.error, self.details.clone())
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error, ContentType::Json)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = StatusCode::from_u16(status.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let encoded = serde_json::to_value(&status)
            .map_err(|e| Error::Encode(e.to_string()))
            .and_then(|value| Codec::new(self.content_type, GroupVersion::new("", "v1")).encode(&value));

        let (content_type, body) = match encoded {
            Ok(body) => (self.content_type, body),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode status, falling back to JSON");
                (ContentType::Json, serde_json::to_vec(&status).unwrap_or_default())
            }
        };

        let mut response = (code, body).into_response();
        response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type.mime()));
        response
    }
}
