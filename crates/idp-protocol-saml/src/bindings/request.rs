//! Transport-neutral view of an inbound HTTP request.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method};

use crate::error::{SamlError, SamlResult};

/// The parts of an HTTP request the bindings look at.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl InboundRequest {
    /// Creates a request from its parts. `query` excludes the leading `?`.
    #[must_use]
    pub fn new(method: Method, query: Option<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            query,
            headers,
            body,
        }
    }

    /// A GET with the given raw query string.
    #[must_use]
    pub fn get(query: impl Into<String>) -> Self {
        Self::new(Method::GET, Some(query.into()), HeaderMap::new(), Bytes::new())
    }

    /// A form-encoded POST with the given body.
    #[must_use]
    pub fn post_form(body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        Self::new(Method::POST, None, headers, body.into())
    }

    /// Buffers an axum request, reading at most `body_limit` bytes of body.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::RequestBody`] if the body is larger than the
    /// limit or the stream fails.
    pub async fn from_axum(request: axum::extract::Request, body_limit: usize) -> SamlResult<Self> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, body_limit)
            .await
            .map_err(|e| SamlError::RequestBody(e.to_string()))?;
        Ok(Self::new(
            parts.method,
            parts.uri.query().map(String::from),
            parts.headers,
            body,
        ))
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `Content-Type` without parameters, lowercased.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
    }

    /// Raw `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}
