//! Buffered inbound request as seen by the middleware chain

use crate::error::{StorageError, StorageResult};
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use std::borrow::Cow;

/// A request whose body has already been read into memory
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// Request target as received, absolute or origin-form
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path component of the URL, without query string
    pub fn path(&self) -> StorageResult<String> {
        let uri: Uri = self.url.parse().map_err(|e| {
            StorageError::internal(format!("Failed to parse request URL: {}", e))
        })?;
        let path = uri.path();
        Ok(if path.is_empty() { "/" } else { path }.to_string())
    }

    /// Body as text; invalid UTF-8 sequences become U+FFFD
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Header value as a string, `None` if absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
