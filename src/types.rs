//! Data types for captured HTTP exchanges.
//!
//! These are the request, response and error values the formatter reads
//! from. The capture middleware produces them, but they are plain data and
//! can just as well be built by an HTTP client wrapper or by hand.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use bytes::Bytes;
use std::fmt;
use std::time::SystemTime;

use crate::context::ResolutionContext;

/// A message body as seen by the formatter.
///
/// Buffered bodies can be read any number of times without disturbing the
/// stream that was forwarded to the peer. A body that was streamed through
/// without being kept is `NotCaptured`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CapturedBody {
    Buffered(Bytes),
    #[default]
    NotCaptured,
}

impl CapturedBody {
    /// The buffered bytes, or `None` when the body cannot be replayed.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            CapturedBody::Buffered(bytes) => Some(bytes),
            CapturedBody::NotCaptured => None,
        }
    }
}

impl From<Bytes> for CapturedBody {
    fn from(bytes: Bytes) -> Self {
        CapturedBody::Buffered(bytes)
    }
}

impl From<Vec<u8>> for CapturedBody {
    fn from(bytes: Vec<u8>) -> Self {
        CapturedBody::Buffered(Bytes::from(bytes))
    }
}

impl From<&'static str> for CapturedBody {
    fn from(text: &'static str) -> Self {
        CapturedBody::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for CapturedBody {
    fn from(text: String) -> Self {
        CapturedBody::Buffered(Bytes::from(text))
    }
}

/// Data captured from an HTTP request.
///
/// # Examples
///
/// ```rust
/// use exchange_log::RequestData;
/// use axum::http::{header, HeaderValue, Method, Uri};
///
/// let request = RequestData::new(Method::POST, Uri::from_static("http://api.test/orders"))
///     .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
///     .body(r#"{"sku":42}"#);
/// assert_eq!(request.target(), "/orders");
/// ```
#[derive(Debug, Clone)]
pub struct RequestData {
    /// Identifier shared with the matching response
    pub correlation_id: u64,
    /// When the request was received
    pub timestamp: SystemTime,
    pub method: Method,
    /// Request URI, absolute for client-side requests, origin-form on servers
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: CapturedBody,
}

impl RequestData {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            correlation_id: 0,
            timestamp: SystemTime::now(),
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: CapturedBody::Buffered(Bytes::new()),
        }
    }

    /// Appends a header value, keeping any existing values for the same name.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<CapturedBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Path plus query, `/` when the URI has no path.
    pub fn target(&self) -> &str {
        match self.uri.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => pq.as_str(),
            _ => "/",
        }
    }
}

/// Data captured from an HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseData {
    /// Correlation ID matching the original request
    pub correlation_id: u64,
    /// When the response headers were ready
    pub timestamp: SystemTime,
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: CapturedBody,
}

impl ResponseData {
    pub fn new(status: StatusCode) -> Self {
        Self {
            correlation_id: 0,
            timestamp: SystemTime::now(),
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: CapturedBody::Buffered(Bytes::new()),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<CapturedBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Canonical reason phrase for the status, empty for unregistered codes.
    pub fn phrase(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }
}

/// An error that ended an exchange before a response arrived.
///
/// Only the message survives capture; the original error value stays with
/// the caller that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    message: String,
}

impl CapturedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CapturedError {}

/// One finished exchange: the request plus either a response or an error.
///
/// This is what the middleware hands to an
/// [`ExchangeHandler`](crate::ExchangeHandler) on its background task.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: RequestData,
    pub response: Option<ResponseData>,
    pub error: Option<CapturedError>,
}

impl Exchange {
    pub fn completed(request: RequestData, response: ResponseData) -> Self {
        Self {
            request,
            response: Some(response),
            error: None,
        }
    }

    pub fn failed(request: RequestData, error: CapturedError) -> Self {
        Self {
            request,
            response: None,
            error: Some(error),
        }
    }

    /// Builds a resolution context stamped with the time the exchange ended.
    pub fn context(&self) -> ResolutionContext<'_> {
        let mut ctx = ResolutionContext::new(&self.request);
        let ended = match &self.response {
            Some(response) => {
                ctx = ctx.with_response(response);
                response.timestamp
            }
            None => self.request.timestamp,
        };
        if let Some(error) = &self.error {
            ctx = ctx.with_error(error);
        }
        ctx.at(ended.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_target_includes_query() {
        let request = RequestData::new(Method::GET, Uri::from_static("http://a.test/search?q=rust"));
        assert_eq!(request.target(), "/search?q=rust");
    }

    #[test]
    fn test_target_defaults_to_root() {
        let request = RequestData::new(Method::GET, Uri::from_static("http://a.test"));
        assert_eq!(request.target(), "/");
    }

    #[test]
    fn test_header_appends_repeated_values() {
        let request = RequestData::new(Method::GET, Uri::from_static("/"))
            .header(header::ACCEPT, HeaderValue::from_static("text/html"))
            .header(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert_eq!(request.headers.get_all(header::ACCEPT).iter().count(), 2);
    }

    #[test]
    fn test_failed_exchange_context_has_error_and_no_response() {
        let exchange = Exchange::failed(
            RequestData::new(Method::GET, Uri::from_static("/")),
            CapturedError::new("connection refused"),
        );
        let ctx = exchange.context();
        assert!(ctx.response().is_none());
        assert_eq!(ctx.error().map(|e| e.to_string()).as_deref(), Some("connection refused"));
    }
}
