//! Placeholder resolution.
//!
//! [`PlaceholderResolver`] maps a placeholder name to the bytes it stands
//! for in a given [`ResolutionContext`]. Values are bytes rather than strings
//! because bodies are carried in whatever charset the peer sent; charset
//! recovery happens later, in the decorator.
//!
//! | name | value |
//! |---|---|
//! | `request`, `response` | full wire-format message (empty when no response) |
//! | `req_headers`, `res_headers` | start line plus `Name: v1, v2` header lines |
//! | `req_body`, `res_body` | body bytes |
//! | `ts`, `date_iso_8601` | UTC time, ISO-8601 |
//! | `date_common_log` | time in the context's zone, Apache common log format |
//! | `method`, `version`, `req_version`, `uri`, `url`, `target`, `host` | from the request |
//! | `res_version`, `code`, `phrase` | from the response |
//! | `error` | error message |
//! | `hostname` | local host name |
//! | `req_header_<Name>`, `res_header_<Name>` | a single header line |

use axum::http::{header, HeaderMap, HeaderName, Version};
use chrono::SecondsFormat;

use crate::context::ResolutionContext;
use crate::types::{RequestData, ResponseData};

/// Stands in for any response- or error-derived value that does not exist.
pub const NULL: &str = "NULL";

/// Stands in for a response body that was not kept and cannot be replayed.
pub const RESPONSE_NOT_LOGGEABLE: &str = "RESPONSE_NOT_LOGGEABLE";

/// Resolves placeholder names to values.
///
/// Returns `None` for names the resolver does not recognise; the template
/// engine substitutes an empty string for those.
pub trait Resolve {
    fn resolve(&self, name: &str) -> Option<Vec<u8>>;
}

/// The standard resolver over a request, optional response and optional error.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderResolver<'a> {
    ctx: ResolutionContext<'a>,
}

impl<'a> PlaceholderResolver<'a> {
    pub fn new(ctx: ResolutionContext<'a>) -> Self {
        Self { ctx }
    }

    fn on_response(&self, f: impl FnOnce(&ResponseData) -> Vec<u8>) -> Vec<u8> {
        match self.ctx.response() {
            Some(response) => f(response),
            None => NULL.into(),
        }
    }
}

impl Resolve for PlaceholderResolver<'_> {
    fn resolve(&self, name: &str) -> Option<Vec<u8>> {
        let request = self.ctx.request();
        let value = match name {
            "request" => request_message(request),
            "response" => self.ctx.response().map(response_message).unwrap_or_default(),
            "req_headers" => {
                let mut out = request_line(request).into_bytes();
                out.extend_from_slice(b"\r\n");
                out.extend(header_block(&request.headers));
                out
            }
            "res_headers" => self.on_response(|response| {
                let mut out = status_line(response).into_bytes();
                out.extend_from_slice(b"\r\n");
                out.extend(header_block(&response.headers));
                out
            }),
            "req_body" => request.body.bytes().map(|b| b.to_vec()).unwrap_or_default(),
            "res_body" => self.on_response(|response| match response.body.bytes() {
                Some(bytes) => bytes.to_vec(),
                None => RESPONSE_NOT_LOGGEABLE.into(),
            }),
            "ts" | "date_iso_8601" => self
                .ctx
                .now()
                .to_rfc3339_opts(SecondsFormat::Secs, false)
                .into_bytes(),
            "date_common_log" => self
                .ctx
                .now()
                .with_timezone(&self.ctx.timezone())
                .format("%d/%b/%Y:%H:%M:%S %z")
                .to_string()
                .into_bytes(),
            "method" => request.method.as_str().into(),
            "version" | "req_version" => version_str(request.version).into(),
            "uri" | "url" => request.uri.to_string().into_bytes(),
            "target" => request.target().into(),
            "res_version" => self.on_response(|response| version_str(response.version).into()),
            "host" => host_line(request),
            "hostname" => local_hostname().into_bytes(),
            "code" => self.on_response(|response| response.status.as_str().into()),
            "phrase" => self.on_response(|response| response.phrase().into()),
            "error" => match self.ctx.error() {
                Some(error) => error.to_string().into_bytes(),
                None => NULL.into(),
            },
            other => {
                if let Some(header) = other.strip_prefix("req_header_") {
                    header_line(&request.headers, header)
                } else if let Some(header) = other.strip_prefix("res_header_") {
                    self.on_response(|response| header_line(&response.headers, header))
                } else {
                    return None;
                }
            }
        };
        Some(value)
    }
}

/// HTTP protocol version as it appears after `HTTP/`.
pub fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "0.9"
    } else if version == Version::HTTP_10 {
        "1.0"
    } else if version == Version::HTTP_2 {
        "2"
    } else if version == Version::HTTP_3 {
        "3"
    } else {
        "1.1"
    }
}

fn request_line(request: &RequestData) -> String {
    format!(
        "{} {} HTTP/{}",
        request.method,
        request.target(),
        version_str(request.version)
    )
}

fn status_line(response: &ResponseData) -> String {
    format!(
        "HTTP/{} {} {}",
        version_str(response.version),
        response.status.as_str(),
        response.phrase()
    )
}

/// All values of one header joined with `, `; empty when absent or when the
/// name is not a valid header name.
fn header_line(headers: &HeaderMap, name: &str) -> Vec<u8> {
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => join_values(headers, &name),
        Err(_) => Vec::new(),
    }
}

fn join_values(headers: &HeaderMap, name: &HeaderName) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, value) in headers.get_all(name).iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(b", ");
        }
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// `Name: v1, v2` lines joined by CRLF, no trailing line break.
fn header_block(headers: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, name) in headers.keys().enumerate() {
        if i > 0 {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend(join_values(headers, name));
    }
    out
}

fn host_line(request: &RequestData) -> Vec<u8> {
    if request.headers.contains_key(header::HOST) {
        return join_values(&request.headers, &header::HOST);
    }
    authority_host(request).into_bytes()
}

fn authority_host(request: &RequestData) -> String {
    match (request.uri.host(), request.uri.port_u16()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Header section of a wire-format message, each line preceded by CRLF.
/// `set-cookie` values cannot be folded, so each gets its own line.
fn wire_headers(headers: &HeaderMap, out: &mut Vec<u8>) {
    for name in headers.keys() {
        if *name == header::SET_COOKIE {
            for value in headers.get_all(name) {
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(name.as_str().as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
            }
        } else {
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend(join_values(headers, name));
        }
    }
}

/// Serialises a request the way it would travel on the wire.
pub fn request_message(request: &RequestData) -> Vec<u8> {
    let mut out = request_line(request).into_bytes();
    if !request.headers.contains_key(header::HOST) {
        out.extend_from_slice(b"\r\nhost: ");
        out.extend(authority_host(request).into_bytes());
    }
    wire_headers(&request.headers, &mut out);
    out.extend_from_slice(b"\r\n\r\n");
    if let Some(body) = request.body.bytes() {
        out.extend_from_slice(body);
    }
    out
}

/// Serialises a response the way it would travel on the wire.
pub fn response_message(response: &ResponseData) -> Vec<u8> {
    let mut out = status_line(response).into_bytes();
    wire_headers(&response.headers, &mut out);
    out.extend_from_slice(b"\r\n\r\n");
    if let Some(body) = response.body.bytes() {
        out.extend_from_slice(body);
    }
    out
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapturedBody, CapturedError};
    use axum::http::{HeaderValue, Method, StatusCode, Uri};
    use chrono::{TimeZone, Utc};

    fn request() -> RequestData {
        RequestData::new(Method::POST, Uri::from_static("http://api.test:8080/orders?page=2"))
            .header(header::HOST, HeaderValue::from_static("api.test:8080"))
            .header(header::ACCEPT, HeaderValue::from_static("text/html"))
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .body("name=widget")
    }

    fn response() -> ResponseData {
        ResponseData::new(StatusCode::CREATED)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .body("created")
    }

    fn resolve_str(resolver: &PlaceholderResolver<'_>, name: &str) -> String {
        String::from_utf8(resolver.resolve(name).expect("known placeholder")).unwrap()
    }

    #[test]
    fn test_request_fields() {
        let req = request();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req));

        assert_eq!(resolve_str(&resolver, "method"), "POST");
        assert_eq!(resolve_str(&resolver, "uri"), "http://api.test:8080/orders?page=2");
        assert_eq!(resolve_str(&resolver, "url"), "http://api.test:8080/orders?page=2");
        assert_eq!(resolve_str(&resolver, "target"), "/orders?page=2");
        assert_eq!(resolve_str(&resolver, "version"), "1.1");
        assert_eq!(resolve_str(&resolver, "req_version"), "1.1");
        assert_eq!(resolve_str(&resolver, "host"), "api.test:8080");
        assert_eq!(resolve_str(&resolver, "req_body"), "name=widget");
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive_and_joined() {
        let req = request();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req));

        assert_eq!(
            resolve_str(&resolver, "req_header_Accept"),
            "text/html, application/json"
        );
        assert_eq!(resolve_str(&resolver, "req_header_X-Missing"), "");
    }

    #[test]
    fn test_response_fields_without_response_are_null() {
        let req = request();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req));

        for name in ["res_version", "code", "phrase", "res_body", "res_headers", "res_header_Content-Type", "error"] {
            assert_eq!(resolve_str(&resolver, name), NULL, "placeholder {name}");
        }
        assert_eq!(resolve_str(&resolver, "response"), "");
    }

    #[test]
    fn test_response_fields() {
        let req = request();
        let res = response();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req).with_response(&res));

        assert_eq!(resolve_str(&resolver, "code"), "201");
        assert_eq!(resolve_str(&resolver, "phrase"), "Created");
        assert_eq!(resolve_str(&resolver, "res_version"), "1.1");
        assert_eq!(resolve_str(&resolver, "res_body"), "created");
        assert_eq!(resolve_str(&resolver, "res_header_content-type"), "text/plain");
        assert_eq!(
            resolve_str(&resolver, "res_headers"),
            "HTTP/1.1 201 Created\r\ncontent-type: text/plain"
        );
    }

    #[test]
    fn test_unreplayable_response_body_uses_sentinel() {
        let req = request();
        let res = response().body(CapturedBody::NotCaptured);
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req).with_response(&res));

        assert_eq!(resolve_str(&resolver, "res_body"), RESPONSE_NOT_LOGGEABLE);
    }

    #[test]
    fn test_error_message() {
        let req = request();
        let err = CapturedError::new("cURL error 28: Operation timed out");
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req).with_error(&err));

        assert_eq!(resolve_str(&resolver, "error"), "cURL error 28: Operation timed out");
        assert_eq!(resolve_str(&resolver, "res_body"), NULL);
    }

    #[test]
    fn test_timestamps_use_pinned_instant() {
        let req = request();
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req).at(now));

        assert_eq!(resolve_str(&resolver, "ts"), "2024-05-06T07:08:09+00:00");
        assert_eq!(resolve_str(&resolver, "date_iso_8601"), "2024-05-06T07:08:09+00:00");

        let common = resolve_str(&resolver, "date_common_log");
        let parsed = chrono::DateTime::parse_from_str(&common, "%d/%b/%Y:%H:%M:%S %z").unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_common_log_date_uses_context_zone() {
        let req = request();
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 20, 8, 9).unwrap();
        let ctx = ResolutionContext::new(&req)
            .at(now)
            .in_zone(chrono_tz::Asia::Taipei);
        let resolver = PlaceholderResolver::new(ctx);

        assert_eq!(resolve_str(&resolver, "date_common_log"), "07/May/2024:04:08:09 +0800");
        // ISO timestamps stay in UTC.
        assert_eq!(resolve_str(&resolver, "ts"), "2024-05-06T20:08:09+00:00");
    }

    #[test]
    fn test_request_headers_block() {
        let req = request();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req));

        assert_eq!(
            resolve_str(&resolver, "req_headers"),
            "POST /orders?page=2 HTTP/1.1\r\nhost: api.test:8080\r\naccept: text/html, application/json"
        );
    }

    #[test]
    fn test_request_message_adds_host_when_missing() {
        let req = RequestData::new(Method::GET, Uri::from_static("http://example.test/ping"));
        assert_eq!(
            String::from_utf8(request_message(&req)).unwrap(),
            "GET /ping HTTP/1.1\r\nhost: example.test\r\n\r\n"
        );
    }

    #[test]
    fn test_response_message_keeps_set_cookie_lines_apart() {
        let res = ResponseData::new(StatusCode::OK)
            .header(header::SET_COOKIE, HeaderValue::from_static("a=1"))
            .header(header::SET_COOKIE, HeaderValue::from_static("b=2"))
            .body("ok");
        assert_eq!(
            String::from_utf8(response_message(&res)).unwrap(),
            "HTTP/1.1 200 OK\r\nset-cookie: a=1\r\nset-cookie: b=2\r\n\r\nok"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_unresolved() {
        let req = request();
        let resolver = PlaceholderResolver::new(ResolutionContext::new(&req));
        assert_eq!(resolver.resolve("no_such_field"), None);
    }

    #[test]
    fn test_version_strings() {
        assert_eq!(version_str(Version::HTTP_10), "1.0");
        assert_eq!(version_str(Version::HTTP_2), "2");
    }
}
