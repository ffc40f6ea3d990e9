//! Post-processing of a split record before it is serialised.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use encoding_rs::{Encoding, REPLACEMENT};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::FormatterConfig;
use crate::error::FormatError;
use crate::splitter::FieldRecord;
use crate::types::ResponseData;
use crate::unicode::unescape;

const DEFAULT_CHARSET: &str = "UTF-8";

/// A record ready for serialisation: same fields as the [`FieldRecord`] it
/// came from, all values now UTF-8 text.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecoratedRecord {
    fields: Map<String, Value>,
}

impl DecoratedRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Compact JSON with literal slashes and non-ASCII characters.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }
}

/// Normalises the `time`, `req_body` and `res_body` fields.
#[derive(Clone, Copy, Debug)]
pub struct LogDecorator {
    timezone: Tz,
}

impl LogDecorator {
    pub fn new(config: &FormatterConfig) -> Self {
        Self {
            timezone: config.timezone,
        }
    }

    /// Decorates `record`.
    ///
    /// `time` is moved into the configured zone as `YYYY-MM-DD HH:MM:SS`.
    /// `req_body` is read as UTF-8 and unescaped. `res_body` is decoded from
    /// the charset named by the response's `content-type` (UTF-8 by default)
    /// and unescaped; it is left alone when no response is given. A charset
    /// label nobody recognises fails the whole call.
    pub fn decorate(
        &self,
        record: FieldRecord,
        response: Option<&ResponseData>,
    ) -> Result<DecoratedRecord, FormatError> {
        let mut fields = Map::new();
        for (name, raw) in record {
            let text = match name.as_str() {
                "time" => self.localize(&String::from_utf8_lossy(&raw))?,
                "req_body" => unescape(&String::from_utf8_lossy(&raw)),
                "res_body" => match response {
                    Some(response) => unescape(&decode_body(&raw, &response.headers)?),
                    None => String::from_utf8_lossy(&raw).into_owned(),
                },
                _ => String::from_utf8_lossy(&raw).into_owned(),
            };
            fields.insert(name, Value::String(text));
        }
        Ok(DecoratedRecord { fields })
    }

    fn localize(&self, raw: &str) -> Result<String, FormatError> {
        let raw = raw.trim();
        let parsed = match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed,
            Err(source) => {
                // A zone-less timestamp is taken to be in the application zone already.
                return NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.format("%Y-%m-%d %H:%M:%S").to_string())
                    .map_err(|_| FormatError::Timestamp {
                        value: raw.to_string(),
                        source,
                    });
            }
        };
        Ok(parsed
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string())
    }
}

/// The `charset` parameter of the first `content-type` value, if any.
///
/// # Examples
///
/// ```rust
/// use axum::http::{header, HeaderMap, HeaderValue};
/// use exchange_log::decorator::charset_of;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; Charset=\"Big5\""));
/// assert_eq!(charset_of(&headers).as_deref(), Some("Big5"));
/// ```
pub fn charset_of(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?;
    let value = String::from_utf8_lossy(value.as_bytes());
    let first = value.split(',').next()?;
    first
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, charset)| charset.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace()))
        .filter(|charset| !charset.is_empty())
        .map(str::to_string)
}

fn decode_body(raw: &[u8], headers: &HeaderMap) -> Result<String, FormatError> {
    let label = charset_of(headers).unwrap_or_else(|| DEFAULT_CHARSET.to_string());
    // Labels mapped to the replacement encoding would decode to a lone U+FFFD.
    let encoding = Encoding::for_label(label.as_bytes())
        .filter(|encoding| *encoding != REPLACEMENT)
        .ok_or_else(|| FormatError::UnsupportedCharset(label.clone()))?;
    let (text, _) = encoding.decode_without_bom_handling(raw);
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use encoding_rs::BIG5;

    fn record(pairs: &[(&str, &str)]) -> FieldRecord {
        let mut record = FieldRecord::new();
        for (name, value) in pairs {
            record.insert(*name, value.as_bytes());
        }
        record
    }

    fn body_record(body: &[u8]) -> FieldRecord {
        let mut record = FieldRecord::new();
        record.insert("res_body", body);
        record
    }

    fn response_with(content_type: &'static str) -> ResponseData {
        ResponseData::new(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static(content_type))
    }

    fn utc() -> LogDecorator {
        LogDecorator::new(&FormatterConfig::default())
    }

    #[test]
    fn test_time_is_moved_into_configured_zone() {
        let decorator = LogDecorator::new(&FormatterConfig::with_timezone("Asia/Taipei").unwrap());
        let out = decorator
            .decorate(record(&[("time", "2024-05-06T07:08:09+00:00")]), None)
            .unwrap();
        assert_eq!(out.get("time"), Some("2024-05-06 15:08:09"));
    }

    #[test]
    fn test_time_crosses_date_boundary() {
        let decorator =
            LogDecorator::new(&FormatterConfig::with_timezone("America/New_York").unwrap());
        let out = decorator
            .decorate(record(&[("time", "2024-01-01T02:00:00+00:00")]), None)
            .unwrap();
        assert_eq!(out.get("time"), Some("2023-12-31 21:00:00"));
    }

    #[test]
    fn test_unparseable_time_is_an_error() {
        let err = utc()
            .decorate(record(&[("time", "yesterday")]), None)
            .unwrap_err();
        assert!(matches!(err, FormatError::Timestamp { ref value, .. } if value == "yesterday"));
    }

    #[test]
    fn test_request_body_is_unescaped() {
        let out = utc()
            .decorate(record(&[("req_body", r#"{"q":"測試"}"#)]), None)
            .unwrap();
        assert_eq!(out.get("req_body"), Some(r#"{"q":"測試"}"#));
    }

    #[test]
    fn test_big5_response_body_is_decoded() {
        let res = response_with("text/plain; charset=big5");
        let out = utc()
            .decorate(body_record(&[0xA4, 0xA4]), Some(&res))
            .unwrap();
        assert_eq!(out.get("res_body"), Some("中"));
    }

    #[test]
    fn test_big5_json_body_is_decoded_and_unescaped() {
        let (bytes, _, had_errors) = BIG5.encode(r#"{"msg":"中文測試"}"#);
        assert!(!had_errors);
        let res = response_with("application/json;charset=big5");
        let out = utc()
            .decorate(body_record(&bytes), Some(&res))
            .unwrap();
        assert_eq!(out.get("res_body"), Some(r#"{"msg":"中文測試"}"#));
    }

    #[test]
    fn test_missing_charset_defaults_to_utf8() {
        let res = response_with("application/json");
        let out = utc()
            .decorate(record(&[("res_body", "{\"ok\":\"✓\"}")]), Some(&res))
            .unwrap();
        assert_eq!(out.get("res_body"), Some(r#"{"ok":"✓"}"#));
    }

    #[test]
    fn test_unknown_charset_is_an_error() {
        let res = response_with("text/plain; charset=klingon-8");
        let err = utc()
            .decorate(record(&[("res_body", "qapla")]), Some(&res))
            .unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedCharset(ref c) if c == "klingon-8"));
    }

    #[test]
    fn test_replacement_mapped_charsets_are_unsupported() {
        for charset in ["iso-2022-kr", "hz-gb-2312", "iso-2022-cn"] {
            let res = ResponseData::new(StatusCode::OK).header(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&format!("text/plain; charset={charset}")).unwrap(),
            );
            let err = utc()
                .decorate(record(&[("res_body", "hello world")]), Some(&res))
                .unwrap_err();
            assert!(
                matches!(err, FormatError::UnsupportedCharset(ref c) if c == charset),
                "{charset}: {err}"
            );
        }
    }

    #[test]
    fn test_response_body_untouched_without_response() {
        let out = utc()
            .decorate(record(&[("res_body", "NULL"), ("error", "boom")]), None)
            .unwrap();
        assert_eq!(out.get("res_body"), Some("NULL"));
        assert_eq!(out.get("error"), Some("boom"));
    }

    #[test]
    fn test_field_order_is_kept() {
        let out = utc()
            .decorate(
                record(&[("status", "200"), ("time", "2024-05-06T07:08:09+00:00"), ("method", "GET")]),
                None,
            )
            .unwrap();
        assert_eq!(out.names().collect::<Vec<_>>(), ["status", "time", "method"]);
        assert_eq!(
            out.to_json().unwrap(),
            r#"{"status":"200","time":"2024-05-06 07:08:09","method":"GET"}"#
        );
    }

    #[test]
    fn test_charset_of_without_content_type() {
        assert_eq!(charset_of(&HeaderMap::new()), None);
    }
}
