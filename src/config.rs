//! Configuration for the formatter and the capture middleware.

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::logger::MAIN_CHANNEL;

/// Environment variable consulted by [`FormatterConfig::from_env`].
pub const TIMEZONE_ENV: &str = "APP_TIMEZONE";

/// Settings consumed by the decorator.
///
/// # Examples
///
/// ```rust
/// use exchange_log::FormatterConfig;
///
/// let config: FormatterConfig = serde_json::from_str(r#"{"timezone":"Asia/Taipei"}"#).unwrap();
/// assert_eq!(config.timezone, chrono_tz::Asia::Taipei);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Application time zone the `time` field is rendered in
    pub timezone: Tz,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self { timezone: Tz::UTC }
    }
}

impl FormatterConfig {
    /// Reads the time zone from `APP_TIMEZONE`, falling back to UTC when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(TIMEZONE_ENV) {
            Ok(name) => Self::with_timezone(&name),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn with_timezone(name: &str) -> Result<Self, ConfigError> {
        let timezone = name
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))?;
        Ok(Self { timezone })
    }
}

/// Controls what the capture middleware buffers and where it logs.
///
/// # Examples
///
/// ```rust
/// use exchange_log::CaptureConfig;
///
/// let config = CaptureConfig {
///     capture_response_body: false,
///     ..CaptureConfig::default()
/// };
/// assert_eq!(config.channel, "app");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whether to buffer a copy of request bodies
    pub capture_request_body: bool,
    /// Whether to buffer a copy of response bodies
    pub capture_response_body: bool,
    /// Bodies larger than this are not kept; the response side then logs
    /// `RESPONSE_NOT_LOGGEABLE`
    pub max_body_bytes: Option<usize>,
    /// Log channel for [`FormattingHandler::from_capture`](crate::FormattingHandler::from_capture)
    pub channel: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_request_body: true,
            capture_response_body: true,
            max_body_bytes: None,
            channel: MAIN_CHANNEL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timezone_is_utc() {
        assert_eq!(FormatterConfig::default().timezone, Tz::UTC);
    }

    #[test]
    fn test_with_timezone_parses_iana_names() {
        let config = FormatterConfig::with_timezone("Asia/Taipei").unwrap();
        assert_eq!(config.timezone, chrono_tz::Asia::Taipei);
    }

    #[test]
    fn test_with_timezone_rejects_unknown_zone() {
        let err = FormatterConfig::with_timezone("Mars/Olympus").unwrap_err();
        assert_eq!(err, ConfigError::UnknownTimezone("Mars/Olympus".to_string()));
    }

    #[test]
    fn test_capture_config_deserializes_partial_input() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{"channel":"outbound","max_body_bytes":1024}"#).unwrap();
        assert_eq!(config.channel, "outbound");
        assert_eq!(config.max_body_bytes, Some(1024));
        assert!(config.capture_request_body);
        assert!(config.capture_response_body);
    }
}
