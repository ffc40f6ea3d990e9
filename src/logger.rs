//! Channel-and-level logging facade.
//!
//! A [`Logger`] is bound to one named channel and forwards finished messages
//! to a [`LogSink`]. Messages are built printf-style: the first argument is a
//! format string, the rest are substituted into it. Object and array
//! arguments are written as compact JSON.
//!
//! ```rust
//! use exchange_log::Logger;
//! use serde_json::json;
//!
//! let logger = Logger::channel("payments");
//! logger.info("charged %s for order %d", &[json!("alice"), json!(1042)]).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::SprintfError;

/// Channel used by [`Logger::main`].
pub const MAIN_CHANNEL: &str = "app";

/// Syslog-style severities, most severe first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Level {
    pub const ALL: [Level; 8] = [
        Level::Emergency,
        Level::Alert,
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Info,
        Level::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Emergency => "emergency",
            Level::Alert => "alert",
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Notice => "notice",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    /// Upper-case name as printed in log lines.
    pub fn label(self) -> &'static str {
        match self {
            Level::Emergency => "EMERGENCY",
            Level::Alert => "ALERT",
            Level::Critical => "CRITICAL",
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Notice => "NOTICE",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level: {s}"))
    }
}

/// Destination for finished log messages.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, channel: &str, level: Level, message: &str);
}

/// Sink that emits `tracing` events.
///
/// `tracing` has five levels, so the eight severities are folded onto them;
/// the original severity travels in the `severity` field.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, channel: &str, level: Level, message: &str) {
        let severity = level.label();
        match level {
            Level::Emergency | Level::Alert | Level::Critical | Level::Error => {
                error!(channel, severity, "{message}")
            }
            Level::Warning => warn!(channel, severity, "{message}"),
            Level::Notice | Level::Info => info!(channel, severity, "{message}"),
            Level::Debug => debug!(channel, severity, "{message}"),
        }
    }
}

/// A logger bound to one channel.
#[derive(Clone)]
pub struct Logger {
    channel: String,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Logger for `name`, writing through [`TracingSink`].
    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            channel: name.into(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Logger for the application's main channel.
    pub fn main() -> Self {
        Self::channel(MAIN_CHANNEL)
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    /// Formats `format` with `args` and hands the result to the sink.
    pub fn log(&self, level: Level, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        let message = sprintf(format, args)?;
        self.sink.log(&self.channel, level, &message);
        Ok(())
    }

    pub fn emergency(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Emergency, format, args)
    }

    pub fn alert(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Alert, format, args)
    }

    pub fn critical(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Critical, format, args)
    }

    pub fn error(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Error, format, args)
    }

    pub fn warning(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Warning, format, args)
    }

    pub fn notice(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Notice, format, args)
    }

    pub fn info(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Info, format, args)
    }

    pub fn debug(&self, format: &str, args: &[Value]) -> Result<(), SprintfError> {
        self.log(Level::Debug, format, args)
    }
}

/// printf-style substitution.
///
/// Supports `%s`, `%d`, `%f` (six decimals), `%%` and positional forms such
/// as `%2$s`. Extra arguments are ignored.
pub fn sprintf(format: &str, args: &[Value]) -> Result<String, SprintfError> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        let index = if !digits.is_empty() && chars.peek() == Some(&'$') {
            chars.next();
            // Positions are 1-based; %0$s refers to nothing.
            digits.parse::<usize>().unwrap_or(0).checked_sub(1)
        } else if digits.is_empty() {
            None
        } else {
            // Width specifiers are not supported; treat the digits as text.
            out.push('%');
            out.push_str(&digits);
            continue;
        };
        let conversion = chars.next().ok_or(SprintfError::Truncated)?;
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let position = match index {
            Some(position) => position,
            None if !digits.is_empty() => return Err(SprintfError::MissingArgument(0, args.len())),
            None => {
                next_arg += 1;
                next_arg - 1
            }
        };
        let arg = args
            .get(position)
            .ok_or(SprintfError::MissingArgument(position + 1, args.len()))?;
        match conversion {
            's' => out.push_str(&as_text(arg)),
            'd' => out.push_str(&as_integer(arg).to_string()),
            'f' => out.push_str(&format!("{:.6}", as_float(arg))),
            other => return Err(SprintfError::UnknownConversion(other)),
        }
    }
    Ok(out)
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn as_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => leading_integer(s),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Integer prefix of `s`, the way numeric strings are read loosely.
fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    s[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        lines: Mutex<Vec<(String, Level, String)>>,
    }

    impl LogSink for MemorySink {
        fn log(&self, channel: &str, level: Level, message: &str) {
            self.lines
                .lock()
                .unwrap()
                .push((channel.to_string(), level, message.to_string()));
        }
    }

    #[test]
    fn test_sprintf_basic_conversions() {
        assert_eq!(
            sprintf("%s took %dms (%f)", &[json!("GET /"), json!(12), json!(0.5)]).unwrap(),
            "GET / took 12ms (0.500000)"
        );
    }

    #[test]
    fn test_sprintf_json_encodes_structures() {
        assert_eq!(
            sprintf("payload=%s", &[json!({"path": "/a/b", "name": "台北"})]).unwrap(),
            r#"payload={"path":"/a/b","name":"台北"}"#
        );
    }

    #[test]
    fn test_sprintf_positional_and_percent() {
        assert_eq!(
            sprintf("%2$s %1$s 100%%", &[json!("world"), json!("hello")]).unwrap(),
            "hello world 100%"
        );
    }

    #[test]
    fn test_sprintf_loose_integers() {
        assert_eq!(sprintf("%d", &[json!("42abc")]).unwrap(), "42");
        assert_eq!(sprintf("%d", &[json!(true)]).unwrap(), "1");
        assert_eq!(sprintf("%d", &[json!("x")]).unwrap(), "0");
    }

    #[test]
    fn test_sprintf_errors() {
        assert_eq!(sprintf("%s %s", &[json!("a")]), Err(SprintfError::MissingArgument(2, 1)));
        assert_eq!(sprintf("%q", &[json!("a")]), Err(SprintfError::UnknownConversion('q')));
        assert_eq!(sprintf("trailing %", &[]), Err(SprintfError::Truncated));
    }

    #[test]
    fn test_message_without_conversions_passes_through() {
        assert_eq!(sprintf("plain message", &[]).unwrap(), "plain message");
    }

    #[test]
    fn test_each_level_reaches_the_sink_on_its_channel() {
        let sink = Arc::new(MemorySink::default());
        let logger = Logger::channel("billing").with_sink(sink.clone());

        logger.emergency("a", &[]).unwrap();
        logger.alert("b", &[]).unwrap();
        logger.critical("c", &[]).unwrap();
        logger.error("d", &[]).unwrap();
        logger.warning("e", &[]).unwrap();
        logger.notice("f", &[]).unwrap();
        logger.info("g", &[]).unwrap();
        logger.debug("h", &[]).unwrap();

        let lines = sink.lines.lock().unwrap();
        let levels: Vec<Level> = lines.iter().map(|(_, level, _)| *level).collect();
        assert_eq!(levels, Level::ALL);
        assert!(lines.iter().all(|(channel, _, _)| channel == "billing"));
        assert_eq!(lines[6].2, "g");
    }

    #[test]
    fn test_main_channel() {
        assert_eq!(Logger::main().channel_name(), MAIN_CHANNEL);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("Warning".parse::<Level>(), Ok(Level::Warning));
        assert!("fatal".parse::<Level>().is_err());
        assert!(Level::Emergency < Level::Debug);
    }
}
