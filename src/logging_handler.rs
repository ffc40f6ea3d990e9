//! Handlers for finished exchanges.
//!
//! [`FormattingHandler`] is the stock implementation of [`ExchangeHandler`]:
//! it turns each exchange into one JSON line and writes it to a [`Logger`].

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

use crate::config::{CaptureConfig, FormatterConfig};
use crate::formatter::LogFormatter;
use crate::logger::{Level, LogSink, Logger};
use crate::types::Exchange;

/// Trait for processing exchanges captured by
/// [`HttpLogLayer`](crate::HttpLogLayer).
///
/// Handlers run on the layer's background task, one exchange at a time, in
/// the order the exchanges finished.
///
/// # Examples
///
/// ```rust
/// use exchange_log::{Exchange, ExchangeHandler};
/// use tracing::info;
///
/// #[derive(Debug)]
/// struct StatusCounter;
///
/// impl ExchangeHandler for StatusCounter {
///     async fn handle_exchange(&self, exchange: Exchange) {
///         match &exchange.response {
///             Some(response) => info!(status = %response.status, "exchange finished"),
///             None => info!(uri = %exchange.request.uri, "exchange failed"),
///         }
///     }
/// }
/// ```
pub trait ExchangeHandler: Send + Sync + 'static {
    fn handle_exchange(&self, exchange: Exchange) -> impl Future<Output = ()> + Send;
}

/// Formats exchanges with a [`LogFormatter`] and writes them to a channel.
///
/// Completed exchanges are logged at `info`, failed ones at `error`. A line
/// that cannot be formatted is reported through `tracing` and dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use exchange_log::{CaptureConfig, FormatterConfig, FormattingHandler, HttpLogLayer};
///
/// # #[tokio::main]
/// # async fn main() {
/// let capture = CaptureConfig {
///     channel: "outbound".to_string(),
///     ..CaptureConfig::default()
/// };
/// let handler = FormattingHandler::from_capture(&FormatterConfig::default(), &capture);
/// let layer = HttpLogLayer::new(capture, handler);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FormattingHandler {
    formatter: LogFormatter,
    logger: Logger,
}

impl FormattingHandler {
    pub fn new(config: &FormatterConfig, logger: Logger) -> Self {
        Self::with_formatter(LogFormatter::new(config), logger)
    }

    /// Handler writing to the channel named by `capture`.
    pub fn from_capture(config: &FormatterConfig, capture: &CaptureConfig) -> Self {
        Self::new(config, Logger::channel(capture.channel.clone()))
    }

    pub fn with_formatter(formatter: LogFormatter, logger: Logger) -> Self {
        Self { formatter, logger }
    }

    /// Redirects output to another sink, keeping the channel.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logger = self.logger.with_sink(sink);
        self
    }

    /// Formats and logs synchronously.
    pub fn log_exchange(&self, exchange: &Exchange) {
        let correlation_id = exchange.request.correlation_id;
        let line = match self.formatter.format(&exchange.context()) {
            Ok(line) => line,
            Err(e) => {
                error!(correlation_id, error = %e, "Failed to format exchange");
                return;
            }
        };
        let level = if exchange.error.is_some() {
            Level::Error
        } else {
            Level::Info
        };
        if let Err(e) = self.logger.log(level, "%s", &[Value::String(line)]) {
            error!(correlation_id, error = %e, "Failed to write log line");
        }
    }
}

impl ExchangeHandler for FormattingHandler {
    async fn handle_exchange(&self, exchange: Exchange) {
        self.log_exchange(&exchange);
    }
}
