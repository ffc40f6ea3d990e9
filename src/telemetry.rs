//! Tracing subscriber setup with a compact, microsecond-precision line format.
//!
//! Lines look like `[2024-05-06 15:08:09.123456] NOTICE: message`: no target,
//! no spans, no extra fields. The severity comes from the `severity` field
//! written by [`TracingSink`](crate::logger::TracingSink) when present, and
//! from the tracing level otherwise.

use chrono::Utc;
use chrono_tz::Tz;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::FormatterConfig;

#[derive(Clone, Copy, Debug)]
pub struct MicrosecondFormat {
    timezone: Tz,
}

impl MicrosecondFormat {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Default for MicrosecondFormat {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl<S, N> FormatEvent<S, N> for MicrosecondFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let level = match &visitor.severity {
            Some(severity) => severity.as_str(),
            None => event.metadata().level().as_str(),
        };
        writeln!(
            writer,
            "[{}] {}: {}",
            Utc::now()
                .with_timezone(&self.timezone)
                .format("%Y-%m-%d %H:%M:%S%.6f"),
            level,
            visitor.message
        )
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    severity: Option<String>,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "severity" => self.severity = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "severity" => self.severity = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

/// Installs a global subscriber using [`MicrosecondFormat`] in the configured
/// time zone. Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(
    config: &FormatterConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(MicrosecondFormat::new(config.timezone))
        .try_init()
}
