//! Exchange to log line.

use chrono_tz::Tz;
use tracing::debug;

use crate::config::FormatterConfig;
use crate::context::ResolutionContext;
use crate::decorator::{DecoratedRecord, LogDecorator};
use crate::error::FormatError;
use crate::resolver::PlaceholderResolver;
use crate::splitter::RecordSplitter;
use crate::template::{self, Preset, Template, TemplateEngine, DELIMITER};

/// Formats exchanges as single-line JSON records.
///
/// The pipeline is: expand the delimiter-joined template, split it back into
/// fields, decorate `time` and the bodies, serialise. Keys appear in template
/// order; every value is a string.
///
/// # Examples
///
/// ```rust
/// use exchange_log::{FormatterConfig, LogFormatter, RequestData, ResolutionContext, ResponseData};
/// use axum::http::{Method, StatusCode, Uri};
///
/// let formatter = LogFormatter::new(&FormatterConfig::default());
/// let request = RequestData::new(Method::GET, Uri::from_static("http://localhost/ping"));
/// let response = ResponseData::new(StatusCode::OK).body("pong");
///
/// let line = formatter
///     .format(&ResolutionContext::new(&request).with_response(&response))
///     .unwrap();
/// assert!(line.starts_with(r#"{"method":"GET","uri":"http://localhost/ping","time":"#));
/// assert!(line.ends_with(r#""status":"200","req_body":"","res_body":"pong","error":"NULL"}"#));
/// ```
#[derive(Clone, Debug)]
pub struct LogFormatter {
    engine: TemplateEngine,
    decorator: LogDecorator,
    timezone: Tz,
}

impl LogFormatter {
    /// Formatter with the default `method, uri, time, status, req_body,
    /// res_body, error` template.
    pub fn new(config: &FormatterConfig) -> Self {
        Self::with_template(Template::default(), config)
    }

    pub fn with_template(template: Template, config: &FormatterConfig) -> Self {
        Self {
            engine: TemplateEngine::new(template),
            decorator: LogDecorator::new(config),
            timezone: config.timezone,
        }
    }

    pub fn template(&self) -> &Template {
        self.engine.template()
    }

    /// Builds the decorated record for one exchange.
    pub fn record(&self, ctx: &ResolutionContext<'_>) -> Result<DecoratedRecord, FormatError> {
        let resolver = PlaceholderResolver::new(ctx.in_zone(self.timezone));
        let expansion = self.engine.expand(&resolver);
        if !expansion.unknown.is_empty() {
            debug!(unknown = ?expansion.unknown, "Template references unknown placeholders");
        }
        let record = RecordSplitter::split(&expansion.text, DELIMITER);
        self.decorator.decorate(record, ctx.response())
    }

    /// Formats one exchange as a JSON line.
    pub fn format(&self, ctx: &ResolutionContext<'_>) -> Result<String, FormatError> {
        Ok(self.record(ctx)?.to_json()?)
    }

    /// Expands a free-form template into a plain line, with no splitting or
    /// decoration. Non-UTF-8 body bytes are replaced.
    pub fn format_line(&self, template: &str, ctx: &ResolutionContext<'_>) -> String {
        let resolver = PlaceholderResolver::new(ctx.in_zone(self.timezone));
        template::expand(template, &resolver).to_string_lossy()
    }

    pub fn format_preset(&self, preset: Preset, ctx: &ResolutionContext<'_>) -> String {
        self.format_line(preset.template(), ctx)
    }
}
