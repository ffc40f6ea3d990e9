//! Error types for formatting, templates, configuration and the logging facade.

/// Errors raised while turning an exchange into a log line.
///
/// Most of the pipeline degrades to sentinel values instead of failing, so
/// the variants here are the few cases that must reach the caller: a
/// timestamp the decorator cannot parse, a response charset nobody knows how
/// to decode, and JSON serialisation itself.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("cannot parse timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("unsupported response charset: {0}")]
    UnsupportedCharset(String),
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while building a [`Template`](crate::template::Template).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("field {0:?} is declared more than once")]
    DuplicateField(String),
    #[error("field name {0:?} must be non-empty and contain neither ',' nor the record delimiter")]
    InvalidFieldName(String),
    #[error("a template needs at least one field")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown time zone: {0}")]
    UnknownTimezone(String),
}

/// Errors from the printf-style message formatting in [`Logger`](crate::logger::Logger).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SprintfError {
    #[error("format string references argument {0} but only {1} were given")]
    MissingArgument(usize, usize),
    #[error("unknown conversion specifier '%{0}'")]
    UnknownConversion(char),
    #[error("missing conversion specifier at end of format string")]
    Truncated,
}
