//! Templates and single-pass placeholder expansion.
//!
//! A placeholder is `{name}` where `name` is made of ASCII letters, digits,
//! `_`, `-` and `.`; whitespace just inside the braces is tolerated. Anything
//! else in a template is copied through untouched.
//!
//! Structured records ride on the same machinery: a [`Template`] is compiled
//! into one flat string of `field,{placeholder}` chunks joined by
//! [`DELIMITER`], expanded, and then cut back apart by
//! [`RecordSplitter`](crate::splitter::RecordSplitter). A resolved value that
//! itself contains the delimiter will corrupt that split; the delimiter is
//! chosen so this does not happen in practice, and nothing guards against it.

use regex::bytes::Regex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::TemplateError;
use crate::resolver::Resolve;

/// Separator between `field,value` chunks in a compiled template.
pub const DELIMITER: &str = "-0-0-0-0-0-0-0-0-0-";

/// Apache common log format.
pub const CLF: &str = "{hostname} {req_header_User-Agent} - [{date_common_log}] \"{method} {target} HTTP/{version}\" {code} {res_header_Content-Length}";

/// Full request and response dump.
pub const DEBUG: &str = ">>>>>>>>\n{request}\n<<<<<<<<\n{response}\n--------\n{error}";

/// One-line summary.
pub const SHORT: &str = "[{ts}] \"{method} {target} HTTP/{version}\" {code}";

/// The built-in plain-text line formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Preset {
    CommonLog,
    Debug,
    Short,
}

impl Preset {
    pub fn template(self) -> &'static str {
        match self {
            Preset::CommonLog => CLF,
            Preset::Debug => DEBUG,
            Preset::Short => SHORT,
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clf" | "common" => Ok(Preset::CommonLog),
            "debug" => Ok(Preset::Debug),
            "short" => Ok(Preset::Short),
            other => Err(format!("unknown preset: {other}")),
        }
    }
}

/// Ordered `field name → placeholder` pairs describing one log record.
///
/// # Examples
///
/// ```rust
/// use exchange_log::Template;
///
/// let template = Template::new([("method", "{method}"), ("status", "{code}")]).unwrap();
/// assert_eq!(template.field_names().collect::<Vec<_>>(), ["method", "status"]);
/// assert!(Template::new([("a", "{method}"), ("a", "{uri}")]).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    fields: Vec<(String, String)>,
    compiled: String,
}

impl Template {
    pub fn new<I, K, V>(fields: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (name, token) in fields {
            let name = name.into();
            if name.is_empty() || name.contains(',') || name.contains(DELIMITER) {
                return Err(TemplateError::InvalidFieldName(name));
            }
            if pairs.iter().any(|(existing, _)| *existing == name) {
                return Err(TemplateError::DuplicateField(name));
            }
            pairs.push((name, token.into()));
        }
        if pairs.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(Self::compile(pairs))
    }

    fn compile(fields: Vec<(String, String)>) -> Self {
        let compiled = fields
            .iter()
            .map(|(name, token)| format!("{name},{token}"))
            .collect::<Vec<_>>()
            .join(DELIMITER);
        Self { fields, compiled }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// The delimiter-joined form fed to the expander.
    pub fn as_str(&self) -> &str {
        &self.compiled
    }
}

impl Default for Template {
    /// `method`, `uri`, `time`, `status`, `req_body`, `res_body`, `error`.
    fn default() -> Self {
        Self::compile(
            [
                ("method", "{method}"),
                ("uri", "{uri}"),
                ("time", "{ts}"),
                ("status", "{code}"),
                ("req_body", "{req_body}"),
                ("res_body", "{res_body}"),
                ("error", "{error}"),
            ]
            .into_iter()
            .map(|(name, token)| (name.to_string(), token.to_string()))
            .collect(),
        )
    }
}

/// Result of expanding a template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    pub text: Vec<u8>,
    /// Placeholder names the resolver did not recognise, in first-seen order.
    /// Each was replaced by an empty string.
    pub unknown: Vec<String>,
}

impl Expansion {
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\s*([A-Za-z_\-.0-9]+)\s*\}").expect("placeholder pattern is valid")
    })
}

/// Replaces every placeholder in `template` with its resolved value.
///
/// Each distinct name is resolved once per call; later occurrences reuse the
/// first value, so body reads and clock reads happen at most once.
pub fn expand<R: Resolve + ?Sized>(template: &str, resolver: &R) -> Expansion {
    let haystack = template.as_bytes();
    let mut cache: HashMap<&str, Vec<u8>> = HashMap::new();
    let mut expansion = Expansion::default();
    let mut last = 0;

    for caps in placeholder().captures_iter(haystack) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // The name class is pure ASCII.
        let Ok(name) = std::str::from_utf8(name.as_bytes()) else {
            continue;
        };
        expansion.text.extend_from_slice(&haystack[last..whole.start()]);
        let value = cache.entry(name).or_insert_with(|| {
            resolver.resolve(name).unwrap_or_else(|| {
                expansion.unknown.push(name.to_string());
                Vec::new()
            })
        });
        expansion.text.extend_from_slice(value);
        last = whole.end();
    }
    expansion.text.extend_from_slice(&haystack[last..]);
    expansion
}

/// Expands one configured [`Template`].
#[derive(Clone, Debug, Default)]
pub struct TemplateEngine {
    template: Template,
}

impl TemplateEngine {
    pub fn new(template: Template) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn expand<R: Resolve + ?Sized>(&self, resolver: &R) -> Expansion {
        expand(self.template.as_str(), resolver)
    }
}
