//! Locale-aware DOM error messages.
//!
//! Messages come from three domains (DOM, XML, serializer), each backed by
//! embedded catalogs. Lookups walk `lang_COUNTRY`, then `lang`, then the
//! root catalog. The locale is always passed in; there is no global state.
//!
//! ```
//! use dom_messages::{Locale, DOM_DOMAIN, format_exception};
//!
//! let msg = format_exception(&Locale::root(), DOM_DOMAIN, 8, &[]).unwrap();
//! assert!(msg.starts_with("NOT_FOUND_ERR: "));
//! ```

mod catalog;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DOM_DOMAIN: &str = "http://www.w3.org/dom/DOMTR";
pub const XML_DOMAIN: &str = "http://www.w3.org/TR/1998/REC-xml-19980210";
pub const SERIALIZER_DOMAIN: &str = "http://apache.org/xml/serializer";

/// Keys for DOM exception codes 1 through 17, in code order.
pub const EXCEPTION_KEYS: [&str; 17] = [
    "INDEX_SIZE_ERR",
    "DOMSTRING_SIZE_ERR",
    "HIERARCHY_REQUEST_ERR",
    "WRONG_DOCUMENT_ERR",
    "INVALID_CHARACTER_ERR",
    "NO_DATA_ALLOWED_ERR",
    "NO_MODIFICATION_ALLOWED_ERR",
    "NOT_FOUND_ERR",
    "NOT_SUPPORTED_ERR",
    "INUSE_ATTRIBUTE_ERR",
    "INVALID_STATE_ERR",
    "SYNTAX_ERR",
    "INVALID_MODIFICATION_ERR",
    "NAMESPACE_ERR",
    "INVALID_ACCESS_ERR",
    "VALIDATION_ERR",
    "TYPE_MISMATCH_ERR",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("unknown message domain '{0}'")]
    UnknownDomain(String),

    /// `message` is the catalog's own "bad key" text, in the requested locale.
    #[error("{key}: {message}")]
    UnknownKey { key: String, message: String },

    #[error("DOM exception code {0} is outside 1..=17")]
    UnknownCode(u16),

    #[error("invalid locale '{0}'")]
    InvalidLocale(String),
}

pub type MessageResult<T> = Result<T, MessageError>;

/// Message domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Dom,
    Xml,
    Serializer,
}

impl Domain {
    pub fn from_uri(uri: &str) -> MessageResult<Self> {
        match uri {
            DOM_DOMAIN => Ok(Domain::Dom),
            XML_DOMAIN => Ok(Domain::Xml),
            SERIALIZER_DOMAIN => Ok(Domain::Serializer),
            other => Err(MessageError::UnknownDomain(other.to_string())),
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            Domain::Dom => DOM_DOMAIN,
            Domain::Xml => XML_DOMAIN,
            Domain::Serializer => SERIALIZER_DOMAIN,
        }
    }
}

/// Language plus optional country, e.g. `fr` or `fr_CA`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    country: Option<String>,
}

impl Locale {
    /// The root locale: only the base catalogs.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(language: &str, country: Option<&str>) -> Self {
        Self {
            language: language.to_ascii_lowercase(),
            country: country.map(|c| c.to_ascii_uppercase()),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Catalog tags to try, most specific first, always ending with the root.
    fn candidates(&self) -> Vec<String> {
        let mut tags = Vec::with_capacity(3);
        if !self.language.is_empty() {
            if let Some(country) = &self.country {
                tags.push(format!("{}_{}", self.language, country));
            }
            tags.push(self.language.clone());
        }
        tags.push(String::new());
        tags
    }
}

impl FromStr for Locale {
    type Err = MessageError;

    /// Accepts `""`, `lang`, `lang_COUNTRY` and `lang-COUNTRY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut parts = s.splitn(2, ['_', '-']);
        let language = parts.next().unwrap_or_default();
        let country = parts.next();

        let valid = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphabetic());
        if !valid(language) || country.is_some_and(|c| !valid(c)) {
            return Err(MessageError::InvalidLocale(s.to_string()));
        }
        Ok(Self::new(language, country))
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}_{}", self.language, country),
            None => f.write_str(&self.language),
        }
    }
}

fn resolve(locale: &Locale, domain: Domain, key: &str) -> Option<&'static str> {
    let tables = catalog::tables(domain);
    locale.candidates().iter().find_map(|tag| {
        tables
            .iter()
            .find(|(t, _)| *t == tag.as_str())
            .and_then(|(_, table)| catalog::lookup(*table, key))
    })
}

/// Format `key` from `domain` as `"<key>: <text>"`, substituting `{n}`
/// placeholders with `args[n]`. Placeholders without an argument are kept.
pub fn format_message(
    locale: &Locale,
    domain: &str,
    key: &str,
    args: &[&dyn fmt::Display],
) -> MessageResult<String> {
    let domain = Domain::from_uri(domain)?;
    let text = resolve(locale, domain, key).ok_or_else(|| MessageError::UnknownKey {
        key: key.to_string(),
        message: resolve(locale, domain, catalog::BAD_MESSAGE_KEY)
            .unwrap_or_default()
            .to_string(),
    })?;

    Ok(substitute(&format!("{}: {}", key, text), args))
}

/// Format the message for DOM exception `code` (1..=17).
pub fn format_exception(
    locale: &Locale,
    domain: &str,
    code: u16,
    args: &[&dyn fmt::Display],
) -> MessageResult<String> {
    let key = usize::from(code)
        .checked_sub(1)
        .and_then(|i| EXCEPTION_KEYS.get(i))
        .ok_or(MessageError::UnknownCode(code))?;
    format_message(locale, domain, key, args)
}

fn substitute(pattern: &str, args: &[&dyn fmt::Display]) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg.to_string(), close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
