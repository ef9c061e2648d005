//! Endpoint to rate limit group classification
//!
//! Rules are checked in declaration order and the first match wins, so a
//! sub-resource pattern has to come before the collection it lives under.
//!
//! Pattern syntax:
//! - `/orders` matches `/orders` and anything below it at a segment boundary
//! - `*` or `{name}` matches exactly one segment
//! - a trailing `$` matches the path exactly, nothing below it
//! - a leading `~` makes the rest a regular expression over the whole path

use crate::core::rate_limiter::DEFAULT_GROUP;
use crate::utils::error::{DispatchError, Result};
use regex::Regex;
use std::fmt;

/// Built-in classification table, most specific first
const BUILTIN_RULES: &[(&str, &str)] = &[
    ("/orders/*/buyerInfo", "order_buyer_info"),
    ("/orders/*/address", "order_address"),
    ("/orders/*", "order_detail"),
    ("/orders", "order_list"),
    ("/invoices/*", "invoice_detail"),
    ("/invoices", "invoice_list"),
    ("/listings/*", "listings"),
    ("/reports/*", "report_detail"),
    ("/reports", "reports"),
    ("/feeds", "feeds"),
    ("/tokens", "tokens"),
];

/// One segment of a [`PathPattern::Segments`] pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Wildcard,
}

/// A matchable path expression
#[derive(Debug, Clone)]
pub enum PathPattern {
    Segments {
        segments: Vec<Segment>,
        exact: bool,
        source: String,
    },
    Regex(Regex),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        match pattern.strip_prefix('~') {
            Some(expr) => Regex::new(expr).map(Self::Regex).map_err(|e| {
                DispatchError::invalid_config(format!("Invalid path pattern '{}': {}", pattern, e))
            }),
            None => Ok(Self::segments(pattern)),
        }
    }

    /// Segment pattern; never fails
    pub fn segments(pattern: &str) -> Self {
        let trimmed = pattern.trim();
        let (body, exact) = match trimmed.strip_suffix('$') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        let segments = body
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" || (s.starts_with('{') && s.ends_with('}')) {
                    Segment::Wildcard
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        Self::Segments {
            segments,
            exact,
            source: trimmed.to_string(),
        }
    }

    fn matches(&self, path: &str, parts: &[&str]) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(path),
            Self::Segments {
                segments, exact, ..
            } => {
                if parts.len() < segments.len() || (*exact && parts.len() != segments.len()) {
                    return false;
                }
                segments.iter().zip(parts).all(|(segment, part)| match segment {
                    Segment::Wildcard => true,
                    Segment::Literal(literal) => literal == part,
                })
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segments { source, .. } => f.write_str(source),
            Self::Regex(regex) => write!(f, "~{}", regex.as_str()),
        }
    }
}

/// One `{pattern, group}` entry
#[derive(Debug, Clone)]
pub struct GroupRule {
    pub pattern: PathPattern,
    pub group: String,
}

impl GroupRule {
    pub fn new(pattern: &str, group: impl Into<String>) -> Result<Self> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            group: group.into(),
        })
    }
}

/// Maps request paths to rate limit groups
#[derive(Debug, Clone)]
pub struct GroupClassifier {
    rules: Vec<GroupRule>,
}

impl Default for GroupClassifier {
    fn default() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .map(|&(pattern, group)| GroupRule {
                pattern: PathPattern::segments(pattern),
                group: group.to_string(),
            })
            .collect();
        Self { rules }
    }
}

impl GroupClassifier {
    pub fn new(rules: Vec<GroupRule>) -> Self {
        Self { rules }
    }

    /// Build from `(pattern, group)` pairs in order
    pub fn from_table<'a, I>(table: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules = table
            .into_iter()
            .map(|(pattern, group)| GroupRule::new(pattern, group))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[GroupRule] {
        &self.rules
    }

    /// Group for `path`, or `default` when no rule matches
    ///
    /// Accepts bare paths or full URLs; query strings and fragments are ignored.
    pub fn classify(&self, path: &str) -> &str {
        let path = normalize(path);
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(&path, &parts))
            .map(|rule| rule.group.as_str())
            .unwrap_or(DEFAULT_GROUP)
    }
}

fn normalize(path: &str) -> String {
    let path = match url::Url::parse(path) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => path.to_string(),
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
