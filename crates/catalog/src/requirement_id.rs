use crate::error::{CatalogError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical requirement identifier.
///
/// Prefixes without a hyphen join the number with a space (`BR 1.4`), hyphenated
/// prefixes join with `-` (`UR-REG-35`). Every spelling variant accepted by
/// [`IdMatcher`] collapses to this one form, so the id is safe to use as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequirementId {
    prefix: String,
    number: String,
}

impl RequirementId {
    pub fn new(prefix: impl Into<String>, number: impl Into<String>) -> Self {
        let number: String = number.into();
        Self {
            prefix: prefix.into(),
            number: number.trim_end_matches('.').to_string(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn number(&self) -> &str {
        &self.number
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.contains('-') {
            write!(f, "{}-{}", self.prefix, self.number)
        } else {
            write!(f, "{} {}", self.prefix, self.number)
        }
    }
}

impl FromStr for RequirementId {
    type Err = CatalogError;

    /// Parses any `PREFIX<sep>NUMBER` spelling without consulting a prefix set.
    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let number_start = raw
            .char_indices()
            .rev()
            .take_while(|(_, ch)| ch.is_ascii_digit() || *ch == '.')
            .last()
            .map(|(idx, _)| idx)
            .ok_or_else(|| CatalogError::invalid_config(format!("'{raw}' has no numeric suffix")))?;

        let number = raw[number_start..].trim_start_matches('.');
        let prefix = raw[..raw.len() - number.len()]
            .trim_end_matches(|ch: char| ch.is_whitespace() || ch == '-' || ch == '.');

        if prefix.is_empty() || !number.starts_with(|ch: char| ch.is_ascii_digit()) {
            return Err(CatalogError::invalid_config(format!(
                "'{raw}' is not a requirement id"
            )));
        }

        Ok(Self::new(prefix, number))
    }
}

impl TryFrom<String> for RequirementId {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RequirementId> for String {
    fn from(id: RequirementId) -> Self {
        id.to_string()
    }
}

/// Recognises requirement identifiers for a closed set of prefixes.
#[derive(Debug, Clone)]
pub struct IdMatcher {
    identifier: Regex,
    bare_prefix: Regex,
}

impl IdMatcher {
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Result<Self> {
        if prefixes.is_empty() {
            return Err(CatalogError::invalid_config("prefixes must not be empty"));
        }

        // Longest first so `UR-REG` wins over a hypothetical `UR`.
        let mut sorted: Vec<&str> = prefixes.iter().map(AsRef::as_ref).collect();
        sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = sorted
            .iter()
            .map(|prefix| regex::escape(prefix))
            .collect::<Vec<_>>()
            .join("|");

        let identifier = Regex::new(&format!(
            r"^(?P<prefix>{alternation})[\s\-]*(?P<number>\d+(?:\.\d+)*)(?P<rest>.*)$"
        ))?;
        let bare_prefix = Regex::new(&format!(r"^(?:{alternation})(?:$|[\s:\-])"))?;

        Ok(Self {
            identifier,
            bare_prefix,
        })
    }

    /// Matches a line that starts with a full identifier.
    ///
    /// Returns the canonical id and whatever text follows it, with leading
    /// separators (`:`, `-`, dashes, whitespace) removed. `BR 1.4abc` is not an
    /// identifier.
    #[must_use]
    pub fn match_line<'a>(&self, line: &'a str) -> Option<(RequirementId, &'a str)> {
        let caps = self.identifier.captures(line)?;
        let prefix = caps.name("prefix")?.as_str();
        let number = caps.name("number")?.as_str();
        let mut rest = caps.name("rest").map_or("", |m| m.as_str());

        if let Some(stripped) = rest.strip_prefix('.') {
            rest = stripped;
        }
        if rest.starts_with(char::is_alphanumeric) {
            return None;
        }

        let rest = rest
            .trim_start_matches(|ch: char| {
                ch.is_whitespace() || matches!(ch, ':' | '-' | '\u{2013}' | '\u{2014}')
            })
            .trim_end();

        Some((RequirementId::new(prefix, number), rest))
    }

    /// True when the line opens with a known prefix word, with or without a number.
    #[must_use]
    pub fn starts_with_prefix(&self, line: &str) -> bool {
        self.bare_prefix.is_match(line) || self.match_line(line).is_some()
    }
}
