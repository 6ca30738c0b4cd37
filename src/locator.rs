//! Element locator grammar.
//!
//! Locators follow the familiar Selenium shape: `strategy=criteria`, a bare
//! value matched against `id` then `name`, or an XPath starting with `//`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strategy used to find an element in the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    /// Match `id` first, then `name`.
    Identifier,
    Id,
    Name,
    Xpath,
    Css,
    Tag,
}

impl LocatorStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            LocatorStrategy::Identifier => "identifier",
            LocatorStrategy::Id => "id",
            LocatorStrategy::Name => "name",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Tag => "tag",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "identifier" => Some(LocatorStrategy::Identifier),
            "id" => Some(LocatorStrategy::Id),
            "name" => Some(LocatorStrategy::Name),
            "xpath" => Some(LocatorStrategy::Xpath),
            "css" => Some(LocatorStrategy::Css),
            "tag" => Some(LocatorStrategy::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("element locator must not be empty")]
    Empty,
    #[error("element locator with prefix '{0}' is not supported")]
    UnsupportedStrategy(String),
    #[error("element locator '{0}' has no criteria")]
    MissingCriteria(String),
}

/// A parsed element locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub criteria: String,
}

impl Locator {
    pub fn new(strategy: LocatorStrategy, criteria: impl Into<String>) -> Self {
        Self {
            strategy,
            criteria: criteria.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LocatorError::Empty);
        }
        if trimmed.starts_with("//") {
            return Ok(Locator::new(LocatorStrategy::Xpath, trimmed));
        }
        let Some((prefix, criteria)) = trimmed.split_once('=') else {
            return Ok(Locator::new(LocatorStrategy::Identifier, trimmed));
        };
        let strategy = LocatorStrategy::from_prefix(prefix)
            .ok_or_else(|| LocatorError::UnsupportedStrategy(prefix.trim().to_string()))?;
        let criteria = criteria.trim();
        if criteria.is_empty() {
            return Err(LocatorError::MissingCriteria(trimmed.to_string()));
        }
        Ok(Locator::new(strategy, criteria))
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.criteria)
    }
}
