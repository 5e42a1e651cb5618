//! Classification tags attached to documents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TagError;

const MAX_KEY_LEN: usize = 50;
const MAX_VALUE_LEN: usize = 100;

/// `key:value` classification label used for filtering (e.g. `dept:finance`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Create a validated tag. Keys and values are lowercased.
    ///
    /// # Errors
    ///
    /// Returns `TagError::InvalidKey` / `TagError::InvalidValue` when either
    /// part is empty, too long, or contains unsupported characters.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, TagError> {
        let key = key.into().trim().to_lowercase();
        let value = value.into().trim().to_lowercase();

        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(TagError::InvalidKey(format!(
                "key must be 1-{} characters, got '{}'",
                MAX_KEY_LEN, key
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TagError::InvalidKey(format!(
                "key '{}' must be alphanumeric with underscore or hyphen",
                key
            )));
        }

        if value.is_empty() || value.len() > MAX_VALUE_LEN {
            return Err(TagError::InvalidValue(format!(
                "value must be 1-{} characters, got '{}'",
                MAX_VALUE_LEN, value
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
        {
            return Err(TagError::InvalidValue(format!(
                "value '{}' must be alphanumeric with underscore, hyphen, dot or slash",
                value
            )));
        }

        Ok(Self { key, value })
    }

    /// Flat `key:value` form stored in the vector index.
    pub fn to_storage_string(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((key, value)) => Tag::new(key, value),
            None => Err(TagError::ParseError(format!(
                "invalid tag format '{}', expected 'key:value'",
                s
            ))),
        }
    }
}

/// Parse a comma-separated tag list, dropping duplicates while keeping order.
pub fn parse_tags(s: &str) -> Result<Vec<Tag>, TagError> {
    let mut tags: Vec<Tag> = Vec::new();
    for part in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let tag: Tag = part.parse()?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}
