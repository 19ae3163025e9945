// Copyright (c) 2025 - Cowboy AI, Inc.
//! CloudFormation Logical ID Value Object

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Logical ID validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogicalIdError {
    #[error("Logical ID is empty")]
    Empty,

    #[error("Logical ID exceeds maximum length of 255 characters: {0}")]
    TooLong(usize),

    #[error("Invalid character in logical ID {id}: {ch:?}")]
    InvalidCharacter { id: String, ch: char },
}

/// Template-unique resource name
///
/// Invariants:
/// - Non-empty
/// - At most 255 characters
/// - ASCII alphanumeric only
///
/// # Examples
///
/// ```rust
/// use swift_infrastructure::domain::LogicalId;
///
/// let id = LogicalId::new("SwiftVPCSAGSNLSubnet1").unwrap();
/// assert_eq!(id.as_str(), "SwiftVPCSAGSNLSubnet1");
///
/// assert!(LogicalId::new("").is_err());
/// assert!(LogicalId::new("Swift-VPC").is_err());
///
/// // Free-form names are squeezed into a valid id
/// let id = LogicalId::sanitized(["SAGSNL1", "-> Endpoint (443)"]).unwrap();
/// assert_eq!(id.as_str(), "SAGSNL1Endpoint443");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Maximum length accepted by CloudFormation
    pub const MAX_LENGTH: usize = 255;

    /// Create a new logical ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, LogicalIdError> {
        let id = id.into();

        if id.is_empty() {
            return Err(LogicalIdError::Empty);
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(LogicalIdError::TooLong(id.len()));
        }

        if let Some(ch) = id.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(LogicalIdError::InvalidCharacter { id, ch });
        }

        Ok(Self(id))
    }

    /// Concatenate parts, dropping every non-alphanumeric character
    pub fn sanitized<I, S>(parts: I) -> Result<Self, LogicalIdError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: String = parts
            .into_iter()
            .flat_map(|part| {
                part.as_ref()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self::new(joined)
    }

    /// Get the logical ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a suffix, producing a derived ID (`SwiftVPC` + `IGW`)
    pub fn child(&self, suffix: &str) -> Result<Self, LogicalIdError> {
        Self::sanitized([self.as_str(), suffix])
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LogicalId {
    type Error = LogicalIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for LogicalId {
    type Error = LogicalIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
