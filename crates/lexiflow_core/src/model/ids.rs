//! Typed identifiers for users, calendar days, and vocabulary items.
//!
//! # Invariants
//! - `UserId` is never blank and carries no surrounding whitespace.
//! - `DayId` is always a zero-padded, valid `YYYY-MM-DD` calendar date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DAY_ID_FORMAT: &str = "%Y-%m-%d";

/// Identifier of one vocabulary item in the public pool.
///
/// Kept as a type alias; pool documents are keyed by opaque strings.
pub type WordId = String;

/// Verified or requested user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parses a user id, rejecting blank input.
    pub fn parse(value: &str) -> Result<Self, UserIdError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(UserIdError::Blank);
        }
        if trimmed.len() != value.len() {
            return Err(UserIdError::SurroundingWhitespace);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// User id parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdError {
    Blank,
    SurroundingWhitespace,
}

impl Display for UserIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank => write!(f, "user id must not be blank"),
            Self::SurroundingWhitespace => {
                write!(f, "user id must not have leading or trailing whitespace")
            }
        }
    }
}

impl Error for UserIdError {}

/// Civil calendar day used as the partition key for daily state.
///
/// Serialized as the plain `YYYY-MM-DD` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayId(String);

impl DayId {
    /// Parses a strict `YYYY-MM-DD` day id.
    pub fn parse(value: &str) -> Result<Self, DayIdError> {
        let date = NaiveDate::parse_from_str(value, DAY_ID_FORMAT)
            .map_err(|_| DayIdError::Malformed(value.to_string()))?;
        let canonical = Self::from_date(date);
        // chrono accepts unpadded fields; stored keys must be canonical.
        if canonical.0 != value {
            return Err(DayIdError::Malformed(value.to_string()));
        }
        Ok(canonical)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(DAY_ID_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for DayId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DayId {
    type Error = DayIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DayId> for String {
    fn from(value: DayId) -> Self {
        value.0
    }
}

/// Day id parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayIdError {
    Malformed(String),
}

impl Display for DayIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "day id must be YYYY-MM-DD, got `{value}`"),
        }
    }
}

impl Error for DayIdError {}
