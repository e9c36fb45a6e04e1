//! Enum types for shelf entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reading status of a tracked book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    /// On the list, not started
    #[default]
    PlanToRead,
    /// Currently reading
    Reading,
    /// Read to the last chapter
    Completed,
    /// Paused
    OnHold,
    /// Abandoned
    Dropped,
}

impl ReadingStatus {
    pub const ALL: [ReadingStatus; 5] = [
        ReadingStatus::PlanToRead,
        ReadingStatus::Reading,
        ReadingStatus::Completed,
        ReadingStatus::OnHold,
        ReadingStatus::Dropped,
    ];

    /// Convert to wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::PlanToRead => "plan_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Completed => "completed",
            ReadingStatus::OnHold => "on_hold",
            ReadingStatus::Dropped => "dropped",
        }
    }

    /// Parse from wire string representation.
    pub fn from_wire_str(s: &str) -> Result<Self, ReadingStatusParseError> {
        match s.to_lowercase().as_str() {
            "plan_to_read" => Ok(ReadingStatus::PlanToRead),
            "reading" => Ok(ReadingStatus::Reading),
            "completed" => Ok(ReadingStatus::Completed),
            "on_hold" => Ok(ReadingStatus::OnHold),
            "dropped" => Ok(ReadingStatus::Dropped),
            _ => Err(ReadingStatusParseError(s.to_string())),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ReadingStatus::Completed)
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReadingStatus {
    type Err = ReadingStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire_str(s)
    }
}

/// Error when parsing an invalid reading status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingStatusParseError(pub String);

impl fmt::Display for ReadingStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid reading status: {}", self.0)
    }
}

impl std::error::Error for ReadingStatusParseError {}
