//! Append-only audit records and reflections.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{EventId, UserId, ValidationError};

/// Outcome of a reminder email attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub enum ReminderStatus {
    /// The provider accepted the email.
    Success,
    /// Every attempt failed.
    Failed,
}

impl ReminderStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            other => Err(ValidationError::new(
                "status",
                format!("unknown reminder status '{other}'"),
            )),
        }
    }
}

/// One reminder email attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderLog {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Recipient.
    pub user_id: UserId,
    /// Event the reminder was for.
    pub event_id: EventId,
    /// Outcome.
    pub status: ReminderStatus,
    /// Error text for failures, subject line for successes.
    pub message: Option<String>,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
}

impl ReminderLog {
    /// Creates a log row stamped `now`.
    #[must_use]
    pub fn new(
        user_id: UserId,
        event_id: EventId,
        status: ReminderStatus,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user_id,
            event_id,
            status,
            message,
            timestamp: now,
        }
    }
}

/// Summary of one bulk CSV import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLog {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Importing user.
    pub user_id: UserId,
    /// Uploaded file name.
    pub file_name: String,
    /// Run timestamp.
    pub imported_at: DateTime<Utc>,
    /// Rows committed.
    pub success_count: i32,
    /// Rows rejected.
    pub failure_count: i32,
    /// One entry per rejected row.
    pub errors: Vec<String>,
}

/// A user's note about a past event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reflection {
    /// Author.
    pub user_id: UserId,
    /// Event reflected on.
    pub event_id: EventId,
    /// Note text.
    pub note: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last edit timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [ReminderStatus::Success, ReminderStatus::Failed] {
            assert_eq!(status.as_str().parse::<ReminderStatus>().ok(), Some(status));
        }
        assert!("Queued".parse::<ReminderStatus>().is_err());
    }
}
