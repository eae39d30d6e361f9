//! Service layer: business logic orchestration.
//!
//! Services own `Arc`s to the [`crate::persistence::Store`], the
//! [`crate::mail::Mailer`] and the [`crate::storage::ObjectStorage`] seams
//! and are shared by the HTTP handlers and the `jobs` subcommand.

pub mod analytics_service;
pub mod auth_service;
pub mod card_service;
pub mod event_service;
pub mod import_service;
pub mod job_service;
pub mod passwords;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

pub use analytics_service::AnalyticsService;
pub use auth_service::AuthService;
pub use card_service::CardService;
pub use event_service::EventService;
pub use import_service::ImportService;
pub use job_service::JobService;
pub use passwords::Passwords;

/// Offset used when none is configured: UTC+05:30.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

/// Decides which calendar day "today" is.
///
/// Event dates carry no timezone, so every comparison against today goes
/// through one fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    /// Creates a calendar for `offset`.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Today's date.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    /// The local date at instant `at`.
    #[must_use]
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

impl Default for Calendar {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60).unwrap_or(Utc.fix());
        Self::new(offset)
    }
}

/// A batch stage, as named on the command line and in job URLs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum JobStage {
    /// Send due reminder emails.
    Reminders,
    /// Regenerate recurring events for next year.
    Recurring,
    /// Warn owners before media of past events is purged.
    DeletionNotices,
    /// Purge media whose deletion time has come.
    MediaCleanup,
    /// Every stage, in the order above.
    #[serde(alias = "run-all")]
    #[value(alias = "run-all")]
    All,
}

impl JobStage {
    /// Stage name used in logs and URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reminders => "reminders",
            Self::Recurring => "recurring",
            Self::DeletionNotices => "deletion-notices",
            Self::MediaCleanup => "media-cleanup",
            Self::All => "all",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_calendar_is_ahead_of_utc() {
        let calendar = Calendar::default();
        // 20:00 UTC is already the next day at +05:30.
        let Some(at) = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).single() else {
            return;
        };
        assert_eq!(calendar.date_of(at), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap_or_default());
    }

    #[test]
    fn stage_names_match_cli_values() {
        use clap::ValueEnum;
        for stage in JobStage::value_variants() {
            let Some(value) = stage.to_possible_value() else {
                continue;
            };
            assert_eq!(value.get_name(), stage.as_str());
        }
    }
}
