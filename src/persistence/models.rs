//! Database row types and their mapping onto domain types.
//!
//! Enumerations are stored as text; decoding an unknown value yields
//! [`StoreError::Corrupt`] rather than a panic.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::StoreError;
use crate::domain::{
    CardPage, CardShare, Event, EventMedia, ImportLog, Reflection, ReminderLog, User,
    VerificationCode,
};

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub notification_email: bool,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id.into(),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            is_verified: row.is_verified,
            notification_email: row.notification_email,
            timezone: row.timezone,
            created_at: row.created_at,
        }
    }
}

/// A row from the `verification_codes` table.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCodeRow {
    pub user_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<VerificationCodeRow> for VerificationCode {
    fn from(row: VerificationCodeRow) -> Self {
        Self {
            user_id: row.user_id.into(),
            code: row.code,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub event_type: String,
    pub date: NaiveDate,
    pub recurs_on: NaiveDate,
    pub remind_days_before: i32,
    pub message: Option<String>,
    pub custom_label: Option<String>,
    pub cultural_theme: bool,
    pub highlights: Option<String>,
    pub is_recurring: bool,
    pub is_archived: bool,
    pub notified: bool,
    pub deletion_notified: bool,
    pub deletion_scheduled: Option<DateTime<Utc>>,
    pub card_password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            name: row.name,
            event_type: row.event_type.parse().map_err(corrupt)?,
            date: row.date,
            recurs_on: row.recurs_on,
            remind_days_before: row.remind_days_before,
            message: row.message,
            custom_label: row.custom_label,
            cultural_theme: row.cultural_theme,
            highlights: row.highlights,
            is_recurring: row.is_recurring,
            is_archived: row.is_archived,
            notified: row.notified,
            deletion_notified: row.deletion_notified,
            deletion_scheduled: row.deletion_scheduled,
            card_password_hash: row.card_password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `event_media` table.
#[derive(Debug, Clone, FromRow)]
pub struct MediaRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub url: String,
    pub storage_path: String,
    pub kind: String,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for EventMedia {
    type Error = StoreError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            event_id: row.event_id.into(),
            url: row.url,
            storage_path: row.storage_path,
            kind: row.kind.parse().map_err(corrupt)?,
            content_type: row.content_type,
            uploaded_at: row.uploaded_at,
        })
    }
}

/// A row from the `card_pages` table.
#[derive(Debug, Clone, FromRow)]
pub struct CardPageRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub page_number: i32,
    pub image_id: Option<Uuid>,
    pub audio_id: Option<Uuid>,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CardPageRow> for CardPage {
    fn from(row: CardPageRow) -> Self {
        Self {
            id: row.id.into(),
            event_id: row.event_id.into(),
            page_number: row.page_number,
            image_id: row.image_id.map(Into::into),
            audio_id: row.audio_id.map(Into::into),
            caption: row.caption,
            created_at: row.created_at,
        }
    }
}

/// A row from the `card_shares` table.
#[derive(Debug, Clone, FromRow)]
pub struct CardShareRow {
    pub token: Uuid,
    pub event_id: Uuid,
    pub password_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<CardShareRow> for CardShare {
    fn from(row: CardShareRow) -> Self {
        Self {
            token: row.token.into(),
            event_id: row.event_id.into(),
            password_hash: row.password_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

/// A row from the `reflections` table.
#[derive(Debug, Clone, FromRow)]
pub struct ReflectionRow {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReflectionRow> for Reflection {
    fn from(row: ReflectionRow) -> Self {
        Self {
            user_id: row.user_id.into(),
            event_id: row.event_id.into(),
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A row from the `reminder_logs` table.
#[derive(Debug, Clone, FromRow)]
pub struct ReminderLogRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub status: String,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<ReminderLogRow> for ReminderLog {
    type Error = StoreError;

    fn try_from(row: ReminderLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id.into(),
            event_id: row.event_id.into(),
            status: row.status.parse().map_err(corrupt)?,
            message: row.message,
            timestamp: row.timestamp,
        })
    }
}

/// A row from the `import_logs` table. `errors` is newline-separated.
#[derive(Debug, Clone, FromRow)]
pub struct ImportLogRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub imported_at: DateTime<Utc>,
    pub success_count: i32,
    pub failure_count: i32,
    pub errors: String,
}

impl From<ImportLogRow> for ImportLog {
    fn from(row: ImportLogRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id.into(),
            file_name: row.file_name,
            imported_at: row.imported_at,
            success_count: row.success_count,
            failure_count: row.failure_count,
            errors: row
                .errors
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_row(event_type: &str) -> EventRow {
        let now = Utc::now();
        EventRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Asha".to_string(),
            event_type: event_type.to_string(),
            date: now.date_naive(),
            recurs_on: now.date_naive(),
            remind_days_before: 1,
            message: None,
            custom_label: None,
            cultural_theme: false,
            highlights: None,
            is_recurring: true,
            is_archived: false,
            notified: false,
            deletion_notified: false,
            deletion_scheduled: None,
            card_password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unknown_event_type_is_corrupt() {
        assert!(Event::try_from(event_row("raksha_bandhan")).is_ok());
        assert!(matches!(
            Event::try_from(event_row("wedding")),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn import_errors_split_on_newlines() {
        let row = ImportLogRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            file_name: "events.csv".to_string(),
            imported_at: Utc::now(),
            success_count: 1,
            failure_count: 2,
            errors: "Row 2: bad date\nRow 3: bad type\n".to_string(),
        };
        let log = ImportLog::from(row);
        assert_eq!(log.errors, ["Row 2: bad date", "Row 3: bad type"]);
    }
}
