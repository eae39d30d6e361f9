//! Persistence layer: the [`Store`] trait and its implementations.
//!
//! [`postgres::PostgresStore`] is the production backend (`sqlx::PgPool`
//! plus the SQL migrations under `migrations/`). [`memory::MemoryStore`]
//! keeps everything in process and backs tests and local runs with
//! `PERSISTENCE_ENABLED=false`.

pub mod memory;
mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    CardPage, CardShare, Event, EventId, EventMedia, EventType, ImportLog, MediaId, Reflection,
    ReminderLog, ShareToken, User, UserId, VerificationCode,
};

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint would be violated.
    #[error("{0}")]
    Conflict(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Sort order for [`EventFilter`] queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrder {
    /// Soonest first, ties by name.
    #[default]
    DateAsc,
    /// Latest first, ties by name.
    DateDesc,
    /// Alphabetical, ties by date.
    NameAsc,
}

/// Conjunctive event query. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Owner.
    pub user_id: Option<UserId>,
    /// Archived flag.
    pub archived: Option<bool>,
    /// Reminder-sent flag.
    pub notified: Option<bool>,
    /// Recurrence flag.
    pub recurring: Option<bool>,
    /// Deletion-warning flag.
    pub deletion_notified: Option<bool>,
    /// Occasion kind.
    pub event_type: Option<EventType>,
    /// Inclusive lower date bound.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub date_to: Option<NaiveDate>,
    /// Exclusive upper date bound.
    pub date_before: Option<NaiveDate>,
    /// `deletion_scheduled` is set and not after this instant.
    pub deletion_due_by: Option<DateTime<Utc>>,
    /// At least one media object is attached (or none, when `false`).
    pub has_media: Option<bool>,
    /// Exact name match.
    pub name: Option<String>,
    /// Case-insensitive substring of name or custom label.
    pub search: Option<String>,
    /// Result ordering.
    pub order: EventOrder,
}

impl EventFilter {
    /// Filter scoped to one user's events.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Evaluates the filter against one event. `has_media` reports whether
    /// the event has attached media.
    #[must_use]
    pub fn matches(&self, event: &Event, has_media: bool) -> bool {
        fn check<T: PartialEq>(wanted: Option<T>, actual: T) -> bool {
            wanted.is_none_or(|w| w == actual)
        }

        check(self.user_id, event.user_id)
            && check(self.archived, event.is_archived)
            && check(self.notified, event.notified)
            && check(self.recurring, event.is_recurring)
            && check(self.deletion_notified, event.deletion_notified)
            && check(self.event_type, event.event_type)
            && check(self.has_media, has_media)
            && self.date_from.is_none_or(|d| event.date >= d)
            && self.date_to.is_none_or(|d| event.date <= d)
            && self.date_before.is_none_or(|d| event.date < d)
            && self
                .deletion_due_by
                .is_none_or(|due| event.deletion_scheduled.is_some_and(|at| at <= due))
            && self.name.as_deref().is_none_or(|n| event.name == n)
            && self.search.as_deref().is_none_or(|q| {
                let q = q.to_lowercase();
                event.name.to_lowercase().contains(&q)
                    || event
                        .custom_label
                        .as_deref()
                        .is_some_and(|l| l.to_lowercase().contains(&q))
            })
    }

    /// Sorts events according to [`Self::order`].
    pub fn sort(&self, events: &mut [Event]) {
        match self.order {
            EventOrder::DateAsc => {
                events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
            }
            EventOrder::DateDesc => {
                events.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)));
            }
            EventOrder::NameAsc => {
                events.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.date.cmp(&b.date)));
            }
        }
    }
}

/// Durable storage for every entity the service owns.
///
/// Deleting an event removes its media rows, card pages, shares,
/// reflections and reminder logs. Deleting a media row clears the card
/// page references to it.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Inserts a new account.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the username or email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Loads an account by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Loads an account by email or username, case-insensitively. An email
    /// match wins over a username match.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    /// Overwrites an existing account.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    /// Stores a verification code, replacing the user's previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn put_verification_code(&self, code: &VerificationCode) -> Result<(), StoreError>;

    /// Loads the user's pending verification code.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_verification_code(
        &self,
        user_id: UserId,
    ) -> Result<Option<VerificationCode>, StoreError>;

    /// Removes the user's pending verification code.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn delete_verification_code(&self, user_id: UserId) -> Result<(), StoreError>;

    /// Inserts a new event.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Loads an event by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError>;

    /// Overwrites an existing event.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn update_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Deletes an event and everything attached to it. Returns whether a
    /// row was removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn delete_event(&self, id: EventId) -> Result<bool, StoreError>;

    /// Runs an [`EventFilter`] query.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;

    /// Sets `notified` to `to` only if it currently equals `from`.
    /// Returns whether the flag changed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn compare_and_set_notified(
        &self,
        id: EventId,
        from: bool,
        to: bool,
    ) -> Result<bool, StoreError>;

    /// Inserts a media row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn insert_media(&self, media: &EventMedia) -> Result<(), StoreError>;

    /// Loads a media row by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_media(&self, id: MediaId) -> Result<Option<EventMedia>, StoreError>;

    /// Lists an event's media, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_media(&self, event_id: EventId) -> Result<Vec<EventMedia>, StoreError>;

    /// Lists media across all of a user's events.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_media_for_user(&self, user_id: UserId) -> Result<Vec<EventMedia>, StoreError>;

    /// Deletes a media row. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn delete_media(&self, id: MediaId) -> Result<bool, StoreError>;

    /// Inserts or replaces the page with the same event and page number.
    /// Returns the stored page (keeping the original id on replace).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn upsert_page(&self, page: &CardPage) -> Result<CardPage, StoreError>;

    /// Lists an event's card pages ordered by page number.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_pages(&self, event_id: EventId) -> Result<Vec<CardPage>, StoreError>;

    /// Deletes one page. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn delete_page(&self, event_id: EventId, page_number: i32) -> Result<bool, StoreError>;

    /// Inserts or replaces the user's reflection on an event.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn upsert_reflection(&self, reflection: &Reflection) -> Result<Reflection, StoreError>;

    /// Loads the user's reflection on an event.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_reflection(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Reflection>, StoreError>;

    /// Inserts a share link.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn insert_share(&self, share: &CardShare) -> Result<(), StoreError>;

    /// Loads a share link by token.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_share(&self, token: ShareToken) -> Result<Option<CardShare>, StoreError>;

    /// Appends a reminder log row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn insert_reminder_log(&self, log: &ReminderLog) -> Result<(), StoreError>;

    /// Lists a user's reminder log rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_reminder_logs(&self, user_id: UserId) -> Result<Vec<ReminderLog>, StoreError>;

    /// Appends an import log row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn insert_import_log(&self, log: &ImportLog) -> Result<(), StoreError>;

    /// Lists a user's import log rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_import_logs(&self, user_id: UserId) -> Result<Vec<ImportLog>, StoreError>;
}
