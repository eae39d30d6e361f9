//! Events: the occasions users are reminded about.
//!
//! An [`Event`] is created from a validated [`EventDraft`] and afterwards
//! mutated by user edits and by the scheduled jobs (reminder, recurrence,
//! deletion flags).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{EventId, UserId, ValidationError};

/// Maximum length of an event name, in characters.
pub const MAX_NAME_LEN: usize = 500;

/// Maximum length of the custom label used by [`EventType::Other`].
pub const MAX_CUSTOM_LABEL_LEN: usize = 100;

/// Default reminder lead time in days.
pub const DEFAULT_REMIND_DAYS_BEFORE: i32 = 1;

/// Kind of occasion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A birthday. Recurs yearly.
    Birthday,
    /// A wedding or relationship anniversary. Recurs yearly.
    Anniversary,
    /// Raksha Bandhan festival.
    RakshaBandhan,
    /// Any other occasion; requires a custom label.
    Other,
}

impl EventType {
    /// All variants in display order.
    pub const ALL: [Self; 4] = [
        Self::Birthday,
        Self::Anniversary,
        Self::RakshaBandhan,
        Self::Other,
    ];

    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Birthday => "birthday",
            Self::Anniversary => "anniversary",
            Self::RakshaBandhan => "raksha_bandhan",
            Self::Other => "other",
        }
    }

    /// Human-readable label used in emails and CSV exports.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Birthday => "Birthday",
            Self::Anniversary => "Anniversary",
            Self::RakshaBandhan => "Raksha Bandhan",
            Self::Other => "Other",
        }
    }

    /// Whether events of this type may regenerate for the following year.
    #[must_use]
    pub const fn supports_recurrence(self) -> bool {
        matches!(self, Self::Birthday | Self::Anniversary)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    /// Accepts the wire form (`raksha_bandhan`) as well as the display
    /// form (`Raksha Bandhan`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ValidationError::new("event_type", format!("unknown event type '{s}'")))
    }
}

/// User-supplied event fields, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct EventDraft {
    /// Name of the person or occasion.
    pub name: String,
    /// Occasion kind.
    pub event_type: EventType,
    /// Date of the occasion.
    pub date: NaiveDate,
    /// Days before `date` the reminder email is sent.
    #[serde(default = "default_remind_days_before")]
    pub remind_days_before: i32,
    /// Greeting message included in the reminder.
    #[serde(default)]
    pub message: Option<String>,
    /// Custom label; required for [`EventType::Other`].
    #[serde(default)]
    pub custom_label: Option<String>,
    /// Use the cultural card theme.
    #[serde(default)]
    pub cultural_theme: bool,
    /// Milestones, mostly for anniversaries.
    #[serde(default)]
    pub highlights: Option<String>,
    /// Regenerate yearly. Defaults to `true` for birthdays and anniversaries.
    #[serde(default)]
    pub is_recurring: Option<bool>,
}

fn default_remind_days_before() -> i32 {
    DEFAULT_REMIND_DAYS_BEFORE
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl EventDraft {
    /// Normalizes and validates the draft.
    ///
    /// `check_date` enforces that the date is not before `today`; callers
    /// set it for new events and for edits that move the date.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(mut self, today: NaiveDate, check_date: bool) -> Result<Self, ValidationError> {
        self.name = self.name.trim().to_string();
        self.message = non_blank(self.message);
        self.custom_label = non_blank(self.custom_label);
        self.highlights = non_blank(self.highlights);

        if self.name.is_empty() {
            return Err(ValidationError::new("name", "name is required"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::new(
                "name",
                format!("name exceeds {MAX_NAME_LEN} characters"),
            ));
        }
        if self.remind_days_before < 0 {
            return Err(ValidationError::new(
                "remind_days_before",
                "reminder lead time cannot be negative",
            ));
        }
        if check_date && self.date < today {
            return Err(ValidationError::new("date", "event date cannot be in the past"));
        }
        if let Some(label) = &self.custom_label
            && label.chars().count() > MAX_CUSTOM_LABEL_LEN
        {
            return Err(ValidationError::new(
                "custom_label",
                format!("custom label exceeds {MAX_CUSTOM_LABEL_LEN} characters"),
            ));
        }
        if self.event_type == EventType::Other && self.custom_label.is_none() {
            return Err(ValidationError::new(
                "custom_label",
                "custom label is required for Other events",
            ));
        }
        match self.is_recurring {
            Some(true) if !self.event_type.supports_recurrence() => {
                return Err(ValidationError::new(
                    "is_recurring",
                    "recurring events are only allowed for birthdays and anniversaries",
                ));
            }
            None => self.is_recurring = Some(self.event_type.supports_recurrence()),
            Some(_) => {}
        }
        Ok(self)
    }
}

/// A persisted occasion owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Owner.
    pub user_id: UserId,
    /// Name of the person or occasion.
    pub name: String,
    /// Occasion kind.
    pub event_type: EventType,
    /// Date of the occasion.
    pub date: NaiveDate,
    /// Date whose month and day the yearly chain follows. Copies keep it,
    /// so a February 29 occasion returns to the 29th in leap years.
    pub recurs_on: NaiveDate,
    /// Days before `date` the reminder is sent.
    pub remind_days_before: i32,
    /// Greeting message.
    pub message: Option<String>,
    /// Label for [`EventType::Other`].
    pub custom_label: Option<String>,
    /// Use the cultural card theme.
    pub cultural_theme: bool,
    /// Milestones.
    pub highlights: Option<String>,
    /// Regenerates for the next year once the date has passed.
    pub is_recurring: bool,
    /// Soft-deleted.
    pub is_archived: bool,
    /// The reminder for the current window was sent.
    pub notified: bool,
    /// The owner was warned that media will be deleted.
    pub deletion_notified: bool,
    /// When attached media becomes eligible for purge.
    pub deletion_scheduled: Option<DateTime<Utc>>,
    /// Argon2 hash of the derived card password.
    pub card_password_hash: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Builds a new event from a validated draft.
    #[must_use]
    pub fn from_draft(user_id: UserId, draft: EventDraft, now: DateTime<Utc>) -> Self {
        let is_recurring =
            draft.event_type.supports_recurrence() && draft.is_recurring.unwrap_or(true);
        Self {
            id: EventId::new(),
            user_id,
            name: draft.name,
            event_type: draft.event_type,
            date: draft.date,
            recurs_on: draft.date,
            remind_days_before: draft.remind_days_before,
            message: draft.message,
            custom_label: draft.custom_label,
            cultural_theme: draft.cultural_theme,
            highlights: draft.highlights,
            is_recurring,
            is_archived: false,
            notified: false,
            deletion_notified: false,
            deletion_scheduled: None,
            card_password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an edit. Moving the date or the lead time opens a new
    /// reminder window; moving the date also cancels a pending media purge.
    pub fn apply_draft(&mut self, draft: EventDraft, now: DateTime<Utc>) {
        if draft.date != self.date || draft.remind_days_before != self.remind_days_before {
            self.notified = false;
        }
        if draft.date != self.date {
            self.recurs_on = draft.date;
            self.deletion_notified = false;
            self.deletion_scheduled = None;
        }
        self.is_recurring =
            draft.event_type.supports_recurrence() && draft.is_recurring.unwrap_or(self.is_recurring);
        self.name = draft.name;
        self.event_type = draft.event_type;
        self.date = draft.date;
        self.remind_days_before = draft.remind_days_before;
        self.message = draft.message;
        self.custom_label = draft.custom_label;
        self.cultural_theme = draft.cultural_theme;
        self.highlights = draft.highlights;
        self.updated_at = now;
    }

    /// Whether the event date lies before `today`.
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.date < today
    }

    /// Signed number of days from `today` until the event.
    #[must_use]
    pub fn days_until(&self, today: NaiveDate) -> i64 {
        (self.date - today).num_days()
    }

    /// Whether today is the reminder day and no reminder went out yet.
    #[must_use]
    pub fn is_due_for_reminder(&self, today: NaiveDate) -> bool {
        !self.notified
            && !self.is_archived
            && self.days_until(today) == i64::from(self.remind_days_before)
    }

    /// The first yearly occurrence strictly after the event date that
    /// falls on or after `today`, on the month and day of
    /// [`Event::recurs_on`]. February 29 maps to February 28 in non-leap
    /// years only.
    #[must_use]
    pub fn next_occurrence_on_or_after(&self, today: NaiveDate) -> Option<NaiveDate> {
        let mut year = (self.date.year() + 1).max(today.year());
        loop {
            let candidate = anniversary_in(self.recurs_on, year)?;
            if candidate >= today {
                return Some(candidate);
            }
            year = year.checked_add(1)?;
        }
    }

    /// Builds next year's copy of this event. Flags are reset and the
    /// recurrence chain moves to the copy.
    #[must_use]
    pub fn recurrence_copy(&self, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            date,
            is_recurring: true,
            is_archived: false,
            notified: false,
            deletion_notified: false,
            deletion_scheduled: None,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Label shown to people: the custom label for `Other`, the type name
    /// otherwise.
    #[must_use]
    pub fn occasion_label(&self) -> &str {
        match (&self.custom_label, self.event_type) {
            (Some(label), EventType::Other) => label,
            _ => self.event_type.display_name(),
        }
    }
}

fn anniversary_in(date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
}

/// Derives the plain-text card password for an event. Raksha Bandhan
/// cards use the highlights, lowercased; every other type uses the first
/// word of the name, lowercased. Both fall back to `"love"`.
#[must_use]
pub fn derive_card_password(event: &Event) -> String {
    let derived = match event.event_type {
        EventType::RakshaBandhan => event
            .highlights
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_lowercase),
        _ => event.name.split_whitespace().next().map(str::to_lowercase),
    };
    derived.unwrap_or_else(|| "love".to_string())
}
