//! Event lifecycle: CRUD, listings, media, reflections and the past-events
//! export.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{Calendar, Passwords};
use crate::domain::event::derive_card_password;
use crate::domain::media::{MAX_MEDIA_PER_EVENT, object_key};
use crate::domain::{
    Event, EventDraft, EventId, EventMedia, EventType, MediaId, MediaUpload, Reflection, User,
    ValidationError,
};
use crate::error::AppError;
use crate::mail::{Mailer, RetryPolicy, send_with_retry, templates};
use crate::persistence::{EventFilter, EventOrder, Store};
use crate::storage::ObjectStorage;

/// Ordering for the upcoming-events list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventSort {
    /// Soonest first.
    #[default]
    Date,
    /// Alphabetical.
    Name,
}

/// Filters for the past-events list.
#[derive(Debug, Clone, Default)]
pub struct PastEventQuery {
    /// Only this kind.
    pub event_type: Option<EventType>,
    /// Inclusive lower date bound.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub date_to: Option<NaiveDate>,
    /// Substring of name or custom label.
    pub search: Option<String>,
}

/// Owns every user-facing event operation.
#[derive(Debug, Clone)]
pub struct EventService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    passwords: Passwords,
    calendar: Calendar,
}

impl EventService {
    /// Creates a new `EventService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        retry: RetryPolicy,
        passwords: Passwords,
        calendar: Calendar,
    ) -> Self {
        Self {
            store,
            storage,
            mailer,
            retry,
            passwords,
            calendar,
        }
    }

    /// Validates and stores a new event.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] when the draft breaks a rule.
    pub async fn create(&self, user: &User, draft: EventDraft) -> Result<Event, AppError> {
        let draft = draft.validate(self.calendar.today(), true)?;
        let mut event = Event::from_draft(user.id, draft, Utc::now());
        event.card_password_hash = Some(self.passwords.hash(&derive_card_password(&event))?);
        self.store.insert_event(&event).await?;
        tracing::info!(event_id = %event.id, user_id = %user.id, event_type = %event.event_type, "event created");
        Ok(event)
    }

    /// Loads one of the user's events.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn get(&self, user: &User, id: EventId) -> Result<Event, AppError> {
        owned_event(self.store.as_ref(), user, id).await
    }

    /// Media attached to one of the user's events.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn media(&self, user: &User, id: EventId) -> Result<Vec<EventMedia>, AppError> {
        let event = self.get(user, id).await?;
        Ok(self.store.list_media(event.id).await?)
    }

    /// Replaces the editable fields of an event. The past-date rule only
    /// applies when the date changes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] or [`AppError::Validation`].
    pub async fn update(
        &self,
        user: &User,
        id: EventId,
        draft: EventDraft,
    ) -> Result<Event, AppError> {
        let mut event = self.get(user, id).await?;
        let date_changed = draft.date != event.date;
        let draft = draft.validate(self.calendar.today(), date_changed)?;
        let renamed = draft.name != event.name || draft.highlights != event.highlights;

        event.apply_draft(draft, Utc::now());
        if renamed || event.card_password_hash.is_none() {
            event.card_password_hash = Some(self.passwords.hash(&derive_card_password(&event))?);
        }
        self.store.update_event(&event).await?;
        tracing::info!(event_id = %event.id, "event updated");
        Ok(event)
    }

    /// Deletes an event. Stored media objects are removed first; if that
    /// fails nothing is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] when the objects cannot be removed.
    pub async fn delete(&self, user: &User, id: EventId) -> Result<(), AppError> {
        let event = self.get(user, id).await?;
        let keys: Vec<String> = self
            .store
            .list_media(event.id)
            .await?
            .into_iter()
            .map(|m| m.storage_path)
            .collect();
        if !keys.is_empty() {
            self.storage.remove(&keys).await.inspect_err(|e| {
                tracing::error!(event_id = %event.id, error = %e, "media removal failed, event kept");
            })?;
        }
        self.store.delete_event(event.id).await?;
        tracing::info!(event_id = %event.id, media = keys.len(), "event deleted");
        Ok(())
    }

    /// Non-archived events dated today or later.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] on store failure.
    pub async fn list_upcoming(&self, user: &User, sort: EventSort) -> Result<Vec<Event>, AppError> {
        let filter = EventFilter {
            archived: Some(false),
            date_from: Some(self.calendar.today()),
            order: match sort {
                EventSort::Date => EventOrder::DateAsc,
                EventSort::Name => EventOrder::NameAsc,
            },
            ..EventFilter::for_user(user.id)
        };
        Ok(self.store.find_events(&filter).await?)
    }

    /// Non-archived events dated before today, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for an inverted date range.
    pub async fn list_past(
        &self,
        user: &User,
        query: PastEventQuery,
    ) -> Result<Vec<Event>, AppError> {
        if let (Some(from), Some(to)) = (query.date_from, query.date_to)
            && from > to
        {
            return Err(ValidationError::new("date_from", "start date is after end date").into());
        }
        let filter = EventFilter {
            archived: Some(false),
            date_before: Some(self.calendar.today()),
            event_type: query.event_type,
            date_from: query.date_from,
            date_to: query.date_to,
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            order: EventOrder::DateDesc,
            ..EventFilter::for_user(user.id)
        };
        Ok(self.store.find_events(&filter).await?)
    }

    /// Flips the recurrence flag of a birthday or anniversary.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for other event types.
    pub async fn toggle_recurring(&self, user: &User, id: EventId) -> Result<Event, AppError> {
        let mut event = self.get(user, id).await?;
        if !event.event_type.supports_recurrence() {
            return Err(ValidationError::new(
                "is_recurring",
                "recurring events are only allowed for birthdays and anniversaries",
            )
            .into());
        }
        event.is_recurring = !event.is_recurring;
        event.updated_at = Utc::now();
        self.store.update_event(&event).await?;
        Ok(event)
    }

    /// Archives or restores an event.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn set_archived(
        &self,
        user: &User,
        id: EventId,
        archived: bool,
    ) -> Result<Event, AppError> {
        let mut event = self.get(user, id).await?;
        if event.is_archived != archived {
            event.is_archived = archived;
            event.updated_at = Utc::now();
            self.store.update_event(&event).await?;
            tracing::info!(event_id = %event.id, archived, "archive flag changed");
        }
        Ok(event)
    }

    /// Stores uploaded files and attaches them to the event. All files are
    /// validated before the first one is stored.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for bad files or when the event
    /// would exceed its media allowance, [`AppError::Storage`] when an
    /// upload fails.
    pub async fn upload_media(
        &self,
        user: &User,
        id: EventId,
        uploads: Vec<MediaUpload>,
    ) -> Result<Vec<EventMedia>, AppError> {
        let event = self.get(user, id).await?;
        if uploads.is_empty() {
            return Err(ValidationError::new("media_files", "no files uploaded").into());
        }
        let kinds = uploads
            .iter()
            .map(MediaUpload::validate)
            .collect::<Result<Vec<_>, _>>()?;
        let existing = self.store.list_media(event.id).await?.len();
        if existing + uploads.len() > MAX_MEDIA_PER_EVENT {
            return Err(ValidationError::new(
                "media_files",
                format!(
                    "an event can have at most {MAX_MEDIA_PER_EVENT} media files ({existing} attached)"
                ),
            )
            .into());
        }

        let mut stored = Vec::with_capacity(uploads.len());
        for (upload, kind) in uploads.into_iter().zip(kinds) {
            let key = object_key(user.id, event.id, &upload);
            let content_type = upload.content_type.clone();
            self.storage.upload(&key, upload.bytes, &content_type).await?;
            let media = EventMedia {
                id: MediaId::new(),
                event_id: event.id,
                url: self.storage.public_url(&key),
                storage_path: key,
                kind,
                content_type,
                uploaded_at: Utc::now(),
            };
            if let Err(err) = self.store.insert_media(&media).await {
                if let Err(cleanup) = self.storage.remove(&[media.storage_path.clone()]).await {
                    tracing::warn!(
                        event_id = %event.id,
                        key = %media.storage_path,
                        error = %cleanup,
                        "uploaded object left orphaned after media insert failed"
                    );
                }
                return Err(err.into());
            }
            tracing::info!(event_id = %event.id, media_id = %media.id, kind = %kind, "media uploaded");
            stored.push(media);
        }
        Ok(stored)
    }

    /// Removes one media object. When the event is already past the owner
    /// gets an email about it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MediaNotFound`] for unknown or foreign media and
    /// [`AppError::Storage`] when the object cannot be removed.
    pub async fn delete_media(&self, user: &User, id: MediaId) -> Result<(), AppError> {
        let media = self
            .store
            .get_media(id)
            .await?
            .ok_or(AppError::MediaNotFound(id))?;
        let event = owned_event(self.store.as_ref(), user, media.event_id)
            .await
            .map_err(|_| AppError::MediaNotFound(id))?;

        self.storage
            .remove(std::slice::from_ref(&media.storage_path))
            .await?;
        self.store.delete_media(media.id).await?;
        tracing::info!(event_id = %event.id, media_id = %media.id, "media deleted");

        if event.is_expired(self.calendar.today()) {
            let message = templates::media_removed(user, &event, media.kind);
            if let Err(err) = send_with_retry(self.mailer.as_ref(), &message, self.retry).await {
                tracing::warn!(event_id = %event.id, error = %err, "media removal notice not delivered");
            }
        }
        Ok(())
    }

    /// The user's reflection on an event, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn reflection(&self, user: &User, id: EventId) -> Result<Option<Reflection>, AppError> {
        let event = self.get(user, id).await?;
        Ok(self.store.get_reflection(user.id, event.id).await?)
    }

    /// Writes the user's reflection on a past, non-archived event.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for an empty note or an event that
    /// is upcoming or archived.
    pub async fn put_reflection(
        &self,
        user: &User,
        id: EventId,
        note: &str,
    ) -> Result<Reflection, AppError> {
        let event = self.get(user, id).await?;
        if event.is_archived || !event.is_expired(self.calendar.today()) {
            return Err(ValidationError::new(
                "event",
                "reflections can only be written for past events",
            )
            .into());
        }
        let note = note.trim();
        if note.is_empty() {
            return Err(ValidationError::new("note", "reflection cannot be empty").into());
        }
        let now = Utc::now();
        let reflection = Reflection {
            user_id: user.id,
            event_id: event.id,
            note: note.to_string(),
            created_at: now,
            updated_at: now,
        };
        Ok(self.store.upsert_reflection(&reflection).await?)
    }

    /// Renders every past, non-archived event as CSV, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the CSV cannot be written.
    pub async fn export_past_csv(&self, user: &User) -> Result<String, AppError> {
        let events = self.list_past(user, PastEventQuery::default()).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "Name",
                "Event Type",
                "Date",
                "Message",
                "Custom Label",
                "Reflection",
                "Media Count",
            ])
            .map_err(csv_error)?;
        for event in &events {
            let reflection = self.store.get_reflection(user.id, event.id).await?;
            let media_count = self.store.list_media(event.id).await?.len();
            writer
                .write_record([
                    event.name.as_str(),
                    event.event_type.display_name(),
                    &event.date.format("%Y-%m-%d").to_string(),
                    event.message.as_deref().unwrap_or_default(),
                    event.custom_label.as_deref().unwrap_or_default(),
                    reflection.as_ref().map(|r| r.note.as_str()).unwrap_or_default(),
                    &media_count.to_string(),
                ])
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("csv flush failed: {e}")))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
    }
}

/// Loads an event and checks that `user` owns it.
pub(crate) async fn owned_event(
    store: &dyn Store,
    user: &User,
    id: EventId,
) -> Result<Event, AppError> {
    store
        .get_event(id)
        .await?
        .filter(|e| e.user_id == user.id)
        .ok_or(AppError::EventNotFound(id))
}

pub(crate) fn csv_error(err: csv::Error) -> AppError {
    AppError::Internal(format!("csv write failed: {err}"))
}
