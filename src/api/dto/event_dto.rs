//! Event, media and reflection DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    Event, EventId, EventMedia, EventType, MediaId, MediaKind, Reflection,
};
use crate::service::event_service::{EventSort, PastEventQuery};

/// An event as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventDto {
    /// Event id.
    pub id: EventId,
    /// Name of the person or occasion.
    pub name: String,
    /// Occasion kind.
    pub event_type: EventType,
    /// Custom label for `other`, display name otherwise.
    pub occasion: String,
    /// Date of the occasion.
    pub date: NaiveDate,
    /// Reminder lead time in days.
    pub remind_days_before: i32,
    /// Greeting message.
    pub message: Option<String>,
    /// Label for `other` events.
    pub custom_label: Option<String>,
    /// Cultural card theme.
    pub cultural_theme: bool,
    /// Milestones.
    pub highlights: Option<String>,
    /// Regenerates yearly.
    pub is_recurring: bool,
    /// Archived.
    pub is_archived: bool,
    /// Reminder sent for the current window.
    pub notified: bool,
    /// Owner warned about media deletion.
    pub deletion_notified: bool,
    /// When attached media will be purged.
    pub deletion_scheduled: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit.
    pub updated_at: DateTime<Utc>,
}

impl From<&Event> for EventDto {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            name: event.name.clone(),
            event_type: event.event_type,
            occasion: event.occasion_label().to_string(),
            date: event.date,
            remind_days_before: event.remind_days_before,
            message: event.message.clone(),
            custom_label: event.custom_label.clone(),
            cultural_theme: event.cultural_theme,
            highlights: event.highlights.clone(),
            is_recurring: event.is_recurring,
            is_archived: event.is_archived,
            notified: event.notified,
            deletion_notified: event.deletion_notified,
            deletion_scheduled: event.deletion_scheduled,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// A media object as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct MediaDto {
    /// Media id.
    pub id: MediaId,
    /// Owning event.
    pub event_id: EventId,
    /// Public URL.
    pub url: String,
    /// Image or audio.
    pub kind: MediaKind,
    /// MIME type.
    pub content_type: String,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

impl From<&EventMedia> for MediaDto {
    fn from(media: &EventMedia) -> Self {
        Self {
            id: media.id,
            event_id: media.event_id,
            url: media.url.clone(),
            kind: media.kind,
            content_type: media.content_type.clone(),
            uploaded_at: media.uploaded_at,
        }
    }
}

/// Response body for `GET /events/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventDetailResponse {
    /// The event.
    pub event: EventDto,
    /// Attached media.
    pub media: Vec<MediaDto>,
}

/// Response body for `POST /events/{id}/media`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MediaUploadResponse {
    /// Newly stored media.
    pub media: Vec<MediaDto>,
}

/// Query for `GET /events`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListEventsParams {
    /// `date` (default) or `name`.
    #[serde(default)]
    pub sort_by: Option<EventSort>,
}

/// Query for `GET /events/past`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PastEventsParams {
    /// Only this kind.
    #[serde(default)]
    pub event_type: Option<EventType>,
    /// First day included.
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Last day included.
    #[serde(default)]
    pub to: Option<NaiveDate>,
    /// Substring of name or custom label.
    #[serde(default)]
    pub search: Option<String>,
}

impl From<PastEventsParams> for PastEventQuery {
    fn from(params: PastEventsParams) -> Self {
        Self {
            event_type: params.event_type,
            date_from: params.from,
            date_to: params.to,
            search: params.search,
        }
    }
}

/// Request body for `PUT /events/{id}/reflection`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReflectionRequest {
    /// Note text.
    pub note: String,
}

/// A reflection as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReflectionDto {
    /// Event reflected on.
    pub event_id: EventId,
    /// Note text.
    pub note: String,
    /// First written.
    pub created_at: DateTime<Utc>,
    /// Last edited.
    pub updated_at: DateTime<Utc>,
}

impl From<&Reflection> for ReflectionDto {
    fn from(r: &Reflection) -> Self {
        Self {
            event_id: r.event_id,
            note: r.note.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
