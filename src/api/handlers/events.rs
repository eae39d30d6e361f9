//! Event handlers: CRUD, listings, recurrence, archive, media, reflections
//! and the past-events export.

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::api::dto::{
    EventDetailResponse, EventDto, ListEventsParams, MediaDto, MediaUploadResponse,
    PastEventsParams, ReflectionDto, ReflectionRequest,
};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::domain::media::{MAX_IMAGE_BYTES, MAX_MEDIA_PER_EVENT};
use crate::domain::{EventDraft, EventId, MediaId, MediaUpload};
use crate::error::{AppError, ErrorResponse};

/// Request body cap for media uploads: a full allowance of the largest
/// files plus multipart framing.
const MEDIA_BODY_LIMIT: usize = MAX_IMAGE_BYTES * MAX_MEDIA_PER_EVENT + 1024 * 1024;

/// Multipart field carrying media files.
const MEDIA_FIELD: &str = "media_files";

/// `GET /events` — Upcoming events.
///
/// # Errors
///
/// Returns [`AppError`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "Events",
    summary = "List upcoming events",
    description = "Non-archived events dated today or later, sorted by `date` (default) or `name`.",
    security(("bearer" = [])),
    params(ListEventsParams),
    responses(
        (status = 200, description = "Upcoming events", body = Vec<EventDto>),
        (status = 401, description = "Not logged in", body = ErrorResponse),
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ListEventsParams>,
) -> Result<impl IntoResponse, AppError> {
    let events = state
        .events
        .list_upcoming(&user, params.sort_by.unwrap_or_default())
        .await?;
    Ok(Json(events.iter().map(EventDto::from).collect::<Vec<_>>()))
}

/// `POST /events` — Create an event.
///
/// # Errors
///
/// Returns [`AppError::Validation`] when the draft breaks a rule.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Create an event",
    security(("bearer" = [])),
    request_body = EventDraft,
    responses(
        (status = 201, description = "Event created", body = EventDto),
        (status = 400, description = "Invalid event", body = ErrorResponse),
    )
)]
pub async fn create_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(draft): Json<EventDraft>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.events.create(&user, draft).await?;
    Ok((StatusCode::CREATED, Json(EventDto::from(&event))))
}

/// `GET /events/{id}` — One event with its media.
///
/// # Errors
///
/// Returns [`AppError::EventNotFound`] for unknown or foreign events.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Get an event",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Event details", body = EventDetailResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let id = EventId::from_uuid(id);
    let event = state.events.get(&user, id).await?;
    let media = state.events.media(&user, id).await?;
    Ok(Json(EventDetailResponse {
        event: EventDto::from(&event),
        media: media.iter().map(MediaDto::from).collect(),
    }))
}

/// `PUT /events/{id}` — Replace an event's editable fields.
///
/// # Errors
///
/// Returns [`AppError`] for unknown events or invalid drafts.
#[utoipa::path(
    put,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Update an event",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    request_body = EventDraft,
    responses(
        (status = 200, description = "Event updated", body = EventDto),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn update_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(draft): Json<EventDraft>,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .events
        .update(&user, EventId::from_uuid(id), draft)
        .await?;
    Ok(Json(EventDto::from(&event)))
}

/// `DELETE /events/{id}` — Delete an event and its media.
///
/// # Errors
///
/// Returns [`AppError::Storage`] when media objects cannot be removed; the
/// event is kept in that case.
#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Delete an event",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 502, description = "Media removal failed", body = ErrorResponse),
    )
)]
pub async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.events.delete(&user, EventId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /events/{id}/recurring` — Toggle yearly recurrence.
///
/// # Errors
///
/// Returns [`AppError::Validation`] for types that cannot recur.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/recurring",
    tag = "Events",
    summary = "Toggle recurrence",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Event updated", body = EventDto),
        (status = 400, description = "Type cannot recur", body = ErrorResponse),
    )
)]
pub async fn toggle_recurring(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .events
        .toggle_recurring(&user, EventId::from_uuid(id))
        .await?;
    Ok(Json(EventDto::from(&event)))
}

/// `POST /events/{id}/archive` — Hide an event from listings.
///
/// # Errors
///
/// Returns [`AppError::EventNotFound`] for unknown or foreign events.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/archive",
    tag = "Events",
    summary = "Archive an event",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Event archived", body = EventDto),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn archive_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .events
        .set_archived(&user, EventId::from_uuid(id), true)
        .await?;
    Ok(Json(EventDto::from(&event)))
}

/// `POST /events/{id}/unarchive` — Restore an archived event.
///
/// # Errors
///
/// Returns [`AppError::EventNotFound`] for unknown or foreign events.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/unarchive",
    tag = "Events",
    summary = "Unarchive an event",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Event restored", body = EventDto),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn unarchive_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .events
        .set_archived(&user, EventId::from_uuid(id), false)
        .await?;
    Ok(Json(EventDto::from(&event)))
}

/// `POST /events/{id}/media` — Upload images or audio.
///
/// # Errors
///
/// Returns [`AppError`] for malformed multipart bodies, rejected files or
/// storage failures.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/media",
    tag = "Events",
    summary = "Upload media",
    description = "Multipart upload; every part named `media_files` is stored. JPEG, PNG, MP3, WAV and FLAC are accepted, at most three files per event.",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 201, description = "Media stored", body = MediaUploadResponse),
        (status = 400, description = "Rejected file", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse),
    )
)]
pub async fn upload_media(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(MEDIA_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        uploads.push(MediaUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    let stored = state
        .events
        .upload_media(&user, EventId::from_uuid(id), uploads)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MediaUploadResponse {
            media: stored.iter().map(MediaDto::from).collect(),
        }),
    ))
}

/// `DELETE /media/{id}` — Remove one media object.
///
/// # Errors
///
/// Returns [`AppError::MediaNotFound`] for unknown or foreign media.
#[utoipa::path(
    delete,
    path = "/api/v1/media/{id}",
    tag = "Events",
    summary = "Delete media",
    description = "Removes the object from storage and the event. Owners of past events are notified by email.",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Media UUID")),
    responses(
        (status = 204, description = "Media deleted"),
        (status = 404, description = "Media not found", body = ErrorResponse),
    )
)]
pub async fn delete_media(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .events
        .delete_media(&user, MediaId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /events/past` — Past events with filters.
///
/// # Errors
///
/// Returns [`AppError::Validation`] for an inverted date range.
#[utoipa::path(
    get,
    path = "/api/v1/events/past",
    tag = "Events",
    summary = "List past events",
    security(("bearer" = [])),
    params(PastEventsParams),
    responses(
        (status = 200, description = "Past events, newest first", body = Vec<EventDto>),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn list_past_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PastEventsParams>,
) -> Result<impl IntoResponse, AppError> {
    let events = state.events.list_past(&user, params.into()).await?;
    Ok(Json(events.iter().map(EventDto::from).collect::<Vec<_>>()))
}

/// `GET /events/past/export` — Past events as CSV.
///
/// # Errors
///
/// Returns [`AppError`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/events/past/export",
    tag = "Events",
    summary = "Export past events",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv", body = String),
    )
)]
pub async fn export_past_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.events.export_past_csv(&user).await?;
    Ok(csv_download("past_events.csv", csv))
}

/// `GET /events/{id}/reflection` — The user's note on a past event.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] when no reflection was written.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/reflection",
    tag = "Events",
    summary = "Get reflection",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Reflection", body = ReflectionDto),
        (status = 404, description = "No reflection", body = ErrorResponse),
    )
)]
pub async fn get_reflection(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let reflection = state
        .events
        .reflection(&user, EventId::from_uuid(id))
        .await?
        .ok_or_else(|| AppError::NotFound("reflection".to_string()))?;
    Ok(Json(ReflectionDto::from(&reflection)))
}

/// `PUT /events/{id}/reflection` — Write the user's note on a past event.
///
/// # Errors
///
/// Returns [`AppError::Validation`] for upcoming or archived events.
#[utoipa::path(
    put,
    path = "/api/v1/events/{id}/reflection",
    tag = "Events",
    summary = "Write reflection",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    request_body = ReflectionRequest,
    responses(
        (status = 200, description = "Reflection saved", body = ReflectionDto),
        (status = 400, description = "Event is not past", body = ErrorResponse),
    )
)]
pub async fn put_reflection(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ReflectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reflection = state
        .events
        .put_reflection(&user, EventId::from_uuid(id), &req.note)
        .await?;
    Ok(Json(ReflectionDto::from(&reflection)))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidRequest(format!("malformed multipart body: {err}"))
}

/// A CSV body served as a file download.
pub(crate) fn csv_download(file_name: &str, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
}

/// Event and media routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/past", get(list_past_events))
        .route("/events/past/export", get(export_past_events))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/{id}/recurring", post(toggle_recurring))
        .route("/events/{id}/archive", post(archive_event))
        .route("/events/{id}/unarchive", post(unarchive_event))
        .route(
            "/events/{id}/media",
            post(upload_media).layer(DefaultBodyLimit::max(MEDIA_BODY_LIMIT)),
        )
        .route("/media/{id}", delete(delete_media))
        .route(
            "/events/{id}/reflection",
            get(get_reflection).put(put_reflection),
        )
}
