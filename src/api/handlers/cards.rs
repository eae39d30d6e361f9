//! Card handlers: owner-side page editing and sharing, plus the public
//! share endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    CardResponse, CreateShareRequest, PageResponse, PasswordCheckResponse, PasswordRequest,
    PublicCardResponse, PutPageRequest, ShareResponse,
};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::domain::{EventId, ShareToken};
use crate::error::{AppError, ErrorResponse};

/// `GET /events/{id}/card` — The event's card with every page.
///
/// # Errors
///
/// Returns [`AppError::EventNotFound`] for unknown or foreign events.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/card",
    tag = "Cards",
    summary = "Get card",
    description = "A card without pages is given a welcome page on first view.",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Card", body = CardResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_card(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.cards.card(&user, EventId::from_uuid(id)).await?;
    Ok(Json(CardResponse::from(view)))
}

/// `PUT /events/{id}/card/pages/{page}` — Create or replace a page.
///
/// # Errors
///
/// Returns [`AppError::Validation`] for an out-of-range page or foreign
/// media.
#[utoipa::path(
    put,
    path = "/api/v1/events/{id}/card/pages/{page}",
    tag = "Cards",
    summary = "Save card page",
    security(("bearer" = [])),
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("page" = i32, Path, description = "Page number, 1 to 5"),
    ),
    request_body = PutPageRequest,
    responses(
        (status = 200, description = "Page saved", body = PageResponse),
        (status = 400, description = "Invalid page", body = ErrorResponse),
    )
)]
pub async fn put_page(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, page)): Path<(uuid::Uuid, i32)>,
    Json(req): Json<PutPageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .cards
        .put_page(&user, EventId::from_uuid(id), page, req.into())
        .await?;
    Ok(Json(PageResponse::from(&page)))
}

/// `DELETE /events/{id}/card/pages/{page}` — Remove a page.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] when the page does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}/card/pages/{page}",
    tag = "Cards",
    summary = "Delete card page",
    security(("bearer" = [])),
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("page" = i32, Path, description = "Page number, 1 to 5"),
    ),
    responses(
        (status = 204, description = "Page deleted"),
        (status = 404, description = "Page not found", body = ErrorResponse),
    )
)]
pub async fn delete_page(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, page)): Path<(uuid::Uuid, i32)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .cards
        .delete_page(&user, EventId::from_uuid(id), page)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /events/{id}/card/password` — Check a guess at the card password.
///
/// # Errors
///
/// Returns [`AppError::EventNotFound`] for unknown or foreign events.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/card/password",
    tag = "Cards",
    summary = "Check card password",
    description = "Comparison ignores case and surrounding whitespace.",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Check result", body = PasswordCheckResponse),
    )
)]
pub async fn check_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<PasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let valid = state
        .cards
        .check_password(&user, EventId::from_uuid(id), &req.password)
        .await?;
    Ok(Json(PasswordCheckResponse { valid }))
}

/// `POST /events/{id}/shares` — Create a share link.
///
/// # Errors
///
/// Returns [`AppError::EventNotFound`] for unknown or foreign events.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/shares",
    tag = "Cards",
    summary = "Share card",
    description = "Creates an expiring link, optionally password protected. When `recipient_email` is set the link is also emailed; a failed email does not fail the request.",
    security(("bearer" = [])),
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    request_body = CreateShareRequest,
    responses(
        (status = 201, description = "Share created", body = ShareResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn create_share(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<CreateShareRequest>,
) -> Result<impl IntoResponse, AppError> {
    let link = state
        .cards
        .create_share(
            &user,
            EventId::from_uuid(id),
            req.password.as_deref(),
            req.recipient_email.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ShareResponse::from(link))))
}

/// `GET /share/{token}` — Open a shared card.
///
/// # Errors
///
/// Returns 404 for unknown links, 410 once expired and 401 for protected
/// links.
#[utoipa::path(
    get,
    path = "/share/{token}",
    tag = "Share",
    summary = "Open shared card",
    params(("token" = uuid::Uuid, Path, description = "Share token")),
    responses(
        (status = 200, description = "Shared card", body = PublicCardResponse),
        (status = 401, description = "Password required", body = ErrorResponse),
        (status = 404, description = "Unknown link", body = ErrorResponse),
        (status = 410, description = "Link expired", body = ErrorResponse),
    )
)]
pub async fn open_share(
    State(state): State<AppState>,
    Path(token): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, AppError> {
    public_card(&state, token, None).await
}

/// `POST /share/{token}/unlock` — Open a password-protected shared card.
///
/// # Errors
///
/// Returns 401 when the password is wrong.
#[utoipa::path(
    post,
    path = "/share/{token}/unlock",
    tag = "Share",
    summary = "Unlock shared card",
    params(("token" = uuid::Uuid, Path, description = "Share token")),
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Shared card", body = PublicCardResponse),
        (status = 401, description = "Wrong password", body = ErrorResponse),
        (status = 410, description = "Link expired", body = ErrorResponse),
    )
)]
pub async fn unlock_share(
    State(state): State<AppState>,
    Path(token): Path<uuid::Uuid>,
    Json(req): Json<PasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    public_card(&state, token, Some(&req.password)).await
}

async fn public_card(
    state: &AppState,
    token: uuid::Uuid,
    password: Option<&str>,
) -> Result<Json<PublicCardResponse>, AppError> {
    let (share, view) = state
        .cards
        .open_share(ShareToken::from_uuid(token), password)
        .await?;
    Ok(Json(PublicCardResponse {
        card: CardResponse::from(view),
        expires_at: share.expires_at,
    }))
}

/// Authenticated card routes, nested under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/card", get(get_card))
        .route(
            "/events/{id}/card/pages/{page}",
            put(put_page).delete(delete_page),
        )
        .route("/events/{id}/card/password", post(check_password))
        .route("/events/{id}/shares", post(create_share))
}

/// Public share routes, mounted at the root.
pub fn share_routes() -> Router<AppState> {
    Router::new()
        .route("/share/{token}", get(open_share))
        .route("/share/{token}/unlock", post(unlock_share))
}
