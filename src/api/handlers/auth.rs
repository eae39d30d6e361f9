//! Account handlers: register, verify, resend, login and profile.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    LoginRequest, LoginResponse, MessageResponse, ProfileUpdateRequest, RegisterRequest,
    ResendRequest, UserDto, VerifyRequest,
};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::error::{AppError, ErrorResponse};

/// `POST /auth/register` — Create an account and email a code.
///
/// # Errors
///
/// Returns [`AppError`] on invalid input or a taken username or email.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    summary = "Register",
    description = "Creates an unverified account and emails a six-digit verification code.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserDto),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Username or email taken", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .register(&req.username, &req.email, &req.password)
        .await?;
    Ok((StatusCode::CREATED, Json(UserDto::from(&user))))
}

/// `POST /auth/verify` — Confirm the email address.
///
/// # Errors
///
/// Returns [`AppError`] for an unknown email or a wrong or expired code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify",
    tag = "Auth",
    summary = "Verify email",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Account verified", body = UserDto),
        (status = 400, description = "Wrong or expired code", body = ErrorResponse),
        (status = 404, description = "Unknown account", body = ErrorResponse),
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.verify(&req.email, &req.code).await?;
    Ok(Json(UserDto::from(&user)))
}

/// `POST /auth/resend` — Send a fresh verification code.
///
/// # Errors
///
/// Returns [`AppError`] for an unknown or already verified account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/resend",
    tag = "Auth",
    summary = "Resend verification code",
    request_body = ResendRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 404, description = "Unknown account", body = ErrorResponse),
        (status = 409, description = "Already verified", body = ErrorResponse),
    )
)]
pub async fn resend(
    State(state): State<AppState>,
    Json(req): Json<ResendRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.resend_code(&req.email).await?;
    Ok(Json(MessageResponse::new("verification code sent")))
}

/// `POST /auth/login` — Exchange credentials for a bearer token.
///
/// # Errors
///
/// Returns [`AppError`] for bad credentials, unverified accounts or a
/// locked identifier.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    summary = "Log in",
    description = "Accepts a username or email. Five failures within 15 minutes lock the identifier until the window passes.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Email not verified", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.auth.login(&req.identifier, &req.password).await?;
    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        user: UserDto::from(&issued.user),
    }))
}

/// `GET /profile` — The current account.
#[utoipa::path(
    get,
    path = "/api/v1/profile",
    tag = "Auth",
    summary = "Get profile",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current account", body = UserDto),
        (status = 401, description = "Not logged in", body = ErrorResponse),
    )
)]
pub async fn get_profile(AuthUser(user): AuthUser) -> impl IntoResponse {
    Json(UserDto::from(&user))
}

/// `PUT /profile` — Update notification preferences.
///
/// # Errors
///
/// Returns [`AppError`] for an empty timezone.
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    tag = "Auth",
    summary = "Update profile",
    security(("bearer" = [])),
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Updated account", body = UserDto),
        (status = 400, description = "Invalid input", body = ErrorResponse),
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .update_profile(user, req.notification_email, req.timezone)
        .await?;
    Ok(Json(UserDto::from(&user)))
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify", post(verify))
        .route("/auth/resend", post(resend))
        .route("/auth/login", post(login))
        .route("/profile", get(get_profile).put(update_profile))
}
