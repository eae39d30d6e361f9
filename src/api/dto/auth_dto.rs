//! Account DTOs: registration, verification, login and profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{User, UserId};

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Login name, 3 to 150 characters.
    pub username: String,
    /// Email address the verification code is sent to.
    pub email: String,
    /// At least 8 characters.
    pub password: String,
}

/// Request body for `POST /auth/verify`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// Registered email address.
    pub email: String,
    /// Six-digit code from the email.
    pub code: String,
}

/// Request body for `POST /auth/resend`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResendRequest {
    /// Registered email address.
    pub email: String,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email address.
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    /// Account password.
    pub password: String,
}

/// Response body for `POST /auth/login`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for the `Authorization` header.
    pub token: String,
    /// Always `Bearer`.
    pub token_type: &'static str,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// The logged-in account.
    pub user: UserDto,
}

/// Public view of an account.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserDto {
    /// Account id.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Email confirmed.
    pub is_verified: bool,
    /// Reminder emails enabled.
    pub notification_email: bool,
    /// Preferred timezone label.
    pub timezone: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_verified: user.is_verified,
            notification_email: user.notification_email,
            timezone: user.timezone.clone(),
            created_at: user.created_at,
        }
    }
}

/// Request body for `PUT /profile`. Omitted fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    /// Receive reminder emails.
    #[serde(default)]
    pub notification_email: Option<bool>,
    /// Preferred timezone label.
    #[serde(default)]
    pub timezone: Option<String>,
}
