//! Accounts, notification preferences and email verification codes.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::{UserId, ValidationError};

/// Lifetime of an email verification code.
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 10;

/// Default profile timezone label.
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Login name, unique case-insensitively.
    pub username: String,
    /// Email address, unique case-insensitively.
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// The email address was confirmed with a code.
    pub is_verified: bool,
    /// Receive reminder emails.
    pub notification_email: bool,
    /// Preferred timezone label.
    pub timezone: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates an unverified account with default preferences.
    #[must_use]
    pub fn new(username: String, email: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            username,
            email,
            password_hash,
            is_verified: false,
            notification_email: true,
            timezone: DEFAULT_TIMEZONE.to_string(),
            created_at: now,
        }
    }
}

/// A pending six-digit email verification code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    /// Account being verified.
    pub user_id: UserId,
    /// Six ASCII digits.
    pub code: String,
    /// Issue timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Issues a fresh random code for `user_id`.
    #[must_use]
    pub fn issue(user_id: UserId, now: DateTime<Utc>) -> Self {
        let n: u32 = rand::rng().random_range(0..1_000_000);
        Self {
            user_id,
            code: format!("{n:06}"),
            created_at: now,
            expires_at: now + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES),
        }
    }

    /// Whether the code is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Validates registration input.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the offending field.
pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
) -> Result<(), ValidationError> {
    let username_len = username.chars().count();
    if !(3..=150).contains(&username_len) {
        return Err(ValidationError::new(
            "username",
            "username must be between 3 and 150 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
    {
        return Err(ValidationError::new(
            "username",
            "username may contain letters, digits and @ . + - _ only",
        ));
    }
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid_email || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("email", "enter a valid email address"));
    }
    if password.chars().count() < 8 {
        return Err(ValidationError::new(
            "password",
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}
