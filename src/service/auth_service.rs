//! Accounts: registration, email verification, login and bearer tokens.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::passwords::Passwords;
use crate::domain::user::validate_registration;
use crate::domain::{User, UserId, ValidationError, VerificationCode};
use crate::error::AppError;
use crate::mail::{Mailer, RetryPolicy, send_with_retry, templates};
use crate::persistence::Store;

/// Failed logins allowed per identifier inside [`LOCKOUT_WINDOW_MINUTES`].
pub const MAX_FAILED_LOGINS: usize = 5;

/// Sliding window for counting failed logins.
pub const LOCKOUT_WINDOW_MINUTES: i64 = 15;

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Username at issue time.
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: usize,
}

/// A freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded JWT.
    pub token: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Account the token belongs to.
    pub user: User,
}

/// Per-identifier failed login timestamps.
#[derive(Debug, Default)]
struct LoginThrottle {
    failures: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl LoginThrottle {
    fn window() -> Duration {
        Duration::minutes(LOCKOUT_WINDOW_MINUTES)
    }

    async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut failures = self.failures.lock().await;
        let Some(times) = failures.get_mut(key) else {
            return Ok(());
        };
        times.retain(|t| *t + Self::window() > now);
        if times.len() < MAX_FAILED_LOGINS {
            return Ok(());
        }
        let oldest = times.iter().min().copied().unwrap_or(now);
        let retry_after = (oldest + Self::window() - now).num_seconds().max(1);
        Err(AppError::RateLimited {
            retry_after_secs: u64::try_from(retry_after).unwrap_or(1),
        })
    }

    /// Records a failed attempt and drops every entry that has aged out of
    /// the window, so keys that never log in again do not accumulate.
    async fn record_failure(&self, key: &str, now: DateTime<Utc>) {
        let mut failures = self.failures.lock().await;
        failures.retain(|_, times| {
            times.retain(|t| *t + Self::window() > now);
            !times.is_empty()
        });
        failures.entry(key.to_string()).or_default().push(now);
    }

    async fn reset(&self, key: &str) {
        self.failures.lock().await.remove(key);
    }
}

/// Registration, verification and login.
pub struct AuthService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    passwords: Passwords,
    jwt_secret: String,
    token_ttl: Duration,
    throttle: LoginThrottle,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Creates a new `AuthService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        retry: RetryPolicy,
        passwords: Passwords,
        jwt_secret: String,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            retry,
            passwords,
            jwt_secret,
            token_ttl,
            throttle: LoginThrottle::default(),
        }
    }

    /// Creates an unverified account and emails a verification code.
    ///
    /// A failed email does not fail registration; the user can ask for
    /// the code again.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for bad input and
    /// [`AppError::Conflict`] when the username or email is taken.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        validate_registration(username, &email, password)?;

        let hash = self.passwords.hash(password)?;
        let user = User::new(username.to_string(), email, hash, Utc::now());
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "account registered");

        self.send_code(&user).await?;
        Ok(user)
    }

    /// Confirms an account with the code sent by email. Verifying an
    /// already verified account is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown email and
    /// [`AppError::Validation`] for a wrong or expired code.
    pub async fn verify(&self, email: &str, code: &str) -> Result<User, AppError> {
        let mut user = self.find_account(email).await?;
        if user.is_verified {
            return Ok(user);
        }
        let Some(stored) = self.store.get_verification_code(user.id).await? else {
            return Err(ValidationError::new("code", "no verification code pending").into());
        };
        if stored.is_expired(Utc::now()) {
            return Err(
                ValidationError::new("code", "verification code expired; request a new one").into(),
            );
        }
        if stored.code != code.trim() {
            return Err(ValidationError::new("code", "invalid verification code").into());
        }

        user.is_verified = true;
        self.store.update_user(&user).await?;
        self.store.delete_verification_code(user.id).await?;
        tracing::info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// Issues and emails a new code, replacing any pending one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown email and
    /// [`AppError::Conflict`] when the account is already verified.
    pub async fn resend_code(&self, email: &str) -> Result<(), AppError> {
        let user = self.find_account(email).await?;
        if user.is_verified {
            return Err(AppError::Conflict("account is already verified".to_string()));
        }
        self.send_code(&user).await
    }

    /// Logs in with a username or email and returns a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RateLimited`] while the identifier is locked,
    /// [`AppError::Unauthorized`] for bad credentials and
    /// [`AppError::EmailNotVerified`] for unverified accounts.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<IssuedToken, AppError> {
        let key = identifier.trim().to_lowercase();
        let now = Utc::now();
        self.throttle.check(&key, now).await?;

        let user = self.store.find_user_by_login(&key).await?;
        let Some(user) = user.filter(|u| self.passwords.verify(password, &u.password_hash)) else {
            self.throttle.record_failure(&key, now).await;
            tracing::warn!(identifier = %key, "failed login");
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        };
        self.throttle.reset(&key).await;

        if !user.is_verified {
            return Err(AppError::EmailNotVerified);
        }

        let expires_at = now + self.token_ttl;
        let claims = Claims {
            sub: user.id.into(),
            username: user.username.clone(),
            exp: usize::try_from(expires_at.timestamp()).unwrap_or(usize::MAX),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))?;

        tracing::info!(user_id = %user.id, "login");
        Ok(IssuedToken {
            token,
            expires_at,
            user,
        })
    }

    /// Resolves a bearer token to a verified account.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unauthorized`] for invalid or expired tokens and
    /// [`AppError::EmailNotVerified`] for unverified accounts.
    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;

        let user = self
            .store
            .get_user(UserId::from_uuid(data.claims.sub))
            .await?
            .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_string()))?;
        if !user.is_verified {
            return Err(AppError::EmailNotVerified);
        }
        Ok(user)
    }

    /// Updates notification preferences. `None` leaves a field unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for an empty timezone.
    pub async fn update_profile(
        &self,
        mut user: User,
        notification_email: Option<bool>,
        timezone: Option<String>,
    ) -> Result<User, AppError> {
        if let Some(enabled) = notification_email {
            user.notification_email = enabled;
        }
        if let Some(tz) = timezone {
            let tz = tz.trim();
            if tz.is_empty() {
                return Err(ValidationError::new("timezone", "timezone cannot be empty").into());
            }
            user.timezone = tz.to_string();
        }
        self.store.update_user(&user).await?;
        Ok(user)
    }

    async fn find_account(&self, email: &str) -> Result<User, AppError> {
        self.store
            .find_user_by_login(email)
            .await?
            .ok_or_else(|| AppError::NotFound("account".to_string()))
    }

    async fn send_code(&self, user: &User) -> Result<(), AppError> {
        let code = VerificationCode::issue(user.id, Utc::now());
        self.store.put_verification_code(&code).await?;
        let message = templates::verification_code(user, &code.code);
        if let Err(err) = send_with_retry(self.mailer.as_ref(), &message, self.retry).await {
            tracing::warn!(user_id = %user.id, error = %err, "verification email not delivered");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::mail::LogMailer;
    use crate::persistence::memory::MemoryStore;

    struct Fixture {
        auth: AuthService,
        mailer: Arc<LogMailer>,
    }

    fn fixture() -> Fixture {
        let mailer = Arc::new(LogMailer::new());
        let auth = AuthService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            RetryPolicy {
                attempts: 1,
                delay: std::time::Duration::ZERO,
            },
            Passwords::low_cost(),
            "test-secret".to_string(),
            Duration::hours(1),
        );
        Fixture { auth, mailer }
    }

    async fn last_code(mailer: &LogMailer) -> String {
        let sent = mailer.sent().await;
        let Some(msg) = sent.last() else {
            panic!("no email sent");
        };
        msg.text
            .split("code is: ")
            .nth(1)
            .map(|rest| rest.chars().take(6).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn recording_a_failure_drops_expired_keys() {
        let throttle = LoginThrottle::default();
        let start = Utc::now();
        throttle.record_failure("old@example.com", start).await;
        throttle.record_failure("recent@example.com", start).await;

        let later = start + LoginThrottle::window() + Duration::seconds(1);
        throttle.record_failure("other@example.com", later).await;

        let failures = throttle.failures.lock().await;
        assert!(!failures.contains_key("old@example.com"));
        assert!(!failures.contains_key("recent@example.com"));
        assert_eq!(failures.get("other@example.com").map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn recording_a_failure_keeps_live_attempts() {
        let throttle = LoginThrottle::default();
        let start = Utc::now();
        throttle.record_failure("a@example.com", start).await;
        throttle
            .record_failure("b@example.com", start + Duration::minutes(1))
            .await;

        let failures = throttle.failures.lock().await;
        assert_eq!(failures.get("a@example.com").map(Vec::len), Some(1));
        assert_eq!(failures.get("b@example.com").map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn register_verify_login() {
        let f = fixture();
        let Ok(user) = f
            .auth
            .register("asha", "Asha@Example.com", "longpassword")
            .await
        else {
            panic!("registration failed");
        };
        assert_eq!(user.email, "asha@example.com");
        assert!(!user.is_verified);

        assert!(matches!(
            f.auth.login("asha", "longpassword").await,
            Err(AppError::EmailNotVerified)
        ));

        let code = last_code(&f.mailer).await;
        assert!(f.auth.verify("asha@example.com", "000000x").await.is_err());
        let Ok(verified) = f.auth.verify("asha@example.com", &code).await else {
            panic!("verification failed");
        };
        assert!(verified.is_verified);

        let Ok(issued) = f.auth.login("ASHA@example.com", "longpassword").await else {
            panic!("login failed");
        };
        let Ok(me) = f.auth.authenticate(&issued.token).await else {
            panic!("token rejected");
        };
        assert_eq!(me.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let f = fixture();
        let _ = f.auth.register("asha", "a@example.com", "longpassword").await;
        assert!(matches!(
            f.auth.register("ASHA", "b@example.com", "longpassword").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn lockout_after_repeated_failures() {
        let f = fixture();
        let _ = f.auth.register("asha", "a@example.com", "longpassword").await;
        for _ in 0..MAX_FAILED_LOGINS {
            assert!(matches!(
                f.auth.login("asha", "wrong-password").await,
                Err(AppError::Unauthorized(_))
            ));
        }
        assert!(matches!(
            f.auth.login("asha", "longpassword").await,
            Err(AppError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let f = fixture();
        assert!(matches!(
            f.auth.authenticate("not.a.jwt").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn resend_replaces_code() {
        let f = fixture();
        let _ = f.auth.register("asha", "a@example.com", "longpassword").await;
        assert!(f.auth.resend_code("a@example.com").await.is_ok());
        assert_eq!(f.mailer.sent().await.len(), 2);
        assert!(matches!(
            f.auth.resend_code("nobody@example.com").await,
            Err(AppError::NotFound(_))
        ));
    }
}
