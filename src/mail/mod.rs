//! Outbound email.
//!
//! [`Mailer`] is the seam between services and the mail provider.
//! [`MailerSendMailer`] talks to the MailerSend REST API; [`LogMailer`]
//! records messages in memory and logs them, for local runs and tests.
//! Every send goes through [`send_with_retry`].

pub mod mailersend;
pub mod templates;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

pub use mailersend::MailerSendMailer;

/// Errors returned by a [`Mailer`].
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("provider rejected message with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
}

/// A rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// Optional HTML body.
    pub html: Option<String>,
}

/// Something that can deliver an [`EmailMessage`].
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    /// Delivers one message. A single attempt; no retries.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] when delivery fails.
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Attempt count and fixed wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Sends `message`, retrying with a fixed wait until it succeeds or the
/// policy's attempts run out.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn send_with_retry(
    mailer: &dyn Mailer,
    message: &EmailMessage,
    policy: RetryPolicy,
) -> Result<(), MailError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match mailer.send(message).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    to = %message.to,
                    attempt,
                    error = %err,
                    "email send failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(to = %message.to, attempts, error = %err, "email send failed");
                return Err(err);
            }
        }
    }
}

/// Mailer that logs messages and keeps them in an in-memory outbox.
///
/// [`LogMailer::fail_next`] makes the next `n` sends fail, which is how
/// tests exercise the retry and failure paths.
#[derive(Debug, Default)]
pub struct LogMailer {
    outbox: Mutex<Vec<EmailMessage>>,
    failures_left: AtomicU32,
}

impl LogMailer {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to [`Mailer::send`] fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Messages delivered so far, oldest first.
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.outbox.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MailError::Rejected {
                status: 503,
                body: "simulated outage".to_string(),
            });
        }
        tracing::info!(to = %message.to, subject = %message.subject, "email (not sent, log mailer)");
        self.outbox.lock().await.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "asha@example.com".to_string(),
            subject: "Hello".to_string(),
            text: "Hi".to_string(),
            html: None,
        }
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let mailer = LogMailer::new();
        mailer.fail_next(2);
        assert!(send_with_retry(&mailer, &message(), quick(3)).await.is_ok());
        assert_eq!(mailer.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_attempts() {
        let mailer = LogMailer::new();
        mailer.fail_next(3);
        let result = send_with_retry(&mailer, &message(), quick(3)).await;
        assert!(matches!(result, Err(MailError::Rejected { status: 503, .. })));
        assert!(mailer.sent().await.is_empty());
        assert!(send_with_retry(&mailer, &message(), quick(3)).await.is_ok());
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let mailer = LogMailer::new();
        assert!(send_with_retry(&mailer, &message(), quick(0)).await.is_ok());
        assert_eq!(mailer.sent().await.len(), 1);
    }
}
