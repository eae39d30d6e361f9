//! MailerSend REST client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{EmailMessage, MailError, Mailer};

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: Address<'a>,
    to: [Address<'a>; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

/// Sends mail through `POST {api_url}` with a bearer API key.
#[derive(Debug, Clone)]
pub struct MailerSendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: Option<String>,
}

impl MailerSendMailer {
    /// Builds a client for the given endpoint and sender.
    ///
    /// `from_email` may be given as `Name <addr>`; only the address is kept.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        api_url: String,
        api_key: String,
        from_email: &str,
        from_name: Option<String>,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            api_key,
            from_email: bare_address(from_email).to_string(),
            from_name,
        })
    }
}

/// Extracts `addr` from `Name <addr>`; returns the input otherwise.
fn bare_address(from: &str) -> &str {
    match (from.find('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => from.get(start + 1..end).unwrap_or(from).trim(),
        _ => from.trim(),
    }
}

#[async_trait]
impl Mailer for MailerSendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let body = SendRequest {
            from: Address {
                email: &self.from_email,
                name: self.from_name.as_deref(),
            },
            to: [Address {
                email: &message.to,
                name: None,
            }],
            subject: &message.subject,
            text: &message.text,
            html: message.html.as_deref(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = %message.to, status = status.as_u16(), "email accepted by provider");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn strips_display_name_from_sender() {
        assert_eq!(bare_address("Reminders <noreply@example.com>"), "noreply@example.com");
        assert_eq!(bare_address(" noreply@example.com "), "noreply@example.com");
    }

    #[test]
    fn request_body_shape() {
        let body = SendRequest {
            from: Address {
                email: "noreply@example.com",
                name: Some("Reminders"),
            },
            to: [Address {
                email: "asha@example.com",
                name: None,
            }],
            subject: "Hi",
            text: "Hello",
            html: None,
        };
        let Ok(json) = serde_json::to_value(&body) else {
            panic!("serialization failed");
        };
        assert_eq!(json["from"]["name"], "Reminders");
        assert_eq!(json["to"][0]["email"], "asha@example.com");
        assert!(json.get("html").is_none());
    }
}
