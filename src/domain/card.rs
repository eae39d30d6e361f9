//! Greeting cards: ordered pages and public share links.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{EventId, MediaId, PageId, ShareToken, ValidationError};

/// Highest page number a card can have.
pub const MAX_CARD_PAGES: i32 = 5;

/// Caption given to the automatically created first page.
pub const WELCOME_CAPTION: &str = "Welcome to your celebration card!";

/// One page of an event's greeting card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPage {
    /// Unique identifier.
    pub id: PageId,
    /// Owning event.
    pub event_id: EventId,
    /// Position in the card, `1..=MAX_CARD_PAGES`.
    pub page_number: i32,
    /// Image shown on the page.
    pub image_id: Option<MediaId>,
    /// Audio played on the page.
    pub audio_id: Option<MediaId>,
    /// Caption text.
    pub caption: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl CardPage {
    /// The page created the first time a card is opened.
    #[must_use]
    pub fn welcome(event_id: EventId, now: DateTime<Utc>) -> Self {
        Self {
            id: PageId::new(),
            event_id,
            page_number: 1,
            image_id: None,
            audio_id: None,
            caption: Some(WELCOME_CAPTION.to_string()),
            created_at: now,
        }
    }

    /// Number of the page that follows this one, if any.
    #[must_use]
    pub fn next_page(&self) -> Option<i32> {
        (self.page_number < MAX_CARD_PAGES).then_some(self.page_number + 1)
    }
}

/// Checks a page number against the card bounds.
///
/// # Errors
///
/// Returns a [`ValidationError`] when the number is outside `1..=5`.
pub fn validate_page_number(page_number: i32) -> Result<(), ValidationError> {
    if (1..=MAX_CARD_PAGES).contains(&page_number) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "page_number",
            format!("page number must be between 1 and {MAX_CARD_PAGES}"),
        ))
    }
}

/// Whether a share link can still be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    /// The link works.
    Active,
    /// The link is past its expiry.
    Expired,
}

/// A token-addressed public link to an event's card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardShare {
    /// Public token.
    pub token: ShareToken,
    /// Shared event.
    pub event_id: EventId,
    /// Argon2 hash of the optional share password.
    pub password_hash: Option<String>,
    /// Instant after which the link stops working.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl CardShare {
    /// Creates a share that expires `ttl` after `now`.
    #[must_use]
    pub fn new(
        event_id: EventId,
        password_hash: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: ShareToken::new(),
            event_id,
            password_hash,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// Status at `now`. The expiry instant itself counts as expired.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> ShareStatus {
        if now >= self.expires_at {
            ShareStatus::Expired
        } else {
            ShareStatus::Active
        }
    }

    /// Whether opening the link requires a password.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds() {
        assert!(validate_page_number(1).is_ok());
        assert!(validate_page_number(5).is_ok());
        assert!(validate_page_number(0).is_err());
        assert!(validate_page_number(6).is_err());
    }

    #[test]
    fn last_page_has_no_next() {
        let mut page = CardPage::welcome(EventId::new(), Utc::now());
        assert_eq!(page.next_page(), Some(2));
        page.page_number = MAX_CARD_PAGES;
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn share_expires_at_deadline() {
        let now = Utc::now();
        let share = CardShare::new(EventId::new(), None, Duration::hours(1), now);
        assert_eq!(share.status(now), ShareStatus::Active);
        assert_eq!(share.status(now + Duration::hours(1)), ShareStatus::Expired);
        assert!(!share.is_protected());
    }
}
