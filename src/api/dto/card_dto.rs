//! Card page and share link DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{CardPage, EventId, MediaId, ShareToken};
use crate::service::card_service::{CardView, PageContent, RenderedPage, ShareLink};

/// One rendered card page.
#[derive(Debug, Serialize, ToSchema)]
pub struct CardPageDto {
    /// Position, 1 to 5.
    pub page_number: i32,
    /// Caption text.
    pub caption: Option<String>,
    /// Image media id.
    pub image_id: Option<MediaId>,
    /// Audio media id.
    pub audio_id: Option<MediaId>,
    /// Image URL.
    pub image_url: Option<String>,
    /// Audio URL.
    pub audio_url: Option<String>,
    /// Number of the following page, if the card has room for one.
    pub next_page: Option<i32>,
}

impl From<RenderedPage> for CardPageDto {
    fn from(rendered: RenderedPage) -> Self {
        Self {
            page_number: rendered.page.page_number,
            next_page: rendered.page.next_page(),
            caption: rendered.page.caption,
            image_id: rendered.page.image_id,
            audio_id: rendered.page.audio_id,
            image_url: rendered.image_url,
            audio_url: rendered.audio_url,
        }
    }
}

/// A greeting card.
#[derive(Debug, Serialize, ToSchema)]
pub struct CardResponse {
    /// Celebrated event.
    pub event_id: EventId,
    /// Name of the person or occasion.
    pub name: String,
    /// Occasion label.
    pub occasion: String,
    /// Event date.
    pub date: NaiveDate,
    /// Greeting message.
    pub message: Option<String>,
    /// Cultural theme.
    pub cultural_theme: bool,
    /// Pages in order.
    pub pages: Vec<CardPageDto>,
}

impl From<CardView> for CardResponse {
    fn from(view: CardView) -> Self {
        Self {
            event_id: view.event.id,
            occasion: view.event.occasion_label().to_string(),
            name: view.event.name,
            date: view.event.date,
            message: view.event.message,
            cultural_theme: view.event.cultural_theme,
            pages: view.pages.into_iter().map(CardPageDto::from).collect(),
        }
    }
}

/// Request body for `PUT /events/{id}/card/pages/{n}`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PutPageRequest {
    /// Image media of the same event.
    #[serde(default)]
    pub image_id: Option<MediaId>,
    /// Audio media of the same event.
    #[serde(default)]
    pub audio_id: Option<MediaId>,
    /// Caption text.
    #[serde(default)]
    pub caption: Option<String>,
}

impl From<PutPageRequest> for PageContent {
    fn from(req: PutPageRequest) -> Self {
        Self {
            image_id: req.image_id,
            audio_id: req.audio_id,
            caption: req.caption,
        }
    }
}

/// A stored card page.
#[derive(Debug, Serialize, ToSchema)]
pub struct PageResponse {
    /// Position, 1 to 5.
    pub page_number: i32,
    /// Caption text.
    pub caption: Option<String>,
    /// Image media id.
    pub image_id: Option<MediaId>,
    /// Audio media id.
    pub audio_id: Option<MediaId>,
}

impl From<&CardPage> for PageResponse {
    fn from(page: &CardPage) -> Self {
        Self {
            page_number: page.page_number,
            caption: page.caption.clone(),
            image_id: page.image_id,
            audio_id: page.audio_id,
        }
    }
}

/// Request body carrying a password.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordRequest {
    /// The password to check.
    pub password: String,
}

/// Response body for `POST /events/{id}/card/password`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordCheckResponse {
    /// Whether the password opens the card.
    pub valid: bool,
}

/// Request body for `POST /events/{id}/shares`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateShareRequest {
    /// Protect the link with this password.
    #[serde(default)]
    pub password: Option<String>,
    /// Email the link to this address.
    #[serde(default)]
    pub recipient_email: Option<String>,
}

/// Response body for `POST /events/{id}/shares`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ShareResponse {
    /// Share token.
    pub token: ShareToken,
    /// Public URL.
    pub url: String,
    /// Link expiry.
    pub expires_at: DateTime<Utc>,
    /// Whether a password is required.
    pub protected: bool,
    /// Whether the link was emailed.
    pub emailed: bool,
}

impl From<ShareLink> for ShareResponse {
    fn from(link: ShareLink) -> Self {
        Self {
            token: link.share.token,
            protected: link.share.is_protected(),
            expires_at: link.share.expires_at,
            url: link.url,
            emailed: link.emailed,
        }
    }
}

/// Response body for the public share endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicCardResponse {
    /// The card.
    pub card: CardResponse,
    /// Link expiry.
    pub expires_at: DateTime<Utc>,
}
