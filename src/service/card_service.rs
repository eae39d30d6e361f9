//! Greeting cards: page editing, the card password and public share links.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use super::Passwords;
use super::event_service::owned_event;
use crate::domain::card::validate_page_number;
use crate::domain::event::derive_card_password;
use crate::domain::{
    CardPage, CardShare, Event, EventId, EventMedia, MediaId, MediaKind, PageId, ShareStatus,
    ShareToken, User, ValidationError,
};
use crate::error::AppError;
use crate::mail::{Mailer, RetryPolicy, send_with_retry, templates};
use crate::persistence::Store;
use crate::storage::ObjectStorage;

/// Editable fields of one card page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// Image media of the same event.
    pub image_id: Option<MediaId>,
    /// Audio media of the same event.
    pub audio_id: Option<MediaId>,
    /// Caption text.
    pub caption: Option<String>,
}

/// A page with its media resolved to URLs.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Stored page.
    pub page: CardPage,
    /// Image URL, if the page has an image.
    pub image_url: Option<String>,
    /// Audio URL, if the page has audio.
    pub audio_url: Option<String>,
}

/// An event's card ready for display.
#[derive(Debug, Clone)]
pub struct CardView {
    /// The celebrated event.
    pub event: Event,
    /// Pages in order.
    pub pages: Vec<RenderedPage>,
}

/// A created share link.
#[derive(Debug, Clone)]
pub struct ShareLink {
    /// Stored share.
    pub share: CardShare,
    /// Public URL of the card.
    pub url: String,
    /// Whether the link was emailed to a recipient.
    pub emailed: bool,
}

/// Card operations for owners and for share-link visitors.
#[derive(Debug, Clone)]
pub struct CardService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    passwords: Passwords,
    share_ttl: Duration,
    signed_url_ttl: std::time::Duration,
    public_base_url: String,
}

impl CardService {
    /// Creates a new `CardService`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        retry: RetryPolicy,
        passwords: Passwords,
        share_ttl: Duration,
        signed_url_ttl: std::time::Duration,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            storage,
            mailer,
            retry,
            passwords,
            share_ttl,
            signed_url_ttl,
            public_base_url,
        }
    }

    /// The owner's view of an event's card. A card without pages gets a
    /// welcome page.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn card(&self, user: &User, id: EventId) -> Result<CardView, AppError> {
        let event = owned_event(self.store.as_ref(), user, id).await?;
        let pages = self.pages_or_welcome(event.id).await?;
        let media = self.media_by_id(event.id).await?;
        let pages = pages
            .into_iter()
            .map(|page| RenderedPage {
                image_url: page.image_id.and_then(|m| media.get(&m)).map(|m| m.url.clone()),
                audio_url: page.audio_id.and_then(|m| media.get(&m)).map(|m| m.url.clone()),
                page,
            })
            .collect();
        Ok(CardView { event, pages })
    }

    /// Creates or replaces page `page_number`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for a page number outside the card
    /// or media that belongs to another event or has the wrong kind.
    pub async fn put_page(
        &self,
        user: &User,
        id: EventId,
        page_number: i32,
        content: PageContent,
    ) -> Result<CardPage, AppError> {
        validate_page_number(page_number)?;
        let event = owned_event(self.store.as_ref(), user, id).await?;
        self.check_media(event.id, content.image_id, MediaKind::Image, "image_id")
            .await?;
        self.check_media(event.id, content.audio_id, MediaKind::Audio, "audio_id")
            .await?;

        let page = CardPage {
            id: PageId::new(),
            event_id: event.id,
            page_number,
            image_id: content.image_id,
            audio_id: content.audio_id,
            caption: content
                .caption
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        };
        let stored = self.store.upsert_page(&page).await?;
        tracing::info!(event_id = %event.id, page_number, "card page saved");
        Ok(stored)
    }

    /// Deletes page `page_number`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when the page does not exist.
    pub async fn delete_page(
        &self,
        user: &User,
        id: EventId,
        page_number: i32,
    ) -> Result<(), AppError> {
        validate_page_number(page_number)?;
        let event = owned_event(self.store.as_ref(), user, id).await?;
        if !self.store.delete_page(event.id, page_number).await? {
            return Err(AppError::NotFound(format!("card page {page_number}")));
        }
        Ok(())
    }

    /// Checks the card password, ignoring case and surrounding spaces.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn check_password(
        &self,
        user: &User,
        id: EventId,
        password: &str,
    ) -> Result<bool, AppError> {
        let event = owned_event(self.store.as_ref(), user, id).await?;
        let candidate = password.trim().to_lowercase();
        Ok(match &event.card_password_hash {
            Some(hash) => self.passwords.verify(&candidate, hash),
            None => candidate == derive_card_password(&event),
        })
    }

    /// Creates a share link, optionally password protected, and emails it
    /// to `recipient` when given. A failed email does not undo the link.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventNotFound`] for unknown or foreign events.
    pub async fn create_share(
        &self,
        user: &User,
        id: EventId,
        password: Option<&str>,
        recipient: Option<&str>,
    ) -> Result<ShareLink, AppError> {
        let event = owned_event(self.store.as_ref(), user, id).await?;
        let password_hash = match password.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(self.passwords.hash(p)?),
            None => None,
        };
        let share = CardShare::new(event.id, password_hash, self.share_ttl, Utc::now());
        self.store.insert_share(&share).await?;
        let url = format!("{}/share/{}", self.public_base_url, share.token);
        tracing::info!(event_id = %event.id, token = %share.token, protected = share.is_protected(), "share link created");

        let mut emailed = false;
        if let Some(to) = recipient.map(str::trim).filter(|r| !r.is_empty()) {
            let message = templates::share_link(to, user, &event, &url, share.expires_at);
            match send_with_retry(self.mailer.as_ref(), &message, self.retry).await {
                Ok(()) => emailed = true,
                Err(err) => {
                    tracing::warn!(token = %share.token, error = %err, "share email not delivered");
                }
            }
        }
        Ok(ShareLink {
            share,
            url,
            emailed,
        })
    }

    /// Opens a shared card. Media URLs are short-lived signed URLs.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for unknown tokens,
    /// [`AppError::ShareExpired`] past the expiry and
    /// [`AppError::PasswordRequired`] when a protected link is opened
    /// without the right password.
    pub async fn open_share(
        &self,
        token: ShareToken,
        password: Option<&str>,
    ) -> Result<(CardShare, CardView), AppError> {
        let share = self
            .store
            .get_share(token)
            .await?
            .ok_or_else(|| AppError::NotFound("share link".to_string()))?;
        if share.status(Utc::now()) == ShareStatus::Expired {
            return Err(AppError::ShareExpired);
        }
        if let Some(hash) = &share.password_hash {
            let unlocked = password.is_some_and(|p| self.passwords.verify(p.trim(), hash));
            if !unlocked {
                return Err(AppError::PasswordRequired);
            }
        }

        let event = self
            .store
            .get_event(share.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("share link".to_string()))?;
        let media = self.media_by_id(event.id).await?;
        let mut pages = Vec::new();
        for page in self.pages_or_welcome(event.id).await? {
            pages.push(RenderedPage {
                image_url: self.signed(page.image_id, &media).await,
                audio_url: self.signed(page.audio_id, &media).await,
                page,
            });
        }
        Ok((share, CardView { event, pages }))
    }

    async fn pages_or_welcome(&self, event_id: EventId) -> Result<Vec<CardPage>, AppError> {
        let pages = self.store.list_pages(event_id).await?;
        if !pages.is_empty() {
            return Ok(pages);
        }
        let welcome = self
            .store
            .upsert_page(&CardPage::welcome(event_id, Utc::now()))
            .await?;
        Ok(vec![welcome])
    }

    async fn media_by_id(&self, event_id: EventId) -> Result<HashMap<MediaId, EventMedia>, AppError> {
        Ok(self
            .store
            .list_media(event_id)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect())
    }

    async fn signed(
        &self,
        id: Option<MediaId>,
        media: &HashMap<MediaId, EventMedia>,
    ) -> Option<String> {
        let item = media.get(&id?)?;
        match self
            .storage
            .signed_url(&item.storage_path, self.signed_url_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(media_id = %item.id, error = %err, "could not sign media url");
                None
            }
        }
    }

    async fn check_media(
        &self,
        event_id: EventId,
        id: Option<MediaId>,
        kind: MediaKind,
        field: &'static str,
    ) -> Result<(), AppError> {
        let Some(id) = id else {
            return Ok(());
        };
        let media = self.store.get_media(id).await?;
        match media {
            Some(m) if m.event_id == event_id && m.kind == kind => Ok(()),
            Some(m) if m.event_id == event_id => Err(ValidationError::new(
                field,
                format!("media {id} is {}, expected {kind}", m.kind),
            )
            .into()),
            _ => Err(ValidationError::new(field, format!("media {id} does not belong to this event"))
                .into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::card::WELCOME_CAPTION;
    use crate::domain::{EventDraft, EventType};
    use crate::mail::LogMailer;
    use crate::persistence::memory::MemoryStore;
    use crate::storage::MemoryStorage;

    struct Fixture {
        cards: CardService,
        store: Arc<MemoryStore>,
        storage: Arc<MemoryStorage>,
        mailer: Arc<LogMailer>,
        user: User,
        event: Event,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::default());
        let mailer = Arc::new(LogMailer::new());
        let passwords = Passwords::low_cost();
        let now = Utc::now();
        let user = User::new(
            "asha".to_string(),
            "asha@example.com".to_string(),
            "hash".to_string(),
            now,
        );
        let draft = EventDraft {
            name: "Ravi Kumar".to_string(),
            event_type: EventType::Birthday,
            date: now.date_naive(),
            remind_days_before: 1,
            message: None,
            custom_label: None,
            cultural_theme: true,
            highlights: None,
            is_recurring: None,
        };
        let mut event = Event::from_draft(user.id, draft, now);
        event.card_password_hash = passwords.hash("ravi").ok();
        let _ = store.insert_event(&event).await;

        let cards = CardService::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&storage) as Arc<dyn ObjectStorage>,
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            RetryPolicy {
                attempts: 1,
                delay: std::time::Duration::ZERO,
            },
            passwords,
            Duration::hours(72),
            std::time::Duration::from_secs(600),
            "https://cards.example.com".to_string(),
        );
        Fixture {
            cards,
            store,
            storage,
            mailer,
            user,
            event,
        }
    }

    async fn attach(f: &Fixture, kind: MediaKind, key: &str) -> EventMedia {
        let _ = f.storage.upload(key, vec![1], "image/png").await;
        let media = EventMedia {
            id: MediaId::new(),
            event_id: f.event.id,
            url: f.storage.public_url(key),
            storage_path: key.to_string(),
            kind,
            content_type: "image/png".to_string(),
            uploaded_at: Utc::now(),
        };
        let _ = f.store.insert_media(&media).await;
        media
    }

    #[tokio::test]
    async fn first_view_creates_welcome_page() {
        let f = fixture().await;
        let Ok(view) = f.cards.card(&f.user, f.event.id).await else {
            panic!("card failed");
        };
        let Some(first) = view.pages.first() else {
            panic!("no pages");
        };
        assert_eq!(first.page.page_number, 1);
        assert_eq!(first.page.caption.as_deref(), Some(WELCOME_CAPTION));
        assert_eq!(f.store.list_pages(f.event.id).await.map(|p| p.len()).ok(), Some(1));
    }

    #[tokio::test]
    async fn page_media_must_match_event_and_kind() {
        let f = fixture().await;
        let image = attach(&f, MediaKind::Image, "u/e/a.png").await;

        let wrong_kind = PageContent {
            audio_id: Some(image.id),
            ..PageContent::default()
        };
        assert!(matches!(
            f.cards.put_page(&f.user, f.event.id, 2, wrong_kind).await,
            Err(AppError::Validation(_))
        ));

        let foreign = PageContent {
            image_id: Some(MediaId::new()),
            ..PageContent::default()
        };
        assert!(f.cards.put_page(&f.user, f.event.id, 2, foreign).await.is_err());

        let ok = PageContent {
            image_id: Some(image.id),
            caption: Some("  cake time ".to_string()),
            ..PageContent::default()
        };
        let Ok(page) = f.cards.put_page(&f.user, f.event.id, 2, ok).await else {
            panic!("page rejected");
        };
        assert_eq!(page.caption.as_deref(), Some("cake time"));
        assert!(f.cards.put_page(&f.user, f.event.id, 6, PageContent::default()).await.is_err());
    }

    #[tokio::test]
    async fn card_password_ignores_case() {
        let f = fixture().await;
        assert!(matches!(
            f.cards.check_password(&f.user, f.event.id, " RAVI ").await,
            Ok(true)
        ));
        assert!(matches!(
            f.cards.check_password(&f.user, f.event.id, "kumar").await,
            Ok(false)
        ));
    }

    #[tokio::test]
    async fn protected_share_needs_password() {
        let f = fixture().await;
        let Ok(link) = f
            .cards
            .create_share(&f.user, f.event.id, Some("secret"), Some("friend@example.com"))
            .await
        else {
            panic!("share failed");
        };
        assert!(link.emailed);
        assert!(link.url.starts_with("https://cards.example.com/share/"));
        assert_eq!(f.mailer.sent().await.len(), 1);

        let token = link.share.token;
        assert!(matches!(
            f.cards.open_share(token, None).await,
            Err(AppError::PasswordRequired)
        ));
        assert!(matches!(
            f.cards.open_share(token, Some("wrong")).await,
            Err(AppError::PasswordRequired)
        ));
        assert!(f.cards.open_share(token, Some("secret")).await.is_ok());
    }

    #[tokio::test]
    async fn expired_share_is_gone() {
        let f = fixture().await;
        let share = CardShare::new(f.event.id, None, Duration::hours(1), Utc::now() - Duration::hours(2));
        let _ = f.store.insert_share(&share).await;
        assert!(matches!(
            f.cards.open_share(share.token, None).await,
            Err(AppError::ShareExpired)
        ));
        assert!(matches!(
            f.cards.open_share(ShareToken::new(), None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn shared_view_uses_signed_urls() {
        let f = fixture().await;
        let image = attach(&f, MediaKind::Image, "u/e/a.png").await;
        let content = PageContent {
            image_id: Some(image.id),
            ..PageContent::default()
        };
        let _ = f.cards.put_page(&f.user, f.event.id, 1, content).await;
        let Ok(link) = f.cards.create_share(&f.user, f.event.id, None, None).await else {
            panic!("share failed");
        };
        let Ok((_, view)) = f.cards.open_share(link.share.token, None).await else {
            panic!("open failed");
        };
        let Some(page) = view.pages.first() else {
            panic!("no pages");
        };
        assert_eq!(
            page.image_url.as_deref(),
            Some("memory://event-media/u/e/a.png?expires_in=600")
        );
    }
}
