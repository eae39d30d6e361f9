//! In-process [`Store`] backed by hash maps.
//!
//! All tables live behind one [`tokio::sync::RwLock`] so that cascading
//! deletes and uniqueness checks see a consistent snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EventFilter, Store, StoreError};
use crate::domain::{
    CardPage, CardShare, Event, EventId, EventMedia, ImportLog, MediaId, Reflection, ReminderLog,
    ShareToken, User, UserId, VerificationCode,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    codes: HashMap<UserId, VerificationCode>,
    events: HashMap<EventId, Event>,
    media: HashMap<MediaId, EventMedia>,
    pages: Vec<CardPage>,
    reflections: HashMap<(UserId, EventId), Reflection>,
    shares: HashMap<ShareToken, CardShare>,
    reminder_logs: Vec<ReminderLog>,
    import_logs: Vec<ImportLog>,
}

impl Tables {
    fn has_media(&self, event_id: EventId) -> bool {
        self.media.values().any(|m| m.event_id == event_id)
    }
}

/// Volatile [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_media_inserts: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent [`Store::insert_media`] fail while `fail` is
    /// set.
    pub fn fail_media_inserts(&self, fail: bool) {
        self.fail_media_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let username = user.username.to_lowercase();
        let email = user.email.to_lowercase();
        for existing in t.users.values() {
            if existing.username.to_lowercase() == username {
                return Err(StoreError::Conflict("username already taken".to_string()));
            }
            if existing.email.to_lowercase() == email {
                return Err(StoreError::Conflict("email already in use".to_string()));
            }
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let needle = identifier.trim().to_lowercase();
        let t = self.tables.read().await;
        let by_email = t.users.values().find(|u| u.email.to_lowercase() == needle);
        let found = by_email.or_else(|| t.users.values().find(|u| u.username.to_lowercase() == needle));
        Ok(found.cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if let Some(slot) = t.users.get_mut(&user.id) {
            *slot = user.clone();
        }
        Ok(())
    }

    async fn put_verification_code(&self, code: &VerificationCode) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .codes
            .insert(code.user_id, code.clone());
        Ok(())
    }

    async fn get_verification_code(
        &self,
        user_id: UserId,
    ) -> Result<Option<VerificationCode>, StoreError> {
        Ok(self.tables.read().await.codes.get(&user_id).cloned())
    }

    async fn delete_verification_code(&self, user_id: UserId) -> Result<(), StoreError> {
        self.tables.write().await.codes.remove(&user_id);
        Ok(())
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.events.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!("event {} already exists", event.id)));
        }
        t.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if let Some(slot) = t.events.get_mut(&event.id) {
            *slot = event.clone();
        }
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.events.remove(&id).is_none() {
            return Ok(false);
        }
        t.media.retain(|_, m| m.event_id != id);
        t.pages.retain(|p| p.event_id != id);
        t.reflections.retain(|(_, event_id), _| *event_id != id);
        t.shares.retain(|_, s| s.event_id != id);
        t.reminder_logs.retain(|l| l.event_id != id);
        Ok(true)
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let t = self.tables.read().await;
        let mut events: Vec<Event> = t
            .events
            .values()
            .filter(|e| filter.matches(e, t.has_media(e.id)))
            .cloned()
            .collect();
        filter.sort(&mut events);
        Ok(events)
    }

    async fn compare_and_set_notified(
        &self,
        id: EventId,
        from: bool,
        to: bool,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        match t.events.get_mut(&id) {
            Some(event) if event.notified == from => {
                event.notified = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_media(&self, media: &EventMedia) -> Result<(), StoreError> {
        if self.fail_media_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Database("media insert rejected".to_string()));
        }
        self.tables.write().await.media.insert(media.id, media.clone());
        Ok(())
    }

    async fn get_media(&self, id: MediaId) -> Result<Option<EventMedia>, StoreError> {
        Ok(self.tables.read().await.media.get(&id).cloned())
    }

    async fn list_media(&self, event_id: EventId) -> Result<Vec<EventMedia>, StoreError> {
        let t = self.tables.read().await;
        let mut media: Vec<EventMedia> = t
            .media
            .values()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect();
        media.sort_by_key(|m| m.uploaded_at);
        Ok(media)
    }

    async fn list_media_for_user(&self, user_id: UserId) -> Result<Vec<EventMedia>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.media
            .values()
            .filter(|m| t.events.get(&m.event_id).is_some_and(|e| e.user_id == user_id))
            .cloned()
            .collect())
    }

    async fn delete_media(&self, id: MediaId) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.media.remove(&id).is_none() {
            return Ok(false);
        }
        for page in &mut t.pages {
            if page.image_id == Some(id) {
                page.image_id = None;
            }
            if page.audio_id == Some(id) {
                page.audio_id = None;
            }
        }
        Ok(true)
    }

    async fn upsert_page(&self, page: &CardPage) -> Result<CardPage, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t
            .pages
            .iter_mut()
            .find(|p| p.event_id == page.event_id && p.page_number == page.page_number)
        {
            existing.image_id = page.image_id;
            existing.audio_id = page.audio_id;
            existing.caption.clone_from(&page.caption);
            return Ok(existing.clone());
        }
        t.pages.push(page.clone());
        Ok(page.clone())
    }

    async fn list_pages(&self, event_id: EventId) -> Result<Vec<CardPage>, StoreError> {
        let t = self.tables.read().await;
        let mut pages: Vec<CardPage> = t
            .pages
            .iter()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.page_number);
        Ok(pages)
    }

    async fn delete_page(&self, event_id: EventId, page_number: i32) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.pages.len();
        t.pages
            .retain(|p| !(p.event_id == event_id && p.page_number == page_number));
        Ok(t.pages.len() != before)
    }

    async fn upsert_reflection(&self, reflection: &Reflection) -> Result<Reflection, StoreError> {
        let mut t = self.tables.write().await;
        let key = (reflection.user_id, reflection.event_id);
        let stored = match t.reflections.get_mut(&key) {
            Some(existing) => {
                existing.note.clone_from(&reflection.note);
                existing.updated_at = reflection.updated_at;
                existing.clone()
            }
            None => {
                t.reflections.insert(key, reflection.clone());
                reflection.clone()
            }
        };
        Ok(stored)
    }

    async fn get_reflection(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Reflection>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .reflections
            .get(&(user_id, event_id))
            .cloned())
    }

    async fn insert_share(&self, share: &CardShare) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .shares
            .insert(share.token, share.clone());
        Ok(())
    }

    async fn get_share(&self, token: ShareToken) -> Result<Option<CardShare>, StoreError> {
        Ok(self.tables.read().await.shares.get(&token).cloned())
    }

    async fn insert_reminder_log(&self, log: &ReminderLog) -> Result<(), StoreError> {
        self.tables.write().await.reminder_logs.push(log.clone());
        Ok(())
    }

    async fn list_reminder_logs(&self, user_id: UserId) -> Result<Vec<ReminderLog>, StoreError> {
        let t = self.tables.read().await;
        let mut logs: Vec<ReminderLog> = t
            .reminder_logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }

    async fn insert_import_log(&self, log: &ImportLog) -> Result<(), StoreError> {
        self.tables.write().await.import_logs.push(log.clone());
        Ok(())
    }

    async fn list_import_logs(&self, user_id: UserId) -> Result<Vec<ImportLog>, StoreError> {
        let t = self.tables.read().await;
        let mut logs: Vec<ImportLog> = t
            .import_logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.imported_at.cmp(&a.imported_at));
        Ok(logs)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::domain::{EventDraft, EventType, MediaKind, PageId};
    use crate::persistence::EventOrder;

    fn user(name: &str) -> User {
        User::new(
            name.to_string(),
            format!("{name}@example.com"),
            "hash".to_string(),
            Utc::now(),
        )
    }

    fn event(user_id: UserId, name: &str, date: NaiveDate) -> Event {
        let draft = EventDraft {
            name: name.to_string(),
            event_type: EventType::Birthday,
            date,
            remind_days_before: 1,
            message: None,
            custom_label: None,
            cultural_theme: false,
            highlights: None,
            is_recurring: None,
        };
        let Ok(draft) = draft.validate(date, false) else {
            panic!("valid draft");
        };
        Event::from_draft(user_id, draft, Utc::now())
    }

    fn media(event_id: EventId) -> EventMedia {
        EventMedia {
            id: MediaId::new(),
            event_id,
            url: "https://cdn/x.png".to_string(),
            storage_path: "u/e/x.png".to_string(),
            kind: MediaKind::Image,
            content_type: "image/png".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap_or_default()
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        assert!(store.insert_user(&user("asha")).await.is_ok());
        let mut dup = user("other");
        dup.email = "ASHA@example.com".to_string();
        let Err(StoreError::Conflict(_)) = store.insert_user(&dup).await else {
            panic!("expected conflict");
        };
    }

    #[tokio::test]
    async fn login_lookup_prefers_email() {
        let store = MemoryStore::new();
        let u = user("asha");
        let _ = store.insert_user(&u).await;
        let Ok(Some(found)) = store.find_user_by_login(" Asha@Example.com ").await else {
            panic!("user not found by email");
        };
        assert_eq!(found.id, u.id);
        let Ok(Some(found)) = store.find_user_by_login("ASHA").await else {
            panic!("user not found by username");
        };
        assert_eq!(found.id, u.id);
    }

    #[tokio::test]
    async fn find_events_filters_and_sorts() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let _ = store.insert_event(&event(owner, "Zed", day(3, 1))).await;
        let _ = store.insert_event(&event(owner, "Amy", day(4, 1))).await;
        let _ = store.insert_event(&event(UserId::new(), "Bob", day(3, 1))).await;

        let mut filter = EventFilter::for_user(owner);
        let Ok(by_date) = store.find_events(&filter).await else {
            panic!("query failed");
        };
        let names: Vec<&str> = by_date.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Zed", "Amy"]);

        filter.order = EventOrder::NameAsc;
        filter.date_before = Some(day(5, 1));
        let Ok(by_name) = store.find_events(&filter).await else {
            panic!("query failed");
        };
        let names: Vec<&str> = by_name.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Amy", "Zed"]);
    }

    #[tokio::test]
    async fn has_media_filter() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let with = event(owner, "With", day(3, 1));
        let without = event(owner, "Without", day(3, 1));
        let _ = store.insert_event(&with).await;
        let _ = store.insert_event(&without).await;
        let _ = store.insert_media(&media(with.id)).await;

        let filter = EventFilter {
            has_media: Some(true),
            ..EventFilter::default()
        };
        let Ok(found) = store.find_events(&filter).await else {
            panic!("query failed");
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found.first().map(|e| e.id), Some(with.id));
    }

    #[tokio::test]
    async fn compare_and_set_only_flips_once() {
        let store = MemoryStore::new();
        let e = event(UserId::new(), "Once", day(3, 1));
        let _ = store.insert_event(&e).await;
        assert!(matches!(store.compare_and_set_notified(e.id, false, true).await, Ok(true)));
        assert!(matches!(store.compare_and_set_notified(e.id, false, true).await, Ok(false)));
    }

    #[tokio::test]
    async fn deleting_media_clears_page_references() {
        let store = MemoryStore::new();
        let e = event(UserId::new(), "Card", day(3, 1));
        let _ = store.insert_event(&e).await;
        let m = media(e.id);
        let _ = store.insert_media(&m).await;
        let page = CardPage {
            id: PageId::new(),
            event_id: e.id,
            page_number: 2,
            image_id: Some(m.id),
            audio_id: None,
            caption: None,
            created_at: Utc::now(),
        };
        let _ = store.upsert_page(&page).await;
        assert!(matches!(store.delete_media(m.id).await, Ok(true)));
        let Ok(pages) = store.list_pages(e.id).await else {
            panic!("query failed");
        };
        assert_eq!(pages.first().and_then(|p| p.image_id), None);
    }

    #[tokio::test]
    async fn deleting_event_cascades() {
        let store = MemoryStore::new();
        let e = event(UserId::new(), "Gone", day(3, 1));
        let _ = store.insert_event(&e).await;
        let m = media(e.id);
        let _ = store.insert_media(&m).await;
        assert!(matches!(store.delete_event(e.id).await, Ok(true)));
        assert!(matches!(store.get_media(m.id).await, Ok(None)));
        assert!(matches!(store.delete_event(e.id).await, Ok(false)));
    }

    #[tokio::test]
    async fn upsert_page_keeps_original_id() {
        let store = MemoryStore::new();
        let event_id = EventId::new();
        let first = CardPage::welcome(event_id, Utc::now());
        let _ = store.upsert_page(&first).await;
        let mut replacement = CardPage::welcome(event_id, Utc::now());
        replacement.caption = Some("Updated".to_string());
        let Ok(stored) = store.upsert_page(&replacement).await else {
            panic!("upsert failed");
        };
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.caption.as_deref(), Some("Updated"));
    }
}
