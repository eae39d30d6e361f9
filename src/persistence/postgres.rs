//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{
    CardPageRow, CardShareRow, EventRow, ImportLogRow, MediaRow, ReflectionRow, ReminderLogRow,
    UserRow, VerificationCodeRow,
};
use super::{EventFilter, EventOrder, Store, StoreError};
use crate::domain::{
    CardPage, CardShare, Event, EventId, EventMedia, ImportLog, MediaId, Reflection, ReminderLog,
    ShareToken, User, UserId, VerificationCode,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, is_verified, \
     notification_email, timezone, created_at";

const EVENT_COLUMNS: &str = "id, user_id, name, event_type, date, recurs_on, remind_days_before, \
     message, custom_label, cultural_theme, highlights, is_recurring, is_archived, notified, \
     deletion_notified, deletion_scheduled, card_password_hash, created_at, updated_at";

const MEDIA_COLUMNS: &str = "id, event_id, url, storage_path, kind, content_type, uploaded_at";

const PAGE_COLUMNS: &str = "id, event_id, page_number, image_id, audio_id, caption, created_at";

fn db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        let what = match db.constraint() {
            Some(c) if c.contains("email") => "email already in use".to_string(),
            Some(c) if c.contains("username") => "username already taken".to_string(),
            _ => db.message().to_string(),
        };
        return StoreError::Conflict(what);
    }
    StoreError::Database(err.to_string())
}

/// Escapes `%`, `_` and `\` so user input matches literally in `ILIKE`.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// PostgreSQL-backed [`Store`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when the database is unreachable.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded SQL migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migration`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(uuid::Uuid::from(user_id));
        }
        if let Some(v) = filter.archived {
            qb.push(" AND is_archived = ").push_bind(v);
        }
        if let Some(v) = filter.notified {
            qb.push(" AND notified = ").push_bind(v);
        }
        if let Some(v) = filter.recurring {
            qb.push(" AND is_recurring = ").push_bind(v);
        }
        if let Some(v) = filter.deletion_notified {
            qb.push(" AND deletion_notified = ").push_bind(v);
        }
        if let Some(t) = filter.event_type {
            qb.push(" AND event_type = ").push_bind(t.as_str());
        }
        if let Some(d) = filter.date_from {
            qb.push(" AND date >= ").push_bind(d);
        }
        if let Some(d) = filter.date_to {
            qb.push(" AND date <= ").push_bind(d);
        }
        if let Some(d) = filter.date_before {
            qb.push(" AND date < ").push_bind(d);
        }
        if let Some(due) = filter.deletion_due_by {
            qb.push(" AND deletion_scheduled <= ").push_bind(due);
        }
        match filter.has_media {
            Some(true) => {
                qb.push(" AND EXISTS (SELECT 1 FROM event_media m WHERE m.event_id = events.id)");
            }
            Some(false) => {
                qb.push(
                    " AND NOT EXISTS (SELECT 1 FROM event_media m WHERE m.event_id = events.id)",
                );
            }
            None => {}
        }
        if let Some(name) = &filter.name {
            qb.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(q) = &filter.search {
            let pattern = like_pattern(q);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR custom_label ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(match filter.order {
            EventOrder::DateAsc => " ORDER BY date ASC, name ASC",
            EventOrder::DateDesc => " ORDER BY date DESC, name ASC",
            EventOrder::NameAsc => " ORDER BY name ASC, date ASC",
        });
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, is_verified, \
             notification_email, timezone, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(uuid::Uuid::from(user.id))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(user.notification_email)
        .bind(&user.timezone)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(uuid::Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE lower(email) = lower($1) OR lower(username) = lower($1) \
             ORDER BY (lower(email) = lower($1)) DESC LIMIT 1"
        ))
        .bind(identifier.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET username = $2, email = $3, password_hash = $4, is_verified = $5, \
             notification_email = $6, timezone = $7 WHERE id = $1",
        )
        .bind(uuid::Uuid::from(user.id))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(user.notification_email)
        .bind(&user.timezone)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn put_verification_code(&self, code: &VerificationCode) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO verification_codes (user_id, code, created_at, expires_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (user_id) DO UPDATE \
             SET code = EXCLUDED.code, created_at = EXCLUDED.created_at, \
             expires_at = EXCLUDED.expires_at",
        )
        .bind(uuid::Uuid::from(code.user_id))
        .bind(&code.code)
        .bind(code.created_at)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_verification_code(
        &self,
        user_id: UserId,
    ) -> Result<Option<VerificationCode>, StoreError> {
        let row = sqlx::query_as::<_, VerificationCodeRow>(
            "SELECT user_id, code, created_at, expires_at FROM verification_codes \
             WHERE user_id = $1",
        )
        .bind(uuid::Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(VerificationCode::from))
    }

    async fn delete_verification_code(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM verification_codes WHERE user_id = $1")
            .bind(uuid::Uuid::from(user_id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(uuid::Uuid::from(event.id))
        .bind(uuid::Uuid::from(event.user_id))
        .bind(&event.name)
        .bind(event.event_type.as_str())
        .bind(event.date)
        .bind(event.recurs_on)
        .bind(event.remind_days_before)
        .bind(&event.message)
        .bind(&event.custom_label)
        .bind(event.cultural_theme)
        .bind(&event.highlights)
        .bind(event.is_recurring)
        .bind(event.is_archived)
        .bind(event.notified)
        .bind(event.deletion_notified)
        .bind(event.deletion_scheduled)
        .bind(&event.card_password_hash)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(uuid::Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Event::try_from).transpose()
    }

    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE events SET name = $2, event_type = $3, date = $4, remind_days_before = $5, \
             message = $6, custom_label = $7, cultural_theme = $8, highlights = $9, \
             is_recurring = $10, is_archived = $11, notified = $12, deletion_notified = $13, \
             deletion_scheduled = $14, card_password_hash = $15, updated_at = $16, \
             recurs_on = $17 WHERE id = $1",
        )
        .bind(uuid::Uuid::from(event.id))
        .bind(&event.name)
        .bind(event.event_type.as_str())
        .bind(event.date)
        .bind(event.remind_days_before)
        .bind(&event.message)
        .bind(&event.custom_label)
        .bind(event.cultural_theme)
        .bind(&event.highlights)
        .bind(event.is_recurring)
        .bind(event.is_archived)
        .bind(event.notified)
        .bind(event.deletion_notified)
        .bind(event.deletion_scheduled)
        .bind(&event.card_password_hash)
        .bind(event.updated_at)
        .bind(event.recurs_on)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(uuid::Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"
        ));
        Self::push_filter(&mut qb, filter);
        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn compare_and_set_notified(
        &self,
        id: EventId,
        from: bool,
        to: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE events SET notified = $3, updated_at = now() WHERE id = $1 AND notified = $2",
        )
        .bind(uuid::Uuid::from(id))
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_media(&self, media: &EventMedia) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO event_media ({MEDIA_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(uuid::Uuid::from(media.id))
        .bind(uuid::Uuid::from(media.event_id))
        .bind(&media.url)
        .bind(&media.storage_path)
        .bind(media.kind.as_str())
        .bind(&media.content_type)
        .bind(media.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_media(&self, id: MediaId) -> Result<Option<EventMedia>, StoreError> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM event_media WHERE id = $1"
        ))
        .bind(uuid::Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(EventMedia::try_from).transpose()
    }

    async fn list_media(&self, event_id: EventId) -> Result<Vec<EventMedia>, StoreError> {
        let rows = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM event_media WHERE event_id = $1 ORDER BY uploaded_at"
        ))
        .bind(uuid::Uuid::from(event_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(EventMedia::try_from).collect()
    }

    async fn list_media_for_user(&self, user_id: UserId) -> Result<Vec<EventMedia>, StoreError> {
        let rows = sqlx::query_as::<_, MediaRow>(
            "SELECT m.id, m.event_id, m.url, m.storage_path, m.kind, m.content_type, \
             m.uploaded_at FROM event_media m JOIN events e ON e.id = m.event_id \
             WHERE e.user_id = $1 ORDER BY m.uploaded_at",
        )
        .bind(uuid::Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(EventMedia::try_from).collect()
    }

    async fn delete_media(&self, id: MediaId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM event_media WHERE id = $1")
            .bind(uuid::Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_page(&self, page: &CardPage) -> Result<CardPage, StoreError> {
        let row = sqlx::query_as::<_, CardPageRow>(&format!(
            "INSERT INTO card_pages ({PAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (event_id, page_number) DO UPDATE SET image_id = EXCLUDED.image_id, \
             audio_id = EXCLUDED.audio_id, caption = EXCLUDED.caption \
             RETURNING {PAGE_COLUMNS}"
        ))
        .bind(uuid::Uuid::from(page.id))
        .bind(uuid::Uuid::from(page.event_id))
        .bind(page.page_number)
        .bind(page.image_id.map(uuid::Uuid::from))
        .bind(page.audio_id.map(uuid::Uuid::from))
        .bind(&page.caption)
        .bind(page.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(CardPage::from(row))
    }

    async fn list_pages(&self, event_id: EventId) -> Result<Vec<CardPage>, StoreError> {
        let rows = sqlx::query_as::<_, CardPageRow>(&format!(
            "SELECT {PAGE_COLUMNS} FROM card_pages WHERE event_id = $1 ORDER BY page_number"
        ))
        .bind(uuid::Uuid::from(event_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(CardPage::from).collect())
    }

    async fn delete_page(&self, event_id: EventId, page_number: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM card_pages WHERE event_id = $1 AND page_number = $2")
            .bind(uuid::Uuid::from(event_id))
            .bind(page_number)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_reflection(&self, reflection: &Reflection) -> Result<Reflection, StoreError> {
        let row = sqlx::query_as::<_, ReflectionRow>(
            "INSERT INTO reflections (user_id, event_id, note, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (user_id, event_id) DO UPDATE \
             SET note = EXCLUDED.note, updated_at = EXCLUDED.updated_at \
             RETURNING user_id, event_id, note, created_at, updated_at",
        )
        .bind(uuid::Uuid::from(reflection.user_id))
        .bind(uuid::Uuid::from(reflection.event_id))
        .bind(&reflection.note)
        .bind(reflection.created_at)
        .bind(reflection.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(Reflection::from(row))
    }

    async fn get_reflection(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Reflection>, StoreError> {
        let row = sqlx::query_as::<_, ReflectionRow>(
            "SELECT user_id, event_id, note, created_at, updated_at FROM reflections \
             WHERE user_id = $1 AND event_id = $2",
        )
        .bind(uuid::Uuid::from(user_id))
        .bind(uuid::Uuid::from(event_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Reflection::from))
    }

    async fn insert_share(&self, share: &CardShare) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO card_shares (token, event_id, password_hash, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid::Uuid::from(share.token))
        .bind(uuid::Uuid::from(share.event_id))
        .bind(&share.password_hash)
        .bind(share.expires_at)
        .bind(share.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_share(&self, token: ShareToken) -> Result<Option<CardShare>, StoreError> {
        let row = sqlx::query_as::<_, CardShareRow>(
            "SELECT token, event_id, password_hash, expires_at, created_at FROM card_shares \
             WHERE token = $1",
        )
        .bind(uuid::Uuid::from(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(CardShare::from))
    }

    async fn insert_reminder_log(&self, log: &ReminderLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reminder_logs (id, user_id, event_id, status, message, \"timestamp\") \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(log.id)
        .bind(uuid::Uuid::from(log.user_id))
        .bind(uuid::Uuid::from(log.event_id))
        .bind(log.status.as_str())
        .bind(&log.message)
        .bind(log.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_reminder_logs(&self, user_id: UserId) -> Result<Vec<ReminderLog>, StoreError> {
        let rows = sqlx::query_as::<_, ReminderLogRow>(
            "SELECT id, user_id, event_id, status, message, \"timestamp\" FROM reminder_logs \
             WHERE user_id = $1 ORDER BY \"timestamp\" DESC",
        )
        .bind(uuid::Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ReminderLog::try_from).collect()
    }

    async fn insert_import_log(&self, log: &ImportLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO import_logs (id, user_id, file_name, imported_at, success_count, \
             failure_count, errors) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(log.id)
        .bind(uuid::Uuid::from(log.user_id))
        .bind(&log.file_name)
        .bind(log.imported_at)
        .bind(log.success_count)
        .bind(log.failure_count)
        .bind(log.errors.join("\n"))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_import_logs(&self, user_id: UserId) -> Result<Vec<ImportLog>, StoreError> {
        let rows = sqlx::query_as::<_, ImportLogRow>(
            "SELECT id, user_id, file_name, imported_at, success_count, failure_count, errors \
             FROM import_logs WHERE user_id = $1 ORDER BY imported_at DESC",
        )
        .bind(uuid::Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ImportLog::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("asha"), "%asha%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = EventFilter {
            user_id: Some(UserId::new()),
            archived: Some(false),
            has_media: Some(true),
            search: Some("asha".to_string()),
            order: EventOrder::DateDesc,
            ..EventFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM events WHERE TRUE");
        PostgresStore::push_filter(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("user_id = $1"));
        assert!(sql.contains("is_archived = $2"));
        assert!(sql.contains("EXISTS (SELECT 1 FROM event_media"));
        assert!(sql.contains("name ILIKE $3 OR custom_label ILIKE $4"));
        assert!(sql.ends_with("ORDER BY date DESC, name ASC"));
    }
}
