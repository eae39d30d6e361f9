//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use chrono::Duration;

use crate::config::AppConfig;
use crate::mail::{Mailer, RetryPolicy};
use crate::persistence::Store;
use crate::service::{
    AnalyticsService, AuthService, CardService, EventService, ImportService, JobService, Passwords,
};
use crate::storage::ObjectStorage;

/// The external systems the services talk to.
#[derive(Debug, Clone)]
pub struct Backends {
    /// Durable storage.
    pub store: Arc<dyn Store>,
    /// Media object storage.
    pub storage: Arc<dyn ObjectStorage>,
    /// Outbound email.
    pub mailer: Arc<dyn Mailer>,
    /// Password hasher.
    pub passwords: Passwords,
}

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Accounts and bearer tokens.
    pub auth: Arc<AuthService>,
    /// Event CRUD, media and reflections.
    pub events: Arc<EventService>,
    /// Cards and share links.
    pub cards: Arc<CardService>,
    /// CSV import.
    pub imports: Arc<ImportService>,
    /// Statistics.
    pub analytics: Arc<AnalyticsService>,
    /// Batch stages.
    pub jobs: Arc<JobService>,
    /// Secret the job endpoints require. `None` disables them.
    pub cron_secret: Option<String>,
}

impl AppState {
    /// Wires every service from configuration and backends.
    #[must_use]
    pub fn new(config: &AppConfig, backends: Backends) -> Self {
        let Backends {
            store,
            storage,
            mailer,
            passwords,
        } = backends;
        let retry = RetryPolicy {
            delay: config.email_retry_delay(),
            ..RetryPolicy::default()
        };
        let calendar = config.calendar();

        let auth = AuthService::new(
            Arc::clone(&store),
            Arc::clone(&mailer),
            retry,
            passwords.clone(),
            config.jwt_secret.clone(),
            Duration::hours(config.jwt_ttl_hours),
        );
        let events = EventService::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            Arc::clone(&mailer),
            retry,
            passwords.clone(),
            calendar,
        );
        let cards = CardService::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            Arc::clone(&mailer),
            retry,
            passwords.clone(),
            Duration::hours(config.share_ttl_hours),
            std::time::Duration::from_secs(config.signed_url_ttl_secs),
            config.public_base_url.clone(),
        );
        let imports = ImportService::new(
            Arc::clone(&store),
            passwords,
            calendar,
            config.max_upload_bytes,
        );
        let analytics = AnalyticsService::new(Arc::clone(&store), calendar);
        let jobs = JobService::new(
            store,
            storage,
            mailer,
            retry,
            calendar,
            Duration::hours(config.media_retention_hours),
        );

        Self {
            auth: Arc::new(auth),
            events: Arc::new(events),
            cards: Arc::new(cards),
            imports: Arc::new(imports),
            analytics: Arc::new(analytics),
            jobs: Arc::new(jobs),
            cron_secret: config.cron_secret.clone(),
        }
    }
}
