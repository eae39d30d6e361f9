//! occasion-keeper entry point.
//!
//! `serve` (the default) starts the HTTP server; `jobs <stage>` runs one
//! batch stage against the configured backends and prints its report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use occasion_keeper::api;
use occasion_keeper::app_state::{AppState, Backends};
use occasion_keeper::config::{AppConfig, Cli, Command, LogFormat};
use occasion_keeper::mail::{LogMailer, MailerSendMailer, Mailer};
use occasion_keeper::persistence::Store;
use occasion_keeper::persistence::memory::MemoryStore;
use occasion_keeper::persistence::postgres::PostgresStore;
use occasion_keeper::service::{JobStage, Passwords};
use occasion_keeper::storage::{MemoryStorage, ObjectStorage, SupabaseStorage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_name(std::env::var("LOG_FORMAT").ok().as_deref()));

    let mut config = AppConfig::from_env().context("loading configuration")?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }

    let backends = connect_backends(&config).await?;
    let app_state = AppState::new(&config, backends);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, app_state).await,
        Command::Jobs { stage } => run_job(&app_state, stage).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn connect_backends(config: &AppConfig) -> anyhow::Result<Backends> {
    let store: Arc<dyn Store> = if config.persistence_enabled {
        let store = PostgresStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            config.database_connect_timeout(),
        )
        .await
        .context("connecting to PostgreSQL")?;
        store.migrate().await.context("running migrations")?;
        tracing::info!("using PostgreSQL store");
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled; data is kept in memory only");
        Arc::new(MemoryStore::new())
    };

    let mailer: Arc<dyn Mailer> = match &config.mailersend_api_key {
        Some(key) => Arc::new(
            MailerSendMailer::new(
                config.mailersend_api_url.clone(),
                key.clone(),
                &config.email_from,
                Some(config.email_from_name.clone()),
            )
            .context("building mail client")?,
        ),
        None => {
            tracing::warn!("MAILERSEND_API_KEY not set; emails are logged, not sent");
            Arc::new(LogMailer::new())
        }
    };

    let storage: Arc<dyn ObjectStorage> =
        match (&config.supabase_url, &config.supabase_service_key) {
            (Some(url), Some(key)) => Arc::new(
                SupabaseStorage::new(url, key.clone(), config.supabase_bucket.clone())
                    .context("building storage client")?,
            ),
            _ => {
                tracing::warn!("Supabase not configured; media is kept in memory only");
                Arc::new(MemoryStorage::new(config.supabase_bucket.clone()))
            }
        };

    Ok(Backends {
        store,
        storage,
        mailer,
        passwords: Passwords::default(),
    })
}

async fn serve(config: &AppConfig, app_state: AppState) -> anyhow::Result<()> {
    let app = Router::new()
        .merge(api::build_router())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn run_job(app_state: &AppState, stage: JobStage) -> anyhow::Result<()> {
    tracing::info!(stage = stage.as_str(), "running batch stage");
    let report = app_state
        .jobs
        .run(stage)
        .await
        .with_context(|| format!("batch stage {}", stage.as_str()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
