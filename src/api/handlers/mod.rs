//! REST endpoint handlers organized by resource.

pub mod analytics;
pub mod auth;
pub mod cards;
pub mod events;
pub mod imports;
pub mod jobs;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(events::routes())
        .merge(cards::routes())
        .merge(imports::routes())
        .merge(analytics::routes())
        .merge(jobs::routes())
}
