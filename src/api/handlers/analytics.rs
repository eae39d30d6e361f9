//! Analytics handlers.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::events::csv_download;
use crate::api::dto::DateRangeParams;
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::error::{AppError, ErrorResponse};
use crate::service::analytics_service::Analytics;

/// `GET /analytics` — Event, reminder, media and import statistics.
///
/// # Errors
///
/// Returns [`AppError`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/analytics",
    tag = "Analytics",
    summary = "Statistics",
    description = "Counts for the caller's data. `from` and `to` restrict event dates and reminder or import times; either may be omitted.",
    security(("bearer" = [])),
    params(DateRangeParams),
    responses(
        (status = 200, description = "Statistics", body = Analytics),
        (status = 401, description = "Not logged in", body = ErrorResponse),
    )
)]
pub async fn get_analytics(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(range): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.analytics.stats(&user, range.into()).await?;
    Ok(Json(stats))
}

/// `GET /analytics/report` — The same statistics as CSV.
///
/// # Errors
///
/// Returns [`AppError`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/analytics/report",
    tag = "Analytics",
    summary = "Statistics report",
    security(("bearer" = [])),
    params(DateRangeParams),
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv", body = String),
    )
)]
pub async fn analytics_report(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(range): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.analytics.report_csv(&user, range.into()).await?;
    Ok(csv_download("analytics_report.csv", csv))
}

/// Analytics routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(get_analytics))
        .route("/analytics/report", get(analytics_report))
}
