//! Batch job triggers for an external scheduler.
//!
//! Each stage is idempotent. Calls must carry the shared cron secret in a
//! form field named `token`; without a configured secret every call is
//! refused.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Form, Json, Router};

use crate::api::dto::JobTriggerForm;
use crate::app_state::AppState;
use crate::error::{AppError, ErrorResponse};
use crate::service::JobStage;
use crate::service::job_service::JobReport;

/// `POST /jobs/{stage}` — Run one batch stage now.
///
/// # Errors
///
/// Returns [`AppError::Forbidden`] for a missing or wrong token.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{stage}",
    tag = "Jobs",
    summary = "Run batch stage",
    description = "Stages: `reminders`, `recurring`, `deletion-notices`, `media-cleanup`, `run-all`. The body is a form with the cron `token`.",
    params(("stage" = String, Path, description = "Stage name")),
    request_body(content = JobTriggerForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Stage report", body = JobReport),
        (status = 403, description = "Bad token", body = ErrorResponse),
    )
)]
pub async fn run_stage(
    State(state): State<AppState>,
    Path(stage): Path<JobStage>,
    Form(form): Form<JobTriggerForm>,
) -> Result<impl IntoResponse, AppError> {
    authorize(state.cron_secret.as_deref(), &form.token)?;
    tracing::info!(stage = stage.as_str(), "batch stage triggered");
    let report = state.jobs.run(stage).await?;
    Ok(Json(report))
}

fn authorize(secret: Option<&str>, token: &str) -> Result<(), AppError> {
    match secret {
        Some(secret) if secret == token.trim() => Ok(()),
        Some(_) => Err(AppError::Forbidden("invalid job token".to_string())),
        None => Err(AppError::Forbidden("job endpoints are disabled".to_string())),
    }
}

/// Job routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/jobs/{stage}", post(run_stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_must_match_configured_secret() {
        assert!(authorize(Some("s3cret"), "s3cret").is_ok());
        assert!(authorize(Some("s3cret"), " s3cret ").is_ok());
        assert!(authorize(Some("s3cret"), "nope").is_err());
        assert!(authorize(None, "").is_err());
        assert!(authorize(None, "anything").is_err());
    }
}
