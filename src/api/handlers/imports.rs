//! CSV import handlers.

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::events::csv_download;
use crate::api::dto::ImportResponse;
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::error::{AppError, ErrorResponse};

/// Request body cap for imports. The configured file limit is enforced by
/// the import service below this.
const IMPORT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Multipart field carrying the CSV file.
const FILE_FIELD: &str = "file";

/// `POST /imports` — Bulk-create events from a CSV file.
///
/// # Errors
///
/// Returns [`AppError::Validation`] when the file is rejected as a whole.
/// Row-level problems are reported in the response body instead.
#[utoipa::path(
    post,
    path = "/api/v1/imports",
    tag = "Imports",
    summary = "Import events from CSV",
    description = "Multipart upload with a `file` part. Header: `name,event_type,date,remind_days_before,message,custom_label,is_recurring`. Valid rows are committed even when others fail.",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Import finished", body = ImportResponse),
        (status = 400, description = "File rejected", body = ErrorResponse),
    )
)]
pub async fn import_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("malformed multipart body: {e}")))?;
        upload = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = upload else {
        return Err(AppError::InvalidRequest(format!(
            "missing multipart field '{FILE_FIELD}'"
        )));
    };

    let log = state.imports.import(&user, &file_name, &bytes).await?;
    Ok((StatusCode::CREATED, Json(ImportResponse::from(log))))
}

/// `GET /imports/template` — Downloadable CSV template.
#[utoipa::path(
    get,
    path = "/api/v1/imports/template",
    tag = "Imports",
    summary = "CSV template",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Template download", content_type = "text/csv", body = String),
    )
)]
pub async fn import_template(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> impl IntoResponse {
    csv_download("events_template.csv", state.imports.template())
}

/// Import routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/imports",
            post(import_events).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
        .route("/imports/template", get(import_template))
}

#[cfg(test)]
mod tests {
    use utoipa::OpenApi;

    use crate::api::ApiDoc;
    use crate::service::import_service::IMPORT_HEADER;

    #[test]
    fn documented_header_matches_accepted_header() {
        let doc = ApiDoc::openapi();
        let description = doc
            .paths
            .paths
            .get("/api/v1/imports")
            .and_then(|item| item.post.as_ref())
            .and_then(|op| op.description.clone())
            .unwrap_or_default();
        assert!(
            description.contains(&format!("`{}`", IMPORT_HEADER.join(","))),
            "{description}"
        );
    }
}
