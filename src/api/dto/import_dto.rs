//! CSV import DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ImportLog;

/// Response body for `POST /imports`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportResponse {
    /// Import run id.
    pub id: uuid::Uuid,
    /// Uploaded file name.
    pub file_name: String,
    /// Run time.
    pub imported_at: DateTime<Utc>,
    /// Rows committed.
    pub success_count: i32,
    /// Rows rejected.
    pub failure_count: i32,
    /// One message per rejected row.
    pub errors: Vec<String>,
}

impl From<ImportLog> for ImportResponse {
    fn from(log: ImportLog) -> Self {
        Self {
            id: log.id,
            file_name: log.file_name,
            imported_at: log.imported_at,
            success_count: log.success_count,
            failure_count: log.failure_count,
            errors: log.errors,
        }
    }
}
