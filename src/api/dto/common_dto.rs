//! Shared DTO types used across multiple endpoints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::service::analytics_service::DateRange;

/// Plain acknowledgement body.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    /// Wraps `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Optional inclusive date range query.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateRangeParams {
    /// First day included (`YYYY-MM-DD`).
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Last day included (`YYYY-MM-DD`).
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl From<DateRangeParams> for DateRange {
    fn from(params: DateRangeParams) -> Self {
        Self {
            from: params.from,
            to: params.to,
        }
    }
}

/// Form body accepted by the batch job endpoints.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct JobTriggerForm {
    /// Shared cron secret.
    #[serde(default)]
    pub token: String,
}
