use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Canonical JSON payload for generic failures.
#[derive(Debug, Serialize, Clone)]
pub struct ApiFailure {
    pub success: bool,
    pub error: String,
}

impl ApiFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Distinct payload for quota rejections, so clients can show an upgrade
/// affordance instead of a generic error.
#[derive(Debug, Serialize, Clone)]
pub struct QuotaRejection {
    pub success: bool,
    pub error: String,
    pub quota_exceeded: bool,
    pub upgrade_url: String,
}

impl QuotaRejection {
    pub fn new(error: impl Into<String>, upgrade_url: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            quota_exceeded: true,
            upgrade_url: upgrade_url.into(),
        }
    }
}

/// Helper for handlers that need to return `(StatusCode, Json<ApiFailure>)`.
pub fn json_failure(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiFailure>) {
    (status, Json(ApiFailure::new(message)))
}
