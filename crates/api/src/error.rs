//! API error type and HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use propvest_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Failure while handling a provider delivery. Any non-2xx makes the
    /// provider redeliver, so persistence failures answer 400 here.
    #[error(transparent)]
    Webhook(BillingError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn internal_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Webhook(BillingError::Database(e)) => {
                tracing::error!(error = %e, retryable = true, "Database error while handling webhook");
                (
                    StatusCode::BAD_REQUEST,
                    "Failed to persist subscription change".to_string(),
                )
            }
            ApiError::Billing(BillingError::Database(e)) => {
                tracing::error!(error = %e, retryable = true, "Database error while handling request");
                internal_error()
            }
            ApiError::Webhook(BillingError::Config(e)) | ApiError::Billing(BillingError::Config(e)) => {
                tracing::error!(error = %e, "Billing misconfigured");
                internal_error()
            }
            ApiError::Webhook(e) | ApiError::Billing(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                internal_error()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
