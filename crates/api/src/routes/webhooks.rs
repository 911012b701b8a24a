//! Stripe webhook endpoint
//!
//! Receives the raw body so the signature is checked over the exact bytes
//! Stripe signed.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use propvest_billing::{BillingError, WebhookOutcome};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let delivery_id = Uuid::new_v4();
    let span = tracing::info_span!("stripe_webhook", %delivery_id);

    async move {
        let signature = headers
            .get(STRIPE_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!("Missing Stripe-Signature header");
                ApiError::Webhook(BillingError::WebhookSignatureMissing)
            })?;

        let payload = std::str::from_utf8(&body)
            .map_err(|e| {
                ApiError::Webhook(BillingError::MalformedPayload(format!(
                    "body is not UTF-8: {}",
                    e
                )))
            })?;

        let outcome = state
            .billing
            .webhooks
            .process(payload, signature)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, retryable = e.is_retryable(), "Webhook delivery failed");
                ApiError::Webhook(e)
            })?;

        match &outcome {
            WebhookOutcome::Applied {
                user_id,
                tier,
                status,
            } => tracing::info!(%user_id, %tier, %status, "Webhook reconciled subscription"),
            WebhookOutcome::SkippedNoUser { event_type } => {
                tracing::debug!(%event_type, "Webhook acknowledged without user")
            }
            WebhookOutcome::Ignored { event_type } => {
                tracing::debug!(%event_type, "Webhook acknowledged and ignored")
            }
        }

        Ok::<_, ApiError>((StatusCode::OK, Json(json!({ "received": true }))))
    }
    .instrument(span)
    .await
}
