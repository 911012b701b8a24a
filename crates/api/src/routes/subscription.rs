//! Paywall entitlement for the signed-in user

use axum::{extract::State, Extension, Json};

use propvest_billing::Entitlement;

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

/// GET /api/v1/subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Entitlement>> {
    let entitlement = state.billing.entitlements.get(&user.user_id).await?;
    Ok(Json(entitlement))
}
