//! HTTP routes

mod health;
mod subscription;
mod webhooks;


use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

pub use health::health;
pub use subscription::get_subscription;
pub use webhooks::{stripe_webhook, STRIPE_SIGNATURE_HEADER};

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/subscription", get(get_subscription))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .merge(protected)
        .with_state(state)
}
