//! Application state

use std::sync::Arc;

use propvest_billing::{BillingService, ProfileStore};

use crate::{
    auth::{AuthState, JwtVerifier},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub billing: BillingService,
    pub jwt: JwtVerifier,
}

impl AppState {
    pub fn new(config: Config, profiles: Arc<dyn ProfileStore>) -> Self {
        let jwt = JwtVerifier::with_supabase_secret(&config.supabase_jwt_secret);
        let billing = BillingService::new(config.webhook.clone(), config.prices.clone(), profiles);

        if config.prices.basic.is_none() && config.prices.pro.is_none() && config.prices.premium.is_none() {
            tracing::warn!("No STRIPE_PRICE_* configured; only canonical plan names will resolve");
        }

        Self {
            config,
            billing,
            jwt,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
        }
    }
}
