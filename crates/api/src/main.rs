//! Propvest API Server
//!
//! Receives Stripe webhooks, keeps profile subscription state in step with
//! billing, and serves paywall entitlements to signed-in users.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use propvest_api::{create_router, AppState, Config, LogFormat};
use propvest_billing::PgProfileStore;
use propvest_shared::{create_pool, run_migrations};

const DEFAULT_LOG_FILTER: &str = "info,propvest_api=debug,propvest_billing=debug";

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Starting Propvest API Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        webhook = ?config.webhook,
        prices = ?config.prices,
        "Configuration loaded"
    );

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    if config.run_migrations {
        run_migrations(&pool).await?;
    } else {
        tracing::info!("Database migrations skipped (RUN_MIGRATIONS=false)");
    }

    let state = AppState::new(config.clone(), Arc::new(PgProfileStore::new(pool)));

    // Report drift left behind by earlier deliveries; never blocks startup
    match state.billing.invariant_checker().run().await {
        Ok(summary) if summary.healthy => tracing::info!(
            records_checked = summary.records_checked,
            checks_run = summary.checks_run,
            "Subscription invariants hold"
        ),
        Ok(summary) => tracing::warn!(
            records_checked = summary.records_checked,
            checks_failed = summary.checks_failed,
            violations = summary.violations.len(),
            "Subscription invariant violations found"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to run subscription invariant checks"),
    }

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    tracing::info!(
        allowed_origins = ?allowed_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
