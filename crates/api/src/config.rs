//! Server configuration loaded from the environment

use propvest_billing::{PriceIds, WebhookConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("billing configuration: {0}")]
    Billing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` (`pretty` or `json`)
    fn from_env() -> Result<Self, ConfigError> {
        match optional("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub webhook: WebhookConfig,
    pub prices: PriceIds,
    /// HS256 secret Supabase signs access tokens with
    pub supabase_jwt_secret: String,
    pub allowed_origins: Vec<String>,
    pub run_migrations: bool,
    pub log_format: LogFormat,
}

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let supabase_jwt_secret = required("SUPABASE_JWT_SECRET")?;
        let webhook = WebhookConfig::from_env().map_err(|e| ConfigError::Billing(e.to_string()))?;

        let allowed_origins = optional("ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address: optional("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            webhook,
            prices: PriceIds::from_env(),
            supabase_jwt_secret,
            allowed_origins,
            run_migrations: parse_bool("RUN_MIGRATIONS", true)?,
            log_format: LogFormat::from_env()?,
        })
    }
}
