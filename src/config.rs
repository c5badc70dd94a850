//! Server configuration.
//!
//! Values come from the process environment (after `.env` is loaded by
//! `main`). Tests build configs from a plain map through [`AppConfig::from_lookup`].

use anyhow::{anyhow, bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TTL_HOURS: u64 = 24 * 7;
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;
const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

/// Where records are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Supabase { url: String, service_role_key: String },
}

/// Settings for the optional AI extraction path.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model: String,
}

impl AiSettings {
    /// AI extraction runs only when explicitly enabled and a key is present.
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Fixed-window rate limit applied under `/api`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub cors_origins: Vec<String>,
    pub body_limit: usize,
    pub rate_limit: RateLimitSettings,
    pub store: StoreBackend,
    pub ai: AiSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET not set"))?;

        let store = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => StoreBackend::Supabase {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
            },
            _ => StoreBackend::Memory,
        };

        let cors_origins: Vec<String> = get("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        // Credentialed CORS cannot use a wildcard origin.
        if cors_origins.iter().any(|o| o == "*") {
            bail!("CORS_ORIGINS must list explicit origins; \"*\" is not allowed with credentials");
        }

        let ttl_hours: u64 = parse_or(get("JWT_TTL_HOURS"), "JWT_TTL_HOURS", DEFAULT_TTL_HOURS)?;
        let window_secs: u64 = parse_or(
            get("RATE_LIMIT_WINDOW_SECS"),
            "RATE_LIMIT_WINDOW_SECS",
            DEFAULT_RATE_LIMIT_WINDOW_SECS,
        )?;

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            jwt_secret,
            token_ttl: Duration::from_secs(ttl_hours * 3600),
            cors_origins,
            body_limit: parse_or(get("BODY_LIMIT_BYTES"), "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT)?,
            rate_limit: RateLimitSettings {
                max_requests: parse_or(get("RATE_LIMIT_MAX"), "RATE_LIMIT_MAX", DEFAULT_RATE_LIMIT_MAX)?,
                window: Duration::from_secs(window_secs),
            },
            store,
            ai: AiSettings {
                enabled: get("USE_AI")
                    .map(|v| v.trim().eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
                api_key: get("OPENROUTER_API_KEY"),
                model: get("EXTRACTION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, value)),
        None => Ok(default),
    }
}
