//! Legacy Extractor - turns free-form legacy text records into schema-shaped
//! rows, with per-company history and document storage behind a JWT API.

pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod openrouter;
pub mod rate_limit;
pub mod routes;
pub mod schema;
pub mod store;

use auth::TokenService;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use config::AppConfig;
use extractor::Extractor;
use rate_limit::RateLimiter;
use std::sync::Arc;
use store::Store;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenService>,
    pub extractor: Extractor,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, extractor: Extractor) -> Self {
        Self {
            tokens: Arc::new(TokenService::new(&config.jwt_secret, config.token_ttl)),
            rate_limiter: RateLimiter::new(config.rate_limit),
            config: Arc::new(config),
            store,
            extractor,
        }
    }
}

/// Build the full HTTP application.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .nest("/api", routes::api_router(state.clone()))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) if o != "*" => Some(value),
            _ => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
