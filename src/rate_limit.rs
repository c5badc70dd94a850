//! Fixed-window request limiter keyed by client address.

use crate::config::RateLimitSettings;
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Expired windows are only swept once this many clients are tracked.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request for `key`. On rejection returns how long until the
    /// window resets.
    pub fn check(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window_len = self.settings.window;

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < window_len);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= window_len {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.settings.max_requests {
            return Err(window_len.saturating_sub(now.duration_since(window.started)));
        }
        window.count += 1;
        Ok(())
    }
}

/// Middleware applied to every `/api` route.
pub async fn limit_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match state.rate_limiter.check(&key, Instant::now()) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            debug!("Rate limit exceeded for {}", key);
            ApiError::TooManyRequests(retry_after.as_secs().max(1)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            max_requests: max,
            window: Duration::from_secs(secs),
        })
    }

    #[test]
    fn test_allows_up_to_max_per_window() {
        let limiter = limiter(2, 60);
        let now = Instant::now();
        assert!(limiter.check("a", now).is_ok());
        assert!(limiter.check("a", now).is_ok());
        let retry = limiter.check("a", now + Duration::from_secs(10)).unwrap_err();
        assert_eq!(retry, Duration::from_secs(50));
        // Other clients have their own window.
        assert!(limiter.check("b", now).is_ok());
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check("a", now).is_ok());
        assert!(limiter.check("a", now).is_err());
        assert!(limiter.check("a", now + Duration::from_secs(61)).is_ok());
        assert!(limiter.check("a", now + Duration::from_secs(61)).is_err());
    }

    #[test]
    fn test_expired_windows_swept_past_threshold() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        for i in 0..SWEEP_THRESHOLD - 1 {
            assert!(limiter.check(&format!("client-{}", i), now).is_ok());
        }
        assert!(limiter.check("last", now).is_ok());
        assert_eq!(limiter.windows.lock().unwrap().len(), SWEEP_THRESHOLD);

        // The map is full, so expired entries are dropped on this call.
        assert!(limiter.check("fresh", now + Duration::from_secs(61)).is_ok());
        assert_eq!(limiter.windows.lock().unwrap().len(), 1);
    }
}
