use crate::{config::Limits, errors::AppError};
use axum::http::HeaderMap;
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, sync::Arc};

pub fn require_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let token = extract_bearer(headers).ok_or(AppError::Unauthorized)?;
    if token != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// An empty allow-list means origins are not checked.
pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), AppError> {
    if allowed.is_empty() {
        return Ok(());
    }
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::OriginDenied)?;
    if allowed.iter().any(|o| o == origin) {
        Ok(())
    } else {
        Err(AppError::OriginDenied)
    }
}

pub fn content_length_ok(headers: &HeaderMap, max_kb: usize) -> Result<(), AppError> {
    if let Some(len) = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if len > max_kb * 1024 {
            return Err(AppError::RequestTooLarge);
        }
    }
    Ok(())
}

/// One limiter for the whole server and one per client key (session cookie
/// or bearer token).
#[derive(Clone)]
pub struct RateLimiters {
    global: Arc<DefaultDirectRateLimiter>,
    per_client: Arc<DefaultKeyedRateLimiter<String>>,
}

impl RateLimiters {
    pub fn new(global_rps: u32, global_burst: u32, client_rps: u32, client_burst: u32) -> Self {
        Self {
            global: Arc::new(RateLimiter::direct(quota(global_rps, global_burst))),
            per_client: Arc::new(RateLimiter::keyed(quota(client_rps, client_burst))),
        }
    }

    /// Clients get the configured rate; the server as a whole four times that.
    pub fn from_limits(limits: &Limits) -> Self {
        Self::new(
            limits.requests_per_second.saturating_mul(4),
            limits.burst.saturating_mul(4),
            limits.requests_per_second,
            limits.burst,
        )
    }

    pub fn check(&self, client: Option<&str>) -> Result<(), AppError> {
        if let Some(key) = client {
            self.per_client.check_key(&key.to_string()).map_err(|_| AppError::RateLimited)?;
        }
        self.global.check().map_err(|_| AppError::RateLimited)
    }

    /// Drops per-client buckets that have refilled completely.
    pub fn retain_recent(&self) {
        self.per_client.retain_recent();
        self.per_client.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize { self.per_client.len() }
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(nonzero!(1u32));
    let burst = NonZeroU32::new(burst).unwrap_or(nonzero!(1u32));
    Quota::per_second(rps).allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_enforced_only_when_configured() {
        let mut h = HeaderMap::new();
        assert!(check_origin(&h, &[]).is_ok());
        assert!(check_origin(&h, &["http://localhost:8080".into()]).is_err());
        h.insert("Origin", "http://localhost:8080".parse().unwrap());
        assert!(check_origin(&h, &["http://localhost:8080".into()]).is_ok());
        assert!(check_origin(&h, &["https://elsewhere".into()]).is_err());
    }

    #[test]
    fn bearer_required() {
        let mut h = HeaderMap::new();
        assert!(require_bearer(&h, "token").is_err());
        h.insert(axum::http::header::AUTHORIZATION, "Bearer token".parse().unwrap());
        assert!(require_bearer(&h, "token").is_ok());
        assert!(require_bearer(&h, "wrong").is_err());
        assert_eq!(extract_bearer(&h).as_deref(), Some("token"));
    }

    #[test]
    fn content_length_capped() {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::CONTENT_LENGTH, "2048".parse().unwrap());
        assert!(content_length_ok(&h, 2).is_ok());
        assert!(matches!(content_length_ok(&h, 1), Err(AppError::RequestTooLarge)));
    }

    #[test]
    fn burst_then_limited_per_client() {
        let rl = RateLimiters::new(100, 100, 1, 2);
        assert!(rl.check(Some("a")).is_ok());
        assert!(rl.check(Some("a")).is_ok());
        assert!(matches!(rl.check(Some("a")), Err(AppError::RateLimited)));
        assert!(rl.check(Some("b")).is_ok());
    }

    #[test]
    fn global_quota_covers_anonymous_checks() {
        let rl = RateLimiters::new(1, 2, 100, 100);
        assert!(rl.check(None).is_ok());
        assert!(rl.check(Some("a")).is_ok());
        assert!(matches!(rl.check(None), Err(AppError::RateLimited)));
        assert_eq!(rl.tracked_clients(), 1);
        rl.retain_recent();
        assert!(rl.tracked_clients() <= 1);
    }
}
