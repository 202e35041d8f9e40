//! Cache strategies: which responses to keep, and for how long.

use std::time::Duration;

use reqwest::Request;

use super::CachedResponse;
use crate::error::ConfigError;

/// Decides whether a response is cacheable and how long it stays valid.
pub trait CacheStrategy: Send + Sync + std::fmt::Debug {
    /// Whether `response` to `request` should be stored.
    fn should_cache(&self, request: &Request, response: &CachedResponse) -> bool;

    /// Lifetime of a stored response. `None` means do not store.
    fn ttl(&self, response: &CachedResponse) -> Option<Duration>;
}

/// Caches every response for a fixed TTL, ignoring `Cache-Control`.
///
/// Useful while developing extractor configs against a live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheAllStrategy {
    ttl: Duration,
}

impl CacheAllStrategy {
    /// Create the strategy from a TTL in seconds. Negative values are rejected.
    pub fn new(ttl_secs: i64) -> Result<Self, ConfigError> {
        let secs = u64::try_from(ttl_secs).map_err(|_| ConfigError::NegativeTtl(ttl_secs))?;
        Ok(Self { ttl: Duration::from_secs(secs) })
    }

    /// Create the strategy from an already validated duration.
    #[must_use]
    pub const fn from_duration(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Fixed TTL applied to every response.
    #[must_use]
    pub const fn ttl_duration(&self) -> Duration {
        self.ttl
    }
}

impl CacheStrategy for CacheAllStrategy {
    fn should_cache(&self, _request: &Request, _response: &CachedResponse) -> bool {
        true
    }

    fn ttl(&self, _response: &CachedResponse) -> Option<Duration> {
        Some(self.ttl)
    }
}

/// Caches only what the origin allows, for as long as `Cache-Control` says.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RespectHeadersStrategy;

/// Status codes cacheable by default (RFC 9110 §15.1).
const CACHEABLE_STATUSES: &[u16] = &[200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

impl RespectHeadersStrategy {
    fn directives(response: &CachedResponse) -> Vec<(String, Option<String>)> {
        response
            .header_values("cache-control")
            .flat_map(|value| value.split(','))
            .filter_map(|directive| {
                let directive = directive.trim();
                if directive.is_empty() {
                    return None;
                }
                Some(match directive.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_ascii_lowercase(),
                        Some(value.trim().trim_matches('"').to_string()),
                    ),
                    None => (directive.to_ascii_lowercase(), None),
                })
            })
            .collect()
    }
}

impl CacheStrategy for RespectHeadersStrategy {
    fn should_cache(&self, _request: &Request, response: &CachedResponse) -> bool {
        if !CACHEABLE_STATUSES.contains(&response.status) {
            return false;
        }
        let forbidden = Self::directives(response)
            .iter()
            .any(|(name, _)| matches!(name.as_str(), "no-store" | "no-cache" | "private"));
        !forbidden && self.ttl(response).is_some()
    }

    fn ttl(&self, response: &CachedResponse) -> Option<Duration> {
        let directives = Self::directives(response);
        let lookup = |wanted: &str| {
            directives
                .iter()
                .find(|(name, _)| name == wanted)
                .and_then(|(_, value)| value.as_deref())
                .and_then(|value| value.parse::<u64>().ok())
        };
        // s-maxage applies to shared caches and wins over max-age
        lookup("s-maxage").or_else(|| lookup("max-age")).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn request() -> Request {
        Request::new(reqwest::Method::GET, "https://example.com/items".parse().unwrap())
    }

    fn response(status: u16, cache_control: Option<&str>) -> CachedResponse {
        let headers = cache_control
            .map(|v| vec![("cache-control".to_string(), v.to_string())])
            .unwrap_or_default();
        CachedResponse::new(status, headers, b"{}".to_vec(), Utc::now())
    }

    #[test]
    fn test_cache_all_rejects_negative_ttl() {
        assert!(matches!(CacheAllStrategy::new(-1), Err(ConfigError::NegativeTtl(-1))));
    }

    #[test]
    fn test_cache_all_ignores_cache_control() {
        let strategy = CacheAllStrategy::new(30).unwrap();
        let resp = response(500, Some("no-store, private"));
        assert!(strategy.should_cache(&request(), &resp));
        assert_eq!(strategy.ttl(&resp), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_cache_all_zero_ttl() {
        let strategy = CacheAllStrategy::new(0).unwrap();
        assert_eq!(strategy.ttl(&response(200, None)), Some(Duration::ZERO));
    }

    #[test]
    fn test_respect_headers_uses_max_age() {
        let strategy = RespectHeadersStrategy;
        let resp = response(200, Some("public, max-age=120"));
        assert!(strategy.should_cache(&request(), &resp));
        assert_eq!(strategy.ttl(&resp), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_respect_headers_prefers_s_maxage() {
        let resp = response(200, Some("max-age=10, s-maxage=\"60\""));
        assert_eq!(RespectHeadersStrategy.ttl(&resp), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_respect_headers_refuses() {
        let strategy = RespectHeadersStrategy;
        assert!(!strategy.should_cache(&request(), &response(200, Some("no-store, max-age=60"))));
        assert!(!strategy.should_cache(&request(), &response(200, Some("Private, max-age=60"))));
        assert!(!strategy.should_cache(&request(), &response(500, Some("max-age=60"))));
        assert!(!strategy.should_cache(&request(), &response(200, None)));
    }
}
