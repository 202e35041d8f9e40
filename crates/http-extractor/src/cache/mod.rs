//! Response caching.
//!
//! The pieces compose rather than inherit:
//! - [`CacheStrategy`] decides what to keep and for how long
//! - [`CacheStorage`] persists entries and enforces expiry on read
//! - [`CacheExecutor`] derives keys and ties the two together
//! - [`CacheMiddleware`] plugs the executor into the request pipeline

pub mod clock;
mod middleware;
pub mod storage;
pub mod strategy;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Request;
use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use middleware::CacheMiddleware;
pub use storage::{CacheStorage, FileStorage, MemoryStorage};
pub use strategy::{CacheAllStrategy, CacheStrategy, RespectHeadersStrategy};

use crate::error::StorageError;

/// Fully buffered snapshot of a transport response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,

    /// Header pairs in arrival order. Names are lowercase.
    pub headers: Vec<(String, String)>,

    /// Raw body bytes.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    /// When the response was received.
    pub received_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Create a snapshot from its parts.
    #[must_use]
    pub fn new(
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self { status, headers, body, received_at }
    }

    /// Buffer a live response. Headers with non-UTF-8 values are dropped.
    pub async fn from_response(
        response: reqwest::Response,
        received_at: DateTime<Utc>,
    ) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Self { status, headers, body, received_at })
    }

    /// All values of header `name`, compared case-insensitively.
    pub fn header_values<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of header `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    /// Rebuild a `reqwest::Response` carrying this status, headers and body.
    pub fn into_response(self) -> Result<reqwest::Response, http::Error> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(self.body)?;
        Ok(reqwest::Response::from(response))
    }
}

/// A stored response plus its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key derived from the request.
    pub key: String,

    /// The stored response.
    pub response: CachedResponse,

    /// When the entry was written.
    pub stored_at: DateTime<Utc>,

    /// After this instant the entry must not be returned.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// True once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Length of the validity window.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        (self.expires_at - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Strategy + storage + clock, shared by every request through the client.
#[derive(Debug, Clone)]
pub struct CacheExecutor {
    strategy: Arc<dyn CacheStrategy>,
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
}

impl CacheExecutor {
    /// Create an executor on the system clock.
    #[must_use]
    pub fn new(strategy: Arc<dyn CacheStrategy>, storage: Arc<dyn CacheStorage>) -> Self {
        Self::with_clock(strategy, storage, Arc::new(SystemClock))
    }

    /// Create an executor stamping entries with `clock`.
    ///
    /// The storage should read the same clock, otherwise expiry checks drift.
    #[must_use]
    pub fn with_clock(
        strategy: Arc<dyn CacheStrategy>,
        storage: Arc<dyn CacheStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { strategy, storage, clock }
    }

    /// Current time on the executor's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Deterministic key over method, full URL and buffered body.
    #[must_use]
    pub fn cache_key(&self, request: &Request) -> String {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(request.method().as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(request.url().as_str().as_bytes());
        hasher.update(b"|");
        if let Some(body) = request.body().and_then(reqwest::Body::as_bytes) {
            hasher.update(body);
        }

        format!("{:x}", hasher.finalize())
    }

    /// Stored entry for `request`, as the storage reports it.
    pub async fn fetch(&self, request: &Request) -> Result<Option<CacheEntry>, StorageError> {
        self.fetch_key(&self.cache_key(request)).await
    }

    /// Stored entry for a precomputed key.
    pub async fn fetch_key(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        self.storage.fetch(key).await
    }

    /// Store `response` if the strategy accepts it. Returns the written entry.
    pub async fn store(
        &self,
        request: &Request,
        response: &CachedResponse,
    ) -> Result<Option<CacheEntry>, StorageError> {
        let key = self.cache_key(request);
        self.store_key(key, request, response).await
    }

    /// Like [`store`](Self::store) with a precomputed key.
    pub async fn store_key(
        &self,
        key: String,
        request: &Request,
        response: &CachedResponse,
    ) -> Result<Option<CacheEntry>, StorageError> {
        if !self.strategy.should_cache(request, response) {
            return Ok(None);
        }
        let Some(ttl) = self.strategy.ttl(response) else {
            return Ok(None);
        };

        let stored_at = self.clock.now();
        let entry = CacheEntry {
            key,
            response: response.clone(),
            stored_at,
            expires_at: clock::expiry_after(stored_at, ttl),
        };
        self.storage.store(&entry.key, entry.clone()).await?;
        Ok(Some(entry))
    }
}

mod body_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
