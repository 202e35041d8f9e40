//! Cache middleware for the reqwest pipeline.
//!
//! Storage failures never fail a request: a read error is a miss and a write
//! error only costs the next request a round trip.

use std::sync::Arc;

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

use super::{CacheExecutor, CachedResponse};

/// Serves stored responses and stores fresh ones.
#[derive(Debug, Clone)]
pub struct CacheMiddleware {
    executor: Arc<CacheExecutor>,
}

impl CacheMiddleware {
    /// Wrap a shared executor.
    #[must_use]
    pub fn new(executor: Arc<CacheExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl Middleware for CacheMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let key = self.executor.cache_key(&req);

        match self.executor.fetch_key(&key).await {
            Ok(Some(entry)) => match entry.response.into_response() {
                Ok(response) => {
                    tracing::debug!(key = %key, url = %req.url(), "Cache hit");
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Unusable cache entry, fetching");
                }
            },
            Ok(None) => tracing::trace!(key = %key, "Cache miss"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache read failed, fetching"),
        }

        // The strategy only needs the request head; the body goes to the transport.
        let mut head = Request::new(req.method().clone(), req.url().clone());
        *head.headers_mut() = req.headers().clone();

        let response = next.run(req, extensions).await?;
        let received_at = self.executor.now();
        let buffered = CachedResponse::from_response(response, received_at)
            .await
            .map_err(reqwest_middleware::Error::Reqwest)?;

        match self.executor.store_key(key, &head, &buffered).await {
            Ok(Some(entry)) => {
                tracing::debug!(
                    key = %entry.key,
                    expires_at = %entry.expires_at,
                    "Response cached"
                );
            }
            Ok(None) => tracing::trace!(url = %head.url(), "Response not cacheable"),
            Err(e) => tracing::warn!(url = %head.url(), error = %e, "Cache write failed"),
        }

        buffered.into_response().map_err(reqwest_middleware::Error::middleware)
    }
}
