//! Middleware stack assembly.
//!
//! Order, outermost first: request logger, cache, retry, signature, transport.
//! Retry sits inside the cache so a cached response short-circuits it, and
//! outside the signer so each attempt is signed afresh.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::cache::{CacheExecutor, CacheMiddleware};
use crate::logging::RequestLogger;
use crate::signature::SignatureInjector;

/// Middleware the client composes around the transport.
#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    pub logger: RequestLogger,
    pub cache: Option<Arc<CacheExecutor>>,
    pub max_retries: u32,
    pub signature: Option<SignatureInjector>,
}

impl Pipeline {
    pub(crate) fn build(self, client: Client) -> ClientWithMiddleware {
        let mut builder = ClientBuilder::new(client).with(self.logger);

        if let Some(executor) = self.cache {
            builder = builder.with(CacheMiddleware::new(executor));
        }

        if self.max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder()
                .retry_bounds(Duration::from_secs(1), Duration::from_secs(30))
                .build_with_max_retries(self.max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        if let Some(signature) = self.signature {
            builder = builder.with(signature);
        }

        builder.build()
    }
}
