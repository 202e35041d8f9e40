//! Extractor HTTP client.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - Request logging at debug level
//! - Response caching (cache-all with fixed TTL by default)
//! - Retry middleware with exponential backoff
//! - Query or header signature injection

mod middleware;

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request, Response};
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

use crate::cache::{
    CacheAllStrategy, CacheExecutor, CacheStorage, Clock, FileStorage, MemoryStorage, SystemClock,
};
use crate::config::{Authentication, Config, api};
use crate::error::{ClientError, ClientResult, ConfigError};
use crate::logging::{LogSink, RequestLogger, TracingSink};
use crate::signature::{SignatureInjector, StaticSignature};

use self::middleware::Pipeline;

/// REST API client with a middleware pipeline around the transport.
#[derive(Clone)]
pub struct ExtractorClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// Base URL relative endpoints resolve against.
    base_url: Url,

    /// Headers attached to every request.
    headers: HeaderMap,

    /// Status codes treated as success.
    ignore_errors: Vec<u16>,

    /// Cache shared with the middleware, if enabled.
    cache: Option<Arc<CacheExecutor>>,

    /// Whether a configured signer is in the pipeline.
    signed: bool,
}

/// Assembles an [`ExtractorClient`], overriding config-derived middleware.
pub struct ExtractorClientBuilder {
    config: Config,
    log_sink: Arc<dyn LogSink>,
    cache: Option<Arc<CacheExecutor>>,
    signature: Option<SignatureInjector>,
    clock: Arc<dyn Clock>,
}

impl ExtractorClientBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            log_sink: Arc::new(TracingSink),
            cache: None,
            signature: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Send request log lines to `sink` instead of `tracing`.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Use this cache executor instead of one built from the config.
    #[must_use]
    pub fn cache(mut self, executor: Arc<CacheExecutor>) -> Self {
        self.cache = Some(executor);
        self
    }

    /// Use this signer instead of one built from the config's authentication.
    #[must_use]
    pub fn signature(mut self, injector: SignatureInjector) -> Self {
        self.signature = Some(injector);
        self
    }

    /// Clock for config-built caches.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns error if a default header is invalid or HTTP client initialization fails.
    pub fn build(self) -> anyhow::Result<ExtractorClient> {
        let headers = header_map(&self.config)?;

        let client = Client::builder()
            .timeout(self.config.request_timeout)
            .connect_timeout(self.config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let cache = self.cache.or_else(|| {
            self.config.cache.as_ref().map(|cache| {
                let clock = self.clock.clone();
                let storage: Arc<dyn CacheStorage> = match &cache.dir {
                    Some(dir) => Arc::new(FileStorage::with_clock(dir, clock)),
                    None => Arc::new(MemoryStorage::with_clock(cache.max_capacity, clock)),
                };
                Arc::new(CacheExecutor::with_clock(
                    Arc::new(CacheAllStrategy::from_duration(cache.ttl)),
                    storage,
                    self.clock.clone(),
                ))
            })
        });

        let signature = self.signature.or_else(|| {
            self.config.authentication.as_ref().map(|auth| match auth {
                Authentication::Query(params) => SignatureInjector::query()
                    .with_generator(StaticSignature::from(params.clone())),
                Authentication::Basic { username, password } => {
                    SignatureInjector::header().with_generator(StaticSignature::new(vec![(
                        "Authorization".to_string(),
                        Authentication::basic_header(username, password),
                    )]))
                }
            })
        });
        let signed = signature.as_ref().is_some_and(SignatureInjector::is_configured);

        tracing::debug!(
            base_url = %self.config.base_url,
            cache = cache.is_some(),
            signed,
            max_retries = self.config.max_retries,
            "Building extractor client"
        );

        let client = Pipeline {
            logger: RequestLogger::new(self.log_sink),
            cache: cache.clone(),
            max_retries: self.config.max_retries,
            signature,
        }
        .build(client);

        Ok(ExtractorClient {
            client,
            base_url: self.config.base_url,
            headers,
            ignore_errors: self.config.ignore_errors,
            cache,
            signed,
        })
    }
}

fn header_map(config: &Config) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let invalid = || ConfigError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

impl ExtractorClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        ExtractorClientBuilder::new(config).build()
    }

    /// Start a builder for finer control over the pipeline.
    #[must_use]
    pub fn builder(config: Config) -> ExtractorClientBuilder {
        ExtractorClientBuilder::new(config)
    }

    /// Check if response caching is enabled.
    #[must_use]
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Check if requests are signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// The shared cache executor, if caching is enabled.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<CacheExecutor>> {
        self.cache.as_ref()
    }

    /// Resolve `endpoint` against the base URL. Absolute URLs pass through.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid URL reference.
    pub fn resolve(&self, endpoint: &str) -> ClientResult<Url> {
        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.base_url.join(endpoint)?),
            Err(e) => Err(e.into()),
        }
    }

    /// GET `endpoint` and parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns error on transport, signing, status or parse failure.
    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> ClientResult<serde_json::Value> {
        self.get_json(endpoint, params).await
    }

    /// GET `endpoint` and deserialize the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// Returns error on transport, signing, status or parse failure.
    pub async fn get_json<T>(&self, endpoint: &str, params: &[(String, String)]) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.resolve(endpoint)?;

        let response =
            self.client.get(url).headers(self.headers.clone()).query(params).send().await?;

        let response = self.handle_response(response).await?;
        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(ClientError::from)
    }

    /// Send a prepared request through the pipeline without status handling.
    ///
    /// Default headers are added where the request does not set them.
    ///
    /// # Errors
    ///
    /// Returns error on transport or signing failure.
    pub async fn send(&self, mut request: Request) -> ClientResult<Response> {
        for (name, value) in &self.headers {
            if !request.headers().contains_key(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }
        Ok(self.client.execute(request).await?)
    }

    /// Handle API response status codes.
    async fn handle_response(&self, response: Response) -> ClientResult<Response> {
        let status = response.status();

        if status.is_success() || self.ignore_errors.contains(&status.as_u16()) {
            return Ok(response);
        }

        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);

                Err(ClientError::rate_limited(retry_after))
            }
            404 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::not_found(text))
            }
            400 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::bad_request(text))
            }
            500..=599 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::server(status.as_u16(), text))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::UnexpectedStatus { status: status.as_u16(), message: text })
            }
        }
    }
}

impl std::fmt::Debug for ExtractorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorClient")
            .field("base_url", &self.base_url.as_str())
            .field("has_cache", &self.has_cache())
            .field("is_signed", &self.signed)
            .finish()
    }
}
