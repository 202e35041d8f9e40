//! Configuration for the extractor client.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Client configuration constants.
pub mod api {
    use std::time::Duration;

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Retries for transient failures.
    pub const MAX_RETRIES: u32 = 3;

    /// Cache TTL when a cache section is present without one (one week).
    pub const CACHE_TTL_SECS: i64 = 604_800;

    /// Maximum entries held by the in-memory cache.
    pub const CACHE_MAX_SIZE: u64 = 1000;

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Fixed time-to-live applied to every cached response.
    pub ttl: Duration,

    /// Directory for on-disk entries. `None` keeps entries in memory.
    pub dir: Option<PathBuf>,

    /// Capacity of the in-memory store.
    pub max_capacity: u64,
}

impl CacheConfig {
    /// Build a cache config from a TTL in seconds.
    ///
    /// Negative values are rejected here so a bad TTL never reaches a request.
    pub fn from_ttl_secs(ttl: i64) -> Result<Self, ConfigError> {
        let secs = u64::try_from(ttl).map_err(|_| ConfigError::NegativeTtl(ttl))?;
        Ok(Self { ttl: Duration::from_secs(secs), dir: None, max_capacity: api::CACHE_MAX_SIZE })
    }

    /// Store entries on disk under `dir`.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }
}

/// Authentication the client applies to every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    /// Fixed query parameters merged into each request URL.
    Query(BTreeMap<String, String>),

    /// HTTP basic credentials sent as an `Authorization` header.
    Basic {
        /// User name
        username: String,
        /// Password
        password: String,
    },
}

impl Authentication {
    /// `Authorization` header value for basic credentials.
    #[must_use]
    pub fn basic_header(username: &str, password: &str) -> String {
        use base64::Engine as _;
        use base64::engine::general_purpose::STANDARD;

        format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
    }
}

impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query(params) => {
                f.debug_tuple("Query").field(&params.keys().collect::<Vec<_>>()).finish()
            }
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Extractor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API base URL; relative endpoints are joined onto it.
    pub base_url: Url,

    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Retries for transient failures (0 disables retrying).
    pub max_retries: u32,

    /// Status codes treated as success.
    pub ignore_errors: Vec<u16>,

    /// Response cache, disabled when `None`.
    pub cache: Option<CacheConfig>,

    /// Authentication, none when `None`.
    pub authentication: Option<Authentication>,
}

impl Config {
    /// Create a configuration with defaults for everything but the base URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            headers: BTreeMap::new(),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            max_retries: api::MAX_RETRIES,
            ignore_errors: Vec::new(),
            cache: None,
            authentication: None,
        })
    }

    /// Create a test configuration pointed at a mock server.
    ///
    /// # Panics
    ///
    /// Panics if `base_url` is not a valid URL.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        let mut config = Self::new(base_url).expect("valid mock server URL");
        config.request_timeout = Duration::from_secs(5);
        config.connect_timeout = Duration::from_secs(2);
        config.max_retries = 0; // Fail fast in tests
        config
    }

    /// Enable the response cache.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parse the extractor's JSON config layout.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(raw)?;
        file.parameters.into_config()
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from `EXTRACTOR_*` variables read through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url =
            lookup("EXTRACTOR_BASE_URL").ok_or(ConfigError::MissingField("baseUrl"))?;
        let mut config = Self::new(&base_url)?;

        if let Some(ttl) = lookup("EXTRACTOR_CACHE_TTL") {
            let ttl = ttl.trim().parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                field: "EXTRACTOR_CACHE_TTL",
                reason: e.to_string(),
            })?;
            let mut cache = CacheConfig::from_ttl_secs(ttl)?;
            if let Some(dir) = lookup("EXTRACTOR_CACHE_DIR") {
                cache = cache.with_dir(dir);
            }
            config.cache = Some(cache);
        }

        Ok(config)
    }

    /// Check if response caching is enabled.
    #[must_use]
    pub const fn has_cache(&self) -> bool {
        self.cache.is_some()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidBaseUrl { url: raw.to_string(), reason: e.to_string() })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "URL cannot be a base".to_string(),
        });
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    parameters: Parameters,
}

#[derive(Debug, Deserialize)]
struct Parameters {
    api: ApiSection,
    #[serde(default)]
    cache: Option<CacheSection>,
    #[serde(default)]
    config: Attributes,
}

/// Job attributes; credentials may use the encrypted `#` form.
#[derive(Debug, Default, Deserialize)]
struct Attributes {
    username: Option<String>,
    #[serde(rename = "#username")]
    secret_username: Option<String>,
    password: Option<String>,
    #[serde(rename = "#password")]
    secret_password: Option<String>,
}

impl Attributes {
    fn credentials(self) -> Result<(String, String), ConfigError> {
        let pick = |plain: Option<String>, secret: Option<String>| {
            plain.filter(|v| !v.is_empty()).or(secret.filter(|v| !v.is_empty()))
        };
        let username = pick(self.username, self.secret_username)
            .ok_or(ConfigError::MissingField("#username"))?;
        let password = pick(self.password, self.secret_password)
            .ok_or(ConfigError::MissingField("#password"))?;
        Ok((username, password))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSection {
    base_url: Option<String>,
    #[serde(default)]
    http: HttpSection,
    #[serde(default)]
    retry_config: RetrySection,
    #[serde(default)]
    authentication: Option<AuthSection>,
    /// Older location of the query authentication parameters.
    #[serde(default)]
    query: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpSection {
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    ignore_errors: Vec<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrySection {
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AuthSection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    query: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSection {
    ttl: Option<i64>,
    dir: Option<PathBuf>,
}

impl Parameters {
    fn into_config(self) -> Result<Config, ConfigError> {
        let base_url = self.api.base_url.ok_or(ConfigError::MissingField("baseUrl"))?;
        let mut config = Config::new(&base_url)?;

        config.headers = self.api.http.headers;
        config.ignore_errors = self.api.http.ignore_errors;
        if let Some(max_retries) = self.api.retry_config.max_retries {
            config.max_retries = max_retries;
        }

        if let Some(auth) = self.api.authentication {
            config.authentication = Some(match auth.kind.as_str() {
                "basic" => {
                    let (username, password) = self.config.credentials()?;
                    Authentication::Basic { username, password }
                }
                "query" | "url.query" => {
                    if auth.kind == "url.query" {
                        tracing::warn!("Authentication 'url.query' is deprecated, use 'query'");
                    }
                    let query = if auth.query.is_empty() { self.api.query } else { auth.query };
                    if query.is_empty() {
                        return Err(ConfigError::MissingField("authentication.query"));
                    }
                    Authentication::Query(query)
                }
                other => return Err(ConfigError::UnsupportedAuth(other.to_string())),
            });
        }

        if let Some(cache) = self.cache {
            let mut cache_config =
                CacheConfig::from_ttl_secs(cache.ttl.unwrap_or(api::CACHE_TTL_SECS))?;
            cache_config.dir = cache.dir;
            config.cache = Some(cache_config);
        }

        Ok(config)
    }
}
