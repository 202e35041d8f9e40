//! Error types for the extractor client and its middleware.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::time::Duration;

/// Errors from the HTTP client pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(reqwest_middleware::Error),

    /// The signature generator failed; the request was not sent.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rate limited by the API (429 response)
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested wait time before retry
        retry_after: Duration,
    },

    /// Resource not found (404 response)
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Invalid request parameters (400 response)
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message from API
        message: String,
    },

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint could not be resolved against the base URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Server error (5xx response)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ClientError {
    /// Create a rate limited error with retry-after duration.
    #[must_use]
    pub fn rate_limited(seconds: u64) -> Self {
        Self::RateLimited { retry_after: Duration::from_secs(seconds) }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. })
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<reqwest_middleware::Error> for ClientError {
    /// Middleware errors carry our own failures boxed in `anyhow`; unwrap the
    /// ones we know so callers can match on them.
    ///
    /// The retry layer wraps whatever fails beneath it in a `RetryError`, and
    /// its transparent variant hides the inner error from `source()`, so it is
    /// peeled off explicitly.
    fn from(err: reqwest_middleware::Error) -> Self {
        let e = match err {
            reqwest_middleware::Error::Reqwest(e) => return Self::Http(e),
            reqwest_middleware::Error::Middleware(e) => e,
        };

        let e = match e.downcast::<SigningError>() {
            Ok(signing) => return Self::Signing(signing),
            Err(e) => e,
        };

        match e.downcast::<reqwest_retry::RetryError>() {
            Ok(reqwest_retry::RetryError::Error(inner)) => Self::from(inner),
            Ok(reqwest_retry::RetryError::WithRetries { retries, err }) => {
                tracing::debug!(retries, "Request failed after retries");
                Self::from(err)
            }
            Err(other) => Self::Middleware(reqwest_middleware::Error::Middleware(other)),
        }
    }
}

/// Errors raised while computing or applying a request signature.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The caller-supplied generator failed.
    #[error("signature generator failed: {message}")]
    Generator {
        /// Reason reported by the generator
        message: String,
    },

    /// A generated header name or value is not valid HTTP.
    #[error("generated header '{name}' is not a valid HTTP header")]
    InvalidHeader {
        /// Offending header name
        name: String,
    },
}

impl SigningError {
    /// Create a generator failure.
    #[must_use]
    pub fn generator(message: impl Into<String>) -> Self {
        Self::Generator { message: message.into() }
    }
}

/// Configuration errors, raised at construction time rather than per request.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Cache TTL below zero.
    #[error("cache TTL must not be negative, got {0}")]
    NegativeTtl(i64),

    /// Base URL missing or unparsable.
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// Supplied URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// Default header that cannot be sent.
    #[error("invalid header '{name}'")]
    InvalidHeader {
        /// Header name
        name: String,
    },

    /// Value present but malformed.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field or variable name
        field: &'static str,
        /// Parser message
        reason: String,
    },

    /// Required configuration field not present.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// Authentication type this client does not implement.
    #[error("unsupported authentication type '{0}'")]
    UnsupportedAuth(String),

    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON of the expected shape.
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cache storage failures. The cache middleware treats these as fail-open.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Filesystem error
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A log sink could not accept a line. Swallowed by the request logger.
#[derive(thiserror::Error, Debug)]
#[error("log sink unavailable: {0}")]
pub struct SinkError(pub String);

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
