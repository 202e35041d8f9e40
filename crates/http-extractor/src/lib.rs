//! HTTP Extractor
//!
//! A configurable client for pulling data out of REST APIs. Cross-cutting
//! concerns are middleware around the reqwest transport.
//!
//! # Features
//!
//! - **Request logging**: one debug line per request with headers and body
//! - **Response caching**: cache-all with a fixed TTL, in memory or on disk
//! - **Signatures**: generated tokens merged into the query string or headers
//! - **Retries**: exponential backoff on transient failures
//!
//! # Example
//!
//! ```no_run
//! use http_extractor::{ExtractorClient, config::{CacheConfig, Config}};
//! use http_extractor::signature::{SignatureInjector, StaticSignature};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new("https://api.example.com/v1/")?
//!         .with_cache(CacheConfig::from_ttl_secs(300)?);
//!
//!     let signer = SignatureInjector::query()
//!         .with_generator(StaticSignature::new(vec![("token".into(), "secret".into())]));
//!
//!     let client = ExtractorClient::builder(config).signature(signer).build()?;
//!     let users = client.get("users", &[]).await?;
//!     println!("{users}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod signature;

pub use client::{ExtractorClient, ExtractorClientBuilder};
pub use config::Config;
pub use error::{ClientError, ConfigError, SigningError, StorageError};
