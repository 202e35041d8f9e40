//! Configuration and client tests.
//!
//! Tests actual behavior, not constants.

use std::time::Duration;

use http_extractor::ExtractorClient;
use http_extractor::config::{Authentication, CacheConfig, Config, api};
use http_extractor::error::ConfigError;
use http_extractor::signature::SignatureInjector;

// =============================================================================
// Config Behavior Tests
// =============================================================================

#[test]
fn test_config_default_has_no_cache() {
    let config = Config::new("https://api.example.com/").unwrap();
    assert!(!config.has_cache());
}

#[test]
fn test_config_with_cache() {
    let config = Config::new("https://api.example.com/")
        .unwrap()
        .with_cache(CacheConfig::from_ttl_secs(120).unwrap());
    assert!(config.has_cache());
    assert_eq!(config.cache.unwrap().ttl, Duration::from_secs(120));
}

#[test]
fn test_config_clone_preserves_authentication() {
    let mut config = Config::new("https://api.example.com/").unwrap();
    config.authentication =
        Some(Authentication::Query([("token".to_string(), "secret".to_string())].into()));
    let cloned = config.clone();
    assert_eq!(config.authentication, cloned.authentication);
}

#[test]
fn test_config_from_json_full_layout() {
    let config = Config::from_json_str(
        r#"{
            "parameters": {
                "api": {
                    "baseUrl": "https://api.example.com/v2/",
                    "http": {
                        "headers": {"Accept": "application/json"},
                        "ignoreErrors": [404, 410]
                    },
                    "retryConfig": {"maxRetries": 7},
                    "authentication": {"type": "query", "query": {"apiKey": "k"}}
                },
                "cache": {"ttl": 90}
            }
        }"#,
    )
    .unwrap();

    assert_eq!(config.base_url.as_str(), "https://api.example.com/v2/");
    assert_eq!(config.headers.get("Accept").map(String::as_str), Some("application/json"));
    assert_eq!(config.ignore_errors, vec![404, 410]);
    assert_eq!(config.max_retries, 7);
    assert_eq!(config.cache.unwrap().ttl, Duration::from_secs(90));
    assert!(matches!(
        config.authentication,
        Some(Authentication::Query(ref q)) if q["apiKey"] == "k"
    ));
}

#[test]
fn test_config_from_json_minimal_uses_defaults() {
    let config =
        Config::from_json_str(r#"{"parameters": {"api": {"baseUrl": "https://api.example.com/"}}}"#)
            .unwrap();
    assert_eq!(config.max_retries, api::MAX_RETRIES);
    assert_eq!(config.request_timeout, api::REQUEST_TIMEOUT);
    assert!(config.ignore_errors.is_empty());
    assert!(!config.has_cache());
}

#[test]
fn test_config_from_json_missing_base_url() {
    let result = Config::from_json_str(r#"{"parameters": {"api": {}}}"#);
    assert!(matches!(result, Err(ConfigError::MissingField("baseUrl"))));
}

#[test]
fn test_config_from_json_negative_ttl() {
    let result = Config::from_json_str(
        r#"{"parameters": {"api": {"baseUrl": "https://a.example/"}, "cache": {"ttl": -5}}}"#,
    );
    assert!(matches!(result, Err(ConfigError::NegativeTtl(-5))));
}

#[test]
fn test_config_from_json_unknown_auth() {
    let result = Config::from_json_str(
        r#"{"parameters": {"api": {"baseUrl": "https://a.example/",
            "authentication": {"type": "oauth20"}}}}"#,
    );
    assert!(matches!(result, Err(ConfigError::UnsupportedAuth(ref kind)) if kind == "oauth20"));
}

#[test]
fn test_config_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"parameters": {"api": {"baseUrl": "https://a.example/"}, "cache": {"dir": "/tmp/x"}}}"#,
    )
    .unwrap();

    let config = Config::from_json_file(&path).unwrap();
    let cache = config.cache.unwrap();
    assert_eq!(cache.ttl, Duration::from_secs(api::CACHE_TTL_SECS as u64));
    assert_eq!(cache.dir.as_deref(), Some(std::path::Path::new("/tmp/x")));
}

#[test]
fn test_config_from_json_basic_auth() {
    let config = Config::from_json_str(
        r##"{"parameters": {
            "api": {"baseUrl": "https://a.example/", "authentication": {"type": "basic"}},
            "config": {"username": "root", "#password": "hunter2", "outputBucket": "ignored"}
        }}"##,
    )
    .unwrap();
    assert_eq!(
        config.authentication,
        Some(Authentication::Basic { username: "root".into(), password: "hunter2".into() })
    );
    assert!(ExtractorClient::new(config).unwrap().is_signed());
}

#[test]
fn test_config_from_json_basic_auth_without_credentials() {
    let result = Config::from_json_str(
        r#"{"parameters": {"api": {"baseUrl": "https://a.example/",
            "authentication": {"type": "basic"}}}}"#,
    );
    assert!(matches!(result, Err(ConfigError::MissingField("#username"))));
}

#[test]
fn test_config_from_missing_file_is_io_error() {
    let result = Config::from_json_file("/nonexistent/extractor/config.json");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

// =============================================================================
// Client Behavior Tests
// =============================================================================

#[test]
fn test_client_creation_succeeds() {
    let config = Config::new("https://api.example.com/").unwrap();
    assert!(ExtractorClient::new(config).is_ok());
}

#[test]
fn test_client_rejects_invalid_header() {
    let mut config = Config::new("https://api.example.com/").unwrap();
    config.headers.insert("Bad Header".to_string(), "x".to_string());
    assert!(ExtractorClient::new(config).is_err());
}

#[test]
fn test_client_reports_cache_status() {
    let config = Config::new("https://api.example.com/")
        .unwrap()
        .with_cache(CacheConfig::from_ttl_secs(10).unwrap());
    let client = ExtractorClient::new(config).unwrap();
    assert!(client.has_cache());
    assert!(client.cache().is_some());

    let client_no_cache =
        ExtractorClient::new(Config::new("https://api.example.com/").unwrap()).unwrap();
    assert!(!client_no_cache.has_cache());
}

#[test]
fn test_client_reports_signature_status() {
    let mut config = Config::new("https://api.example.com/").unwrap();
    config.authentication =
        Some(Authentication::Query([("token".to_string(), "secret".to_string())].into()));
    assert!(ExtractorClient::new(config.clone()).unwrap().is_signed());

    // An explicit unconfigured signer replaces the config-derived one
    let client =
        ExtractorClient::builder(config).signature(SignatureInjector::query()).build().unwrap();
    assert!(!client.is_signed());
}

#[test]
fn test_client_debug_hides_authentication() {
    let mut config = Config::new("https://api.example.com/").unwrap();
    config.authentication =
        Some(Authentication::Query([("token".to_string(), "super-secret-key".to_string())].into()));
    let client = ExtractorClient::new(config).unwrap();
    let debug = format!("{client:?}");
    assert!(!debug.contains("super-secret-key"));
    assert!(debug.contains("is_signed"));
}

#[test]
fn test_client_resolves_endpoints() {
    let client = ExtractorClient::new(Config::new("https://api.example.com/v1/").unwrap()).unwrap();
    assert_eq!(client.resolve("users").unwrap().as_str(), "https://api.example.com/v1/users");
    assert_eq!(
        client.resolve("users?page=2").unwrap().as_str(),
        "https://api.example.com/v1/users?page=2"
    );
    assert_eq!(
        client.resolve("https://other.example/x").unwrap().as_str(),
        "https://other.example/x"
    );
}

#[test]
fn test_client_is_cloneable() {
    let client = ExtractorClient::new(Config::new("https://api.example.com/").unwrap()).unwrap();
    let cloned = client.clone();
    assert_eq!(client.has_cache(), cloned.has_cache());
}
