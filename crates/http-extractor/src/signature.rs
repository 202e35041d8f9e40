//! Signature injection.
//!
//! A [`SignatureGenerator`] produces name/value pairs right before dispatch;
//! [`SignatureInjector`] merges them into the request's query string or
//! headers. Signing is fail-closed: if the generator errors, the request is
//! not sent.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::Extensions;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use url::{Url, form_urlencoded};

use crate::error::SigningError;

/// Name/value pairs produced by a generator, in merge order.
pub type SignatureParams = Vec<(String, String)>;

/// Produces the parameters that authenticate one request.
///
/// Called once per request, synchronously, just before dispatch.
pub trait SignatureGenerator: Send + Sync {
    /// Compute the signature parameters.
    fn generate(&self) -> Result<SignatureParams, SigningError>;
}

impl<F> SignatureGenerator for F
where
    F: Fn() -> Result<SignatureParams, SigningError> + Send + Sync,
{
    fn generate(&self) -> Result<SignatureParams, SigningError> {
        self()
    }
}

/// Generator returning the same parameters every time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSignature {
    params: SignatureParams,
}

impl StaticSignature {
    /// Always return `params`.
    #[must_use]
    pub fn new(params: SignatureParams) -> Self {
        Self { params }
    }
}

impl From<BTreeMap<String, String>> for StaticSignature {
    fn from(params: BTreeMap<String, String>) -> Self {
        Self::new(params.into_iter().collect())
    }
}

impl SignatureGenerator for StaticSignature {
    fn generate(&self) -> Result<SignatureParams, SigningError> {
        Ok(self.params.clone())
    }
}

/// Where generated parameters go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    /// Merged into the URL query string.
    #[default]
    Query,
    /// Set as request headers.
    Header,
}

/// Injects generated signature parameters into outgoing requests.
///
/// Starts unconfigured, in which state it passes requests through untouched.
#[derive(Clone, Default)]
pub struct SignatureInjector {
    placement: Placement,
    generator: Option<Arc<dyn SignatureGenerator>>,
}

impl SignatureInjector {
    /// Unconfigured injector writing into the query string.
    #[must_use]
    pub fn query() -> Self {
        Self { placement: Placement::Query, generator: None }
    }

    /// Unconfigured injector writing headers.
    #[must_use]
    pub fn header() -> Self {
        Self { placement: Placement::Header, generator: None }
    }

    /// Install the generator, moving the injector to the configured state.
    pub fn set_signature_generator<G>(&mut self, generator: G)
    where
        G: SignatureGenerator + 'static,
    {
        self.generator = Some(Arc::new(generator));
    }

    /// Install a closure as the generator.
    pub fn set_signature_fn<F>(&mut self, generator: F)
    where
        F: Fn() -> Result<SignatureParams, SigningError> + Send + Sync + 'static,
    {
        self.set_signature_generator(generator);
    }

    /// Builder-style [`set_signature_generator`](Self::set_signature_generator).
    #[must_use]
    pub fn with_generator<G>(mut self, generator: G) -> Self
    where
        G: SignatureGenerator + 'static,
    {
        self.set_signature_generator(generator);
        self
    }

    /// Whether a generator has been installed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Target of the generated parameters.
    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    /// Run the generator once and merge its output into `request`.
    ///
    /// Existing parameters of the same name are overwritten. Without a
    /// generator the request is left exactly as it was.
    pub fn add_signature(&self, request: &mut Request) -> Result<(), SigningError> {
        let Some(generator) = &self.generator else {
            return Ok(());
        };
        let params = generator.generate()?;

        match self.placement {
            Placement::Query => merge_query(request.url_mut(), &params),
            Placement::Header => {
                for (name, value) in &params {
                    let invalid = || SigningError::InvalidHeader { name: name.clone() };
                    let header_name =
                        HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
                    let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
                    request.headers_mut().insert(header_name, header_value);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SignatureInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureInjector")
            .field("placement", &self.placement)
            .field("configured", &self.is_configured())
            .finish()
    }
}

#[async_trait::async_trait]
impl Middleware for SignatureInjector {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if let Err(e) = self.add_signature(&mut req) {
            tracing::warn!(url = %req.url(), error = %e, "Request signing failed, not sending");
            return Err(reqwest_middleware::Error::middleware(e));
        }
        next.run(req, extensions).await
    }
}

/// Merge `params` into the query of `url`.
///
/// A name already present keeps its position and takes the new value; any
/// further duplicates of that name are dropped. New names are appended.
/// Segments whose name is not generated are kept byte for byte.
pub fn merge_query(url: &mut Url, params: &[(String, String)]) {
    if params.is_empty() {
        return;
    }

    // Later pairs with a repeated name win, at the first one's position.
    let mut signature: Vec<(&str, &str)> = Vec::with_capacity(params.len());
    for (name, value) in params {
        match signature.iter_mut().find(|(k, _)| *k == name.as_str()) {
            Some(existing) => existing.1 = value.as_str(),
            None => signature.push((name.as_str(), value.as_str())),
        }
    }
    let mut placed = vec![false; signature.len()];

    let mut segments: Vec<String> = Vec::new();
    let existing = url.query().filter(|q| !q.is_empty()).into_iter().flat_map(|q| q.split('&'));
    for segment in existing {
        let name = form_urlencoded::parse(segment.as_bytes()).next().map(|(k, _)| k);
        let position = name.and_then(|name| signature.iter().position(|(k, _)| *k == name));
        match position {
            Some(i) if placed[i] => {}
            Some(i) => {
                placed[i] = true;
                segments.push(encode_pair(signature[i]));
            }
            None => segments.push(segment.to_string()),
        }
    }
    for (pair, done) in signature.iter().zip(&placed) {
        if !done {
            segments.push(encode_pair(*pair));
        }
    }

    url.set_query(Some(&segments.join("&")));
}

fn encode_pair((name, value): (&str, &str)) -> String {
    form_urlencoded::Serializer::new(String::new()).append_pair(name, value).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_injector() -> SignatureInjector {
        let mut injector = SignatureInjector::query();
        injector.set_signature_fn(|| Ok(vec![("token".to_string(), "tokenValue".to_string())]));
        injector
    }

    fn get(url: &str) -> Request {
        Request::new(reqwest::Method::GET, url.parse().unwrap())
    }

    fn token_values(req: &Request) -> Vec<String> {
        req.url()
            .query_pairs()
            .filter(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    #[test]
    fn test_adds_signature() {
        let mut req = get("https://example.com/endpoint");
        token_injector().add_signature(&mut req).unwrap();
        assert_eq!(token_values(&req), vec!["tokenValue"]);
        assert_eq!(req.url().query(), Some("token=tokenValue"));
    }

    #[test]
    fn test_overwrites_existing_parameter() {
        let mut req = get("https://example.com/endpoint?token=old&page=1");
        token_injector().add_signature(&mut req).unwrap();
        assert_eq!(req.url().query(), Some("token=tokenValue&page=1"));
    }

    #[test]
    fn test_collapses_duplicate_parameters() {
        let mut req = get("https://example.com/endpoint?token=a&x=1&token=b");
        token_injector().add_signature(&mut req).unwrap();
        assert_eq!(token_values(&req), vec!["tokenValue"]);
        assert_eq!(req.url().query(), Some("token=tokenValue&x=1"));
    }

    #[test]
    fn test_unrelated_segments_kept_verbatim() {
        let mut req = get("https://example.com/endpoint?flag&q=a%20b&t=10:00&ids[]=1&token=old");
        token_injector().add_signature(&mut req).unwrap();
        assert_eq!(req.url().query(), Some("flag&q=a%20b&t=10:00&ids[]=1&token=tokenValue"));
    }

    #[test]
    fn test_generated_values_are_form_encoded() {
        let injector = SignatureInjector::query().with_generator(StaticSignature::new(vec![(
            "sig".to_string(),
            "a b&c=d".to_string(),
        )]));
        let mut req = get("https://example.com/endpoint?flag");
        injector.add_signature(&mut req).unwrap();
        assert_eq!(req.url().query(), Some("flag&sig=a+b%26c%3Dd"));

        let sig: Vec<String> = req
            .url()
            .query_pairs()
            .filter(|(k, _)| k == "sig")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(sig, vec!["a b&c=d"]);
    }

    #[test]
    fn test_repeated_generated_name_keeps_last_value() {
        let injector = SignatureInjector::query().with_generator(StaticSignature::new(vec![
            ("token".to_string(), "first".to_string()),
            ("token".to_string(), "second".to_string()),
        ]));
        let mut req = get("https://example.com/endpoint");
        injector.add_signature(&mut req).unwrap();
        assert_eq!(req.url().query(), Some("token=second"));
    }

    #[test]
    fn test_unconfigured_leaves_query_untouched() {
        let injector = SignatureInjector::query();
        assert!(!injector.is_configured());

        let mut req = get("https://example.com/endpoint?a=%20b&c");
        injector.add_signature(&mut req).unwrap();
        assert_eq!(req.url().as_str(), "https://example.com/endpoint?a=%20b&c");
    }

    #[test]
    fn test_signing_twice_is_idempotent() {
        let injector = token_injector();
        let mut req = get("https://example.com/endpoint?page=3");
        injector.add_signature(&mut req).unwrap();
        let once = req.url().clone();
        injector.add_signature(&mut req).unwrap();
        assert_eq!(req.url(), &once);
    }

    #[test]
    fn test_generator_failure_propagates() {
        let mut injector = SignatureInjector::query();
        injector.set_signature_fn(|| Err(SigningError::generator("secret unavailable")));

        let mut req = get("https://example.com/endpoint");
        let err = injector.add_signature(&mut req).unwrap_err();
        assert_eq!(err, SigningError::generator("secret unavailable"));
        assert_eq!(req.url().query(), None);
    }

    #[test]
    fn test_generator_called_once_per_request() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut injector = SignatureInjector::query();
        injector.set_signature_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![("sig".to_string(), "x".to_string())])
        });

        let mut req = get("https://example.com/endpoint");
        injector.add_signature(&mut req).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_header_placement() {
        let injector = SignatureInjector::header().with_generator(StaticSignature::new(vec![(
            "X-Signature".to_string(),
            "abc".to_string(),
        )]));
        let mut req = get("https://example.com/endpoint?token=keep");
        req.headers_mut().insert("x-signature", "stale".parse().unwrap());

        injector.add_signature(&mut req).unwrap();
        assert_eq!(req.headers()["x-signature"], "abc");
        assert_eq!(req.headers().get_all("x-signature").iter().count(), 1);
        assert_eq!(req.url().query(), Some("token=keep"));
    }

    #[test]
    fn test_header_placement_rejects_invalid_header() {
        let injector = SignatureInjector::header()
            .with_generator(StaticSignature::new(vec![("bad header".into(), "v".into())]));
        let mut req = get("https://example.com/");
        assert_eq!(
            injector.add_signature(&mut req),
            Err(SigningError::InvalidHeader { name: "bad header".into() })
        );
    }

    #[test]
    fn test_static_signature_from_map() {
        let map = BTreeMap::from([("apiKey".to_string(), "k".to_string())]);
        let generated = StaticSignature::from(map).generate().unwrap();
        assert_eq!(generated, vec![("apiKey".to_string(), "k".to_string())]);
    }
}
