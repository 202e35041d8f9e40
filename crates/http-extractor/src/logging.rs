//! Request logging middleware.
//!
//! Each request passing through the logger produces one debug line holding the
//! request line, headers and body. The sink is injected per client; a failing
//! sink loses the line, never the request.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

use crate::error::SinkError;

/// Destination for formatted request lines.
pub trait LogSink: Send + Sync + std::fmt::Debug {
    /// Accept one line at debug severity.
    fn debug(&self, line: &str) -> Result<(), SinkError>;
}

/// Forwards lines to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn debug(&self, line: &str) -> Result<(), SinkError> {
        tracing::debug!(target: "http_extractor::request", "{line}");
        Ok(())
    }
}

/// Render `request` as `METHOD target VERSION`, `Host` and header lines, then the body.
#[must_use]
pub fn format_request(request: &Request) -> String {
    let url = request.url();
    let mut line = format!("{} {}", request.method(), url.path());
    if let Some(query) = url.query() {
        line.push('?');
        line.push_str(query);
    }
    line.push_str(&format!(" {:?}", request.version()));

    if let Some(host) = url.host_str() {
        line.push_str("\r\nHost: ");
        line.push_str(host);
        if let Some(port) = url.port() {
            line.push_str(&format!(":{port}"));
        }
    }
    for (name, value) in request.headers() {
        line.push_str(&format!("\r\n{}: {}", name, String::from_utf8_lossy(value.as_bytes())));
    }

    line.push(' ');
    if let Some(body) = request.body().and_then(reqwest::Body::as_bytes) {
        line.push_str(&String::from_utf8_lossy(body));
    }
    line
}

/// Logs every outgoing request before handing it on, unchanged.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    /// Log to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Format and emit one line for `request`.
    ///
    /// Sink errors and panics are absorbed here.
    pub fn log(&self, request: &Request) {
        let line = format_request(request);
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.sink.debug(&line))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!(error = %e, "Request log line dropped"),
            Err(_) => tracing::trace!("Log sink panicked, request log line dropped"),
        }
    }
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

#[async_trait::async_trait]
impl Middleware for RequestLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        self.log(&req);
        next.run(req, extensions).await
    }
}
