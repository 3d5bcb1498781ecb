//! Client middleware.
//!
//! Middleware run in registration order: the first one registered sees the
//! request first and the response last. Each receives the request and a
//! [`Next`] continuation; it may rewrite the request, call `next` zero or more
//! times, and inspect or replace what comes back.

use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::config::WireConfig;
use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse>;
}

/// The rest of the pipeline after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self {
            middleware,
            transport,
        }
    }

    /// Run the remaining middleware and finally the transport.
    pub async fn run(self, request: HttpRequest) -> Result<HttpResponse> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                current
                    .handle(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Middleware from a closure.
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap a closure as middleware.
///
/// ```
/// use chainrpc::client::middleware::from_fn;
/// use futures::FutureExt;
///
/// let auth = from_fn(|mut request, next| {
///     async move {
///         request.set_header("Authorization", "Bearer token");
///         next.run(request).await
///     }
///     .boxed()
/// });
/// # let _ = auth;
/// ```
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(HttpRequest, Next<'a>) -> BoxFuture<'a, Result<HttpResponse>> + Send + Sync,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(HttpRequest, Next<'a>) -> BoxFuture<'a, Result<HttpResponse>> + Send + Sync,
{
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        (self.f)(request, next).await
    }
}

/// Adds fixed headers to every request, e.g. credentials.
#[derive(Debug, Clone, Default)]
pub struct HeaderMiddleware {
    headers: Vec<(String, String)>,
}

impl HeaderMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(token: &str) -> Self {
        Self::new().header("Authorization", format!("Bearer {}", token))
    }
}

#[async_trait]
impl Middleware for HeaderMiddleware {
    async fn handle(&self, mut request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }
        next.run(request).await
    }
}

/// Tags each request with a random request id unless one is already set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdMiddleware;

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, mut request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        if request.header(WireConfig::REQUEST_ID_HEADER).is_none() {
            request.set_header(WireConfig::REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        }
        next.run(request).await
    }
}

/// Logs each exchange with its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        let verb = request.verb;
        let target = request.path_and_query();
        let started = Instant::now();
        debug!("--> {} {}", verb, target);

        let result = next.run(request).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(response) => debug!(
                "<-- {} {} {} ({:?})",
                response.status, verb, target, elapsed
            ),
            Err(e) => warn!("<-- {} {} failed after {:?}: {}", verb, target, elapsed, e),
        }
        result
    }
}
