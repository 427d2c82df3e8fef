//! Admission middleware wiring the fixed-window limiter into the request
//! pipeline.
//!
//! The layer decides per client key before the request reaches a handler.
//! A rejection becomes `429 Too Many Requests` with a `Retry-After`
//! header; nothing else about the pipeline changes.

use crate::limiter::{Decision, FixedWindowLimiter};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, Service};
use tracing::warn;

/// Authenticated caller identity, inserted as a request extension by
/// routes that verify credentials. Takes precedence over the network
/// address as the limiter key.
#[derive(Debug, Clone)]
pub struct SubjectId(pub String);

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<FixedWindowLimiter>,
}

impl RateLimitLayer {
    #[must_use]
    pub fn new(limiter: Arc<FixedWindowLimiter>) -> Self {
        Self { limiter }
    }

    #[must_use]
    pub fn limiter(&self) -> Arc<FixedWindowLimiter> {
        Arc::clone(&self.limiter)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<FixedWindowLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let client = extract_client_key(&req);

            match limiter.allow(&client).await {
                Decision::Admit => inner.call(req).await,
                Decision::Reject { retry_after } => {
                    warn!(
                        client = %client,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "rate limit exceeded"
                    );
                    Ok(rate_limit_response(retry_after))
                }
            }
        })
    }
}

/// Resolve the identity the limiter counts against.
///
/// An authenticated subject wins over any network address; otherwise the
/// forwarding headers are trusted in order, then the socket peer.
fn extract_client_key<B>(req: &Request<B>) -> String {
    if let Some(subject) = req.extensions().get::<SubjectId>() {
        return subject.0.clone();
    }

    // X-Forwarded-For carries the original client first
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first) = forwarded_str.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_owned();
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(real_ip_str) = real_ip.to_str() {
            let real_ip_str = real_ip_str.trim();
            if !real_ip_str.is_empty() {
                return real_ip_str.to_owned();
            }
        }
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip().to_string();
    }

    "127.0.0.1".to_owned()
}

/// Build the rejection response.
fn rate_limit_response(retry_after: Duration) -> Response {
    let retry_after_ms = retry_after.as_millis() as u64;
    let body = serde_json::json!({
        "code": "RATE_LIMIT_ERROR",
        "message": "Too many requests"
    });

    let mut response = Response::new(Body::from(serde_json::to_vec(&body).unwrap_or_default()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response.headers_mut().insert(
        "Content-Type",
        axum::http::HeaderValue::from_static("application/json"),
    );
    // Ceil to whole seconds so a fractional wait never rounds to zero
    response.headers_mut().insert(
        "Retry-After",
        axum::http::HeaderValue::from((retry_after_ms + 999) / 1000),
    );

    response
}
