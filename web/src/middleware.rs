//! Axum middleware for request tracking and observability.
//!
//! The request-context layer:
//! 1. **Extracts** the request ID from the `X-Request-ID` header (or generates a new UUID)
//! 2. **Stores** it in request extensions for handler access
//! 3. **Runs** the request inside an `http_request` tracing span
//! 4. **Records** status and latency (log line plus metrics)
//! 5. **Echoes** the request ID in the response `X-Request-ID` header
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use eventgram_web::middleware::request_context_layer;
//!
//! let app = Router::new()
//!     .route("/e/:id", get(get_event))
//!     .layer(request_context_layer());
//! ```

use axum::{extract::Request, http::HeaderValue, response::Response};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Create a layer that adds request-context tracking to all requests.
#[must_use]
pub const fn request_context_layer() -> RequestContextLayer {
    RequestContextLayer
}

/// Layer for request-context tracking.
#[derive(Clone, Debug)]
pub struct RequestContextLayer;

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextMiddleware { inner }
    }
}

/// Middleware service for request-context tracking.
#[derive(Clone, Debug)]
pub struct RequestContextMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for RequestContextMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(request_id);

        let method = req.method().to_string();
        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let started = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let mut response = fut.await?;

                let status = response.status();
                let elapsed = started.elapsed();
                tracing::info!(
                    status = status.as_u16(),
                    latency_ms = elapsed.as_millis(),
                    "Request completed"
                );
                metrics::counter!(
                    "http_requests_total",
                    "method" => method,
                    "status" => status.as_u16().to_string()
                )
                .increment(1);
                metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

                if let Ok(header_value) = HeaderValue::from_str(&request_id.to_string()) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
