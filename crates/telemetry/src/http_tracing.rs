use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::metrics::TX_HTTP_REQUESTS;

pub const X_CORRELATION_ID: &str = "x-correlation-id";
pub const X_REQUEST_ID: &str = "x-request-id";

/// Take the caller's correlation id (or request id) or mint a fresh one
pub fn extract_or_generate_correlation_id(headers: &HeaderMap) -> String {
    [X_CORRELATION_ID, X_REQUEST_ID]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Axum middleware for HTTP request tracing
pub async fn trace_http_request(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let correlation_id = extract_or_generate_correlation_id(req.headers());

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        uri = %uri,
        correlation_id = %correlation_id,
    );

    let mut response = next.run(req).instrument(span).await;

    let latency_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    TX_HTTP_REQUESTS
        .with_label_values(&[method.as_str(), &status.to_string()])
        .inc();

    match status {
        400..=499 => warn!(
            %method, %uri, status, latency_ms = %latency_ms, %correlation_id,
            "HTTP request failed (client error)"
        ),
        500..=599 => error!(
            %method, %uri, status, latency_ms = %latency_ms, %correlation_id,
            "HTTP request failed (server error)"
        ),
        _ => info!(
            %method, %uri, status, latency_ms = %latency_ms, %correlation_id,
            "HTTP request completed"
        ),
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(X_CORRELATION_ID, value);
    }

    response
}
