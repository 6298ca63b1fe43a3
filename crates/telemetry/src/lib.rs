pub mod http_tracing;
pub mod logging;
pub mod metrics;

// Re-export commonly used items
pub use http_tracing::{extract_or_generate_correlation_id, trace_http_request, X_CORRELATION_ID, X_REQUEST_ID};
pub use logging::{init_structured_logging, LogConfig, LogFormat, LoggingGuard};
