//! Request-time resolution errors.

use fnwrap_core::Strategy;

/// Failure to produce a handler argument from the incoming request.
///
/// None of these carry a status code of their own, so they are answered
/// with the generic `400 Bad Request`.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),
    #[error("request body is unavailable after a failed read")]
    BodyUnavailable,
    #[error("failed to decode request body into `{type_name}`: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse form: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    #[error("request is not a multipart form: {0}")]
    NotMultipart(#[source] multer::Error),
    #[error("failed to parse multipart form: {0}")]
    Multipart(#[from] multer::Error),
    #[error("multipart form exceeds the {limit} byte in-memory limit")]
    MultipartTooLarge { limit: usize },
    #[error("request cancelled")]
    Cancelled,
    #[error("arguments of `{target}` do not fit the {strategy} strategy")]
    StrategyMismatch {
        target: &'static str,
        strategy: Strategy,
    },
}
