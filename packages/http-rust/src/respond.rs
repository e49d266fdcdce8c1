//! Translation of invocation outcomes into HTTP responses.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use fnwrap_core::{unwrap_status_code, Context};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde_json::Value;

/// Content type of every response, including `204` and error responses.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Maps a successful payload to its wire representation.
pub type ResponseEncoder = Arc<dyn Fn(&Context, Value) -> Value + Send + Sync>;

/// Maps a failure to its wire representation.
pub type ErrorEncoder =
    Arc<dyn Fn(&Context, &(dyn StdError + Send + Sync + 'static)) -> Value + Send + Sync>;

/// The pair of encoders a dispatcher answers with.
#[derive(Clone)]
pub struct Encoders {
    /// Applied to every present payload.
    pub response: ResponseEncoder,
    /// Applied to every plugin or handler error.
    pub error: ErrorEncoder,
}

impl Default for Encoders {
    fn default() -> Self {
        Self {
            response: Arc::new(|_: &Context, payload: Value| payload),
            error: Arc::new(|_: &Context, err: &(dyn StdError + Send + Sync + 'static)| {
                Value::String(err.to_string())
            }),
        }
    }
}

impl fmt::Debug for Encoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoders").finish_non_exhaustive()
    }
}

/// Status for a failure: the nearest attached code, else `400 Bad Request`.
#[must_use]
pub fn status_for(err: &(dyn StdError + 'static)) -> StatusCode {
    unwrap_status_code(err).unwrap_or(StatusCode::BAD_REQUEST)
}

/// `204` for an absent payload, otherwise `200` with the encoded payload.
pub(crate) fn success(encoders: &Encoders, ctx: &Context, payload: Option<Value>) -> Response {
    match payload {
        None => respond(StatusCode::NO_CONTENT, Body::empty()),
        Some(payload) => {
            let encoded = (encoders.response)(ctx, payload);
            respond(StatusCode::OK, Body::from(encoded.to_string()))
        }
    }
}

pub(crate) fn failure(
    encoders: &Encoders,
    ctx: &Context,
    err: &(dyn StdError + Send + Sync + 'static),
) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
    }

    let encoded = (encoders.error)(ctx, err);
    respond(status, Body::from(encoded.to_string()))
}

fn respond(status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}
