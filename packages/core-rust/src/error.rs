//! Errors that carry an explicit HTTP status code.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

/// Type-erased error used for handler and plugin failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Wraps an error with the status code the response should carry.
///
/// The wrapped error stays reachable through [`StdError::source`], so the code
/// survives being wrapped again by any error type that preserves its source.
#[derive(Debug)]
pub struct StatusCodeError {
    source: BoxError,
    status: StatusCode,
}

impl StatusCodeError {
    /// Wraps `source` with `status`.
    pub fn new(source: impl Into<BoxError>, status: StatusCode) -> Self {
        Self {
            source: source.into(),
            status,
        }
    }

    /// The status code attached to the wrapped error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn into_inner(self) -> BoxError {
        self.source
    }

    /// Borrows the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl fmt::Display for StatusCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl StdError for StatusCodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let source: &(dyn StdError + 'static) = self.source.as_ref();
        Some(source)
    }
}

/// Wraps `err` so that responses for it carry `status`.
pub fn error_with_status_code(err: impl Into<BoxError>, status: StatusCode) -> StatusCodeError {
    StatusCodeError::new(err, status)
}

/// Walks the source chain of `err` and returns the nearest attached status code.
#[must_use]
pub fn unwrap_status_code(err: &(dyn StdError + 'static)) -> Option<StatusCode> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(coded) = e.downcast_ref::<StatusCodeError>() {
            return Some(coded.status_code());
        }
        current = e.source();
    }
    None
}
