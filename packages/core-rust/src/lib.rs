//! `fnwrap` core: request context, handler signature classification, and
//! status-code-carrying errors. Nothing here depends on an HTTP transport.

pub mod classify;
pub mod context;
pub mod error;
pub mod types;

pub use classify::{classify, ConfigError, HandlerSpec, Strategy};
pub use context::Context;
pub use error::{error_with_status_code, unwrap_status_code, BoxError, StatusCodeError};
pub use types::{Aspect, ResolutionRule};
