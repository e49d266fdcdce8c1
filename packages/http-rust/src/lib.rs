//! `fnwrap`: adapts plain async functions into HTTP handlers.
//!
//! A function's parameter list is classified once when it is wrapped. Each
//! request then runs the plugin chain (dispatcher globals, then the handler's
//! own steps), resolves the parameters from the request, calls the function
//! and translates its `Result` into a JSON response.
//!
//! ```ignore
//! async fn create(ctx: Context, Payload(user): Payload<NewUser>) -> Result<User, BoxError> {
//!     // ...
//! }
//!
//! let router = axum::Router::new().route("/users", post_service(wrap(create)?));
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod group;
pub mod handler;
pub mod plugin;
pub mod respond;

pub use config::{DispatchConfig, DEFAULT_MULTIPART_MAX_MEMORY};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::ResolveError;
pub use extract::{
    FilePart, Form, MultipartForm, Param, Payload, PostForm, RawRequest, RequestState, Values,
};
pub use fnwrap_core::{
    error_with_status_code, unwrap_status_code, Aspect, BoxError, ConfigError, Context,
    HandlerSpec, ResolutionRule, StatusCodeError, Strategy,
};
pub use group::Group;
pub use handler::{Handler, HandlerFn, Params};
pub use http::StatusCode;
pub use plugin::{plugin_fn, Plugin, PluginChain, PluginRef};
pub use respond::{Encoders, ErrorEncoder, ResponseEncoder, JSON_CONTENT_TYPE};

/// Wraps `f` with a default [`Dispatcher`].
///
/// # Errors
///
/// See [`Dispatcher::wrap`].
pub fn wrap<F, A>(f: F) -> Result<Handler, ConfigError>
where
    F: HandlerFn<A>,
    A: Params,
{
    Dispatcher::default().wrap(f)
}

/// A new group on a default [`Dispatcher`].
#[must_use]
pub fn group() -> Group {
    Dispatcher::default().group()
}
