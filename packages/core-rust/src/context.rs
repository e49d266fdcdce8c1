//! The per-request context: typed values plus cooperative cancellation.

use http::Extensions;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Per-request context threaded through the plugin chain into the handler.
///
/// Values are keyed by type. Plugins attach derived values with
/// [`Context::with_value`]; handlers read them back with [`Context::value`].
/// Cancellation is cooperative: resolvers check the token at their suspension
/// points, a running step is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Extensions,
    cancellation: CancellationToken,
}

impl Context {
    /// Creates an empty context with a fresh, never-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty context bound to an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            values: Extensions::new(),
            cancellation,
        }
    }

    /// Returns the context with `value` attached, replacing any value of the same type.
    #[must_use]
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value);
        self
    }

    /// Attaches `value` in place and returns the previous value of that type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value)
    }

    /// Returns the attached value of type `T`, if any.
    #[must_use]
    pub fn value<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }

    /// Returns `true` when a value of type `T` is attached.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>().is_some()
    }

    /// Token that cancels this request. Child tokens can be derived from it.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the request has been cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }
}
