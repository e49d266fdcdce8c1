//! Context-transforming steps run before a handler is invoked.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fnwrap_core::{BoxError, Context};
use http::request::Parts;

/// One step of a plugin chain.
///
/// A step receives the context produced by the previous step and returns the
/// context for the next one. Returning an error aborts the chain and the
/// handler invocation.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Transforms `ctx` for the next step, or aborts the request with an error.
    async fn apply(&self, ctx: Context, head: &Parts) -> Result<Context, BoxError>;
}

/// Shared handle to a plugin step.
pub type PluginRef = Arc<dyn Plugin>;

/// Adapts a synchronous closure into a [`Plugin`].
pub struct FnPlugin<F>(F);

#[async_trait]
impl<F> Plugin for FnPlugin<F>
where
    F: Fn(Context, &Parts) -> Result<Context, BoxError> + Send + Sync + 'static,
{
    async fn apply(&self, ctx: Context, head: &Parts) -> Result<Context, BoxError> {
        (self.0)(ctx, head)
    }
}

/// Wraps `f` as a shareable plugin step.
pub fn plugin_fn<F>(f: F) -> PluginRef
where
    F: Fn(Context, &Parts) -> Result<Context, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnPlugin(f))
}

// ---------------------------------------------------------------------------
// PluginChain
// ---------------------------------------------------------------------------

/// Ordered list of plugin steps.
#[derive(Clone, Default)]
pub struct PluginChain {
    steps: Vec<PluginRef>,
}

impl PluginChain {
    /// Create a new, empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step. `None` entries are dropped.
    pub fn push(&mut self, step: impl Into<Option<PluginRef>>) {
        if let Some(step) = step.into() {
            self.steps.push(step);
        }
    }

    /// Appends steps, dropping `None` entries.
    pub fn extend<I>(&mut self, steps: I)
    where
        I: IntoIterator,
        I::Item: Into<Option<PluginRef>>,
    {
        for step in steps {
            self.push(step);
        }
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` when the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order, threading the context through.
    ///
    /// # Errors
    ///
    /// The first step error, unchanged. Later steps do not run.
    pub async fn run(&self, mut ctx: Context, head: &Parts) -> Result<Context, BoxError> {
        for (index, step) in self.steps.iter().enumerate() {
            ctx = step.apply(ctx, head).await.inspect_err(|err| {
                tracing::debug!(step = index, error = %err, "plugin aborted request");
            })?;
        }
        Ok(ctx)
    }
}

impl<T> FromIterator<T> for PluginChain
where
    T: Into<Option<PluginRef>>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut chain = Self::new();
        chain.extend(iter);
        chain
    }
}

impl fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}
