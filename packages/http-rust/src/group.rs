use fnwrap_core::ConfigError;

use crate::dispatcher::Dispatcher;
use crate::handler::{Handler, HandlerFn, Params};
use crate::plugin::{PluginChain, PluginRef};

/// A set of local plugin steps shared by the handlers derived from it.
///
/// [`Group::wrap`] copies the group's current list into the new handler;
/// steps added to the group afterwards do not reach handlers already derived.
#[derive(Debug, Clone)]
pub struct Group {
    dispatcher: Dispatcher,
    plugins: PluginChain,
}

impl Group {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            plugins: PluginChain::new(),
        }
    }

    /// Appends steps. `None` entries are dropped.
    #[must_use]
    pub fn with_plugins<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Option<PluginRef>>,
    {
        self.push_plugins(steps);
        self
    }

    /// Appends steps in place. `None` entries are dropped.
    pub fn push_plugins<I>(&mut self, steps: I)
    where
        I: IntoIterator,
        I::Item: Into<Option<PluginRef>>,
    {
        self.plugins.extend(steps);
    }

    /// Steps copied into handlers derived from now on.
    #[must_use]
    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    /// Wraps `f` with a copy of this group's plugin steps.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::wrap`].
    pub fn wrap<F, A>(&self, f: F) -> Result<Handler, ConfigError>
    where
        F: HandlerFn<A>,
        A: Params,
    {
        Ok(self.dispatcher.wrap(f)?.with_chain(self.plugins.clone()))
    }
}
