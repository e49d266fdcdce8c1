//! The dispatcher: configuration shared by every handler it wraps.

use std::any::type_name;
use std::error::Error as StdError;
use std::sync::Arc;

use fnwrap_core::{classify, ConfigError, Context};
use serde_json::Value;

use crate::config::DispatchConfig;
use crate::group::Group;
use crate::handler::adapter::compile;
use crate::handler::{Handler, HandlerFn, Params};
use crate::plugin::{PluginChain, PluginRef};
use crate::respond::Encoders;

/// State shared read-only by all handlers of one dispatcher.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) config: DispatchConfig,
    pub(crate) global: PluginChain,
    pub(crate) encoders: Encoders,
}

/// Wraps functions into handlers that share one configuration.
///
/// Built once at start-up; the global plugin chain, the encoders and the
/// limits cannot change afterwards.
///
/// ```ignore
/// let dispatcher = Dispatcher::builder()
///     .multipart_max_memory(8 * 1024 * 1024)
///     .global_plugins([plugin_fn(attach_tenant)])
///     .build();
/// let handler = dispatcher.wrap(create_user)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Starts a builder with default limits, no global plugins and the default encoders.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Limits applied to every handler this dispatcher wraps.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.shared.config
    }

    /// Classifies `f` and compiles it into a handler.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the parameter list is not acceptable:
    /// a context parameter outside position 0, or more than one payload.
    pub fn wrap<F, A>(&self, f: F) -> Result<Handler, ConfigError>
    where
        F: HandlerFn<A>,
        A: Params,
    {
        let spec = Arc::new(classify(type_name::<F>(), A::rules())?);
        let adapter = compile(f, Arc::clone(&spec));
        Ok(Handler::new(spec, adapter, Arc::clone(&self.shared)))
    }

    /// A new group with an empty local plugin list.
    #[must_use]
    pub fn group(&self) -> Group {
        Group::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// DispatcherBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Dispatcher`].
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    config: DispatchConfig,
    global: PluginChain,
    encoders: Encoders,
}

impl DispatcherBuilder {
    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// In-memory ceiling for multipart forms, in bytes.
    #[must_use]
    pub fn multipart_max_memory(mut self, bytes: usize) -> Self {
        self.config.multipart_max_memory = bytes;
        self
    }

    /// Caps the buffered request body, in bytes.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = Some(bytes);
        self
    }

    /// Sets the global plugin steps, replacing any set earlier.
    /// `None` entries are dropped.
    #[must_use]
    pub fn global_plugins<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Option<PluginRef>>,
    {
        self.global = steps.into_iter().collect();
        self
    }

    /// Encoder for successful payloads.
    #[must_use]
    pub fn response_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&Context, Value) -> Value + Send + Sync + 'static,
    {
        self.encoders.response = Arc::new(encoder);
        self
    }

    /// Encoder for handler and plugin errors.
    #[must_use]
    pub fn error_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&Context, &(dyn StdError + Send + Sync + 'static)) -> Value + Send + Sync + 'static,
    {
        self.encoders.error = Arc::new(encoder);
        self
    }

    /// Freezes the configuration into a shareable [`Dispatcher`].
    #[must_use]
    pub fn build(self) -> Dispatcher {
        tracing::debug!(
            global_plugins = self.global.len(),
            multipart_max_memory = self.config.multipart_max_memory,
            "dispatcher built"
        );
        Dispatcher {
            shared: Arc::new(Shared {
                config: self.config,
                global: self.global,
                encoders: self.encoders,
            }),
        }
    }
}
