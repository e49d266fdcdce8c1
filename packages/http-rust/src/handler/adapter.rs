//! The three invocation strategies.
//!
//! Adapters hold only the wrapped function and the shared [`HandlerSpec`].
//! Arguments are built inside each `invoke` call and dropped with it, so
//! concurrent invocations of one handler never see each other's state.

use std::marker::PhantomData;
use std::sync::Arc;

use fnwrap_core::{BoxError, Context, HandlerSpec, StatusCodeError, Strategy};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use super::func::{BoxFuture, HandlerFn};
use super::params::Params;
use crate::error::ResolveError;
use crate::extract::RequestState;

/// Outcome of one invocation. `Ok(None)` is the absent payload.
pub type InvocationResult = Result<Option<Value>, BoxError>;

/// Uniform invocation contract shared by every strategy.
pub trait Adapter: Send + Sync {
    /// Resolves the arguments from `state`, calls the function and serializes its payload.
    fn invoke(&self, ctx: Context, state: RequestState) -> BoxFuture<'_, InvocationResult>;
}

/// Selects the adapter for `spec.strategy()`.
pub(crate) fn compile<F, A>(f: F, spec: Arc<HandlerSpec>) -> Arc<dyn Adapter>
where
    F: HandlerFn<A>,
    A: Params,
{
    match spec.strategy() {
        Strategy::Plain { .. } => Arc::new(PlainAdapter::new(f, spec)),
        Strategy::Unary => Arc::new(UnaryAdapter::new(f, spec)),
        Strategy::Generic => Arc::new(GenericAdapter::new(f, spec)),
    }
}

/// Serializes a handler payload. `null` is the absent payload.
pub(crate) fn encode<T: Serialize>(payload: &T) -> InvocationResult {
    match serde_json::to_value(payload) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(err) => Err(StatusCodeError::new(err, StatusCode::INTERNAL_SERVER_ERROR).into()),
    }
}

fn mismatch(spec: &HandlerSpec) -> BoxError {
    let err = ResolveError::StrategyMismatch {
        target: spec.target(),
        strategy: spec.strategy(),
    };
    StatusCodeError::new(err, StatusCode::INTERNAL_SERVER_ERROR).into()
}

macro_rules! adapter {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<F, A> {
            f: F,
            spec: Arc<HandlerSpec>,
            _args: PhantomData<fn() -> A>,
        }

        impl<F, A> $name<F, A> {
            pub(crate) fn new(f: F, spec: Arc<HandlerSpec>) -> Self {
                Self {
                    f,
                    spec,
                    _args: PhantomData,
                }
            }
        }
    };
}

adapter! {
    /// No parameters, or only the context. Never touches the request.
    PlainAdapter
}

adapter! {
    /// A single `Payload<T>`: the body is read once and decoded directly.
    UnaryAdapter
}

adapter! {
    /// Any other shape: each position resolved in declared order.
    GenericAdapter
}

impl<F, A> Adapter for PlainAdapter<F, A>
where
    F: HandlerFn<A>,
    A: Params,
{
    fn invoke(&self, ctx: Context, _state: RequestState) -> BoxFuture<'_, InvocationResult> {
        Box::pin(async move {
            let args = A::from_context(&ctx).ok_or_else(|| mismatch(&self.spec))?;
            let payload = self.f.call(args).await?;
            encode(&payload)
        })
    }
}

impl<F, A> Adapter for UnaryAdapter<F, A>
where
    F: HandlerFn<A>,
    A: Params,
{
    fn invoke(&self, ctx: Context, mut state: RequestState) -> BoxFuture<'_, InvocationResult> {
        Box::pin(async move {
            let body = state.body(&ctx).await?;
            let args = A::from_payload(&body).ok_or_else(|| mismatch(&self.spec))??;
            let payload = self.f.call(args).await?;
            encode(&payload)
        })
    }
}

impl<F, A> Adapter for GenericAdapter<F, A>
where
    F: HandlerFn<A>,
    A: Params,
{
    fn invoke(&self, ctx: Context, mut state: RequestState) -> BoxFuture<'_, InvocationResult> {
        Box::pin(async move {
            let args = A::resolve(&ctx, &mut state).await?;
            let payload = self.f.call(args).await?;
            encode(&payload)
        })
    }
}
