use std::future::Future;
use std::pin::Pin;

use fnwrap_core::BoxError;
use serde::Serialize;

use super::params::Params;

/// Boxed `Send` future returned by handlers and adapters.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An async function that can be wrapped into a [`Handler`](crate::Handler).
///
/// Implemented for every `Fn(T1, .., Tn) -> impl Future<Output = Result<R, E>>`
/// with up to eight [`Param`](crate::extract::Param) arguments, where `R` is
/// serializable and `E` converts into [`BoxError`].
pub trait HandlerFn<Args: Params>: Send + Sync + 'static {
    /// The success payload, serialized into the response body.
    type Output: Serialize + Send + 'static;

    /// Calls the function with already-resolved arguments.
    fn call(&self, args: Args) -> BoxFuture<'static, Result<Self::Output, BoxError>>;
}

macro_rules! impl_handler_fn {
    ($($ty:ident),*) => {
        impl<F, Fut, R, E, $($ty,)*> HandlerFn<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: Serialize + Send + 'static,
            E: Into<BoxError> + 'static,
            ($($ty,)*): Params,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn call(&self, ($($ty,)*): ($($ty,)*)) -> BoxFuture<'static, Result<R, BoxError>> {
                let fut = (self)($($ty),*);
                Box::pin(async move { fut.await.map_err(Into::into) })
            }
        }
    };
}

impl_handler_fn!();
impl_handler_fn!(T1);
impl_handler_fn!(T1, T2);
impl_handler_fn!(T1, T2, T3);
impl_handler_fn!(T1, T2, T3, T4);
impl_handler_fn!(T1, T2, T3, T4, T5);
impl_handler_fn!(T1, T2, T3, T4, T5, T6);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8);
