//! The fixed registry of parameter types a handler may declare.
//!
//! Every type a handler can take implements the sealed [`Param`] trait, which
//! ties it to one [`ResolutionRule`]. The registry is closed: a parameter type
//! outside it does not implement `Param`, so the handler fails to compile.

pub mod form;
pub mod payload;
pub mod state;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fnwrap_core::{Aspect, Context, ResolutionRule};
use http::{HeaderMap, Uri};
use serde::de::DeserializeOwned;

pub use form::{FilePart, Form, MultipartForm, PostForm, Values};
pub use payload::Payload;
pub use state::{RawRequest, RequestState};

use crate::error::ResolveError;

mod sealed {
    pub trait Sealed {}
}

/// A value that can be bound to one handler parameter position.
#[async_trait]
pub trait Param: sealed::Sealed + Sized + Send + 'static {
    /// The rule this type resolves by, recorded at registration.
    fn rule() -> ResolutionRule;

    /// Builds the value from the context alone, if the type allows it.
    fn from_context(_ctx: &Context) -> Option<Self> {
        None
    }

    /// Builds the value from an already-buffered body, if the type allows it.
    fn from_payload(_body: &[u8]) -> Option<Result<Self, ResolveError>> {
        None
    }

    /// Resolves the value from the live request.
    async fn resolve(ctx: &Context, state: &mut RequestState) -> Result<Self, ResolveError>;
}

macro_rules! impl_aspect_param {
    ($ty:ty, $aspect:ident, |$ctx:ident, $state:ident| $resolve:expr) => {
        impl sealed::Sealed for $ty {}

        #[async_trait]
        impl Param for $ty {
            fn rule() -> ResolutionRule {
                ResolutionRule::FromRequestAspect(Aspect::$aspect)
            }

            async fn resolve(
                $ctx: &Context,
                $state: &mut RequestState,
            ) -> Result<Self, ResolveError> {
                $resolve
            }
        }
    };
}

impl_aspect_param!(Bytes, RawBody, |ctx, state| state.body(ctx).await);
impl_aspect_param!(HeaderMap, Header, |_ctx, state| Ok(state.headers().clone()));
impl_aspect_param!(Uri, Url, |_ctx, state| Ok(state.uri().clone()));
impl_aspect_param!(Arc<Form>, Form, |ctx, state| state.form(ctx).await);
impl_aspect_param!(Form, Form, |ctx, state| Ok(Form::clone(&*state.form(ctx).await?)));
impl_aspect_param!(Arc<PostForm>, PostForm, |ctx, state| state.post_form(ctx).await);
impl_aspect_param!(PostForm, PostForm, |ctx, state| {
    Ok(PostForm::clone(&*state.post_form(ctx).await?))
});
impl_aspect_param!(Arc<MultipartForm>, MultipartForm, |ctx, state| {
    state.multipart_form(ctx).await
});
impl_aspect_param!(RawRequest, RawRequest, |ctx, state| state.raw_request(ctx).await);

impl sealed::Sealed for Context {}

#[async_trait]
impl Param for Context {
    fn rule() -> ResolutionRule {
        ResolutionRule::FromContext
    }

    fn from_context(ctx: &Context) -> Option<Self> {
        Some(ctx.clone())
    }

    async fn resolve(ctx: &Context, _state: &mut RequestState) -> Result<Self, ResolveError> {
        Ok(ctx.clone())
    }
}

impl<T> sealed::Sealed for Payload<T> {}

#[async_trait]
impl<T> Param for Payload<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn rule() -> ResolutionRule {
        ResolutionRule::DecodeBody {
            type_name: std::any::type_name::<T>(),
        }
    }

    fn from_payload(body: &[u8]) -> Option<Result<Self, ResolveError>> {
        Some(Payload::decode(body))
    }

    async fn resolve(ctx: &Context, state: &mut RequestState) -> Result<Self, ResolveError> {
        let body = state.body(ctx).await?;
        Payload::decode(&body)
    }
}
