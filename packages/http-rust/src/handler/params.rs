use async_trait::async_trait;
use fnwrap_core::{Context, ResolutionRule};

use crate::error::ResolveError;
use crate::extract::{Param, RequestState};

/// An ordered parameter list, implemented for tuples of [`Param`] types.
#[async_trait]
pub trait Params: Sized + Send + 'static {
    /// One rule per position, in declared order.
    fn rules() -> Vec<ResolutionRule>;

    /// Builds the arguments from the context alone, when every position allows it.
    fn from_context(_ctx: &Context) -> Option<Self> {
        None
    }

    /// Builds a single decoded payload argument from a buffered body.
    fn from_payload(_body: &[u8]) -> Option<Result<Self, ResolveError>> {
        None
    }

    /// Resolves every position left to right, stopping at the first failure.
    async fn resolve(ctx: &Context, state: &mut RequestState) -> Result<Self, ResolveError>;
}

#[async_trait]
impl Params for () {
    fn rules() -> Vec<ResolutionRule> {
        Vec::new()
    }

    fn from_context(_ctx: &Context) -> Option<Self> {
        Some(())
    }

    async fn resolve(_ctx: &Context, _state: &mut RequestState) -> Result<Self, ResolveError> {
        Ok(())
    }
}

#[async_trait]
impl<T1: Param> Params for (T1,) {
    fn rules() -> Vec<ResolutionRule> {
        vec![T1::rule()]
    }

    fn from_context(ctx: &Context) -> Option<Self> {
        T1::from_context(ctx).map(|t1| (t1,))
    }

    fn from_payload(body: &[u8]) -> Option<Result<Self, ResolveError>> {
        T1::from_payload(body).map(|r| r.map(|t1| (t1,)))
    }

    async fn resolve(ctx: &Context, state: &mut RequestState) -> Result<Self, ResolveError> {
        Ok((T1::resolve(ctx, state).await?,))
    }
}

macro_rules! impl_params {
    ($($ty:ident),+) => {
        #[async_trait]
        impl<$($ty: Param),+> Params for ($($ty,)+) {
            fn rules() -> Vec<ResolutionRule> {
                vec![$($ty::rule()),+]
            }

            #[allow(non_snake_case)]
            fn from_context(ctx: &Context) -> Option<Self> {
                $(let $ty = $ty::from_context(ctx)?;)+
                Some(($($ty,)+))
            }

            #[allow(non_snake_case)]
            async fn resolve(
                ctx: &Context,
                state: &mut RequestState,
            ) -> Result<Self, ResolveError> {
                $(let $ty = $ty::resolve(ctx, state).await?;)+
                Ok(($($ty,)+))
            }
        }
    };
}

impl_params!(T1, T2);
impl_params!(T1, T2, T3);
impl_params!(T1, T2, T3, T4);
impl_params!(T1, T2, T3, T4, T5);
impl_params!(T1, T2, T3, T4, T5, T6);
impl_params!(T1, T2, T3, T4, T5, T6, T7);
impl_params!(T1, T2, T3, T4, T5, T6, T7, T8);
