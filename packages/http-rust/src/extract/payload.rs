use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;

use crate::error::ResolveError;

/// A handler parameter decoded from the JSON request body.
///
/// A handler may declare at most one `Payload<T>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload<T>(pub T);

impl<T> Payload<T> {
    /// Unwraps the decoded value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> Payload<T> {
    pub(crate) fn decode(body: &[u8]) -> Result<Self, ResolveError> {
        serde_json::from_slice(body)
            .map(Payload)
            .map_err(|source| ResolveError::Decode {
                type_name: std::any::type_name::<T>(),
                source,
            })
    }
}

impl<T> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Payload<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
