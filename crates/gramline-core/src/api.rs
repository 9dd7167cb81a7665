//! The transport contract every API call goes through.
//!
//! Everything above the transport (router context helpers, collectors, the
//! polling loop) talks to the platform through [`ApiClient::request`] only,
//! so any transport (HTTP, a recording mock, a rate-limit reporting wrapper)
//! can be slotted in.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiResult;
use crate::params::Params;

/// Issues one API call.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Calls `method` with `params` and returns the envelope's `result`.
    ///
    /// # Errors
    /// Returns [`ApiError::Api`](crate::ApiError::Api) for a non-ok envelope
    /// and [`ApiError::Transport`](crate::ApiError::Transport) when the call
    /// never produced one.
    async fn request(&self, method: &str, params: Params) -> ApiResult<Value>;
}

/// Shared, type-erased API client.
pub type BoxedApi = Arc<dyn ApiClient>;

/// Typed convenience on top of [`ApiClient`].
#[async_trait]
pub trait ApiClientExt: ApiClient {
    /// Calls `method` and deserializes the result.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Params) -> ApiResult<T> {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<A: ApiClient + ?Sized> ApiClientExt for A {}
