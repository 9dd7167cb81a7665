//! Shared test fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gramline_core::{ApiClient, ApiResult, BotEvent, Context, EventBus, Params, Update};

/// An API client that answers every call with `true`.
pub(crate) struct NoopApi;

#[async_trait]
impl ApiClient for NoopApi {
    async fn request(&self, _method: &str, _params: Params) -> ApiResult<Value> {
        Ok(Value::Bool(true))
    }
}

/// Builds an update event from a raw update object.
pub(crate) fn update_event(raw: Value) -> BotEvent {
    let update = Update::from_value(raw).expect("valid test update");
    BotEvent::Update(Context::new(Arc::new(update), Arc::new(NoopApi)))
}

/// Emits `raw` on `name`, the way the router would.
pub(crate) fn emit(bus: &EventBus, name: &str, raw: Value) -> usize {
    bus.emit(name, &update_event(raw))
}
