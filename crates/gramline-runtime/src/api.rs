//! Rate-limit reporting around any [`ApiClient`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use gramline_core::event::RATE_LIMIT;
use gramline_core::{
    ApiClient, ApiResult, BotEvent, BoxedApi, EventBus, ParamValue, Params, RateLimitSignal,
};

/// Wraps a transport and emits `rate_limit` whenever a call comes back with
/// a retry hint.
///
/// The error itself is still returned to the caller unchanged; reporting
/// does not delay or retry anything.
pub struct ReportingApi {
    inner: BoxedApi,
    bus: EventBus,
}

impl ReportingApi {
    pub fn new(inner: BoxedApi, bus: EventBus) -> Self {
        Self { inner, bus }
    }

    /// Wraps `inner` and erases the type.
    pub fn boxed(inner: BoxedApi, bus: EventBus) -> BoxedApi {
        Arc::new(Self::new(inner, bus))
    }

    pub fn inner(&self) -> &BoxedApi {
        &self.inner
    }
}

#[async_trait]
impl ApiClient for ReportingApi {
    async fn request(&self, method: &str, params: Params) -> ApiResult<Value> {
        let snapshot = json_fields(&params);
        debug!(method, fields = params.len(), "API call");

        let result = self.inner.request(method, params).await;
        if let Err(err) = &result
            && let Some(signal) = RateLimitSignal::from_error(method, err, snapshot)
        {
            warn!(
                method,
                retry_after_secs = signal.retry_after.as_secs(),
                "Rate limited"
            );
            self.bus.emit(RATE_LIMIT, &BotEvent::RateLimit(signal));
        }
        result
    }
}

impl std::fmt::Debug for ReportingApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingApi")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

/// The JSON-valued fields of a call, for the rate-limit report.
fn json_fields(params: &Params) -> Value {
    let fields: Map<String, Value> = params
        .iter()
        .filter_map(|(name, value)| match value {
            ParamValue::Json(json) => Some((name.to_string(), json.clone())),
            ParamValue::File(_) | ParamValue::Media(_) => None,
        })
        .collect();
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gramline_core::model::ResponseParameters;
    use gramline_core::{ApiError, InputFile, Subscription};
    use parking_lot::Mutex;
    use serde_json::json;

    struct Throttled {
        retry_after: Option<u64>,
    }

    #[async_trait]
    impl ApiClient for Throttled {
        async fn request(&self, method: &str, _params: Params) -> ApiResult<Value> {
            Err(ApiError::Api {
                method: method.to_string(),
                code: 429,
                description: "Too Many Requests".into(),
                parameters: Some(ResponseParameters {
                    retry_after: self.retry_after,
                    migrate_to_chat_id: None,
                }),
            })
        }
    }

    fn recorded(bus: &EventBus) -> (Arc<Mutex<Vec<RateLimitSignal>>>, Subscription) {
        let signals = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&signals);
        let token = bus.on(RATE_LIMIT, move |event| {
            if let BotEvent::RateLimit(signal) = event {
                sink.lock().push(signal.clone());
            }
        });
        (signals, token)
    }

    #[tokio::test]
    async fn test_retry_hint_emits_rate_limit() {
        let bus = EventBus::new();
        let (signals, _token) = recorded(&bus);
        let api = ReportingApi::new(Arc::new(Throttled { retry_after: Some(7) }), bus);

        let params = Params::new()
            .with("chat_id", 5)
            .with("text", "hi")
            .file("photo", InputFile::bytes(vec![1, 2]));
        let err = api.request("sendPhoto", params).await.unwrap_err();
        assert_eq!(err.code(), Some(429));

        let signals = signals.lock();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].method, "sendPhoto");
        assert_eq!(signals[0].retry_after.as_secs(), 7);
        assert_eq!(signals[0].parameters, json!({"chat_id": 5, "text": "hi"}));
    }

    #[tokio::test]
    async fn test_error_without_hint_is_not_reported() {
        let bus = EventBus::new();
        let (signals, _token) = recorded(&bus);
        let api = ReportingApi::new(Arc::new(Throttled { retry_after: None }), bus);

        assert!(api.request("getMe", Params::new()).await.is_err());
        assert!(signals.lock().is_empty());
    }
}
