//! The long-polling update loop.
//!
//! ```text
//!            ┌──────────────────────── cancelled? ──▶ Ok(())
//!            ▼
//!   getUpdates(offset, limit, timeout, allowed_updates)
//!            │
//!   ok ──────┼──▶ route each update in update_id order ──▶ offset = max + 1
//!            │
//!   retry hint ──▶ wait retry_after (+ jitter)         ──┐
//!   5xx / network ──▶ emit "error", exponential wait   ──┴──▶ next cycle
//!   anything else ──▶ Err(fatal)
//! ```
//!
//! Only one `getUpdates` call is ever in flight, and routing is synchronous,
//! so listeners observe updates in `update_id` order. The offset moves only
//! after a whole batch has been routed and never moves backwards.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gramline_core::event::ERROR;
use gramline_core::{ApiError, ApiResult, BotEvent, BoxedApi, Params, Update};
use gramline_framework::EventRouter;

use crate::backoff::Backoff;
use crate::error::{RuntimeError, RuntimeResult};

/// Largest batch the platform serves.
pub const MAX_LIMIT: u8 = 100;

/// Options of a [`PollingLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
    /// Maximum updates per batch (1..=100).
    pub limit: u8,
    /// Long-poll timeout in seconds.
    pub timeout: u32,
    /// Update kinds to receive. Empty keeps the platform's default.
    pub allowed_updates: Vec<String>,
    /// Skip everything that is pending when the loop starts.
    pub drop_pending_updates: bool,
    /// Delays after failed polls. Retry hints are always waited in full;
    /// `backoff.max` only bounds their jitter.
    pub backoff: Backoff,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            limit: MAX_LIMIT,
            timeout: 30,
            allowed_updates: Vec::new(),
            drop_pending_updates: false,
            backoff: Backoff::default(),
        }
    }
}

impl PollingOptions {
    /// Checks the options before a loop is built.
    pub fn validate(&self) -> RuntimeResult<()> {
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return invalid("limit", "must be between 1 and 100");
        }
        if self.backoff.initial.is_zero() {
            return invalid("backoff.initial", "must be positive");
        }
        if self.backoff.max < self.backoff.initial {
            return invalid("backoff.max", "must not be below backoff.initial");
        }
        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return invalid("backoff.multiplier", "must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return invalid("backoff.jitter", "must be within 0.0..=1.0");
        }
        Ok(())
    }
}

fn invalid(option: &'static str, reason: &str) -> RuntimeResult<()> {
    Err(RuntimeError::InvalidPolling {
        option,
        reason: reason.to_string(),
    })
}

/// Result of one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Updates routed in this cycle.
    pub received: usize,
    /// The offset the next cycle will request.
    pub offset: i64,
}

/// Fetches updates and feeds them to an [`EventRouter`].
pub struct PollingLoop {
    api: BoxedApi,
    router: EventRouter,
    options: PollingOptions,
    offset: i64,
    pending_dropped: bool,
    failures: u32,
}

impl PollingLoop {
    /// Creates a loop starting at offset 0.
    ///
    /// Rate-limit events are only emitted when `api` reports them, as
    /// [`ReportingApi`](crate::ReportingApi) does.
    pub fn new(api: BoxedApi, router: EventRouter, options: PollingOptions) -> Self {
        Self {
            api,
            router,
            pending_dropped: !options.drop_pending_updates,
            options,
            offset: 0,
            failures: 0,
        }
    }

    /// The offset the next cycle will request.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn options(&self) -> &PollingOptions {
        &self.options
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Runs one cycle: fetch a batch, route it, advance the offset.
    ///
    /// # Errors
    /// Returns the error of the `getUpdates` call; the offset is unchanged
    /// in that case, so the same batch is requested again.
    pub async fn poll_once(&mut self) -> ApiResult<PollOutcome> {
        if !self.pending_dropped {
            return self.drop_pending().await;
        }

        let batch = self.fetch(self.params()).await?;
        let mut batch = self.sequence(batch);
        batch.sort_by_key(|(update_id, _)| *update_id);
        if !batch.is_empty() {
            debug!(count = batch.len(), offset = self.offset, "Received updates");
        }

        let mut next = self.offset;
        let mut received = 0;
        for (update_id, raw) in batch {
            match Update::from_value(raw) {
                Ok(update) => {
                    self.router.route(update);
                    received += 1;
                }
                Err(err) => warn!(update_id, error = %err, "Skipping undecodable update"),
            }
            next = next.max(update_id + 1);
        }
        self.offset = next;

        Ok(PollOutcome {
            received,
            offset: self.offset,
        })
    }

    /// Polls until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation is checked before every cycle and also interrupts an
    /// in-flight poll or a pending retry wait.
    ///
    /// # Errors
    /// Returns the first fatal [`ApiError`] (bad token, conflicting
    /// consumer, malformed request).
    pub async fn run(&mut self, cancel: &CancellationToken) -> ApiResult<()> {
        info!(
            offset = self.offset,
            limit = self.options.limit,
            timeout = self.options.timeout,
            "Polling started"
        );

        while !cancel.is_cancelled() {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            let delay = match outcome {
                Ok(_) => {
                    self.failures = 0;
                    continue;
                }
                Err(err) if err.is_fatal() => {
                    error!(error = %err, offset = self.offset, "Polling stopped by fatal error");
                    return Err(err);
                }
                Err(err) => self.recover(err),
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!(offset = self.offset, "Polling stopped");
        Ok(())
    }

    /// Picks the wait after a recoverable error.
    fn recover(&mut self, err: ApiError) -> Duration {
        if let Some(hint) = err.retry_after() {
            let delay = self.options.backoff.retry_after(hint);
            warn!(
                retry_after_secs = hint.as_secs(),
                delay_ms = delay.as_millis() as u64,
                "getUpdates rate limited"
            );
            return delay;
        }

        let delay = self.options.backoff.delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        warn!(
            error = %err,
            failures = self.failures,
            delay_ms = delay.as_millis() as u64,
            "Polling failed, retrying"
        );
        self.router
            .bus()
            .emit(ERROR, &BotEvent::Error(Arc::new(err)));
        delay
    }

    /// Acknowledges everything pending without routing it.
    async fn drop_pending(&mut self) -> ApiResult<PollOutcome> {
        let params = Params::new()
            .with("offset", -1)
            .with("limit", 1)
            .with("timeout", 0);
        let batch = self.fetch(params).await?;
        if let Some(last) = self.sequence(batch).into_iter().map(|(id, _)| id).max() {
            self.offset = self.offset.max(last + 1);
        }
        self.pending_dropped = true;
        info!(offset = self.offset, "Dropped pending updates");

        Ok(PollOutcome {
            received: 0,
            offset: self.offset,
        })
    }

    fn params(&self) -> Params {
        let params = Params::new()
            .with("offset", self.offset)
            .with("limit", self.options.limit)
            .with("timeout", self.options.timeout);
        if self.options.allowed_updates.is_empty() {
            params
        } else {
            params.with("allowed_updates", self.options.allowed_updates.clone())
        }
    }

    async fn fetch(&self, params: Params) -> ApiResult<Vec<Value>> {
        match self.api.request("getUpdates", params).await? {
            Value::Array(items) => Ok(items),
            _ => Err(ApiError::Serialization(
                "getUpdates did not return an array".into(),
            )),
        }
    }

    /// Pairs each raw update with its id, dropping ids already acknowledged
    /// and items without one.
    fn sequence(&self, batch: Vec<Value>) -> Vec<(i64, Value)> {
        batch
            .into_iter()
            .filter_map(|raw| {
                let Some(update_id) = raw.get("update_id").and_then(Value::as_i64) else {
                    warn!("Skipping update without update_id");
                    return None;
                };
                if update_id < self.offset {
                    debug!(update_id, offset = self.offset, "Skipping acknowledged update");
                    return None;
                }
                Some((update_id, raw))
            })
            .collect()
    }
}

impl std::fmt::Debug for PollingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingLoop")
            .field("offset", &self.offset)
            .field("options", &self.options)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use gramline_core::event::RATE_LIMIT;
    use gramline_core::model::ResponseParameters;
    use gramline_core::{ApiClient, EventBus, ParamValue, Subscription, TransportError};
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::api::ReportingApi;

    /// Plays back scripted `getUpdates` results, then cancels and blocks.
    struct Scripted {
        responses: Mutex<VecDeque<ApiResult<Value>>>,
        calls: Mutex<Vec<Params>>,
        cancel: CancellationToken,
    }

    impl Scripted {
        fn new(responses: Vec<ApiResult<Value>>, cancel: &CancellationToken) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                cancel: cancel.clone(),
            })
        }

        fn offsets(&self) -> Vec<Option<ParamValue>> {
            self.calls
                .lock()
                .iter()
                .map(|params| params.get("offset").cloned())
                .collect()
        }
    }

    #[async_trait]
    impl ApiClient for Scripted {
        async fn request(&self, method: &str, params: Params) -> ApiResult<Value> {
            assert_eq!(method, "getUpdates");
            self.calls.lock().push(params);
            let next = self.responses.lock().pop_front();
            match next {
                Some(response) => response,
                None => {
                    self.cancel.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    fn api_error(code: i64, retry_after: Option<u64>) -> ApiError {
        ApiError::Api {
            method: "getUpdates".into(),
            code,
            description: "scripted".into(),
            parameters: retry_after.map(|secs| ResponseParameters {
                retry_after: Some(secs),
                migrate_to_chat_id: None,
            }),
        }
    }

    fn offset(value: i64) -> Option<ParamValue> {
        Some(ParamValue::Json(json!(value)))
    }

    fn options() -> PollingOptions {
        PollingOptions {
            backoff: Backoff::default().without_jitter(),
            ..Default::default()
        }
    }

    /// Records every emitted event name, including sub-events.
    fn recorder(bus: &EventBus, names: &[&str]) -> (Arc<Mutex<Vec<String>>>, Vec<Subscription>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tokens = names
            .iter()
            .map(|name| {
                let log = Arc::clone(&log);
                let name = name.to_string();
                bus.on(name.clone(), move |_| log.lock().push(name.clone()))
            })
            .collect();
        (log, tokens)
    }

    fn polling(api: Arc<Scripted>, bus: &EventBus, options: PollingOptions) -> PollingLoop {
        let api: BoxedApi = ReportingApi::boxed(api, bus.clone());
        let router = EventRouter::new(bus.clone(), Arc::clone(&api));
        PollingLoop::new(api, router, options)
    }

    #[tokio::test]
    async fn test_batch_routing_order_and_offset() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(
            vec![Ok(json!([
                {"update_id": 1, "message": {"chat": {"id": 9}, "text": "a"}},
                {"update_id": 2, "message": {"chat": {"id": 9}, "caption": "b"}},
                {"update_id": 3, "callback_query": {"id": "q1", "data": "x"}}
            ]))],
            &cancel,
        );
        let bus = EventBus::new();
        let (log, _tokens) = recorder(
            &bus,
            &[
                "message",
                "message:text",
                "message:caption",
                "callback_query",
                "callback_query:data",
            ],
        );
        let mut polling = polling(Arc::clone(&api), &bus, options());

        let outcome = polling.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome { received: 3, offset: 4 });
        assert_eq!(
            *log.lock(),
            vec![
                "message",
                "message:text",
                "message",
                "message:caption",
                "callback_query",
                "callback_query:data",
            ]
        );
        assert_eq!(api.offsets(), vec![offset(0)]);
    }

    #[tokio::test]
    async fn test_offset_tracks_max_across_batches() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(
            vec![
                Ok(json!([
                    {"update_id": 12, "message": {"chat": {"id": 1}, "text": "b"}},
                    {"update_id": 10, "message": {"chat": {"id": 1}, "text": "a"}}
                ])),
                Ok(json!([])),
                Ok(json!([{"update_id": 20, "poll": {"id": "p"}}])),
            ],
            &cancel,
        );
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        let _token = bus.on("update", move |event| {
            if let Some(ctx) = event.context() {
                sink.lock().push(ctx.update_id());
            }
        });
        let mut polling = polling(Arc::clone(&api), &bus, options());

        assert_eq!(polling.poll_once().await.unwrap().offset, 13);
        assert_eq!(polling.poll_once().await.unwrap(), PollOutcome { received: 0, offset: 13 });
        assert_eq!(polling.poll_once().await.unwrap().offset, 21);

        assert_eq!(*order.lock(), vec![10, 12, 20]);
        assert_eq!(api.offsets(), vec![offset(0), offset(13), offset(13)]);
    }

    #[tokio::test]
    async fn test_undecodable_update_is_skipped_but_acknowledged() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(
            vec![Ok(json!([
                {"update_id": 5, "business_message": {"text": "?"}},
                {"update_id": 6, "message": {"chat": {"id": 1}, "text": "ok"}}
            ]))],
            &cancel,
        );
        let bus = EventBus::new();
        let mut polling = polling(api, &bus, options());

        let outcome = polling.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome { received: 1, offset: 7 });
    }

    #[tokio::test]
    async fn test_drop_pending_updates() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(
            vec![
                Ok(json!([{"update_id": 41, "message": {"chat": {"id": 1}, "text": "old"}}])),
                Ok(json!([{"update_id": 42, "message": {"chat": {"id": 1}, "text": "new"}}])),
            ],
            &cancel,
        );
        let bus = EventBus::new();
        let (log, _tokens) = recorder(&bus, &["message"]);
        let mut polling = polling(
            Arc::clone(&api),
            &bus,
            PollingOptions {
                drop_pending_updates: true,
                ..options()
            },
        );

        assert_eq!(polling.poll_once().await.unwrap(), PollOutcome { received: 0, offset: 42 });
        assert!(log.lock().is_empty());

        assert_eq!(polling.poll_once().await.unwrap(), PollOutcome { received: 1, offset: 43 });
        assert_eq!(log.lock().len(), 1);
        assert_eq!(api.offsets(), vec![offset(-1), offset(42)]);
    }

    #[tokio::test]
    async fn test_allowed_updates_are_sent_only_when_set() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(vec![Ok(json!([]))], &cancel);
        let bus = EventBus::new();
        let mut polling = polling(
            Arc::clone(&api),
            &bus,
            PollingOptions {
                limit: 10,
                timeout: 5,
                allowed_updates: vec!["message".into()],
                ..options()
            },
        );
        polling.poll_once().await.unwrap();

        let calls = api.calls.lock();
        assert_eq!(calls[0].get("limit"), Some(&ParamValue::Json(json!(10))));
        assert_eq!(calls[0].get("timeout"), Some(&ParamValue::Json(json!(5))));
        assert_eq!(
            calls[0].get("allowed_updates"),
            Some(&ParamValue::Json(json!(["message"])))
        );
        drop(calls);

        let plain = polling_params(&options());
        assert!(plain.get("allowed_updates").is_none());
    }

    fn polling_params(options: &PollingOptions) -> Params {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        polling(Scripted::new(Vec::new(), &cancel), &bus, options.clone()).params()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_keeps_offset_and_waits() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(
            vec![
                Err(api_error(429, Some(2))),
                Ok(json!([{"update_id": 1, "message": {"chat": {"id": 1}, "text": "a"}}])),
            ],
            &cancel,
        );
        let bus = EventBus::new();
        let (log, _tokens) = recorder(&bus, &[RATE_LIMIT, "error", "message"]);
        let mut polling = polling(Arc::clone(&api), &bus, options());

        let started = tokio::time::Instant::now();
        polling.run(&cancel).await.unwrap();
        let waited = started.elapsed();

        assert!(waited >= Duration::from_secs(2));
        assert!(waited <= Duration::from_millis(2200));
        assert_eq!(*log.lock(), vec![RATE_LIMIT, "message"]);
        assert_eq!(api.offsets(), vec![offset(0), offset(0), offset(2)]);
        assert_eq!(polling.offset(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_back_off_exponentially() {
        let cancel = CancellationToken::new();
        let network = || Err(ApiError::Transport(TransportError::Http("reset".into())));
        let api = Scripted::new(vec![network(), Err(api_error(502, None)), Ok(json!([]))], &cancel);
        let bus = EventBus::new();
        let (log, _tokens) = recorder(&bus, &["error"]);
        let mut polling = polling(Arc::clone(&api), &bus, options());

        let started = tokio::time::Instant::now();
        polling.run(&cancel).await.unwrap();

        // 1 s after the first failure, 2 s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(log.lock().len(), 2);
        assert_eq!(api.calls.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_loop() {
        let cancel = CancellationToken::new();
        let api = Scripted::new(
            vec![Err(api_error(401, None)), Ok(json!([]))],
            &cancel,
        );
        let bus = EventBus::new();
        let (log, _tokens) = recorder(&bus, &["error"]);
        let mut polling = polling(Arc::clone(&api), &bus, options());

        let err = polling.run(&cancel).await.unwrap_err();
        assert_eq!(err.code(), Some(401));
        assert!(log.lock().is_empty());
        assert_eq!(api.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let api = Scripted::new(vec![Ok(json!([]))], &cancel);
        let bus = EventBus::new();
        let mut polling = polling(Arc::clone(&api), &bus, options());

        tokio_test::assert_ok!(polling.run(&cancel).await);
        assert!(api.calls.lock().is_empty());
    }

    #[test]
    fn test_options_validation() {
        assert!(PollingOptions::default().validate().is_ok());

        let zero = PollingOptions {
            limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(RuntimeError::InvalidPolling { option: "limit", .. })
        ));

        let mut shrinking = PollingOptions::default();
        shrinking.backoff.multiplier = 0.5;
        assert!(shrinking.validate().is_err());
    }
}
