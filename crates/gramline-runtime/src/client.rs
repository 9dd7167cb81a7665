//! The client facade.
//!
//! A [`Client`] wires one [`EventBus`], a rate-limit reporting API wrapper,
//! the [`EventRouter`] and a [`PollingLoop`] together:
//!
//! ```text
//! transport ─▶ ReportingApi ──┬─▶ PollingLoop ─▶ EventRouter ─▶ EventBus
//!                 │           └─▶ Context helpers, collectors
//!                 └─ "rate_limit" ───────────────────────────────▶ EventBus
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let client = Client::builder().token("123:abc").build()?;
//! let _echo = client.on_async("message:text", |event| async move {
//!     if let Some(ctx) = event.context() {
//!         let _ = ctx.reply(ctx.text().unwrap_or_default()).await;
//!     }
//! });
//! client.run_until_ctrl_c().await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gramline_core::event::{DISCONNECT, READY};
use gramline_core::model::User;
use gramline_core::{
    ApiClientExt, ApiResult, BotEvent, BoxedApi, Context, EventBus, Params, Subscription,
};
use gramline_framework::{
    CollectorOptions, CollectorResult, EventRouter, InlineKeyboardCollector, MessageCollector,
    ReactionCollector,
};
use gramline_transport::HttpTransport;

use crate::api::ReportingApi;
use crate::config::{ConfigLoader, GramlineConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::polling::{PollingLoop, PollingOptions};

/// A bot API client: events in, API calls out.
///
/// Cloning is cheap; clones share the bus, the transport and the
/// disconnect signal.
#[derive(Clone)]
pub struct Client {
    bus: EventBus,
    api: BoxedApi,
    router: EventRouter,
    polling: PollingOptions,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Builds an HTTP client with default settings.
    pub fn new(token: impl Into<String>) -> RuntimeResult<Self> {
        Self::builder().token(token).build()
    }

    /// Loads configuration from the default locations and the environment,
    /// initializes logging from it and builds a client.
    pub fn load() -> RuntimeResult<Self> {
        let config = ConfigLoader::new().load()?;
        logging::init_from_config(&config.logging);
        Self::builder().config(config).build()
    }

    // ===== Events =====

    /// Registers a synchronous listener.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&BotEvent) + Send + Sync + 'static,
    {
        self.bus.on(name, listener)
    }

    /// Registers an async listener; each emission spawns its future.
    pub fn on_async<F, Fut>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(BotEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bus.on_async(name, listener)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn polling_options(&self) -> &PollingOptions {
        &self.polling
    }

    // ===== API =====

    /// The API client contexts and collectors act through.
    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    /// Calls an API method.
    pub async fn request(&self, method: &str, params: impl Into<Params>) -> ApiResult<Value> {
        self.api.request(method, params.into()).await
    }

    // ===== Collectors =====

    /// Collects messages and channel posts of one chat.
    pub fn message_collector(
        &self,
        chat_id: i64,
        options: CollectorOptions<i64, Context>,
    ) -> CollectorResult<MessageCollector> {
        MessageCollector::in_chat(&self.bus, chat_id, options)
    }

    /// Collects reactions in one chat.
    pub fn reaction_collector(
        &self,
        chat_id: i64,
        options: CollectorOptions<String, Context>,
    ) -> CollectorResult<ReactionCollector> {
        ReactionCollector::in_chat(&self.bus, chat_id, None, options)
    }

    /// Collects inline keyboard presses from any chat.
    pub fn inline_keyboard_collector(
        &self,
        options: CollectorOptions<String, Context>,
    ) -> CollectorResult<InlineKeyboardCollector> {
        InlineKeyboardCollector::for_keyboard(&self.bus, None, options)
    }

    // ===== Lifecycle =====

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Authenticates, emits `ready`, then polls until [`disconnect`] or a
    /// fatal error, and emits `disconnect` once polling stops.
    ///
    /// A disconnected client stays disconnected: a later `run` returns
    /// immediately.
    ///
    /// # Errors
    /// Returns [`RuntimeError::AlreadyRunning`] if another `run` is active,
    /// the `getMe` error if authentication fails, or the fatal error that
    /// stopped polling.
    ///
    /// [`disconnect`]: Client::disconnect
    pub async fn run(&self) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyRunning);
        }
        let _running = RunningGuard(self.running.as_ref());

        let me: User = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            me = self.api.call("getMe", Params::new()) => me?,
        };
        info!(
            id = me.id,
            username = me.username.as_deref().unwrap_or_default(),
            "Bot ready"
        );
        self.bus.emit(READY, &BotEvent::Ready(Arc::new(me)));

        let mut polling = PollingLoop::new(
            Arc::clone(&self.api),
            self.router.clone(),
            self.polling.clone(),
        );
        let result = polling.run(&self.cancel).await;

        self.bus.emit(DISCONNECT, &BotEvent::Disconnect);
        info!(offset = polling.offset(), "Disconnected");
        result.map_err(RuntimeError::from)
    }

    /// Stops polling at the next suspension point.
    pub fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            info!("Disconnect requested");
            self.cancel.cancel();
        }
    }

    /// Runs until Ctrl+C (or SIGTERM on Unix), then disconnects and waits
    /// for polling to stop.
    pub async fn run_until_ctrl_c(&self) -> RuntimeResult<()> {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            () = shutdown_signal() => self.disconnect(),
        }
        run.await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("bus", &self.bus)
            .field("polling", &self.polling)
            .field("running", &self.is_running())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// Clears the running flag however `run` exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// ClientBuilder
// =============================================================================

/// Builder for [`Client`].
///
/// Without an explicit transport, an [`HttpTransport`] is built from the
/// configuration, which is validated first.
#[derive(Default)]
pub struct ClientBuilder {
    token: Option<String>,
    config: Option<GramlineConfig>,
    transport: Option<BoxedApi>,
    polling: Option<PollingOptions>,
}

impl ClientBuilder {
    /// Sets the bot token, overriding the configuration's.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn config(mut self, config: GramlineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `transport` instead of building an HTTP transport.
    pub fn transport(mut self, transport: BoxedApi) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the configuration's polling settings.
    pub fn polling(mut self, options: PollingOptions) -> Self {
        self.polling = Some(options);
        self
    }

    pub fn build(self) -> RuntimeResult<Client> {
        let mut config = self.config.unwrap_or_default();
        if let Some(token) = self.token {
            config.bot.token = token;
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                validate_config(&config)?;
                Arc::new(HttpTransport::new(config.bot.to_transport_config())?) as BoxedApi
            }
        };

        let polling = self
            .polling
            .unwrap_or_else(|| config.polling.to_options());
        polling.validate()?;

        let bus = EventBus::new();
        let api = ReportingApi::boxed(transport, bus.clone());
        let router = EventRouter::new(bus.clone(), Arc::clone(&api));

        Ok(Client {
            bus,
            api,
            router,
            polling,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use gramline_core::{ApiClient, ApiError};
    use gramline_framework::EndReason;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::config::ConfigError;

    /// Answers `getMe`, plays back `getUpdates` batches, then blocks.
    struct FakeApi {
        authorized: bool,
        batches: Mutex<VecDeque<Value>>,
        sent: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn new(batches: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                authorized: true,
                batches: Mutex::new(batches.into()),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ApiClient for FakeApi {
        async fn request(&self, method: &str, _params: Params) -> ApiResult<Value> {
            match method {
                "getMe" if self.authorized => {
                    Ok(json!({"id": 1, "is_bot": true, "first_name": "Gram", "username": "gram_bot"}))
                }
                "getMe" => Err(ApiError::Api {
                    method: method.into(),
                    code: 401,
                    description: "Unauthorized".into(),
                    parameters: None,
                }),
                "getUpdates" => {
                    let next = self.batches.lock().pop_front();
                    match next {
                        Some(batch) => Ok(batch),
                        None => std::future::pending().await,
                    }
                }
                other => {
                    self.sent.lock().push(other.to_string());
                    Ok(json!(true))
                }
            }
        }
    }

    fn client(api: Arc<FakeApi>) -> Client {
        Client::builder().transport(api).build().unwrap()
    }

    fn message(update_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {"message_id": update_id, "chat": {"id": 9}, "from": {"id": 5}, "text": text}
        })
    }

    #[tokio::test]
    async fn test_run_lifecycle_events() {
        let api = FakeApi::new(vec![json!([message(1, "hi"), message(2, "bye")])]);
        let client = client(api);

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tokens = Vec::new();
        for name in ["ready", "message:text", "disconnect"] {
            let log = Arc::clone(&log);
            tokens.push(client.on(name, move |event| {
                let entry = match event {
                    BotEvent::Ready(me) => format!("ready:{}", me.id),
                    BotEvent::Update(ctx) => format!("text:{}", ctx.text().unwrap_or_default()),
                    BotEvent::Disconnect => "disconnect".to_string(),
                    _ => "other".to_string(),
                };
                log.lock().push(entry);
            }));
        }
        let stopper = client.clone();
        tokens.push(client.on("message", move |event| {
            if event.context().and_then(Context::text) == Some("bye") {
                stopper.disconnect();
            }
        }));

        client.run().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["ready:1", "text:hi", "text:bye", "disconnect"]
        );
        assert!(!client.is_running());
        assert!(client.is_disconnected());
    }

    #[tokio::test]
    async fn test_unauthorized_run_fails_without_events() {
        let api = Arc::new(FakeApi {
            authorized: false,
            batches: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        });
        let client = client(api);
        let events = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&events);
        let _ready = client.on("ready", move |_| *counter.lock() += 1);

        let err = client.run().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Api(ref e) if e.code() == Some(401)));
        assert_eq!(*events.lock(), 0);
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let client = client(FakeApi::new(Vec::new()));

        let (first, second) = tokio::join!(client.run(), async {
            let result = client.run().await;
            client.disconnect();
            result
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(RuntimeError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_collector_through_client() {
        let api = FakeApi::new(vec![json!([
            message(1, "one"),
            message(2, "two"),
            message(3, "three")
        ])]);
        let client = client(Arc::clone(&api));

        let collector = client
            .message_collector(9, CollectorOptions::builder().max(2).build().unwrap())
            .unwrap();
        let stopper = client.clone();
        collector.on_end(move |_, _| stopper.disconnect());

        client.run().await.unwrap();

        let (reason, collected) = collector.wait().await;
        assert_eq!(reason, EndReason::Limit);
        assert_eq!(collected.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(client.bus().listener_count("message"), 0);
    }

    #[tokio::test]
    async fn test_request_goes_through_transport() {
        let api = FakeApi::new(Vec::new());
        let client = client(Arc::clone(&api));

        let result = client
            .request("sendMessage", json!({"chat_id": 9, "text": "hello"}))
            .await
            .unwrap();
        assert_eq!(result, json!(true));
        assert_eq!(*api.sent.lock(), vec!["sendMessage"]);
    }

    #[test]
    fn test_builder_validates_http_config() {
        let err = Client::builder().build().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::MissingField { .. })
        ));

        let err = Client::new("not-a-token").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));

        let client = Client::new("123:abc").unwrap();
        assert_eq!(client.polling_options().limit, 100);
    }

    #[test]
    fn test_builder_rejects_bad_polling() {
        let err = Client::builder()
            .transport(FakeApi::new(Vec::new()))
            .polling(PollingOptions {
                limit: 0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPolling { option: "limit", .. }));
    }
}
