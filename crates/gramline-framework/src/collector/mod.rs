//! Bounded, short-lived subscriptions that gather matching updates.
//!
//! A collector subscribes to a few bus events, keeps the items its filter
//! accepts, and ends on the first of its stop conditions:
//!
//! ```text
//!            ┌──────────── collect ──────────┐
//!            ▼                               │
//!       ┌─────────┐  max / max_processed  ┌──┴──────────────┐
//!       │ Active  │──────────────────────▶│ Ended(reason)   │
//!       └─────────┘  time / idle / stop   └─────────────────┘
//! ```
//!
//! | Reason | Trigger |
//! |--------|---------|
//! | `time` | the absolute lifetime elapsed |
//! | `idle` | nothing was accepted for the idle window |
//! | `user` | [`Collector::stop`] |
//! | `limit` | `max` items accepted |
//! | `processedLimit` | `max_processed` items observed |
//!
//! Ending happens exactly once. It releases every bus subscription, cancels
//! both timers, finishes all item streams and fires the `end` hooks. No
//! `collect`, `ignore` or `dispose` hook fires afterwards.
//!
//! A collector stays alive until it ends, whether or not a [`Collector`]
//! handle is still held: its listeners and timers own it, and ending drops
//! them.
//!
//! # Specializations
//!
//! What a collector listens to and how it keys items is decided by a
//! [`CollectorSource`]. Timers, filtering and termination are shared:
//!
//! - [`MessageCollector`]: messages and channel posts of one chat
//! - [`ReactionCollector`]: reaction changes in one chat
//! - [`InlineKeyboardCollector`]: inline keyboard button presses

mod inline_keyboard;
mod message;
mod options;
mod reaction;

pub use inline_keyboard::{InlineKeyboardCollector, InlineKeyboardSource};
pub use message::{MessageCollector, MessageSource};
pub use options::{CollectFilter, CollectorOptions, CollectorOptionsBuilder, DEFAULT_TIME};
pub use reaction::{ReactionCollector, ReactionSource};

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use gramline_core::{BotEvent, EventBus, Subscription};

use crate::error::{CollectorError, CollectorResult};

/// Items a collector has accepted, by key.
pub type Collected<K, V> = BTreeMap<K, V>;

/// A stream of accepted items; it finishes when the collector ends.
pub type ItemStream<K, V> = mpsc::UnboundedReceiver<(K, V)>;

// =============================================================================
// EndReason
// =============================================================================

/// Why a collector ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndReason {
    Time,
    Idle,
    User,
    Limit,
    ProcessedLimit,
    /// A reason passed to [`Collector::stop_with`] or decided by a source.
    Custom(String),
}

impl EndReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Time => "time",
            Self::Idle => "idle",
            Self::User => "user",
            Self::Limit => "limit",
            Self::ProcessedLimit => "processedLimit",
            Self::Custom(reason) => reason,
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CollectorSource
// =============================================================================

/// Decides what a collector listens to and how it keys items.
pub trait CollectorSource: Send + Sync + 'static {
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Bus events that may carry items.
    fn collect_events(&self) -> &'static [&'static str];

    /// Bus events that may retract items. Only subscribed when the options
    /// enable disposal.
    fn dispose_events(&self) -> &'static [&'static str] {
        &[]
    }

    /// Extracts an item from an event.
    ///
    /// `None` means the event does not concern this collector; it is not
    /// counted as processed.
    fn collect(&self, event: &BotEvent) -> Option<(Self::Key, Self::Value)>;

    /// Extracts the key of an item retracted by an event.
    fn dispose(&self, _event: &BotEvent) -> Option<Self::Key> {
        None
    }

    /// Checked after every accepted, ignored or disposed item.
    fn end_reason(
        &self,
        collected: usize,
        processed: usize,
        options: &CollectorOptions<Self::Key, Self::Value>,
    ) -> Option<EndReason> {
        if options.max().is_some_and(|max| collected >= max) {
            return Some(EndReason::Limit);
        }
        if options.max_processed().is_some_and(|max| processed >= max) {
            return Some(EndReason::ProcessedLimit);
        }
        None
    }

    /// Called once for every accepted item, before the `collect` hooks.
    fn accepted(&self, _key: &Self::Key, _value: &Self::Value) {}
}

// =============================================================================
// Shared state
// =============================================================================

type ItemHook<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;
type EndHook<K, V> = Arc<dyn Fn(&EndReason, &Collected<K, V>) + Send + Sync>;

struct Hooks<K, V> {
    collect: Vec<ItemHook<K, V>>,
    ignore: Vec<ItemHook<K, V>>,
    dispose: Vec<ItemHook<K, V>>,
    end: Vec<EndHook<K, V>>,
}

impl<K, V> Default for Hooks<K, V> {
    fn default() -> Self {
        Self {
            collect: Vec::new(),
            ignore: Vec::new(),
            dispose: Vec::new(),
            end: Vec::new(),
        }
    }
}

struct State<K, V> {
    collected: Collected<K, V>,
    processed: usize,
    ended: Option<EndReason>,
    subscriptions: Vec<Subscription>,
    time_guard: Option<DropGuard>,
    idle_guard: Option<DropGuard>,
    streams: Vec<mpsc::UnboundedSender<(K, V)>>,
}

/// Everything ending detaches from [`State`]; dropped and fired after the
/// lock is released.
struct Teardown<K, V> {
    reason: EndReason,
    subscriptions: Vec<Subscription>,
    timers: (Option<DropGuard>, Option<DropGuard>),
    collected: Collected<K, V>,
}

impl<K: Clone, V: Clone> State<K, V> {
    /// Marks the state ended. `None` if it already was.
    fn end(&mut self, reason: EndReason) -> Option<Teardown<K, V>> {
        if self.ended.is_some() {
            return None;
        }
        self.ended = Some(reason.clone());
        self.streams.clear();
        Some(Teardown {
            reason,
            subscriptions: mem::take(&mut self.subscriptions),
            timers: (self.time_guard.take(), self.idle_guard.take()),
            collected: self.collected.clone(),
        })
    }
}

struct Shared<S: CollectorSource> {
    source: S,
    options: CollectorOptions<S::Key, S::Value>,
    runtime: Handle,
    state: Mutex<State<S::Key, S::Value>>,
    hooks: Mutex<Hooks<S::Key, S::Value>>,
    ended: watch::Sender<Option<EndReason>>,
}

impl<S: CollectorSource> Shared<S> {
    fn is_ended(&self) -> bool {
        self.state.lock().ended.is_some()
    }

    fn handle_collect(self: &Arc<Self>, event: &BotEvent) {
        if self.is_ended() {
            return;
        }
        let Some((key, value)) = self.source.collect(event) else {
            return;
        };

        let snapshot = {
            let mut state = self.state.lock();
            if state.ended.is_some() {
                return;
            }
            state.processed += 1;
            self.options.filter().map(|_| state.collected.clone())
        };

        match (self.options.filter(), snapshot) {
            (Some(CollectFilter::Sync(filter)), Some(collected)) => {
                let pass = filter(&value, &collected);
                self.settle(key, value, pass);
            }
            (Some(CollectFilter::Async(filter)), Some(collected)) => {
                let decision = filter(value.clone(), collected);
                let this = Arc::clone(self);
                self.runtime.spawn(async move {
                    let pass = decision.await;
                    this.settle(key, value, pass);
                });
            }
            _ => self.settle(key, value, true),
        }
    }

    /// Stores or ignores an item once its filter has decided.
    ///
    /// Storing the item and checking the stop conditions happen under one
    /// lock, so concurrent decisions can never overshoot `max`.
    fn settle(self: &Arc<Self>, key: S::Key, value: S::Value, pass: bool) {
        let teardown = {
            let mut state = self.state.lock();
            if state.ended.is_some() {
                trace!(key = ?key, "Filter decided after end, discarded");
                return;
            }
            if pass {
                state.collected.insert(key.clone(), value.clone());
                state
                    .streams
                    .retain(|tx| tx.unbounded_send((key.clone(), value.clone())).is_ok());
            }
            self.end_if_done(&mut state)
        };

        if pass {
            self.source.accepted(&key, &value);
            if teardown.is_none() {
                self.reset_idle();
            }
            trace!(key = ?key, "Collected");
            let hooks = self.hooks.lock().collect.clone();
            for hook in hooks {
                hook(&key, &value);
            }
        } else {
            let hooks = self.hooks.lock().ignore.clone();
            for hook in hooks {
                hook(&key, &value);
            }
        }

        if let Some(teardown) = teardown {
            self.complete(teardown);
        }
    }

    fn handle_dispose(self: &Arc<Self>, event: &BotEvent) {
        if self.is_ended() {
            return;
        }
        let Some(key) = self.source.dispose(event) else {
            return;
        };
        let (removed, teardown) = {
            let mut state = self.state.lock();
            if state.ended.is_some() {
                return;
            }
            let removed = state.collected.remove(&key);
            (removed, self.end_if_done(&mut state))
        };

        if let Some(value) = removed {
            trace!(key = ?key, "Disposed");
            let hooks = self.hooks.lock().dispose.clone();
            for hook in hooks {
                hook(&key, &value);
            }
        }
        if let Some(teardown) = teardown {
            self.complete(teardown);
        }
    }

    /// Ends `state` if the source's stop conditions hold. Called with the
    /// lock held.
    fn end_if_done(
        &self,
        state: &mut State<S::Key, S::Value>,
    ) -> Option<Teardown<S::Key, S::Value>> {
        let reason =
            self.source
                .end_reason(state.collected.len(), state.processed, &self.options)?;
        state.end(reason)
    }

    /// Spawns a timer that ends the collector unless the guard is dropped.
    fn arm(self: &Arc<Self>, after: Duration, reason: EndReason) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    this.finish(reason);
                }
            }
        });
        token.drop_guard()
    }

    fn reset_idle(self: &Arc<Self>) {
        let Some(idle) = self.options.idle() else {
            return;
        };
        let guard = self.arm(idle, EndReason::Idle);
        let stale = {
            let mut state = self.state.lock();
            if state.ended.is_some() {
                Some(guard)
            } else {
                state.idle_guard.replace(guard)
            }
        };
        drop(stale);
    }

    /// Ends the collector. Returns `false` if it had already ended.
    fn finish(&self, reason: EndReason) -> bool {
        let teardown = self.state.lock().end(reason);
        match teardown {
            Some(teardown) => {
                self.complete(teardown);
                true
            }
            None => false,
        }
    }

    /// Releases listeners and timers, then fires the `end` hooks.
    fn complete(&self, teardown: Teardown<S::Key, S::Value>) {
        let Teardown {
            reason,
            subscriptions,
            timers,
            collected,
        } = teardown;
        drop(timers);
        drop(subscriptions);

        self.ended.send_replace(Some(reason.clone()));
        let hooks = mem::take(&mut *self.hooks.lock());
        debug!(reason = %reason, collected = collected.len(), "Collector ended");
        for hook in &hooks.end {
            hook(&reason, &collected);
        }
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Handle to a running or ended collector.
pub struct Collector<S: CollectorSource> {
    shared: Arc<Shared<S>>,
}

impl<S: CollectorSource> Clone for Collector<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: CollectorSource> Collector<S> {
    /// Subscribes `source`'s events on `bus` and arms the timers.
    ///
    /// # Errors
    /// Returns [`CollectorError::NoRuntime`] outside a tokio runtime.
    pub fn start(
        bus: &EventBus,
        source: S,
        options: CollectorOptions<S::Key, S::Value>,
    ) -> CollectorResult<Self> {
        let runtime = Handle::try_current().map_err(|_| CollectorError::NoRuntime)?;
        let (ended, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            source,
            options,
            runtime,
            state: Mutex::new(State {
                collected: BTreeMap::new(),
                processed: 0,
                ended: None,
                subscriptions: Vec::new(),
                time_guard: None,
                idle_guard: None,
                streams: Vec::new(),
            }),
            hooks: Mutex::new(Hooks::default()),
            ended,
        });

        let mut subscriptions = Vec::new();
        for name in shared.source.collect_events() {
            let this = Arc::clone(&shared);
            subscriptions.push(bus.on(*name, move |event| this.handle_collect(event)));
        }
        if shared.options.dispose() {
            for name in shared.source.dispose_events() {
                let this = Arc::clone(&shared);
                subscriptions.push(bus.on(*name, move |event| this.handle_dispose(event)));
            }
        }
        let time_guard = shared
            .options
            .time()
            .map(|time| shared.arm(time, EndReason::Time));
        let idle_guard = shared
            .options
            .idle()
            .map(|idle| shared.arm(idle, EndReason::Idle));

        let leftovers = {
            let mut state = shared.state.lock();
            if state.ended.is_some() {
                Some((subscriptions, time_guard, idle_guard))
            } else {
                state.subscriptions = subscriptions;
                state.time_guard = time_guard;
                state.idle_guard = idle_guard;
                None
            }
        };
        drop(leftovers);

        debug!(
            events = ?shared.source.collect_events(),
            options = ?shared.options,
            "Collector started"
        );
        Ok(Self { shared })
    }

    pub fn source(&self) -> &S {
        &self.shared.source
    }

    pub fn options(&self) -> &CollectorOptions<S::Key, S::Value> {
        &self.shared.options
    }

    /// A snapshot of the accepted items.
    pub fn collected(&self) -> Collected<S::Key, S::Value> {
        self.shared.state.lock().collected.clone()
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.shared.state.lock().collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items observed, accepted or not.
    pub fn processed(&self) -> usize {
        self.shared.state.lock().processed
    }

    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.shared.state.lock().ended.clone()
    }

    /// Ends the collector with reason `user`.
    ///
    /// Returns `true` only for the call that ended it.
    pub fn stop(&self) -> bool {
        self.stop_with(EndReason::User)
    }

    /// Ends the collector with `reason`; a no-op once ended.
    pub fn stop_with(&self, reason: EndReason) -> bool {
        self.shared.finish(reason)
    }

    /// Runs `hook` for every accepted item.
    pub fn on_collect<F>(&self, hook: F)
    where
        F: Fn(&S::Key, &S::Value) + Send + Sync + 'static,
    {
        self.shared.hooks.lock().collect.push(Arc::new(hook));
    }

    /// Runs `hook` for every item the filter rejected.
    pub fn on_ignore<F>(&self, hook: F)
    where
        F: Fn(&S::Key, &S::Value) + Send + Sync + 'static,
    {
        self.shared.hooks.lock().ignore.push(Arc::new(hook));
    }

    /// Runs `hook` for every item removed by a retraction event.
    pub fn on_dispose<F>(&self, hook: F)
    where
        F: Fn(&S::Key, &S::Value) + Send + Sync + 'static,
    {
        self.shared.hooks.lock().dispose.push(Arc::new(hook));
    }

    /// Runs `hook` once when the collector ends, or right away if it already
    /// has.
    pub fn on_end<F>(&self, hook: F)
    where
        F: Fn(&EndReason, &Collected<S::Key, S::Value>) + Send + Sync + 'static,
    {
        let ended = {
            let state = self.shared.state.lock();
            match &state.ended {
                Some(reason) => (reason.clone(), state.collected.clone()),
                None => {
                    self.shared.hooks.lock().end.push(Arc::new(hook));
                    return;
                }
            }
        };
        hook(&ended.0, &ended.1);
    }

    /// Streams items accepted from now on.
    pub fn stream(&self) -> ItemStream<S::Key, S::Value> {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.shared.state.lock();
        if state.ended.is_none() {
            state.streams.push(tx);
        }
        rx
    }

    /// Waits for the next accepted item; `None` once the collector ends.
    pub async fn next(&self) -> Option<(S::Key, S::Value)> {
        self.stream().next().await
    }

    /// Waits for the collector to end.
    pub async fn wait(&self) -> (EndReason, Collected<S::Key, S::Value>) {
        let mut ended = self.shared.ended.subscribe();
        let reason = match ended.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        let reason = reason.or_else(|| self.end_reason()).unwrap_or(EndReason::User);
        (reason, self.collected())
    }
}

impl<S: CollectorSource> fmt::Debug for Collector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Collector")
            .field("collected", &state.collected.len())
            .field("processed", &state.processed)
            .field("ended", &state.ended)
            .finish_non_exhaustive()
    }
}
