//! Collector options.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::Collected;
use crate::error::{CollectorError, CollectorResult};

/// Default absolute lifetime of a collector.
pub const DEFAULT_TIME: Duration = Duration::from_millis(60_000);

/// Acceptance predicate of a collector.
pub enum CollectFilter<K, V> {
    /// Decides immediately.
    Sync(Arc<dyn Fn(&V, &Collected<K, V>) -> bool + Send + Sync>),
    /// Decides once the returned future resolves.
    Async(Arc<dyn Fn(V, Collected<K, V>) -> BoxFuture<'static, bool> + Send + Sync>),
}

impl<K, V> Clone for CollectFilter<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// Validated collector options. Build with [`CollectorOptions::builder`].
pub struct CollectorOptions<K, V> {
    filter: Option<CollectFilter<K, V>>,
    time: Option<Duration>,
    idle: Option<Duration>,
    max: Option<usize>,
    max_processed: Option<usize>,
    dispose: bool,
}

impl<K, V> CollectorOptions<K, V> {
    pub fn builder() -> CollectorOptionsBuilder<K, V> {
        CollectorOptionsBuilder::default()
    }

    pub fn filter(&self) -> Option<&CollectFilter<K, V>> {
        self.filter.as_ref()
    }

    /// Absolute lifetime, `None` if disabled.
    pub fn time(&self) -> Option<Duration> {
        self.time
    }

    /// Lifetime since the last accepted item, `None` if disabled.
    pub fn idle(&self) -> Option<Duration> {
        self.idle
    }

    /// Accepted items after which the collector ends.
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Observed items after which the collector ends.
    pub fn max_processed(&self) -> Option<usize> {
        self.max_processed
    }

    /// Whether retraction events remove collected items.
    pub fn dispose(&self) -> bool {
        self.dispose
    }
}

impl<K, V> Default for CollectorOptions<K, V> {
    fn default() -> Self {
        Self {
            filter: None,
            time: Some(DEFAULT_TIME),
            idle: None,
            max: None,
            max_processed: None,
            dispose: false,
        }
    }
}

impl<K, V> Clone for CollectorOptions<K, V> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            time: self.time,
            idle: self.idle,
            max: self.max,
            max_processed: self.max_processed,
            dispose: self.dispose,
        }
    }
}

impl<K, V> std::fmt::Debug for CollectorOptions<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filter = match self.filter {
            Some(CollectFilter::Sync(_)) => "sync",
            Some(CollectFilter::Async(_)) => "async",
            None => "none",
        };
        f.debug_struct("CollectorOptions")
            .field("filter", &filter)
            .field("time", &self.time)
            .field("idle", &self.idle)
            .field("max", &self.max)
            .field("max_processed", &self.max_processed)
            .field("dispose", &self.dispose)
            .finish()
    }
}

/// Builder for [`CollectorOptions`].
pub struct CollectorOptionsBuilder<K, V> {
    options: CollectorOptions<K, V>,
}

impl<K, V> Default for CollectorOptionsBuilder<K, V> {
    fn default() -> Self {
        Self {
            options: CollectorOptions::default(),
        }
    }
}

impl<K, V> CollectorOptionsBuilder<K, V> {
    /// Accepts only items for which `filter` returns `true`.
    ///
    /// The filter sees a snapshot of what has been collected so far.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&V, &Collected<K, V>) -> bool + Send + Sync + 'static,
    {
        self.options.filter = Some(CollectFilter::Sync(Arc::new(filter)));
        self
    }

    /// Like [`filter`](Self::filter), but the decision is awaited.
    pub fn filter_async<F, Fut>(mut self, filter: F) -> Self
    where
        F: Fn(V, Collected<K, V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.options.filter = Some(CollectFilter::Async(Arc::new(move |value, collected| {
            filter(value, collected).boxed()
        })));
        self
    }

    pub fn time(mut self, time: Duration) -> Self {
        self.options.time = Some(time);
        self
    }

    /// Removes the absolute lifetime.
    pub fn without_time(mut self) -> Self {
        self.options.time = None;
        self
    }

    pub fn idle(mut self, idle: Duration) -> Self {
        self.options.idle = Some(idle);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.options.max = Some(max);
        self
    }

    pub fn max_processed(mut self, max: usize) -> Self {
        self.options.max_processed = Some(max);
        self
    }

    pub fn dispose(mut self, dispose: bool) -> Self {
        self.options.dispose = dispose;
        self
    }

    /// Validates and returns the options.
    ///
    /// # Errors
    /// Returns [`CollectorError::InvalidOption`] for a zero limit or a zero
    /// duration.
    pub fn build(self) -> CollectorResult<CollectorOptions<K, V>> {
        let options = self.options;
        if options.max == Some(0) {
            return Err(CollectorError::invalid("max", "must be at least 1"));
        }
        if options.max_processed == Some(0) {
            return Err(CollectorError::invalid("max_processed", "must be at least 1"));
        }
        if options.time.is_some_and(|t| t.is_zero()) {
            return Err(CollectorError::invalid("time", "must be positive"));
        }
        if options.idle.is_some_and(|t| t.is_zero()) {
            return Err(CollectorError::invalid("idle", "must be positive"));
        }
        Ok(options)
    }
}
