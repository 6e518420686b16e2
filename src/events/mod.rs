//! Domain event publishing (spec §4.6).
//!
//! A bounded in-memory buffer flushed to a pluggable [`Sink`] whenever
//! `batch_size` is reached or `flush_interval` elapses, whichever comes
//! first — the same two-trigger flush shape as the teacher's
//! write-behind accounting in `strategy.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::NeoCacheResult;

/// A single occurrence worth reporting to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A `get` found a live entry.
    CacheHit,
    /// A `get` found nothing.
    CacheMiss {
        /// Why nothing was found (`"not_found"`, `"error"`, `"expired"`).
        reason: String,
    },
    /// Keys were removed by the invalidation subsystem.
    CacheInvalidated {
        /// Human-readable cause (pattern text, dependency cascade, schedule id).
        reason: String,
    },
    /// An entry was lazily or eagerly swept for expiry.
    CacheExpired {
        /// What triggered the expiry check (`"lazy_get"`, `"sweep"`).
        trigger: String,
    },
}

/// External destination for flushed event batches.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver a batch; an error is logged by the publisher but does not
    /// block further buffering.
    async fn publish(&self, events: &[DomainEvent]) -> NeoCacheResult<()>;
}

/// A sink that only counts events, useful for tests and as a safe default.
#[derive(Default)]
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn publish(&self, _events: &[DomainEvent]) -> NeoCacheResult<()> {
        Ok(())
    }
}

/// Running counters describing publisher health.
#[derive(Debug, Clone, Default)]
pub struct EventMetrics {
    /// Successfully flushed batches.
    pub successful_flushes: u64,
    /// Flushes that returned an error from the sink.
    pub failed_flushes: u64,
    /// Total events ever buffered.
    pub total_events: u64,
    /// Timestamp of the most recent successful flush.
    pub last_flush_at: Option<DateTime<Utc>>,
    /// Message from the most recent flush failure, if any.
    pub last_error: Option<String>,
    /// Events currently sitting in the buffer.
    pub current_batch_size: usize,
}

impl EventMetrics {
    /// Fraction of flush attempts that succeeded, in `[0.0, 1.0]`.
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_flushes + self.failed_flushes;
        if total == 0 {
            1.0
        } else {
            self.successful_flushes as f64 / total as f64
        }
    }
}

struct Inner {
    buffer: Vec<DomainEvent>,
    metrics: EventMetrics,
}

/// Buffers [`DomainEvent`]s and flushes them to a [`Sink`] on a
/// size-or-time trigger.
pub struct EventPublisher {
    sink: Arc<dyn Sink>,
    batch_size: usize,
    flush_interval: Duration,
    inner: Mutex<Inner>,
}

impl EventPublisher {
    /// Construct a publisher delivering to `sink`.
    pub fn new(sink: Arc<dyn Sink>, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            sink,
            batch_size,
            flush_interval,
            inner: Mutex::new(Inner {
                buffer: Vec::new(),
                metrics: EventMetrics::default(),
            }),
        }
    }

    /// Record a cache hit.
    pub async fn record_hit(&self) {
        self.push(DomainEvent::CacheHit).await;
    }

    /// Record a cache miss with `reason`.
    pub async fn record_miss(&self, reason: impl Into<String>) {
        self.push(DomainEvent::CacheMiss { reason: reason.into() }).await;
    }

    /// Record an invalidation with `reason`.
    pub async fn record_invalidated(&self, reason: impl Into<String>) {
        self.push(DomainEvent::CacheInvalidated { reason: reason.into() }).await;
    }

    /// Record an expiry with `trigger`.
    pub async fn record_expired(&self, trigger: impl Into<String>) {
        self.push(DomainEvent::CacheExpired { trigger: trigger.into() }).await;
    }

    async fn push(&self, event: DomainEvent) {
        let should_flush = {
            let mut inner = self.inner.lock().await;
            inner.buffer.push(event);
            inner.metrics.total_events += 1;
            inner.metrics.current_batch_size = inner.buffer.len();
            inner.buffer.len() >= self.batch_size
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Force an immediate flush regardless of buffer size.
    pub async fn flush(&self) {
        let batch = {
            let mut inner = self.inner.lock().await;
            if inner.buffer.is_empty() {
                return;
            }
            std::mem::take(&mut inner.buffer)
        };
        match self.sink.publish(&batch).await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                inner.metrics.successful_flushes += 1;
                inner.metrics.last_flush_at = Some(Utc::now());
                inner.metrics.current_batch_size = inner.buffer.len();
            }
            Err(e) => {
                tracing::warn!(error = %e, "event batch flush failed");
                let mut inner = self.inner.lock().await;
                inner.metrics.failed_flushes += 1;
                inner.metrics.last_error = Some(e.to_string());
            }
        }
    }

    /// Snapshot current metrics.
    pub async fn metrics(&self) -> EventMetrics {
        self.inner.lock().await.metrics.clone()
    }

    /// Spawn a background loop flushing every `flush_interval`.
    pub fn spawn_flush_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let start = Instant::now();
            let _ = start;
            loop {
                ticker.tick().await;
                self.flush().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl Sink for CountingSink {
        async fn publish(&self, events: &[DomainEvent]) -> NeoCacheResult<()> {
            self.0.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn flushes_on_batch_size() {
        let count = Arc::new(AtomicUsize::new(0));
        let publisher = EventPublisher::new(Arc::new(CountingSink(count.clone())), 2, Duration::from_secs(60));
        publisher.record_hit().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        publisher.record_hit().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn manual_flush_delivers_partial_batch() {
        let count = Arc::new(AtomicUsize::new(0));
        let publisher = EventPublisher::new(Arc::new(CountingSink(count.clone())), 100, Duration::from_secs(60));
        publisher.record_miss("not_found").await;
        publisher.flush().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let metrics = publisher.metrics().await;
        assert_eq!(metrics.successful_flushes, 1);
    }
}
