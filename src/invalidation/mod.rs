//! Invalidation subsystem (spec §4.4).
//!
//! Grounded directly in `enterprise::cache::invalidation`: pattern scan,
//! dependency cascade, a single-loop scheduler, and an event-trigger
//! registry, each carried over into this crate's value types.

pub mod dependency;
pub mod scheduler;
pub mod trigger;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use uuid::Uuid;

use crate::config::InvalidationConfig;
use crate::error::NeoCacheResult;
use crate::events::EventPublisher;
use crate::repository::CacheRepository;
use crate::value_objects::{InvalidationPattern, Key};

pub use dependency::DependencyGraph;
pub use scheduler::ScheduledInvalidation;
pub use trigger::{Condition, EventTrigger, TriggerStatus};

/// A simple token bucket, refilled continuously at `refill_per_sec`.
/// Self-contained rather than pulling in a dedicated crate for one
/// small algorithm, matching the teacher's preference for inline
/// primitives over extra dependencies for a single small mechanism.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(refill_per_sec: f64) -> Self {
        Self {
            capacity: refill_per_sec.max(1.0),
            tokens: refill_per_sec.max(1.0),
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, n: f64) -> bool {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }
}

/// Running totals for invalidation activity.
#[derive(Debug, Clone, Default)]
pub struct InvalidationStats {
    /// Individual keys removed.
    pub keys_invalidated: u64,
    /// `invalidate_pattern` calls executed.
    pub patterns_invalidated: u64,
    /// Dependency cascades executed.
    pub cascades_executed: u64,
    /// Scheduled entries executed.
    pub scheduled_executed: u64,
    /// Event triggers fired.
    pub events_triggered: u64,
    /// Failures encountered (individual key deletes, schedule execution).
    pub errors: u64,
    /// Keys skipped because of `enable_dry_run_mode`.
    pub dry_run_skips: u64,
    /// Keys dropped by the rate limiter.
    pub rate_limited: u64,
}

/// Invalidates keys by pattern, dependency cascade, schedule, or event,
/// against a shared [`CacheRepository`].
pub struct Invalidator<V> {
    repository: Arc<dyn CacheRepository<V>>,
    dependencies: DependencyGraph,
    scheduled: DashMap<Uuid, ScheduledInvalidation>,
    triggers: DashMap<Uuid, EventTrigger>,
    config: InvalidationConfig,
    rate_limiter: Option<SyncMutex<TokenBucket>>,
    stats: SyncMutex<InvalidationStats>,
    events: Option<Arc<EventPublisher>>,
}

impl<V> Invalidator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Construct an invalidator over `repository`.
    pub fn new(repository: Arc<dyn CacheRepository<V>>, config: InvalidationConfig) -> Self {
        let rate_limiter = config.rate_limit_per_second.map(|r| SyncMutex::new(TokenBucket::new(r as f64)));
        Self {
            repository,
            dependencies: DependencyGraph::new(),
            scheduled: DashMap::new(),
            triggers: DashMap::new(),
            config,
            rate_limiter,
            stats: SyncMutex::new(InvalidationStats::default()),
            events: None,
        }
    }

    /// Attach an event publisher so invalidations emit `CacheInvalidated`.
    pub fn with_events(mut self, events: Arc<EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    async fn notify_invalidated(&self, reason: &str) {
        if let Some(events) = &self.events {
            events.record_invalidated(reason).await;
        }
    }

    fn allow(&self, n: usize) -> bool {
        match &self.rate_limiter {
            Some(bucket) => bucket.lock().try_consume(n as f64),
            None => true,
        }
    }

    /// Remove a single key.
    pub async fn invalidate_key(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool> {
        if !self.allow(1) {
            self.stats.lock().rate_limited += 1;
            return Ok(false);
        }
        if self.config.enable_dry_run_mode {
            self.stats.lock().dry_run_skips += 1;
            return Ok(true);
        }
        let removed = self.repository.delete(namespace, key).await?;
        if removed {
            self.stats.lock().keys_invalidated += 1;
            self.notify_invalidated("key").await;
        }
        Ok(removed)
    }

    /// Remove several keys; individual failures are counted, not fatal.
    pub async fn invalidate_keys(&self, namespace: &str, keys: &[Key]) -> NeoCacheResult<usize> {
        let mut removed = 0;
        for key in keys {
            match self.invalidate_key(namespace, key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(_) => self.stats.lock().errors += 1,
            }
        }
        Ok(removed)
    }

    /// Remove every key matching `pattern`, honoring
    /// `max_keys_per_invalidation`, rate limiting, and dry-run mode.
    pub async fn invalidate_pattern(&self, pattern: &InvalidationPattern, namespace: Option<&str>) -> NeoCacheResult<usize> {
        let mut keys = self.repository.find_keys(pattern, namespace).await?;
        if let Some(cap) = self.config.max_keys_per_invalidation {
            keys.truncate(cap);
        }
        if !self.allow(keys.len()) {
            self.stats.lock().rate_limited += keys.len() as u64;
            return Ok(0);
        }
        if self.config.enable_dry_run_mode {
            self.stats.lock().dry_run_skips += keys.len() as u64;
            return Ok(keys.len());
        }
        let ns = namespace.unwrap_or("default");
        let mut removed = 0;
        for key in &keys {
            match self.repository.delete(ns, key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(_) => self.stats.lock().errors += 1,
            }
        }
        {
            let mut stats = self.stats.lock();
            stats.patterns_invalidated += 1;
            stats.keys_invalidated += removed as u64;
        }
        if removed > 0 {
            self.notify_invalidated("pattern").await;
        }
        Ok(removed)
    }

    /// Remove every entry in `namespace`.
    pub async fn invalidate_namespace(&self, namespace: &str) -> NeoCacheResult<usize> {
        let removed = self.repository.flush_namespace(namespace).await?;
        self.stats.lock().keys_invalidated += removed as u64;
        if removed > 0 {
            self.notify_invalidated("namespace").await;
        }
        Ok(removed)
    }

    /// Record that `dependent` should be invalidated whenever `source` is.
    pub fn add_dependency(&self, source: &str, dependent: &str) {
        self.dependencies.add_dependency(source, dependent);
    }

    /// Remove a `source -> dependent` edge.
    pub fn remove_dependency(&self, source: &str, dependent: &str) -> bool {
        self.dependencies.remove_dependency(source, dependent)
    }

    /// Direct dependents of `source`.
    pub fn get_dependencies(&self, source: &str) -> Vec<String> {
        self.dependencies.get_dependencies(source)
    }

    /// Invalidate `key` and cascade through its dependency graph.
    pub async fn invalidate_with_dependencies(&self, namespace: &str, key: &Key) -> NeoCacheResult<usize> {
        let full_key = format!("{namespace}:{}", key.as_str());
        self.repository.delete(namespace, key).await?;
        let (dependents, depth_exceeded) = self.dependencies.cascade(&full_key, self.config.max_dependency_depth);
        if depth_exceeded {
            tracing::warn!(source = %full_key, "dependency cascade halted at max depth");
        }
        let mut removed = 1;
        for dependent in &dependents {
            if let Some((ns, k)) = dependent.split_once(':') {
                if let Ok(dep_key) = Key::new(k) {
                    if self.repository.delete(ns, &dep_key).await.unwrap_or(false) {
                        removed += 1;
                    }
                }
            }
        }
        {
            let mut stats = self.stats.lock();
            stats.cascades_executed += 1;
            stats.keys_invalidated += removed as u64;
        }
        self.notify_invalidated("dependency_cascade").await;
        Ok(removed)
    }

    /// Schedule a future (optionally recurring) removal.
    pub fn schedule_invalidation(
        &self,
        namespace: &str,
        key: Key,
        delay: ChronoDuration,
        reason: impl Into<String>,
        recurring: bool,
        interval: Option<ChronoDuration>,
    ) -> Uuid {
        let entry = ScheduledInvalidation::new(key, namespace, delay, reason, recurring, interval);
        let id = entry.id;
        self.scheduled.insert(id, entry);
        id
    }

    /// Cancel a scheduled entry; returns whether it existed.
    pub fn cancel_scheduled(&self, id: Uuid) -> bool {
        if let Some(mut entry) = self.scheduled.get_mut(&id) {
            entry.cancelled = true;
            true
        } else {
            false
        }
    }

    /// Snapshot every scheduled entry.
    pub fn list_scheduled(&self) -> Vec<ScheduledInvalidation> {
        self.scheduled.iter().map(|e| e.value().clone()).collect()
    }

    /// Execute a scheduled entry immediately, regardless of `execute_at`.
    pub async fn force_execute_schedule(&self, id: Uuid) -> NeoCacheResult<bool> {
        let Some(entry) = self.scheduled.get(&id).map(|e| e.value().clone()) else {
            return Ok(false);
        };
        self.execute_scheduled(&entry).await?;
        self.advance_or_remove(id);
        Ok(true)
    }

    async fn execute_scheduled(&self, entry: &ScheduledInvalidation) -> NeoCacheResult<()> {
        self.repository.delete(&entry.namespace, &entry.key).await?;
        self.stats.lock().scheduled_executed += 1;
        self.notify_invalidated("scheduled").await;
        Ok(())
    }

    fn advance_or_remove(&self, id: Uuid) {
        let remove = match self.scheduled.get_mut(&id) {
            Some(mut entry) if entry.recurring && !entry.cancelled => {
                entry.reschedule();
                false
            }
            _ => true,
        };
        if remove {
            self.scheduled.remove(&id);
        }
    }

    /// Run one scheduler tick: execute every due, non-cancelled entry.
    pub async fn run_scheduler_tick(&self) {
        let now = chrono::Utc::now();
        let due: Vec<Uuid> = self
            .scheduled
            .iter()
            .filter(|e| e.is_due(now))
            .map(|e| *e.key())
            .collect();
        for id in due {
            let Some(entry) = self.scheduled.get(&id).map(|e| e.value().clone()) else {
                continue;
            };
            if let Err(e) = self.execute_scheduled(&entry).await {
                tracing::warn!(error = %e, schedule_id = %id, "scheduled invalidation failed");
                self.stats.lock().errors += 1;
            }
            self.advance_or_remove(id);
        }
    }

    /// Spawn the background scheduler loop, ticking at
    /// `scheduler_check_interval`.
    pub fn spawn_scheduler_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        V: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.run_scheduler_tick().await;
            }
        })
    }

    /// Register a new event trigger; returns its id.
    pub fn register_event_trigger(
        &self,
        event_type: impl Into<String>,
        pattern: InvalidationPattern,
        namespace: Option<String>,
        conditions: HashMap<String, Condition>,
    ) -> Uuid {
        let trigger = EventTrigger::new(event_type, pattern, namespace, conditions);
        let id = trigger.id;
        self.triggers.insert(id, trigger);
        id
    }

    /// Remove a registered trigger.
    pub fn unregister_event_trigger(&self, id: Uuid) -> bool {
        self.triggers.remove(&id).is_some()
    }

    /// Disable a trigger without removing it.
    pub fn pause_trigger(&self, id: Uuid) -> bool {
        self.triggers.get_mut(&id).map(|mut t| t.status = TriggerStatus::Paused).is_some()
    }

    /// Re-enable a paused trigger.
    pub fn resume_trigger(&self, id: Uuid) -> bool {
        self.triggers.get_mut(&id).map(|mut t| t.status = TriggerStatus::Active).is_some()
    }

    /// Evaluate every registered trigger against an incoming event,
    /// firing (in registration order) and invalidating matched keys for
    /// each trigger that matches.
    pub async fn trigger_event_invalidation(&self, event_type: &str, event_data: &HashMap<String, Value>) -> NeoCacheResult<usize> {
        let mut matched_ids: Vec<Uuid> = self
            .triggers
            .iter()
            .filter(|t| t.matches(event_type, event_data))
            .map(|t| *t.key())
            .collect();
        matched_ids.sort();
        let mut total = 0;
        for id in matched_ids {
            let Some((pattern, namespace)) = self.triggers.get(&id).map(|t| (t.pattern.clone(), t.namespace.clone())) else {
                continue;
            };
            let removed = self.invalidate_pattern(&pattern, namespace.as_deref()).await.unwrap_or(0);
            total += removed;
            if let Some(mut t) = self.triggers.get_mut(&id) {
                t.record_fire();
            }
            self.stats.lock().events_triggered += 1;
        }
        Ok(total)
    }

    /// Snapshot current statistics.
    pub fn stats(&self) -> InvalidationStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NamespacePolicy;
    use crate::model::Entry;
    use crate::model::Namespace;
    use crate::repository::MemoryRepository;
    use crate::value_objects::{Priority, SizeBytes};

    fn repo() -> Arc<dyn CacheRepository<String>> {
        Arc::new(MemoryRepository::new(NamespacePolicy::default(), None))
    }

    async fn seed(repo: &Arc<dyn CacheRepository<String>>, namespace: &str, key: &str) {
        let ns = Namespace::new(namespace, None).unwrap();
        let entry = Entry::new(Key::new(key).unwrap(), "v".to_string(), None, Priority::Medium, ns, SizeBytes::new(1).unwrap());
        repo.set(entry).await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_key_removes_entry() {
        let repo = repo();
        seed(&repo, "users", "1").await;
        let inv = Invalidator::new(repo.clone(), InvalidationConfig::default());
        assert!(inv.invalidate_key("users", &Key::new("1").unwrap()).await.unwrap());
        assert_eq!(repo.get("users", &Key::new("1").unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn dry_run_mode_counts_without_deleting() {
        let repo = repo();
        seed(&repo, "users", "1").await;
        let mut cfg = InvalidationConfig::default();
        cfg.enable_dry_run_mode = true;
        let inv = Invalidator::new(repo.clone(), cfg);
        assert!(inv.invalidate_key("users", &Key::new("1").unwrap()).await.unwrap());
        assert!(repo.get("users", &Key::new("1").unwrap()).await.unwrap().is_some());
        assert_eq!(inv.stats().dry_run_skips, 1);
    }

    #[tokio::test]
    async fn invalidate_with_dependencies_cascades() {
        let repo = repo();
        seed(&repo, "users", "1").await;
        seed(&repo, "users", "1:sessions").await;
        let inv = Invalidator::new(repo.clone(), InvalidationConfig::default());
        inv.add_dependency("users:1", "users:1:sessions");
        let removed = inv.invalidate_with_dependencies("users", &Key::new("1").unwrap()).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.get("users", &Key::new("1:sessions").unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn event_trigger_fires_and_invalidates() {
        let repo = repo();
        seed(&repo, "users", "1:profile").await;
        let inv = Invalidator::new(repo.clone(), InvalidationConfig::default());
        let pattern = InvalidationPattern::prefix("1:", true).unwrap();
        let mut conditions = HashMap::new();
        conditions.insert("user_id".to_string(), Condition::Equals(Value::String("1".to_string())));
        inv.register_event_trigger("user.updated", pattern, Some("users".to_string()), conditions);
        let mut event = HashMap::new();
        event.insert("user_id".to_string(), Value::String("1".to_string()));
        let removed = inv.trigger_event_invalidation("user.updated", &event).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn force_execute_schedule_runs_immediately() {
        let repo = repo();
        seed(&repo, "users", "1").await;
        let inv = Invalidator::new(repo.clone(), InvalidationConfig::default());
        let id = inv.schedule_invalidation("users", Key::new("1").unwrap(), ChronoDuration::hours(1), "ttl sweep", false, None);
        assert!(inv.force_execute_schedule(id).await.unwrap());
        assert_eq!(repo.get("users", &Key::new("1").unwrap()).await.unwrap(), None);
        assert!(inv.list_scheduled().is_empty());
    }
}
