//! End-to-end scenarios exercising the cache manager, invalidator, and
//! distributor together through their public APIs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use neocache::config::{DistributionConfig, InvalidationConfig, TokenConfig};
use neocache::distribution::{DistributionEventKind, Distributor, InMemoryTransport, LatestTimestampResolver};
use neocache::invalidation::Invalidator;
use neocache::manager::CacheManagerBuilder;
use neocache::model::Namespace;
use neocache::repository::{CacheRepository, MemoryRepository};
use neocache::serializer::formats::JsonFormat;
use neocache::token::provider::{IdentityProviderClient, IntrospectionResult, RefreshResult};
use neocache::token::TokenValidator;
use neocache::{InvalidationPattern, Key, Priority, Ttl};
use serde_json::{json, Value};

fn memory_repository() -> Arc<dyn CacheRepository<Value>> {
    Arc::new(MemoryRepository::new(Default::default(), None))
}

/// Identity provider stub that counts `refresh` calls and answers every
/// other call with a fixed, inactive-free response.
struct CountingProvider {
    refresh_calls: AtomicUsize,
}

#[async_trait]
impl IdentityProviderClient for CountingProvider {
    async fn introspect(&self, _token: &str, _realm: &str) -> neocache::NeoCacheResult<IntrospectionResult> {
        Ok(IntrospectionResult { active: true, claims: json!({"sub": "u1"}) })
    }

    async fn refresh(&self, _refresh_token: &str, _realm: &str) -> neocache::NeoCacheResult<RefreshResult> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        Ok(RefreshResult { access_token: "new-access".to_string(), refresh_token: "new-refresh".to_string() })
    }

    async fn jwks(&self, _realm: &str) -> neocache::NeoCacheResult<String> {
        Ok(String::new())
    }

    async fn logout(&self, _refresh_token: &str, _realm: &str) -> neocache::NeoCacheResult<()> {
        Ok(())
    }
}

/// S1 — set/get/expire.
#[tokio::test]
async fn set_get_expire() {
    let repository = memory_repository();
    let manager = CacheManagerBuilder::new()
        .with_repository(Arc::clone(&repository))
        .with_serializer(Box::new(JsonFormat))
        .build()
        .unwrap();

    let key = Key::from_parts(&["user", "42", "profile"]).unwrap();
    let ttl = Ttl::new(2).unwrap();
    assert!(manager.set("users", key.clone(), json!({"name": "Ada"}), Some(ttl), Priority::Medium).await);
    assert_eq!(manager.get("users", &key).await, Some(json!({"name": "Ada"})));

    tokio::time::sleep(StdDuration::from_secs(3)).await;
    assert_eq!(manager.get("users", &key).await, None);
}

/// S2 — wildcard invalidation.
#[tokio::test]
async fn wildcard_invalidation_scopes_to_matching_keys() {
    let repository = memory_repository();
    let invalidator = Invalidator::new(Arc::clone(&repository), InvalidationConfig::default());

    for (suffix, segment) in [("1", "profile"), ("1", "settings"), ("2", "profile")] {
        let key = Key::from_parts(&["user", suffix, segment]).unwrap();
        let ns = Namespace::new("users", None).unwrap();
        let entry = neocache::model::Entry::new(key, json!({}), None, Priority::Medium, ns, neocache::SizeBytes::new(2).unwrap());
        repository.set(entry).await.unwrap();
    }

    let pattern = InvalidationPattern::wildcard("user:1:*", true).unwrap();
    let removed = invalidator.invalidate_pattern(&pattern, Some("users")).await.unwrap();
    assert_eq!(removed, 2);

    let still_there = Key::from_parts(&["user", "2", "profile"]).unwrap();
    assert!(repository.exists("users", &still_there).await.unwrap());
}

/// S3 — dependency cascade.
#[tokio::test]
async fn dependency_cascade_invalidates_every_dependent() {
    let repository = memory_repository();
    let invalidator = Invalidator::new(Arc::clone(&repository), InvalidationConfig::default());

    let ns = Namespace::new("catalog", None).unwrap();
    for name in ["list:items", "item:1", "item:2"] {
        let key = Key::new(name).unwrap();
        let entry = neocache::model::Entry::new(key, json!({}), None, Priority::Medium, ns.clone(), neocache::SizeBytes::new(2).unwrap());
        repository.set(entry).await.unwrap();
    }
    invalidator.add_dependency("list:items", "item:1");
    invalidator.add_dependency("list:items", "item:2");

    let root = Key::new("list:items").unwrap();
    let removed = invalidator.invalidate_with_dependencies("catalog", &root).await.unwrap();
    assert_eq!(removed, 3);

    for name in ["list:items", "item:1", "item:2"] {
        let key = Key::new(name).unwrap();
        assert!(!repository.exists("catalog", &key).await.unwrap());
    }
}

/// S5 — scheduled recurring invalidation.
#[tokio::test]
async fn scheduled_recurring_invalidation_fires_repeatedly() {
    let repository = memory_repository();
    let invalidator = Invalidator::new(Arc::clone(&repository), InvalidationConfig::default());

    let ns = Namespace::new("home", None).unwrap();
    let key = Key::from_parts(&["feed", "home"]).unwrap();
    let entry = neocache::model::Entry::new(key.clone(), json!({}), None, Priority::Medium, ns, neocache::SizeBytes::new(2).unwrap());
    repository.set(entry).await.unwrap();

    invalidator.schedule_invalidation("home", key.clone(), ChronoDuration::milliseconds(50), "recurring feed refresh", true, Some(ChronoDuration::milliseconds(100)));

    let mut fires = 0;
    for _ in 0..6 {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        invalidator.run_scheduler_tick().await;
        if !repository.exists("home", &key).await.unwrap() {
            fires += 1;
            let ns = Namespace::new("home", None).unwrap();
            let entry = neocache::model::Entry::new(key.clone(), json!({}), None, Priority::Medium, ns, neocache::SizeBytes::new(2).unwrap());
            repository.set(entry).await.unwrap();
        }
    }
    assert!(fires >= 2, "expected at least two recurring executions, got {fires}");
}

/// S6 — distribution fan-out.
#[tokio::test]
async fn distribution_fan_out_reaches_every_subscriber() {
    let transport = Arc::new(InMemoryTransport::new(64));
    let config_for = |node_id: &str| DistributionConfig {
        node_id: node_id.to_string(),
        minimum_quorum_size: 1,
        ..Default::default()
    };

    let a = Arc::new(Distributor::new(config_for("a"), "a-addr", vec![], Arc::clone(&transport) as _, Arc::new(LatestTimestampResolver)));
    let b = Arc::new(Distributor::new(config_for("b"), "b-addr", vec![], Arc::clone(&transport) as _, Arc::new(LatestTimestampResolver)));
    let c = Arc::new(Distributor::new(config_for("c"), "c-addr", vec![], Arc::clone(&transport) as _, Arc::new(LatestTimestampResolver)));

    let b_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let c_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    {
        let hits = Arc::clone(&b_hits);
        b.subscribe_to_events(&[DistributionEventKind::CacheInvalidate], None, Arc::new(move |_env| {
            hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));
    }
    {
        let hits = Arc::clone(&c_hits);
        c.subscribe_to_events(&[DistributionEventKind::CacheInvalidate], None, Arc::new(move |_env| {
            hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));
    }

    let b_consumer = Arc::clone(&b).spawn_consumer_loop();
    let c_consumer = Arc::clone(&c).spawn_consumer_loop();
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    a.broadcast_invalidation("user:1:profile", "users").await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    assert_eq!(b_hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(c_hits.load(std::sync::atomic::Ordering::SeqCst), 1);

    b_consumer.abort();
    c_consumer.abort();
}

/// S4 — refresh coalescing: a burst of concurrent refresh attempts for
/// the same user collapses into exactly one provider call.
#[tokio::test]
async fn concurrent_refresh_attempts_coalesce_into_one_provider_call() {
    let cache = memory_repository();
    let provider = Arc::new(CountingProvider { refresh_calls: AtomicUsize::new(0) });
    let validator = Arc::new(TokenValidator::new(Arc::clone(&cache), Arc::clone(&provider) as Arc<dyn IdentityProviderClient>, TokenConfig::default()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let validator = Arc::clone(&validator);
        handles.push(tokio::spawn(async move { validator.refresh_if_needed("expired-access-token", "refresh-token", None, true, "u1").await }));
    }

    let mut refreshed = 0;
    let mut coalesced = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Some(_) => refreshed += 1,
            None => coalesced += 1,
        }
    }

    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(refreshed, 1);
    assert_eq!(coalesced, 9);
}
