//! Component health probing and aggregation (spec §4.7).
//!
//! Each attached component is probed concurrently with a per-probe
//! timeout, the same `join_all` + `tokio::time::timeout` shape the
//! teacher uses for its cluster failover health loop, generalized from a
//! single fixed component list to an arbitrary registry of probes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::distribution::Distributor;
use crate::repository::CacheRepository;
use crate::serializer::CacheSerializer;
use crate::token::TokenValidator;
use crate::value_objects::Key;

/// A reserved key the repository probe reads when `ping` isn't
/// conclusive, so the probe still exercises a real read path.
const SYNTHETIC_PROBE_NAMESPACE: &str = "__health__";
const SYNTHETIC_PROBE_KEY: &str = "probe";

/// Outcome state of a single component probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    /// Fully functional.
    Healthy,
    /// Functional but impaired (e.g. a fallback path was used).
    Degraded,
    /// Not functional.
    Unhealthy,
    /// Did not respond within the probe timeout.
    Unknown,
}

/// Result of probing one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Probe/component name.
    pub name: String,
    /// Outcome state.
    pub state: HealthState,
    /// Optional human-readable detail.
    pub message: Option<String>,
    /// Probe duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Aggregate health across every probed component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall state, derived from `components` by the aggregation rule:
    /// any `Unhealthy` wins, else any `Degraded` wins, else `Healthy`.
    pub overall: HealthState,
    /// Per-component results, in registration order.
    pub components: Vec<ComponentHealth>,
    /// When this report was produced.
    pub checked_at: DateTime<Utc>,
    /// Seconds since the checker was constructed.
    pub uptime_seconds: u64,
}

/// One probeable component.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Stable probe name, used as the component's label in reports.
    fn name(&self) -> &str;

    /// Run the probe and report its outcome; probes should never panic
    /// on a failing dependency, only return `Unhealthy`/`Degraded` with a
    /// `message` describing why.
    async fn check(&self) -> (HealthState, Option<String>);
}

/// Probes a [`CacheRepository`] via `ping`, falling back to a synthetic
/// key read when `ping` itself errors or returns `false`.
pub struct RepositoryProbe<V> {
    name: String,
    repository: Arc<dyn CacheRepository<V>>,
}

impl<V> RepositoryProbe<V> {
    /// Wrap `repository` as a named probe.
    pub fn new(name: impl Into<String>, repository: Arc<dyn CacheRepository<V>>) -> Self {
        Self { name: name.into(), repository }
    }
}

#[async_trait]
impl<V: Clone + Send + Sync> HealthProbe for RepositoryProbe<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> (HealthState, Option<String>) {
        match self.repository.ping().await {
            Ok(true) => (HealthState::Healthy, None),
            Ok(false) | Err(_) => {
                let Ok(key) = Key::new(SYNTHETIC_PROBE_KEY) else {
                    return (HealthState::Unhealthy, Some("synthetic probe key is invalid".to_string()));
                };
                match self.repository.get(SYNTHETIC_PROBE_NAMESPACE, &key).await {
                    Ok(_) => (HealthState::Degraded, Some("ping unavailable; synthetic read succeeded".to_string())),
                    Err(e) => (HealthState::Unhealthy, Some(e.to_string())),
                }
            }
        }
    }
}

/// Probes a [`CacheSerializer`] by round-tripping a fixed payload.
pub struct SerializerProbe {
    name: String,
    serializer: Arc<dyn CacheSerializer<serde_json::Value>>,
}

impl SerializerProbe {
    /// Wrap `serializer` as a named probe.
    pub fn new(name: impl Into<String>, serializer: Arc<dyn CacheSerializer<serde_json::Value>>) -> Self {
        Self { name: name.into(), serializer }
    }
}

#[async_trait]
impl HealthProbe for SerializerProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> (HealthState, Option<String>) {
        let probe_value = json!({"health_check": true});
        match self.serializer.serialize(&probe_value, usize::MAX) {
            Ok(bytes) => match self.serializer.deserialize(&bytes) {
                Ok(roundtripped) if roundtripped == probe_value => (HealthState::Healthy, None),
                Ok(_) => (HealthState::Degraded, Some("round-trip produced a different value".to_string())),
                Err(e) => (HealthState::Unhealthy, Some(format!("deserialize failed: {e}"))),
            },
            Err(e) => (HealthState::Unhealthy, Some(format!("serialize failed: {e}"))),
        }
    }
}

/// Probes a [`Distributor`] via its consistency check.
pub struct DistributorProbe {
    name: String,
    distributor: Arc<Distributor>,
}

impl DistributorProbe {
    /// Wrap `distributor` as a named probe.
    pub fn new(name: impl Into<String>, distributor: Arc<Distributor>) -> Self {
        Self { name: name.into(), distributor }
    }
}

#[async_trait]
impl HealthProbe for DistributorProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> (HealthState, Option<String>) {
        match self.distributor.check_consistency() {
            Ok(true) => (HealthState::Healthy, None),
            Ok(false) => (HealthState::Degraded, Some("cluster below desired quorum".to_string())),
            Err(e) => (HealthState::Unhealthy, Some(e.to_string())),
        }
    }
}

/// Probes a [`TokenValidator`] via its cache's liveness.
pub struct TokenValidatorProbe {
    name: String,
    validator: Arc<TokenValidator>,
}

impl TokenValidatorProbe {
    /// Wrap `validator` as a named probe.
    pub fn new(name: impl Into<String>, validator: Arc<TokenValidator>) -> Self {
        Self { name: name.into(), validator }
    }
}

#[async_trait]
impl HealthProbe for TokenValidatorProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> (HealthState, Option<String>) {
        match self.validator.ping().await {
            Ok(true) => (HealthState::Healthy, None),
            Ok(false) => (HealthState::Degraded, Some("validation cache unreachable".to_string())),
            Err(e) => (HealthState::Unhealthy, Some(e.to_string())),
        }
    }
}

/// Concurrently probes a registry of components and aggregates the
/// result into a single [`HealthReport`].
pub struct HealthChecker {
    probes: Vec<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
    started_at: Instant,
    last_result: RwLock<Option<HealthReport>>,
}

impl HealthChecker {
    /// Construct a checker over `probes`, each allotted `probe_timeout`.
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, probe_timeout: Duration) -> Self {
        Self {
            probes,
            probe_timeout,
            started_at: Instant::now(),
            last_result: RwLock::new(None),
        }
    }

    /// Seconds elapsed since construction.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Most recently computed report, if `check` has run at least once.
    pub fn last_result(&self) -> Option<HealthReport> {
        self.last_result.read().clone()
    }

    /// Run every probe concurrently and return the aggregated report,
    /// also caching it for [`Self::last_result`].
    pub async fn check(&self) -> HealthReport {
        let timeout = self.probe_timeout;
        let checks = self.probes.iter().map(|probe| {
            let probe = Arc::clone(probe);
            async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(timeout, probe.check()).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let (state, message) = match outcome {
                    Ok((state, message)) => (state, message),
                    Err(_) => (HealthState::Unknown, Some(format!("probe exceeded {}ms timeout", timeout.as_millis()))),
                };
                ComponentHealth {
                    name: probe.name().to_string(),
                    state,
                    message,
                    elapsed_ms,
                }
            }
        });

        let components: Vec<ComponentHealth> = futures::future::join_all(checks).await;
        let overall = if components.iter().any(|c| c.state == HealthState::Unhealthy) {
            HealthState::Unhealthy
        } else if components.iter().any(|c| c.state == HealthState::Degraded || c.state == HealthState::Unknown) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        let report = HealthReport {
            overall,
            components,
            checked_at: Utc::now(),
            uptime_seconds: self.uptime_seconds(),
        };
        *self.last_result.write() = Some(report.clone());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthProbe for AlwaysHealthy {
        fn name(&self) -> &str {
            "always_healthy"
        }

        async fn check(&self) -> (HealthState, Option<String>) {
            (HealthState::Healthy, None)
        }
    }

    struct AlwaysUnhealthy;

    #[async_trait]
    impl HealthProbe for AlwaysUnhealthy {
        fn name(&self) -> &str {
            "always_unhealthy"
        }

        async fn check(&self) -> (HealthState, Option<String>) {
            (HealthState::Unhealthy, Some("simulated failure".to_string()))
        }
    }

    struct NeverResponds;

    #[async_trait]
    impl HealthProbe for NeverResponds {
        fn name(&self) -> &str {
            "never_responds"
        }

        async fn check(&self) -> (HealthState, Option<String>) {
            tokio::time::sleep(Duration::from_secs(10)).await;
            (HealthState::Healthy, None)
        }
    }

    #[tokio::test]
    async fn all_healthy_aggregates_to_healthy() {
        let checker = HealthChecker::new(vec![Arc::new(AlwaysHealthy), Arc::new(AlwaysHealthy)], Duration::from_millis(50));
        let report = checker.check().await;
        assert_eq!(report.overall, HealthState::Healthy);
        assert_eq!(report.components.len(), 2);
    }

    #[tokio::test]
    async fn any_unhealthy_wins_aggregation() {
        let checker = HealthChecker::new(vec![Arc::new(AlwaysHealthy), Arc::new(AlwaysUnhealthy)], Duration::from_millis(50));
        let report = checker.check().await;
        assert_eq!(report.overall, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn timeout_degrades_overall_via_unknown() {
        let checker = HealthChecker::new(vec![Arc::new(AlwaysHealthy), Arc::new(NeverResponds)], Duration::from_millis(20));
        let report = checker.check().await;
        assert_eq!(report.overall, HealthState::Degraded);
        let unknown = report.components.iter().find(|c| c.name == "never_responds").unwrap();
        assert_eq!(unknown.state, HealthState::Unknown);
    }

    #[tokio::test]
    async fn last_result_is_cached_after_check() {
        let checker = HealthChecker::new(vec![Arc::new(AlwaysHealthy)], Duration::from_millis(50));
        assert!(checker.last_result().is_none());
        checker.check().await;
        assert!(checker.last_result().is_some());
    }
}
