//! Token validation cache: wraps an external identity provider behind a
//! strategy-driven validator with its own cache tier, mirroring the
//! original Keycloak token manager's control flow (revocation check
//! first, adaptive local-vs-introspection selection by token age, refresh
//! coalescing, and per-realm validation metrics) in the teacher's
//! trait-and-cache idiom rather than a line-by-line port.

pub mod local;
pub mod provider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::config::TokenConfig;
use crate::error::{NeoCacheError, NeoCacheResult};
use crate::model::{Entry, Namespace};
use crate::repository::CacheRepository;
use crate::value_objects::{Key, Priority, SizeBytes, Ttl};

pub use provider::{IdentityProviderClient, IntrospectionResult, RefreshResult};

const VALIDATION_NAMESPACE: &str = "token_validation";
const REVOCATION_NAMESPACE: &str = "token_revocation";
const JWKS_NAMESPACE: &str = "token_jwks";
const LOCK_NAMESPACE: &str = "token_locks";
const REFRESH_LOCK_TTL_SECONDS: i64 = 60;
const ADAPTIVE_LOCAL_MAX_AGE_SECONDS: i64 = 300;
const MAX_CONCURRENT_BATCH_VALIDATIONS: usize = 10;

/// How a token's authenticity should be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStrategy {
    /// Verify the JWT signature and standard claims locally; never calls
    /// the provider. Fastest, but blind to provider-side revocation that
    /// hasn't propagated into the cached revocation record.
    Local,
    /// Always ask the provider via token introspection.
    Introspection,
    /// Validate locally first; on failure, fall back to introspection. On
    /// a non-critical local success a background introspection call is
    /// fired to catch provider-side revocation without blocking the
    /// caller.
    Dual,
    /// Pick `Local` for young tokens and `Dual` for older ones.
    Adaptive,
    /// Introspection result path, explicitly always read through cache.
    CachedIntrospection,
}

impl ValidationStrategy {
    fn as_str(self) -> &'static str {
        match self {
            ValidationStrategy::Local => "local",
            ValidationStrategy::Introspection => "introspection",
            ValidationStrategy::Dual => "dual",
            ValidationStrategy::Adaptive => "adaptive",
            ValidationStrategy::CachedIntrospection => "cached_introspection",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RealmDayStats {
    total: u64,
    cache_hits: u64,
    local: u64,
    introspection: u64,
    dual: u64,
    errors: u64,
}

#[derive(Debug, Default)]
struct ValidationStatsInner {
    by_realm_day: HashMap<(String, String), RealmDayStats>,
}

/// Snapshot of accumulated validation counters.
#[derive(Debug, Clone, Default)]
pub struct ValidationStatistics {
    /// Total validation attempts across every realm and day.
    pub total_validations: u64,
    /// Of those, how many were served from the validation cache.
    pub cache_hits: u64,
    /// How many were resolved via local signature verification.
    pub local_validations: u64,
    /// How many reached the provider's introspection endpoint.
    pub introspection_validations: u64,
    /// How many used the dual (local then introspection) path.
    pub dual_validations: u64,
    /// How many attempts ended in an error.
    pub errors: u64,
    /// Per `(realm, date)` breakdown, keyed `"{realm}:{YYYY-MM-DD}"`.
    pub by_realm_day: HashMap<String, ValidationStatistics>,
}

/// Validates and caches tokens issued by an external identity provider.
pub struct TokenValidator {
    cache: Arc<dyn CacheRepository<Value>>,
    provider: Arc<dyn IdentityProviderClient>,
    config: TokenConfig,
    user_token_hashes: DashMap<String, DashSet<String>>,
    stats: SyncMutex<ValidationStatsInner>,
}

fn token_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn cache_key(parts: &[&str]) -> NeoCacheResult<Key> {
    Key::from_parts(parts)
}

fn namespace(name: &str) -> NeoCacheResult<Namespace> {
    Namespace::new(name, None)
}

impl TokenValidator {
    /// Construct a validator over `cache` (the validation/revocation
    /// cache tier) and `provider` (the identity provider client).
    pub fn new(cache: Arc<dyn CacheRepository<Value>>, provider: Arc<dyn IdentityProviderClient>, config: TokenConfig) -> Self {
        Self {
            cache,
            provider,
            config,
            user_token_hashes: DashMap::new(),
            stats: SyncMutex::new(ValidationStatsInner::default()),
        }
    }

    fn record(&self, realm: &str, cache_hit: bool, method: &str, error: bool) {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let mut stats = self.stats.lock();
        let entry = stats.by_realm_day.entry((realm.to_string(), day)).or_default();
        entry.total += 1;
        if cache_hit {
            entry.cache_hits += 1;
        }
        match method {
            "local" => entry.local += 1,
            "introspection" => entry.introspection += 1,
            "dual" => entry.dual += 1,
            _ => {}
        }
        if error {
            entry.errors += 1;
        }
    }

    /// Current aggregate and per-realm-per-day validation counters.
    pub fn get_validation_statistics(&self) -> ValidationStatistics {
        let stats = self.stats.lock();
        let mut out = ValidationStatistics::default();
        for ((realm, day), day_stats) in stats.by_realm_day.iter() {
            out.total_validations += day_stats.total;
            out.cache_hits += day_stats.cache_hits;
            out.local_validations += day_stats.local;
            out.introspection_validations += day_stats.introspection;
            out.dual_validations += day_stats.dual;
            out.errors += day_stats.errors;
            let mut per = ValidationStatistics::default();
            per.total_validations = day_stats.total;
            per.cache_hits = day_stats.cache_hits;
            per.local_validations = day_stats.local;
            per.introspection_validations = day_stats.introspection;
            per.dual_validations = day_stats.dual;
            per.errors = day_stats.errors;
            out.by_realm_day.insert(format!("{realm}:{day}"), per);
        }
        out
    }

    fn realm_or_default<'a>(&'a self, realm: Option<&'a str>) -> &'a str {
        realm.unwrap_or(&self.config.keycloak_admin_realm)
    }

    /// Lightweight liveness probe: whether the validation cache is
    /// reachable. Used by the health checker rather than the provider,
    /// since a provider outage shouldn't itself mark the validator
    /// unhealthy as long as cached/local validation keeps working.
    pub async fn ping(&self) -> NeoCacheResult<bool> {
        self.cache.ping().await
    }

    async fn cached_validation(&self, key: &Key) -> NeoCacheResult<Option<Value>> {
        self.cache.get(VALIDATION_NAMESPACE, key).await
    }

    async fn store_validation(&self, key: Key, claims: Value, ttl_seconds: i64) -> NeoCacheResult<()> {
        let ns = namespace(VALIDATION_NAMESPACE)?;
        let ttl = Ttl::new(ttl_seconds.max(0))?;
        let size = SizeBytes::new(claims.to_string().len() as u64)?;
        let entry = Entry::new(key, claims, Some(ttl), Priority::Medium, ns, size);
        self.cache.set(entry).await?;
        Ok(())
    }

    /// Whether `token` currently carries a live revocation record.
    pub async fn is_token_revoked(&self, token: &str) -> NeoCacheResult<bool> {
        let hash = token_hash(token);
        let key = cache_key(&["revoked", &hash])?;
        self.cache.exists(REVOCATION_NAMESPACE, &key).await
    }

    /// Record `token` as revoked, clamping the revocation record's TTL to
    /// the token's remaining lifetime so it never outlives the token it
    /// guards against. Optionally ends the provider-side session too.
    pub async fn revoke_token(&self, token: &str, realm: Option<&str>, logout_from_provider: bool, refresh_token: Option<&str>) -> NeoCacheResult<Value> {
        let realm = self.realm_or_default(realm).to_string();
        let hash = token_hash(token);
        let claims = local::unverified_claims(token).unwrap_or_else(|_| json!({}));
        let remaining = claims
            .get("exp")
            .and_then(Value::as_i64)
            .map(|exp| (exp - Utc::now().timestamp()).max(0))
            .unwrap_or(0);

        if remaining > 0 {
            let key = cache_key(&["revoked", &hash])?;
            let ns = namespace(REVOCATION_NAMESPACE)?;
            let ttl = Ttl::new(remaining)?;
            let entry = Entry::new(key, json!({"revoked_at": Utc::now(), "realm": realm}), Some(ttl), Priority::High, ns, SizeBytes::new(64)?);
            self.cache.set(entry).await?;
        }

        // Drop any cached validation result so a subsequent lookup can't
        // serve a now-revoked verdict from the validation cache.
        if let Some(sub) = claims.get("sub").and_then(Value::as_str) {
            let hashes: Option<Vec<String>> = self.user_token_hashes.get(sub).map(|set| set.iter().map(|h| h.clone()).collect());
            if let Some(hashes) = hashes {
                for h in hashes {
                    if let Ok(vkey) = cache_key(&["tokenval", &realm, &h]) {
                        let _ = self.cache.delete(VALIDATION_NAMESPACE, &vkey).await;
                    }
                }
            }
        }

        if logout_from_provider {
            if let Some(refresh) = refresh_token {
                self.provider
                    .logout(refresh, &realm)
                    .await
                    .map_err(|e| NeoCacheError::TokenRevocationFailed(e.to_string()))?;
            }
        }

        Ok(json!({"revoked": true, "token_hash": hash, "realm": realm}))
    }

    /// Invalidate every cached validation result previously recorded for
    /// `user_id`; returns how many were removed.
    pub async fn clear_user_tokens(&self, user_id: &str, realm: Option<&str>) -> NeoCacheResult<usize> {
        let realm = self.realm_or_default(realm).to_string();
        let Some((_, hashes)) = self.user_token_hashes.remove(user_id) else {
            return Ok(0);
        };
        let hashes: Vec<String> = hashes.into_iter().collect();
        let mut count = 0;
        for hash in hashes {
            let key = cache_key(&["tokenval", &realm, &hash])?;
            if self.cache.delete(VALIDATION_NAMESPACE, &key).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn remember_for_user(&self, sub: Option<&str>, hash: &str) {
        if let Some(sub) = sub {
            self.user_token_hashes.entry(sub.to_string()).or_insert_with(DashSet::new).insert(hash.to_string());
        }
    }

    async fn jwks_for(&self, realm: &str) -> NeoCacheResult<String> {
        let key = cache_key(&["jwks", realm])?;
        if let Some(Value::String(pem)) = self.cache.get(JWKS_NAMESPACE, &key).await? {
            return Ok(pem);
        }
        let pem = self.provider.jwks(realm).await?;
        let ns = namespace(JWKS_NAMESPACE)?;
        let ttl = Ttl::new(self.config.public_key_cache_ttl as i64)?;
        let size = SizeBytes::new(pem.len() as u64)?;
        let entry = Entry::new(key, Value::String(pem.clone()), Some(ttl), Priority::High, ns, size);
        self.cache.set(entry).await?;
        Ok(pem)
    }

    async fn validate_local(&self, token: &str, realm: &str) -> NeoCacheResult<Value> {
        let pem = self.jwks_for(realm).await?;
        let options = local::LocalValidationOptions {
            algorithm: &self.config.jwt_algorithm,
            key_material: &pem,
            verify_audience: self.config.jwt_verify_audience,
            audience: self.config.jwt_audience.as_deref(),
            verify_issuer: self.config.jwt_verify_issuer,
            issuer: self.config.jwt_issuer.as_deref(),
        };
        let result = local::validate(token, &options)?;
        if let Some(relaxed) = result.relaxed {
            tracing::warn!(realm, relaxed, "accepted token with relaxed claim checks");
        }
        Ok(result.claims)
    }

    async fn validate_introspection(&self, token: &str, realm: &str) -> NeoCacheResult<Value> {
        let result = self.provider.introspect(token, realm).await?;
        if !result.active {
            return Err(NeoCacheError::UnauthorizedToken("token inactive per introspection".to_string()));
        }
        Ok(result.claims)
    }

    /// Validate `token`, selecting a verification path per `strategy`
    /// (or per token age, when `strategy` is [`ValidationStrategy::Adaptive`]).
    /// `critical` forces introspection regardless of the requested
    /// strategy, since a security-sensitive call cannot rely on a cached
    /// or local-only verdict. Returns the (possibly cached) claim map
    /// with validation metadata merged under `_validation`.
    pub async fn validate_token(
        &self,
        token: &str,
        realm: Option<&str>,
        critical: bool,
        strategy: ValidationStrategy,
        cache_result: bool,
        include_metrics: bool,
    ) -> NeoCacheResult<Value> {
        let started = Instant::now();
        let realm = self.realm_or_default(realm).to_string();
        let hash = token_hash(token);

        let revocation_key = cache_key(&["revoked", &hash])?;
        if self.cache.exists(REVOCATION_NAMESPACE, &revocation_key).await? {
            self.record(&realm, false, "revoked", true);
            return Err(NeoCacheError::UnauthorizedToken("token has been revoked".to_string()));
        }

        let unverified = local::unverified_claims(token).unwrap_or_else(|_| json!({}));
        let token_age = unverified
            .get("iat")
            .and_then(Value::as_i64)
            .map(|iat| (Utc::now().timestamp() - iat).max(0))
            .unwrap_or(i64::MAX);

        let resolved = if critical {
            ValidationStrategy::Introspection
        } else if strategy == ValidationStrategy::Adaptive {
            if token_age < ADAPTIVE_LOCAL_MAX_AGE_SECONDS {
                ValidationStrategy::Local
            } else {
                ValidationStrategy::Dual
            }
        } else {
            strategy
        };

        let validation_key = cache_key(&["tokenval", &realm, &hash])?;

        if resolved != ValidationStrategy::Local {
            if let Some(mut cached) = self.cached_validation(&validation_key).await? {
                self.record(&realm, true, resolved.as_str(), false);
                attach_metadata(&mut cached, &realm, strategy, resolved, "cache", &hash, critical, started, include_metrics);
                return Ok(cached);
            }
        }

        let (mut claims, method) = match resolved {
            ValidationStrategy::Local => (self.validate_local(token, &realm).await?, "local"),
            ValidationStrategy::Introspection | ValidationStrategy::CachedIntrospection => {
                (self.validate_introspection(token, &realm).await?, "introspection")
            }
            ValidationStrategy::Dual => match self.validate_local(token, &realm).await {
                Ok(claims) => {
                    if !critical {
                        let provider = Arc::clone(&self.provider);
                        let token = token.to_string();
                        let realm_bg = realm.clone();
                        tokio::spawn(async move {
                            if let Ok(result) = provider.introspect(&token, &realm_bg).await {
                                if !result.active {
                                    tracing::warn!(realm = %realm_bg, "background introspection found locally-valid token inactive at provider");
                                }
                            }
                        });
                    }
                    (claims, "dual")
                }
                Err(local_err) => {
                    tracing::warn!(error = %local_err, "local validation failed, falling back to introspection");
                    (self.validate_introspection(token, &realm).await?, "dual")
                }
            },
            ValidationStrategy::Adaptive => unreachable!("resolved above"),
        };

        if resolved != ValidationStrategy::Local && cache_result {
            self.store_validation(validation_key, claims.clone(), self.config.introspection_cache_ttl as i64).await?;
        }
        self.remember_for_user(claims.get("sub").and_then(Value::as_str), &hash);

        self.record(&realm, false, method, false);
        attach_metadata(&mut claims, &realm, strategy, resolved, method, &hash, critical, started, include_metrics);
        Ok(claims)
    }

    async fn try_acquire_refresh_lock(&self, user_id: &str) -> NeoCacheResult<bool> {
        let key = cache_key(&["refresh_lock", user_id])?;
        if self.cache.exists(LOCK_NAMESPACE, &key).await? {
            return Ok(false);
        }
        let ns = namespace(LOCK_NAMESPACE)?;
        let ttl = Ttl::new(REFRESH_LOCK_TTL_SECONDS)?;
        let entry = Entry::new(key, json!(true), Some(ttl), Priority::High, ns, SizeBytes::new(8)?);
        self.cache.set(entry).await?;
        Ok(true)
    }

    async fn release_refresh_lock(&self, user_id: &str) -> NeoCacheResult<()> {
        let key = cache_key(&["refresh_lock", user_id])?;
        self.cache.delete(LOCK_NAMESPACE, &key).await?;
        Ok(())
    }

    /// Refresh `token` when it's within `refresh_threshold` seconds of
    /// expiry (or `force_refresh` is set), coalescing concurrent refresh
    /// attempts for the same `user_id` behind a cache-backed lock so a
    /// burst of requests from one user produces a single provider call.
    /// Returns `None` when no refresh was needed, or another caller was
    /// already refreshing.
    pub async fn refresh_if_needed(
        &self,
        token: &str,
        refresh_token: &str,
        realm: Option<&str>,
        force_refresh: bool,
        user_id: &str,
    ) -> NeoCacheResult<Option<RefreshResult>> {
        let realm = self.realm_or_default(realm).to_string();
        if !force_refresh {
            let claims = local::unverified_claims(token).unwrap_or_else(|_| json!({}));
            let remaining = claims
                .get("exp")
                .and_then(Value::as_i64)
                .map(|exp| exp - Utc::now().timestamp())
                .unwrap_or(i64::MAX);
            if remaining > self.config.refresh_threshold as i64 {
                return Ok(None);
            }
        }

        if !self.try_acquire_refresh_lock(user_id).await? {
            return Ok(None);
        }

        let result = self.provider.refresh(refresh_token, &realm).await;
        // Always release, regardless of outcome, so one failed refresh
        // doesn't wedge every future attempt for this user for 60s... a
        // retry before the lock TTL expires would otherwise be coalesced
        // away with nothing to show for it.
        self.release_refresh_lock(user_id).await?;

        match result {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(e) => Err(NeoCacheError::TokenRefreshFailed(e.to_string())),
        }
    }

    /// Validate many tokens concurrently, bounded to a fixed number of
    /// in-flight provider calls so a large batch can't overrun the
    /// identity provider.
    pub async fn batch_validate_tokens(&self, tokens: Vec<String>, realm: Option<&str>, strategy: ValidationStrategy) -> HashMap<String, NeoCacheResult<Value>> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_BATCH_VALIDATIONS));
        let realm = realm.map(|r| r.to_string());
        let tasks = tokens.into_iter().map(|token| {
            let semaphore = Arc::clone(&semaphore);
            let realm = realm.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                let result = self.validate_token(&token, realm.as_deref(), false, strategy, true, false).await;
                (token, result)
            }
        });
        futures::future::join_all(tasks).await.into_iter().collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn attach_metadata(
    claims: &mut Value,
    realm: &str,
    requested: ValidationStrategy,
    used: ValidationStrategy,
    method: &str,
    token_hash: &str,
    critical: bool,
    started: Instant,
    include_metrics: bool,
) {
    let mut meta = json!({
        "validated_at": Utc::now(),
        "strategy_requested": requested.as_str(),
        "strategy_used": used.as_str(),
        "method": method,
        "realm": realm,
        "token_hash": token_hash,
        "critical": critical,
    });
    if include_metrics {
        meta["duration_ms"] = json!(started.elapsed().as_secs_f64() * 1000.0);
    }
    if let Value::Object(map) = claims {
        map.insert("_validation".to_string(), meta);
    }
}
