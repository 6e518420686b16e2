//! Identity-provider collaborator abstraction.
//!
//! Grounded in `enterprise::auth::provider::AuthProvider`'s trait-based
//! dependency injection shape, adapted to the four async operations spec
//! §9 names for this collaborator and renamed from the original source's
//! `get_realm_public_key` to `jwks` to match.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NeoCacheResult;

/// Result of a server-side token introspection round-trip.
#[derive(Debug, Clone)]
pub struct IntrospectionResult {
    /// Whether the provider still considers the token active.
    pub active: bool,
    /// Raw claim map returned by the provider.
    pub claims: Value,
}

/// A freshly issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    /// New access token.
    pub access_token: String,
    /// New refresh token.
    pub refresh_token: String,
}

/// Client for the external identity provider backing [`TokenValidator`](crate::token::TokenValidator).
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Ask the provider whether `token` is currently active.
    async fn introspect(&self, token: &str, realm: &str) -> NeoCacheResult<IntrospectionResult>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str, realm: &str) -> NeoCacheResult<RefreshResult>;

    /// Fetch the realm's current signing public key, PEM-encoded.
    async fn jwks(&self, realm: &str) -> NeoCacheResult<String>;

    /// End the session associated with `refresh_token` on the provider side.
    async fn logout(&self, refresh_token: &str, realm: &str) -> NeoCacheResult<()>;
}
