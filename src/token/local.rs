//! Local (signature-only) JWT validation.
//!
//! Grounded in `enterprise::auth::jwt::JwtManager`'s use of `jsonwebtoken`,
//! trimmed to verification only (no issuance) and extended with the
//! audience/issuer relaxation-retry the Python token manager performs:
//! a mismatch on either check is retried exactly once with that specific
//! check disabled, so a provider whose key is valid but whose `aud`/`iss`
//! configuration drifted from ours still yields a usable claim set.

use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

use crate::error::{NeoCacheError, NeoCacheResult};

/// Split a JWT without verifying it and return its claim map.
///
/// Used only to read unverified fields (token age, `sub`) needed to pick
/// a validation strategy before any signature check has happened.
pub fn unverified_claims(token: &str) -> NeoCacheResult<Value> {
    let mut parts = token.split('.');
    let (_header, payload) = match (parts.next(), parts.next()) {
        (Some(h), Some(p)) => (h, p),
        _ => return Err(NeoCacheError::UnauthorizedToken("malformed token".to_string())),
    };
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| NeoCacheError::UnauthorizedToken(format!("malformed token payload: {e}")))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| NeoCacheError::UnauthorizedToken(format!("malformed token claims: {e}")))
}

fn algorithm_from_name(name: &str) -> NeoCacheResult<Algorithm> {
    match name {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "EdDSA" => Ok(Algorithm::EdDSA),
        other => Err(NeoCacheError::UnauthorizedToken(format!("unsupported algorithm {other}"))),
    }
}

fn decoding_key_for(algorithm: Algorithm, key_material: &str) -> NeoCacheResult<DecodingKey> {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(DecodingKey::from_secret(key_material.as_bytes())),
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => {
            DecodingKey::from_rsa_pem(key_material.as_bytes())
                .map_err(|e| NeoCacheError::UnauthorizedToken(format!("invalid RSA public key: {e}")))
        }
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key_material.as_bytes())
            .map_err(|e| NeoCacheError::UnauthorizedToken(format!("invalid EC public key: {e}"))),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(key_material.as_bytes())
            .map_err(|e| NeoCacheError::UnauthorizedToken(format!("invalid Ed25519 public key: {e}"))),
    }
}

/// Options controlling a single local validation attempt.
pub struct LocalValidationOptions<'a> {
    /// Signing algorithm name, e.g. `"RS256"`.
    pub algorithm: &'a str,
    /// Verification key material: PEM for asymmetric algorithms, shared
    /// secret bytes (as a string) for `HS*`.
    pub key_material: &'a str,
    /// Whether to enforce the `aud` claim.
    pub verify_audience: bool,
    /// Expected audience, required when `verify_audience` is set.
    pub audience: Option<&'a str>,
    /// Whether to enforce the `iss` claim.
    pub verify_issuer: bool,
    /// Expected issuer, required when `verify_issuer` is set.
    pub issuer: Option<&'a str>,
}

/// Outcome of a successful local validation.
pub struct LocalValidation {
    /// Decoded and verified claim map.
    pub claims: Value,
    /// Set when signature/expiry checked out but `aud` or `iss` had to be
    /// relaxed to accept the token.
    pub relaxed: Option<&'static str>,
}

/// Verify `token`'s signature and standard claims, retrying once with a
/// relaxed `aud`/`iss` check on a claim mismatch.
pub fn validate(token: &str, options: &LocalValidationOptions<'_>) -> NeoCacheResult<LocalValidation> {
    let algorithm = algorithm_from_name(options.algorithm)?;
    let key = decoding_key_for(algorithm, options.key_material)?;

    let (claims, relaxed) = match try_validate(token, &key, algorithm, options.verify_audience, options.audience, options.verify_issuer, options.issuer) {
        Ok(claims) => (claims, None),
        Err(first_err) => {
            if options.verify_audience && is_claim_mismatch(&first_err) {
                match try_validate(token, &key, algorithm, false, None, options.verify_issuer, options.issuer) {
                    Ok(claims) => {
                        tracing::warn!("relaxing audience check after mismatch to accept token");
                        (claims, Some("audience"))
                    }
                    Err(_) if options.verify_issuer => {
                        let claims = try_validate(token, &key, algorithm, false, None, false, None)
                            .map_err(|e| NeoCacheError::UnauthorizedToken(e.to_string()))?;
                        tracing::warn!("relaxing audience and issuer checks after mismatch to accept token");
                        (claims, Some("audience+issuer"))
                    }
                    Err(e) => return Err(NeoCacheError::UnauthorizedToken(e.to_string())),
                }
            } else if options.verify_issuer && is_claim_mismatch(&first_err) {
                let claims = try_validate(token, &key, algorithm, options.verify_audience, options.audience, false, None)
                    .map_err(|e| NeoCacheError::UnauthorizedToken(e.to_string()))?;
                tracing::warn!("relaxing issuer check after mismatch to accept token");
                (claims, Some("issuer"))
            } else {
                return Err(NeoCacheError::UnauthorizedToken(first_err.to_string()));
            }
        }
    };

    Ok(LocalValidation { claims, relaxed })
}

fn is_claim_mismatch(err: &jsonwebtoken::errors::Error) -> bool {
    matches!(
        err.kind(),
        jsonwebtoken::errors::ErrorKind::InvalidAudience | jsonwebtoken::errors::ErrorKind::InvalidIssuer
    )
}

fn try_validate(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    verify_audience: bool,
    audience: Option<&str>,
    verify_issuer: bool,
    issuer: Option<&str>,
) -> Result<Value, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    if verify_audience {
        if let Some(aud) = audience {
            validation.set_audience(&[aud]);
        }
    } else {
        validation.validate_aud = false;
    }
    if verify_issuer {
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
    }
    let data = decode::<Value>(token, key, &validation)?;
    Ok(data.claims)
}
