//! Signing-key provider — fetches the identity provider's JWKS and holds
//! the current verification key.
//!
//! The provider publishes its key set at a well-known endpoint; the first
//! entry is the active signing key. The fetch runs at startup and on a
//! periodic interval, and is re-triggerable at any time. A failed fetch
//! logs and leaves the previously held key in place; until the first
//! successful fetch, [`KeyProvider::current_key`] returns `None` and every
//! verification attempt must fail closed.
//!
//! Single writer (the refresh task), many readers (callback verification).
//! Readers only ever see a fully formed key or the initial absent state;
//! a refresh swaps the `Arc` atomically behind the lock.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm},
};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{Error, Result};

/// The identity provider's current public verification key.
pub struct SigningKey {
    /// Key id from the JWK, if published
    pub kid: Option<String>,
    /// Signature algorithm the key is used with
    pub algorithm: Algorithm,
    /// Decoding key for signature verification
    pub key: DecodingKey,
}

/// Holds the most recently fetched signing key.
pub struct KeyProvider {
    http: reqwest::Client,
    jwks_url: String,
    current: RwLock<Option<Arc<SigningKey>>>,
}

impl KeyProvider {
    /// Create a provider for the given JWKS endpoint.
    pub fn new(jwks_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build JWKS client: {e}")))?;

        Ok(Self {
            http,
            jwks_url,
            current: RwLock::new(None),
        })
    }

    /// Fetch the key set and replace the held key with its first entry.
    ///
    /// On failure the previously held key (if any) stays in place, so a
    /// provider outage degrades to verification against a possibly stale
    /// key rather than no verification at all.
    pub async fn refresh(&self) -> Result<()> {
        let jwks: JwkSet = match self.fetch().await {
            Ok(jwks) => jwks,
            Err(e) => {
                warn!(url = %self.jwks_url, error = %e, "JWKS fetch failed, keeping current key");
                return Err(e);
            }
        };

        let Some(jwk) = jwks.keys.first() else {
            warn!(url = %self.jwks_url, "JWKS response contained no keys");
            return Err(Error::Internal("empty JWKS".to_string()));
        };

        let Some(key) = signing_key_from_jwk(jwk) else {
            warn!(url = %self.jwks_url, "First JWKS entry is not a usable verification key");
            return Err(Error::Internal("unusable JWKS entry".to_string()));
        };

        info!(url = %self.jwks_url, kid = ?key.kid, alg = ?key.algorithm, "Signing key updated");
        *self.current.write() = Some(Arc::new(key));
        Ok(())
    }

    async fn fetch(&self) -> Result<JwkSet> {
        let jwks = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(jwks)
    }

    /// The most recently fetched key, or `None` if no fetch has succeeded
    /// yet. Callers must treat `None` as a hard verification failure.
    #[must_use]
    pub fn current_key(&self) -> Option<Arc<SigningKey>> {
        self.current.read().clone()
    }
}

/// Convert a JWK into a [`SigningKey`], if the key type is supported.
fn signing_key_from_jwk(jwk: &Jwk) -> Option<SigningKey> {
    let key = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok()?,
        AlgorithmParameters::EllipticCurve(ec) => {
            DecodingKey::from_ec_components(&ec.x, &ec.y).ok()?
        }
        AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => return None,
    };

    Some(SigningKey {
        kid: jwk.common.key_id.clone(),
        algorithm: map_key_algorithm(jwk.common.key_algorithm),
        key,
    })
}

/// Map the JWK `alg` field to a verification algorithm, defaulting to RS256.
fn map_key_algorithm(alg: Option<KeyAlgorithm>) -> Algorithm {
    match alg {
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(KeyAlgorithm::RS256) | None => Algorithm::RS256,
        Some(other) => {
            warn!(alg = ?other, "Unsupported JWK algorithm, defaulting to RS256");
            Algorithm::RS256
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_starts_without_a_key() {
        let provider =
            KeyProvider::new("https://idp.test/jwks".to_string(), Duration::from_secs(10)).unwrap();
        assert!(provider.current_key().is_none());
    }

    #[test]
    fn key_algorithm_mapping_defaults_to_rs256() {
        assert_eq!(map_key_algorithm(None), Algorithm::RS256);
        assert_eq!(map_key_algorithm(Some(KeyAlgorithm::RS256)), Algorithm::RS256);
        assert_eq!(map_key_algorithm(Some(KeyAlgorithm::ES384)), Algorithm::ES384);
        assert_eq!(map_key_algorithm(Some(KeyAlgorithm::HS256)), Algorithm::RS256);
    }

    #[test]
    fn symmetric_jwk_is_rejected() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "oct",
            "kid": "sym-1",
            "k": "c2VjcmV0"
        }))
        .unwrap();
        assert!(signing_key_from_jwk(&jwk).is_none());
    }
}
