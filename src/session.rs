//! Typed access to the per-browser session.
//!
//! The session is the only state shared between the login round trip and
//! the API gateway. Three values live in it: the CSRF state of an
//! in-flight login attempt, the verified identity claims, and the cached
//! upstream registry token. Everything goes through the helpers here so
//! the key strings and serialization stay in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::auth::identity::IdentityClaims;
use crate::{Error, Result};

/// CSRF state for the current login attempt. Written when the login
/// redirect is issued, consumed by the callback.
pub const KEY_AUTH_STATE: &str = "auth_state";

/// Verified identity claims. Present only after a completed login.
pub const KEY_IDENTITY: &str = "identity";

/// Cached upstream registry access token.
pub const KEY_REGISTRY_TOKEN: &str = "registry_token";

/// Access token for the upstream registry API, cached on the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryToken {
    /// Bearer token value
    pub access_token: String,
    /// Expiry instant reported by the registry
    pub expires_at: DateTime<Utc>,
}

impl RegistryToken {
    /// Whether the token's expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Read the stored CSRF state, if a login attempt is in flight.
pub async fn auth_state(session: &Session) -> Result<Option<String>> {
    session
        .get::<String>(KEY_AUTH_STATE)
        .await
        .map_err(|e| Error::Session(e.to_string()))
}

/// Store the CSRF state for a new login attempt.
pub async fn set_auth_state(session: &Session, state: &str) -> Result<()> {
    session
        .insert(KEY_AUTH_STATE, state.to_string())
        .await
        .map_err(|e| Error::Session(e.to_string()))
}

/// Remove the CSRF state. The state is single-use per login attempt.
pub async fn clear_auth_state(session: &Session) {
    let _ = session.remove::<String>(KEY_AUTH_STATE).await;
}

/// Read the verified identity claims, if logged in.
pub async fn identity(session: &Session) -> Result<Option<IdentityClaims>> {
    session
        .get::<IdentityClaims>(KEY_IDENTITY)
        .await
        .map_err(|e| Error::Session(e.to_string()))
}

/// Write the verified identity claims after a completed login.
pub async fn set_identity(session: &Session, claims: &IdentityClaims) -> Result<()> {
    session
        .insert(KEY_IDENTITY, claims.clone())
        .await
        .map_err(|e| Error::Session(e.to_string()))
}

/// Read the cached registry token.
pub async fn registry_token(session: &Session) -> Result<Option<RegistryToken>> {
    session
        .get::<RegistryToken>(KEY_REGISTRY_TOKEN)
        .await
        .map_err(|e| Error::Session(e.to_string()))
}

/// Cache a freshly issued registry token.
pub async fn set_registry_token(session: &Session, token: &RegistryToken) -> Result<()> {
    session
        .insert(KEY_REGISTRY_TOKEN, token.clone())
        .await
        .map_err(|e| Error::Session(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_expiry_is_exact() {
        let live = RegistryToken {
            access_token: "t".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(!live.is_expired());

        let dead = RegistryToken {
            access_token: "t".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        assert!(dead.is_expired());
    }

    #[test]
    fn token_round_trips_through_json() {
        let token = RegistryToken {
            access_token: "abc".to_string(),
            expires_at: Utc::now() + Duration::minutes(5),
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: RegistryToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.access_token, "abc");
        assert_eq!(back.expires_at, token.expires_at);
    }
}
