//! Login round-trip handlers.
//!
//! One invocation of [`callback`] completes one authorization-code login:
//! error check, CSRF state validation, code exchange, ID token
//! verification, session establishment, user-directory upsert. The steps
//! are strictly sequential; every failure funnels into the same
//! user-visible outcome (a redirect back to `/login`) with the cause only
//! in the server log.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::{debug, info, warn};
use url::Url;

use crate::gateway::router::AppState;
use crate::{UpstreamError, session};

use super::identity::{IdentityClaims, verify_id_token};

/// Query parameters of the provider's callback redirect
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// State parameter (CSRF protection)
    pub state: Option<String>,

    /// Error code, set when the provider aborted the attempt
    pub error: Option<String>,

    /// Error description
    pub error_description: Option<String>,
}

/// Token endpoint response. Access and refresh tokens are issued too but
/// the portal only consumes the ID token.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

/// Why a login attempt failed. Logged server-side only; the browser sees
/// the same `/login` redirect for every variant.
#[derive(Debug, thiserror::Error)]
enum LoginError {
    #[error("identity provider reported: {0}")]
    Provider(String),

    #[error("callback state does not match session")]
    StateMismatch,

    #[error("callback missing authorization code")]
    MissingCode,

    #[error("code exchange failed: {0}")]
    Exchange(UpstreamError),

    #[error("no signing key available")]
    KeyUnavailable,

    #[error("ID token verification failed: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),

    #[error("session error: {0}")]
    Session(String),
}

/// GET /auth/login — start a login attempt.
///
/// Cycles the session id, stores a fresh CSRF state, and redirects the
/// browser to the provider's authorization endpoint.
pub async fn login(State(state): State<Arc<AppState>>, session: Session) -> Response {
    if let Err(e) = session.cycle_id().await {
        warn!(error = %e, "Failed to cycle session before login");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let csrf_state = generate_state();
    if let Err(e) = session::set_auth_state(&session, &csrf_state).await {
        warn!(error = %e, "Failed to store login state");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let oidc = &state.config.oidc;
    let mut auth_url = match Url::parse(&oidc.authorization_url()) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Invalid authorization endpoint");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    auth_url
        .query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &oidc.client_id)
        .append_pair("redirect_uri", &oidc.redirect_url)
        .append_pair("scope", &oidc.scope)
        .append_pair("state", &csrf_state);

    debug!("Redirecting to identity provider");
    Redirect::to(auth_url.as_str()).into_response()
}

/// GET /auth/callback — complete a login attempt.
///
/// Success redirects to the application root; any failure redirects to
/// `/login` after logging the cause. No failure detail reaches the client.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    match complete_login(&state, &session, params).await {
        Ok(()) => Redirect::to("/"),
        Err(e) => {
            warn!(error = %e, "Login attempt failed");
            Redirect::to("/login")
        }
    }
}

/// The linear login state machine. Each step depends on the previous
/// step's success; the first failure aborts the attempt.
async fn complete_login(
    state: &AppState,
    session: &Session,
    params: CallbackParams,
) -> Result<(), LoginError> {
    // 1. The provider reported an error (e.g. the user cancelled).
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        return Err(LoginError::Provider(format!("{error} {description}")));
    }

    // 2. CSRF state must match what this session stored at login time.
    // The stored value is single-use: remove it before comparing.
    let stored = session::auth_state(session)
        .await
        .map_err(|e| LoginError::Session(e.to_string()))?;
    session::clear_auth_state(session).await;

    match (params.state.as_deref(), stored.as_deref()) {
        (Some(received), Some(expected)) if received == expected => {}
        _ => return Err(LoginError::StateMismatch),
    }

    let code = params.code.ok_or(LoginError::MissingCode)?;

    // 3. Exchange the code for an ID token.
    let token_response = exchange_code(state, &code).await?;

    // 4. Verify signature and standard claims. `None` from the key
    // provider fails closed — verification is never skipped.
    let key = state
        .key_provider
        .current_key()
        .ok_or(LoginError::KeyUnavailable)?;
    let claims = verify_id_token(&token_response.id_token, &key, &state.config.oidc)?;

    // 5. Establish the authenticated session. Flushing empties the
    // session and forces a fresh id, so neither pre-auth state nor
    // anything a previous login left on this browser (cached registry
    // token included) survives into the new identity.
    let identity = IdentityClaims::from_token(&claims);
    session
        .flush()
        .await
        .map_err(|e| LoginError::Session(e.to_string()))?;
    session::set_identity(session, &identity)
        .await
        .map_err(|e| LoginError::Session(e.to_string()))?;

    info!(country = %identity.country_code, "Login completed");

    // Upsert the durable user record. A directory failure is logged but
    // never fails the login, and the company refresh runs detached so the
    // redirect is not held up by the business-registry lookup.
    if let Some(directory) = &state.directory {
        match directory.upsert(&identity) {
            Ok(true) => {
                let directory = Arc::clone(directory);
                let subject_id = identity.subject_id.clone();
                tokio::spawn(async move {
                    directory.refresh_companies(&subject_id).await;
                });
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "User directory upsert failed"),
        }
    }

    Ok(())
}

/// POST the authorization code to the token endpoint.
///
/// Client credentials travel as HTTP Basic auth; the body carries the
/// code and the registered redirect URI.
async fn exchange_code(state: &AppState, code: &str) -> Result<TokenResponse, LoginError> {
    let oidc = &state.config.oidc;

    let response = state
        .oidc_http
        .post(oidc.token_url())
        .basic_auth(&oidc.client_id, Some(&oidc.client_secret))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &oidc.redirect_url),
        ])
        .send()
        .await
        .map_err(|e| LoginError::Exchange(e.into()))?;

    if !response.status().is_success() {
        return Err(LoginError::Exchange(UpstreamError::Status(
            response.status().as_u16(),
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| LoginError::Exchange(e.into()))
}

/// Session-bound identity readout for the SPA
#[derive(Debug, Serialize)]
pub struct UserStatus {
    /// Whether the session holds verified identity claims
    pub authenticated: bool,
    /// The claims, when authenticated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityClaims>,
}

/// GET /api/user — report the session's identity.
///
/// Public on purpose: the SPA probes this to decide whether to render the
/// login screen, so an anonymous session gets `authenticated: false`
/// rather than a 401.
pub async fn current_user(session: Session) -> Json<UserStatus> {
    let identity = session::identity(&session).await.ok().flatten();
    Json(UserStatus {
        authenticated: identity.is_some(),
        identity,
    })
}

/// POST /api/destroy — log out by destroying the session.
pub async fn destroy(session: Session) -> Response {
    match session.flush().await {
        Ok(()) => Json(json!({})).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to destroy session");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Random URL-safe CSRF state token.
fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_params_deserialize() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc123&state=xyz789").unwrap();

        assert_eq!(params.code, Some("abc123".to_string()));
        assert_eq!(params.state, Some("xyz789".to_string()));
        assert!(params.error.is_none());
    }

    #[test]
    fn callback_params_error_response() {
        let params: CallbackParams =
            serde_urlencoded::from_str("error=access_denied&error_description=cancelled&state=s")
                .unwrap();

        assert!(params.code.is_none());
        assert_eq!(params.error, Some("access_denied".to_string()));
        assert_eq!(params.error_description, Some("cancelled".to_string()));
    }

    #[test]
    fn generated_state_is_unique_and_urlsafe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        // 32 random bytes, unpadded base64url
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
