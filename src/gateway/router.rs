//! HTTP router and the proxied API handlers.
//!
//! Every `/api` route except `/api/user`, `/api/destroy`, and the menu
//! passthrough sits behind the session guard: no verified identity means
//! 401, and the first authenticated request lazily exchanges the identity
//! claims for an upstream registry token that is cached on the session.
//!
//! Upstream responses relay status and body unchanged; upstream failures
//! are normalized (upstream status with an empty JSON body, 408 when no
//! response arrived at all) so error payloads never reach the browser.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use time::Duration as CookieDuration;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tower_sessions::{Expiry, Session, SessionManagerLayer, cookie::SameSite};
use tower_sessions_memory_store::MemoryStore;
use tracing::warn;

use crate::auth::{self, KeyProvider};
use crate::config::Config;
use crate::content::{ContentClient, MenuKind};
use crate::directory::UserDirectory;
use crate::registry::RegistryClient;
use crate::session::{self, RegistryToken};

/// Shared application state
pub struct AppState {
    /// Loaded configuration
    pub config: Config,
    /// Identity provider signing key
    pub key_provider: Arc<KeyProvider>,
    /// Client for identity provider calls (token exchange)
    pub oidc_http: reqwest::Client,
    /// Upstream registrant API client
    pub registry: Arc<RegistryClient>,
    /// CMS content client
    pub content: Arc<ContentClient>,
    /// Durable user directory, when enabled
    pub directory: Option<Arc<UserDirectory>>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let session_store = MemoryStore::default();
    let session_config = &state.config.session;
    let expiry = i64::try_from(session_config.expiry.as_secs()).unwrap_or(i64::MAX);
    let session_layer = SessionManagerLayer::new(session_store)
        .with_name(session_config.cookie_name.clone())
        .with_secure(session_config.secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(CookieDuration::seconds(expiry)));

    Router::new()
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/api/user", get(auth::current_user))
        .route("/api/destroy", post(auth::destroy))
        .route("/api/menu/{kind}", get(menu_handler))
        .route("/api/domains", get(list_domains))
        .route("/api/domains/{uuid}", get(get_domain))
        .route(
            "/api/domains/{uuid}/registry_lock",
            post(set_registry_lock).delete(delete_registry_lock),
        )
        .route("/api/contacts", get(list_contacts))
        .route("/api/contacts/{uuid}", get(get_contact).patch(patch_contact))
        .route("/api/companies", get(list_companies))
        .layer(session_layer)
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/menu/{kind} - public CMS passthrough
async fn menu_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Response {
    let Some(kind) = MenuKind::from_path(&kind) else {
        return (StatusCode::NOT_FOUND, Json(json!({}))).into_response();
    };

    match state.content.menu(kind).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            warn!(error = %e, "Menu fetch failed");
            (e.as_status(), Json(json!({}))).into_response()
        }
    }
}

/// GET /api/domains
async fn list_domains(
    State(state): State<Arc<AppState>>,
    session: Session,
    RawQuery(query): RawQuery,
) -> Response {
    proxy(&state, &session, Method::GET, "domains", query, None).await
}

/// GET /api/domains/{uuid}
async fn get_domain(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(uuid): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    proxy(&state, &session, Method::GET, &format!("domains/{uuid}"), query, None).await
}

/// POST /api/domains/{uuid}/registry_lock
async fn set_registry_lock(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(uuid): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    proxy(
        &state,
        &session,
        Method::POST,
        &format!("domains/{uuid}/registry_lock"),
        query,
        None,
    )
    .await
}

/// DELETE /api/domains/{uuid}/registry_lock
async fn delete_registry_lock(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(uuid): Path<String>,
) -> Response {
    proxy(
        &state,
        &session,
        Method::DELETE,
        &format!("domains/{uuid}/registry_lock"),
        None,
        None,
    )
    .await
}

/// GET /api/contacts
async fn list_contacts(
    State(state): State<Arc<AppState>>,
    session: Session,
    RawQuery(query): RawQuery,
) -> Response {
    proxy(&state, &session, Method::GET, "contacts", query, None).await
}

/// GET /api/contacts/{uuid}
async fn get_contact(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(uuid): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    proxy(&state, &session, Method::GET, &format!("contacts/{uuid}"), query, None).await
}

/// PATCH /api/contacts/{uuid}
async fn patch_contact(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(uuid): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    proxy(
        &state,
        &session,
        Method::PATCH,
        &format!("contacts/{uuid}"),
        None,
        Some(body),
    )
    .await
}

/// GET /api/companies
async fn list_companies(
    State(state): State<Arc<AppState>>,
    session: Session,
    RawQuery(query): RawQuery,
) -> Response {
    proxy(&state, &session, Method::GET, "companies", query, None).await
}

/// Guard plus forward: resolve the session's registry token, relay one
/// upstream call, normalize failures.
async fn proxy(
    state: &AppState,
    session: &Session,
    method: Method,
    path: &str,
    raw_query: Option<String>,
    body: Option<Value>,
) -> Response {
    let token = match require_session(state, session).await {
        Ok(token) => token,
        Err(response) => return response,
    };

    match state
        .registry
        .forward(method, path, raw_query.as_deref(), body, &token)
        .await
    {
        Ok(proxied) => (proxied.status, Json(proxied.body)).into_response(),
        Err(e) => {
            warn!(path, error = %e, "Upstream registry call failed");
            (e.as_status(), Json(json!({}))).into_response()
        }
    }
}

/// The session guard.
///
/// 401 when the session carries no verified identity, or when its cached
/// registry token has expired (the browser must log in again). Otherwise
/// returns the cached token, issuing it on the first authenticated request
/// of the session.
async fn require_session(
    state: &AppState,
    session: &Session,
) -> Result<RegistryToken, Response> {
    let identity = match session::identity(session).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return Err(unauthorized()),
        Err(e) => {
            warn!(error = %e, "Session read failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response());
        }
    };

    match session::registry_token(session).await {
        Ok(Some(token)) if token.is_expired() => return Err(unauthorized()),
        Ok(Some(token)) => return Ok(token),
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "Session read failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response());
        }
    }

    // One issuance per session lifetime.
    let token = match state.registry.issue_token(&identity).await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Registry token issuance failed");
            return Err((e.as_status(), Json(json!({}))).into_response());
        }
    };

    if let Err(e) = session::set_registry_token(session, &token).await {
        warn!(error = %e, "Failed to cache registry token");
    }

    Ok(token)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response()
}
