//! Registrant Portal Backend
//!
//! Server side of a registrant self-service portal:
//!
//! - **eID login**: OpenID-Connect authorization-code flow against an
//!   external identity provider, with JWT verification against the
//!   provider's published signing key.
//! - **API gateway**: forwards authenticated browser requests to the
//!   upstream domain-registry REST API with a per-session bearer token.
//! - **User directory**: durable per-registrant records with cached company
//!   affiliations from a business-registry lookup.
//! - **Content passthrough**: CMS-sourced navigation menus.
//!
//! The browser-facing single-page application is a separate artifact; this
//! crate only serves its JSON API and the login round trip.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod content;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod session;

pub use error::{Error, Result, UpstreamError};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
