//! CMS content passthrough.
//!
//! The portal serves the SPA's navigation menus from a headless CMS. The
//! routes are public (no session guard) and the responses are relayed
//! unchanged; upstream failures go through the same classification as the
//! registry calls.

use serde_json::{Value, json};
use tracing::debug;

use crate::UpstreamError;
use crate::config::ContentConfig;

/// Menu variants the CMS publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKind {
    /// Top navigation
    Main,
    /// Footer links
    Footer,
}

impl MenuKind {
    /// Parse the path segment of `/api/menu/{type}`.
    #[must_use]
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "main" => Some(Self::Main),
            "footer" => Some(Self::Footer),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Footer => "footer",
        }
    }
}

/// Client for the CMS content API.
pub struct ContentClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ContentClient {
    /// Build a client against the configured content API.
    pub fn new(config: &ContentConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetch a menu document.
    pub async fn menu(&self, kind: MenuKind) -> Result<Value, UpstreamError> {
        let url = format!("{}/menus/{}", self.api_url, kind.as_str());
        debug!(%url, "Fetching CMS menu");

        let response = self
            .http
            .get(url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status().as_u16()));
        }

        Ok(response.json::<Value>().await.unwrap_or_else(|_| json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_kind_from_path() {
        assert_eq!(MenuKind::from_path("main"), Some(MenuKind::Main));
        assert_eq!(MenuKind::from_path("footer"), Some(MenuKind::Footer));
        assert_eq!(MenuKind::from_path("sidebar"), None);
    }
}
