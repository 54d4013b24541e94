//! HTTP client for the registrant API.
//!
//! Every call goes through the same boundary: a successful upstream
//! response is passed back as-is (status plus JSON body), everything else
//! is classified into [`UpstreamError`] so the gateway can map it to a
//! browser-facing status without leaking upstream payloads.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::UpstreamError;
use crate::auth::IdentityClaims;
use crate::config::RegistryConfig;
use crate::session::RegistryToken;

/// Client for the upstream registrant API.
pub struct RegistryClient {
    http: reqwest::Client,
    api_url: String,
}

/// An upstream response to relay back to the browser.
pub struct ProxiedResponse {
    /// Upstream status code
    pub status: reqwest::StatusCode,
    /// Upstream JSON body
    pub body: Value,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl RegistryClient {
    /// Build a client against the configured registrant API.
    pub fn new(config: &RegistryConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange verified identity claims for a registry access token.
    ///
    /// Called at most once per session lifetime; the gateway caches the
    /// result on the session until it expires.
    pub async fn issue_token(
        &self,
        identity: &IdentityClaims,
    ) -> Result<RegistryToken, UpstreamError> {
        let response = self
            .http
            .post(format!("{}/auth/eid", self.api_url))
            .json(&json!({
                "ident": identity.subject_id,
                "first_name": identity.first_name,
                "last_name": identity.last_name,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status().as_u16()));
        }

        let body: TokenBody = response
            .json()
            .await
            .map_err(|e| UpstreamError::Other(e.to_string()))?;

        Ok(RegistryToken {
            access_token: body.access_token,
            expires_at: body.expires_at,
        })
    }

    /// Forward one browser request to the corresponding upstream call.
    ///
    /// The query string and body pass through verbatim; the bearer token
    /// comes from the session cache. A non-success upstream status is an
    /// [`UpstreamError::Status`], never a body to relay.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        raw_query: Option<&str>,
        body: Option<Value>,
        token: &RegistryToken,
    ) -> Result<ProxiedResponse, UpstreamError> {
        let mut url = format!("{}/{}", self.api_url, path.trim_start_matches('/'));
        if let Some(query) = raw_query {
            url.push('?');
            url.push_str(query);
        }

        debug!(%method, %url, "Forwarding registry request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&token.access_token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        // Some upstream responses (e.g. lock deletion) carry no body.
        let body = response.json::<Value>().await.unwrap_or_else(|_| json!({}));

        Ok(ProxiedResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;

    #[test]
    fn base_url_is_normalized() {
        let client = RegistryClient::new(&RegistryConfig {
            api_url: "https://registry.test/api/v1/registrant/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.api_url, "https://registry.test/api/v1/registrant");
    }

    #[test]
    fn token_body_parses() {
        let body: TokenBody = serde_json::from_str(
            r#"{"access_token":"abc","expires_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(body.access_token, "abc");
    }
}
