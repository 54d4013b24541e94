//! Identity claims extracted from a verified ID token.
//!
//! The provider's `sub` claim is a country-code-prefixed identifier
//! (e.g. `"EE38903110313"`). The split is purely positional: the first two
//! characters are the ISO country code, the remainder is the local
//! identifier. No country-specific parsing happens here.

use jsonwebtoken::{TokenData, Validation};
use serde::{Deserialize, Serialize};

use crate::config::OidcConfig;

use super::keys::SigningKey;

/// Claim subset of a verified ID token.
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    /// Raw country-code-prefixed subject identifier
    pub sub: String,
    /// Given name as asserted by the provider
    #[serde(default)]
    pub given_name: Option<String>,
    /// Family name as asserted by the provider
    #[serde(default)]
    pub family_name: Option<String>,
}

/// Identity established for a session after a completed login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Local identifier (the `sub` claim with its country prefix removed)
    pub subject_id: String,
    /// Two-letter country code prefix of the `sub` claim
    pub country_code: String,
    /// Title-cased given name
    pub first_name: String,
    /// Title-cased family name
    pub last_name: String,
}

impl IdentityClaims {
    /// Derive session identity from verified token claims.
    #[must_use]
    pub fn from_token(claims: &IdTokenClaims) -> Self {
        let (country_code, subject_id) = split_subject(&claims.sub);
        Self {
            subject_id,
            country_code,
            first_name: title_case(claims.given_name.as_deref().unwrap_or_default()),
            last_name: title_case(claims.family_name.as_deref().unwrap_or_default()),
        }
    }
}

/// Verify an ID token against the current signing key.
///
/// Validates the signature, `aud == client_id`, `iss == issuer`, and
/// expiry/not-before with the configured leeway. The caller must fail the
/// login attempt on any error; verification is never skipped.
pub fn verify_id_token(
    token: &str,
    key: &SigningKey,
    oidc: &OidcConfig,
) -> Result<IdTokenClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(key.algorithm);
    validation.leeway = oidc.leeway_secs;
    validation.set_audience(&[&oidc.client_id]);
    validation.set_issuer(&[&oidc.issuer]);

    let data: TokenData<IdTokenClaims> = jsonwebtoken::decode(token, &key.key, &validation)?;
    Ok(data.claims)
}

/// Split a subject claim into `(country_code, local_identifier)`.
///
/// First two characters versus the rest; degrades to empty strings for
/// short input.
#[must_use]
pub fn split_subject(sub: &str) -> (String, String) {
    let country: String = sub.chars().take(2).collect();
    let local: String = sub.chars().skip(2).collect();
    (country, local)
}

/// Title-case a name claim: each word (split on spaces and hyphens) gets an
/// uppercase first letter, the rest lowercased.
#[must_use]
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        if ch == ' ' || ch == '-' {
            out.push(ch);
            at_word_start = true;
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_subject_estonian_id() {
        let (country, id) = split_subject("EE38903110313");
        assert_eq!(country, "EE");
        assert_eq!(id, "38903110313");
    }

    #[test]
    fn split_subject_alphanumeric_id() {
        let (country, id) = split_subject("FRACD43556DB");
        assert_eq!(country, "FR");
        assert_eq!(id, "ACD43556DB");
    }

    #[test]
    fn split_subject_empty() {
        let (country, id) = split_subject("");
        assert_eq!(country, "");
        assert_eq!(id, "");
    }

    #[test]
    fn split_subject_shorter_than_prefix() {
        let (country, id) = split_subject("E");
        assert_eq!(country, "E");
        assert_eq!(id, "");
    }

    #[test]
    fn title_case_uppercased_claim() {
        assert_eq!(title_case("MARI-LIIS"), "Mari-Liis");
        assert_eq!(title_case("VAN DER BERG"), "Van Der Berg");
    }

    #[test]
    fn title_case_lowercase_and_empty() {
        assert_eq!(title_case("kati"), "Kati");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn identity_from_token_claims() {
        let claims = IdTokenClaims {
            sub: "EE38903110313".to_string(),
            given_name: Some("MARI".to_string()),
            family_name: Some("MAASIKAS".to_string()),
        };
        let identity = IdentityClaims::from_token(&claims);
        assert_eq!(
            identity,
            IdentityClaims {
                subject_id: "38903110313".to_string(),
                country_code: "EE".to_string(),
                first_name: "Mari".to_string(),
                last_name: "Maasikas".to_string(),
            }
        );
    }

    #[test]
    fn identity_tolerates_missing_names() {
        let claims = IdTokenClaims {
            sub: "".to_string(),
            given_name: None,
            family_name: None,
        };
        let identity = IdentityClaims::from_token(&claims);
        assert_eq!(identity.subject_id, "");
        assert_eq!(identity.country_code, "");
        assert_eq!(identity.first_name, "");
        assert_eq!(identity.last_name, "");
    }
}
