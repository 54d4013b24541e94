//! Durable user directory with cached company affiliations.
//!
//! Every completed login upserts a [`UserRecord`]; the cached company list
//! is only refreshed when the record is new or has gone stale, and that
//! refresh runs detached from the login response. A refresh failure keeps
//! the stale list in place.

pub mod companies;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::IdentityClaims;
use crate::config::{BusinessRegistryConfig, DirectoryConfig};
use crate::{Error, Result};

pub use companies::CompanyLookup;
pub use store::{Company, UserRecord, UserStore};

/// The directory subsystem: storage plus the company lookup client.
pub struct UserDirectory {
    store: UserStore,
    lookup: CompanyLookup,
    refresh_ttl: Duration,
}

impl UserDirectory {
    /// Open the directory with the configured storage location.
    pub fn new(config: &DirectoryConfig, soap: &BusinessRegistryConfig) -> Result<Self> {
        let data_dir = resolve_data_dir(&config.data_dir)?;
        let store = UserStore::open(&data_dir)?;
        let lookup = CompanyLookup::new(soap)
            .map_err(|e| Error::Internal(format!("Failed to build SOAP client: {e}")))?;

        Ok(Self {
            store,
            lookup,
            refresh_ttl: config.company_refresh_ttl,
        })
    }

    /// Record a login. Creates the record on first sight; always updates
    /// names, `updated_at`, and `visited_at`.
    ///
    /// Returns whether a company refresh is due: the record is new, or its
    /// previous `updated_at` is older than the staleness window.
    pub fn upsert(&self, claims: &IdentityClaims) -> Result<bool> {
        let now = Utc::now();
        let existing = self.store.get(&claims.subject_id)?;

        // Staleness is judged against the record as it was before this
        // login touches it.
        let refresh_due = match &existing {
            None => true,
            Some(record) => {
                (now - record.updated_at).to_std().unwrap_or_default() > self.refresh_ttl
            }
        };

        let record = match existing {
            Some(mut record) => {
                record.country_code = claims.country_code.clone();
                record.first_name = claims.first_name.clone();
                record.last_name = claims.last_name.clone();
                record.updated_at = now;
                record.visited_at = now;
                record
            }
            None => UserRecord {
                subject_id: claims.subject_id.clone(),
                country_code: claims.country_code.clone(),
                first_name: claims.first_name.clone(),
                last_name: claims.last_name.clone(),
                companies: Vec::new(),
                created_at: now,
                updated_at: now,
                visited_at: now,
            },
        };

        self.store.put(&record)?;
        Ok(refresh_due)
    }

    /// Replace the cached company list from the business registry.
    ///
    /// Runs as a detached task after login; every failure is logged here
    /// and the previously cached list stays untouched.
    pub async fn refresh_companies(&self, subject_id: &str) {
        let companies = match self.lookup.representation_rights(subject_id).await {
            Ok(companies) => companies,
            Err(e) => {
                warn!(error = %e, "Company lookup failed, keeping cached list");
                return;
            }
        };

        match self.store.get(subject_id) {
            Ok(Some(mut record)) => {
                info!(count = companies.len(), "Refreshed company affiliations");
                record.companies = companies;
                if let Err(e) = self.store.put(&record) {
                    warn!(error = %e, "Failed to store refreshed companies");
                }
            }
            Ok(None) => warn!("Company refresh for unknown user record"),
            Err(e) => warn!(error = %e, "Failed to load user record for refresh"),
        }
    }
}

fn resolve_data_dir(configured: &str) -> Result<PathBuf> {
    if configured.is_empty() {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot resolve home directory".to_string()))?;
        Ok(home.join(".registrant-portal").join("users"))
    } else {
        Ok(PathBuf::from(configured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn claims() -> IdentityClaims {
        IdentityClaims {
            subject_id: "38903110313".to_string(),
            country_code: "EE".to_string(),
            first_name: "Mari".to_string(),
            last_name: "Maasikas".to_string(),
        }
    }

    fn directory(dir: &std::path::Path) -> UserDirectory {
        UserDirectory::new(
            &DirectoryConfig {
                enabled: true,
                data_dir: dir.to_string_lossy().to_string(),
                company_refresh_ttl: Duration::from_secs(86_400),
            },
            &BusinessRegistryConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn first_login_creates_and_requests_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory(dir.path());

        assert!(directory.upsert(&claims()).unwrap());

        let record = directory.store.get("38903110313").unwrap().unwrap();
        assert_eq!(record.first_name, "Mari");
        assert_eq!(record.created_at, record.visited_at);
    }

    #[test]
    fn fresh_record_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory(dir.path());

        assert!(directory.upsert(&claims()).unwrap());
        // Second visit inside the staleness window.
        assert!(!directory.upsert(&claims()).unwrap());
    }

    #[test]
    fn stale_record_triggers_one_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory(dir.path());
        directory.upsert(&claims()).unwrap();

        // Age the record past the staleness window.
        let mut record = directory.store.get("38903110313").unwrap().unwrap();
        record.updated_at = Utc::now() - ChronoDuration::days(2);
        directory.store.put(&record).unwrap();

        // The stale visit requests a refresh and resets updated_at, so the
        // following visit does not.
        assert!(directory.upsert(&claims()).unwrap());
        assert!(!directory.upsert(&claims()).unwrap());
    }

    #[test]
    fn upsert_preserves_created_at_and_companies() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory(dir.path());
        directory.upsert(&claims()).unwrap();

        let mut record = directory.store.get("38903110313").unwrap().unwrap();
        let created_at = record.created_at;
        record.companies = vec![Company {
            registry_code: "12345678".to_string(),
            name: "Näidis OÜ".to_string(),
        }];
        directory.store.put(&record).unwrap();

        let mut renamed = claims();
        renamed.first_name = "Maria".to_string();
        directory.upsert(&renamed).unwrap();

        let record = directory.store.get("38903110313").unwrap().unwrap();
        assert_eq!(record.created_at, created_at);
        assert_eq!(record.first_name, "Maria");
        assert_eq!(record.companies.len(), 1);
    }
}
