//! File-per-record JSON storage for user records.
//!
//! Records are keyed by the subject identifier; the on-disk filename is a
//! SHA-256 digest of the key so identifiers never appear in directory
//! listings. A `DashMap` cache fronts the disk so repeat logins within one
//! process lifetime skip the read.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Error, Result};

/// One company affiliation from the business registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Business-registry code
    pub registry_code: String,
    /// Registered company name
    pub name: String,
}

/// Durable per-user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Local subject identifier (unique key)
    pub subject_id: String,
    /// Country code from the login subject
    pub country_code: String,
    /// Given name as of the latest login
    pub first_name: String,
    /// Family name as of the latest login
    pub last_name: String,
    /// Cached company affiliations
    #[serde(default)]
    pub companies: Vec<Company>,
    /// First login
    pub created_at: DateTime<Utc>,
    /// Last profile/company update
    pub updated_at: DateTime<Utc>,
    /// Last login
    pub visited_at: DateTime<Utc>,
}

/// Storage for user records. Records are never deleted here.
pub struct UserStore {
    dir: PathBuf,
    cache: DashMap<String, UserRecord>,
}

impl UserStore {
    /// Open (creating if needed) the storage directory.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            cache: DashMap::new(),
        })
    }

    /// Load a record by subject id.
    pub fn get(&self, subject_id: &str) -> Result<Option<UserRecord>> {
        if let Some(record) = self.cache.get(subject_id) {
            return Ok(Some(record.clone()));
        }

        let path = self.record_path(subject_id);
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&path)?;
        let record: UserRecord =
            serde_json::from_str(&data).map_err(|e| Error::Internal(format!(
                "Corrupt user record {}: {e}",
                path.display()
            )))?;

        self.cache.insert(subject_id.to_string(), record.clone());
        Ok(Some(record))
    }

    /// Write a record, replacing any previous version.
    pub fn put(&self, record: &UserRecord) -> Result<()> {
        let path = self.record_path(&record.subject_id);
        let data = serde_json::to_string_pretty(record)?;
        fs::write(&path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %path.display(), "Stored user record");
        self.cache.insert(record.subject_id.clone(), record.clone());
        Ok(())
    }

    fn record_path(&self, subject_id: &str) -> PathBuf {
        use std::fmt::Write as _;

        let digest = Sha256::digest(subject_id.as_bytes());
        let mut name = String::with_capacity(69);
        for byte in digest {
            let _ = write!(name, "{byte:02x}");
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(subject_id: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            subject_id: subject_id.to_string(),
            country_code: "EE".to_string(),
            first_name: "Mari".to_string(),
            last_name: "Maasikas".to_string(),
            companies: vec![],
            created_at: now,
            updated_at: now,
            visited_at: now,
        }
    }

    #[test]
    fn round_trips_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();

        assert!(store.get("38903110313").unwrap().is_none());

        let rec = record("38903110313");
        store.put(&rec).unwrap();

        let loaded = store.get("38903110313").unwrap().unwrap();
        assert_eq!(loaded.subject_id, rec.subject_id);
        assert_eq!(loaded.first_name, "Mari");
    }

    #[test]
    fn survives_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = UserStore::open(dir.path()).unwrap();
            store.put(&record("38903110313")).unwrap();
        }
        let store = UserStore::open(dir.path()).unwrap();
        assert!(store.get("38903110313").unwrap().is_some());
    }

    #[test]
    fn filename_does_not_contain_subject_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();
        store.put(&record("38903110313")).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains("38903110313"));
    }

    #[cfg(unix)]
    #[test]
    fn record_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();
        store.put(&record("38903110313")).unwrap();

        let entry = fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let mode = entry.metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
