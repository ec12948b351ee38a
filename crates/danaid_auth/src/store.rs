//! Account persistence.
//!
//! Stores only ever receive fully signed records; they never sign or verify
//! anything themselves. The JSON file layout under `data_dir`:
//!
//! ```text
//! users/<username>.json   one AccountRecord, pretty-printed
//! users_list.json         sorted array of registered usernames
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use uuid::Uuid;

use danaid_proto::{validate_username, AccountRecord};

use crate::error::StoreError;

pub trait AccountStore: Send + Sync {
    fn load(&self, username: &str) -> Result<Option<AccountRecord>, StoreError>;

    fn exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.load(username)?.is_some())
    }

    /// Insert a record for a username that is not registered yet.
    fn insert_new(&self, record: &AccountRecord) -> Result<(), StoreError>;

    /// Overwrite an existing record.
    fn replace(&self, record: &AccountRecord) -> Result<(), StoreError>;

    fn usernames(&self) -> Result<Vec<String>, StoreError>;
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: Mutex<BTreeMap<String, AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn load(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.records.lock().get(username).cloned())
    }

    fn insert_new(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if records.contains_key(record.username()) {
            return Err(StoreError::AlreadyExists(record.username().to_string()));
        }
        records.insert(record.username().to_string(), record.clone());
        Ok(())
    }

    fn replace(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        match records.get_mut(record.username()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.username().to_string())),
        }
    }

    fn usernames(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

// ── JSON files ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct JsonFileAccountStore {
    root: PathBuf,
    /// Serialises writers; readers go straight to disk.
    write_lock: Mutex<()>,
}

impl JsonFileAccountStore {
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let users = data_dir.join("users");
        fs::create_dir_all(&users).map_err(|e| StoreError::io(&users, e))?;
        Ok(Self {
            root: data_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for `username`. The name is validated first so
    /// it can never escape `users/`.
    pub fn record_path(&self, username: &str) -> Result<PathBuf, StoreError> {
        validate_username(username).map_err(|_| StoreError::InvalidName(username.to_string()))?;
        Ok(self.root.join("users").join(format!("{username}.json")))
    }

    fn list_path(&self) -> PathBuf {
        self.root.join("users_list.json")
    }

    fn read_list(&self) -> Result<Vec<String>, StoreError> {
        let path = self.list_path();
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|source| StoreError::Malformed { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn write_record(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.username())?;
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &bytes)
    }
}

impl AccountStore for JsonFileAccountStore {
    fn load(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        let path = self.record_path(username)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Malformed { path, source })
    }

    fn insert_new(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        if self.record_path(record.username())?.exists() {
            return Err(StoreError::AlreadyExists(record.username().to_string()));
        }
        self.write_record(record)?;

        let mut list = self.read_list()?;
        if !list.iter().any(|name| name == record.username()) {
            list.push(record.username().to_string());
            list.sort();
        }
        write_atomic(&self.list_path(), &serde_json::to_vec_pretty(&list)?)?;

        tracing::debug!(
            target: "danaid_auth",
            event = "account_stored",
            username = %record.username(),
        );
        Ok(())
    }

    fn replace(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        if !self.record_path(record.username())?.exists() {
            return Err(StoreError::NotFound(record.username().to_string()));
        }
        self.write_record(record)
    }

    fn usernames(&self) -> Result<Vec<String>, StoreError> {
        self.read_list()
    }
}

/// Write to a staging file in the destination directory, fsync, then rename
/// over `dest`. Readers see either the old or the new content.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let staging_path = parent.join(format!(".{}.staging", Uuid::new_v4()));
    let result = (|| {
        let mut file = File::create(&staging_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&staging_path, dest)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&staging_path);
        return Err(StoreError::io(dest, e));
    }
    Ok(())
}
