//! Durable mapping of access keys to usage records.
//!
//! The key file is a JSON object keyed by the access key:
//!
//! ```json
//! {
//!   "k1": { "count": 3, "max_uses": 100, "user_id": "ana", "description": "CEIP" }
//! }
//! ```
//!
//! Every mutation rewrites the whole file before returning so the
//! on-disk counts never lag behind what callers have been told.
//! Edits other processes make to the file (a `keys add`, a manual
//! change) are merged in before each rewrite instead of overwritten.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::ChatError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserKeyRecord {
    // The key is the map key in the file, filled in after loading
    #[serde(skip)]
    pub key: String,
    #[serde(rename = "count", default)]
    pub usage_count: u32,
    pub max_uses: u32,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub description: String,
}

impl UserKeyRecord {
    pub fn new(key: &str, max_uses: u32, user_id: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            usage_count: 0,
            max_uses,
            user_id: user_id.to_string(),
            description: description.to_string(),
        }
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.usage_count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.max_uses
    }
}

pub type KeyMap = BTreeMap<String, UserKeyRecord>;

/// Generate a new random access key.
pub fn generate_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Identifies the version of the key file this process last read or
/// wrote. A different fingerprint means someone else changed it.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Fingerprint {
    modified: SystemTime,
    len: u64,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = fs::metadata(path).ok()?;
    Some(Fingerprint {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

pub struct KeyStore {
    path: PathBuf,
    default_max_uses: u32,
    // Lock order: `keys` first, then `disk`. `keys` is never held while
    // the file is being written.
    keys: Mutex<KeyMap>,
    disk: Mutex<Option<Fingerprint>>,
}

/// A change already applied in memory that still has to be written.
/// Writes are serialized in the order the changes were made.
#[must_use = "the change is only persisted by calling `commit`"]
pub struct PendingWrite<'a> {
    path: &'a Path,
    disk: MutexGuard<'a, Option<Fingerprint>>,
    snapshot: KeyMap,
}

impl PendingWrite<'_> {
    pub fn commit(mut self) -> Result<(), ChatError> {
        write_atomic(self.path, &self.snapshot)?;
        *self.disk = fingerprint(self.path);
        Ok(())
    }
}

impl KeyStore {
    /// Load the key file at `path`, creating a default one if it
    /// doesn't exist yet.
    pub fn open(path: impl AsRef<Path>, default_max_uses: u32) -> Result<Self, ChatError> {
        let path = path.as_ref().to_path_buf();
        let keys = Self::load(&path, default_max_uses)?;
        tracing::info!("Loaded {} access keys from {}", keys.len(), path.display());
        Ok(Self {
            disk: Mutex::new(fingerprint(&path)),
            path,
            default_max_uses,
            keys: Mutex::new(keys),
        })
    }

    /// Read the key file. When the file is absent a default mapping
    /// with a single generated key is written so the service is usable
    /// out of the box.
    pub fn load(path: &Path, default_max_uses: u32) -> Result<KeyMap, ChatError> {
        if let Some(keys) = read_key_file(path)? {
            return Ok(keys);
        }

        let keys = default_keys(default_max_uses);
        write_atomic(path, &keys)?;
        for record in keys.values() {
            tracing::warn!(
                "No key file found at {}. Generated access key {} for user '{}' ({} uses)",
                path.display(),
                record.key,
                record.user_id,
                record.max_uses
            );
        }
        Ok(keys)
    }

    /// Write the current in-memory mapping to disk.
    pub fn save(&self) -> Result<(), ChatError> {
        let (keys, disk) = self.begin();
        self.stage(keys, disk).commit()
    }

    /// Replace the in-memory mapping with the contents of the key
    /// file, picking up edits made while the server was running.
    pub fn reload(&self) -> Result<usize, ChatError> {
        let (mut keys, mut disk) = self.lock_both();
        let fresh = Self::load(&self.path, self.default_max_uses)?;
        let count = fresh.len();
        *keys = fresh;
        *disk = fingerprint(&self.path);
        tracing::info!("Reloaded {} access keys from {}", count, self.path.display());
        Ok(count)
    }

    pub fn get(&self, key: &str) -> Option<UserKeyRecord> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn records(&self) -> Vec<UserKeyRecord> {
        self.lock().values().cloned().collect()
    }

    /// Add or replace a record and persist the result.
    pub fn insert(&self, record: UserKeyRecord) -> Result<(), ChatError> {
        if record.max_uses == 0 {
            return Err(ChatError::InvalidInput(String::from(
                "max_uses must be greater than 0",
            )));
        }
        let (mut keys, disk) = self.begin();
        keys.insert(record.key.clone(), record);
        self.stage(keys, disk).commit()
    }

    /// Apply `f` to the record for `key` in memory. If `f` fails
    /// nothing changes. The returned write must be committed to
    /// persist the change; the key map is already unlocked by then.
    ///
    /// When the write fails the in-memory change is kept: the caller
    /// was refused, but counts never move backwards.
    pub(crate) fn update<F>(
        &self,
        key: &str,
        f: F,
    ) -> Result<(UserKeyRecord, PendingWrite<'_>), ChatError>
    where
        F: FnOnce(&mut UserKeyRecord) -> Result<(), ChatError>,
    {
        let (mut keys, disk) = self.begin();
        let record = keys.get_mut(key).ok_or(ChatError::Unauthorized)?;
        f(record)?;
        let updated = record.clone();
        Ok((updated, self.stage(keys, disk)))
    }

    /// Lock for a read-modify-write, first folding in any change
    /// another process made to the key file since we last touched it.
    fn begin(&self) -> (MutexGuard<'_, KeyMap>, MutexGuard<'_, Option<Fingerprint>>) {
        let (mut keys, mut disk) = self.lock_both();
        let current = fingerprint(&self.path);
        if current.is_some() && current != *disk {
            self.merge_from_disk(&mut keys);
            *disk = current;
        }
        (keys, disk)
    }

    /// Take the file as the source of truth for which keys exist and
    /// their limits. Usage counts keep the higher of the two values.
    fn merge_from_disk(&self, keys: &mut KeyMap) {
        let mut fresh = match read_key_file(&self.path) {
            Ok(Some(fresh)) => fresh,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Ignoring unreadable key file edit: {}", e);
                return;
            }
        };
        for (key, record) in fresh.iter_mut() {
            if let Some(known) = keys.get(key) {
                record.usage_count = record.usage_count.max(known.usage_count);
            }
        }
        tracing::info!(
            "Key file {} changed on disk, merged {} keys (was {})",
            self.path.display(),
            fresh.len(),
            keys.len()
        );
        *keys = fresh;
    }

    fn stage<'a>(
        &'a self,
        keys: MutexGuard<'a, KeyMap>,
        disk: MutexGuard<'a, Option<Fingerprint>>,
    ) -> PendingWrite<'a> {
        let snapshot = keys.clone();
        drop(keys);
        PendingWrite {
            path: &self.path,
            disk,
            snapshot,
        }
    }

    fn lock(&self) -> MutexGuard<'_, KeyMap> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_both(&self) -> (MutexGuard<'_, KeyMap>, MutexGuard<'_, Option<Fingerprint>>) {
        let keys = self.lock();
        let disk = self.disk.lock().unwrap_or_else(PoisonError::into_inner);
        (keys, disk)
    }
}

/// Parse the key file, or `None` if it doesn't exist.
fn read_key_file(path: &Path) -> Result<Option<KeyMap>, ChatError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ChatError::Config(format!(
                "Could not read key file {}: {}",
                path.display(),
                e
            )));
        }
    };

    let mut keys: KeyMap = serde_json::from_str(&raw)
        .map_err(|e| ChatError::Config(format!("Invalid key file {}: {}", path.display(), e)))?;
    for (key, record) in keys.iter_mut() {
        if record.max_uses == 0 {
            return Err(ChatError::Config(format!(
                "Key for user '{}' in {} must have max_uses greater than 0",
                record.user_id,
                path.display()
            )));
        }
        record.key = key.clone();
    }
    Ok(Some(keys))
}

fn default_keys(max_uses: u32) -> KeyMap {
    let key = generate_key();
    let record = UserKeyRecord::new(&key, max_uses, "default", "Generated on first run");
    BTreeMap::from([(key, record)])
}

/// Write to a temp file next to `path` and rename it over the
/// existing file so readers never see a partial file.
fn write_atomic(path: &Path, keys: &KeyMap) -> Result<(), ChatError> {
    let persist = || -> Result<(), anyhow::Error> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let json = serde_json::to_string_pretty(keys)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path)?;
        Ok(())
    };

    persist().map_err(|e| {
        tracing::error!(
            "Failed to write key file {}. In-memory usage counts may now differ from disk: {}",
            path.display(),
            e
        );
        ChatError::Persistence(e.to_string())
    })
}
