use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::record::{Person, SessionRecord, sanitize, sort_records};

/// Fixed storage key for the cache mirror. The file is `<key>.json` inside
/// the cache directory.
pub const CACHE_KEY: &str = "liveData_local_fallback_v1";

/// Both per-person collections, each kept in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub oumiya: Vec<SessionRecord>,
    pub abdoulaye: Vec<SessionRecord>,
}

impl CacheSnapshot {
    pub fn collection(&self, person: Person) -> &[SessionRecord] {
        match person {
            Person::Oumiya => &self.oumiya,
            Person::Abdoulaye => &self.abdoulaye,
        }
    }

    fn collection_mut(&mut self, person: Person) -> &mut Vec<SessionRecord> {
        match person {
            Person::Oumiya => &mut self.oumiya,
            Person::Abdoulaye => &mut self.abdoulaye,
        }
    }

    /// Append and re-sort.
    pub fn push(&mut self, person: Person, record: SessionRecord) {
        let records = self.collection_mut(person);
        records.push(record);
        sort_records(records);
    }

    /// Swap in a full collection, e.g. after a remote list. Sorted on entry.
    pub fn replace(&mut self, person: Person, mut records: Vec<SessionRecord>) {
        sort_records(&mut records);
        *self.collection_mut(person) = records;
    }

    pub fn clear(&mut self) {
        self.oumiya.clear();
        self.abdoulaye.clear();
    }

    pub fn len(&self) -> usize {
        self.oumiya.len() + self.abdoulaye.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode a stored mirror. Anything unexpected degrades to empty
    /// collections; records are sanitized and re-sorted.
    pub fn from_json(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };
        let mut snapshot = Self::default();
        for person in Person::ALL {
            if let Some(rows) = value.get(person.as_str()).and_then(Value::as_array) {
                snapshot.replace(person, rows.iter().map(sanitize).collect());
            }
        }
        snapshot
    }
}

/// Durable shadow of the in-memory snapshot. Best effort: reads degrade to
/// empty, write failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    /// Cache stored as `<dir>/<CACHE_KEY>.json`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{CACHE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CacheSnapshot {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => CacheSnapshot::from_json(&raw),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("cache: unreadable {}: {e}", self.path.display());
                }
                CacheSnapshot::default()
            }
        }
    }

    /// Swallows failures; the in-memory snapshot stays authoritative.
    pub fn save(&self, snapshot: &CacheSnapshot) {
        if let Err(e) = self.try_save(snapshot) {
            tracing::debug!("cache: write skipped: {e}");
        }
    }

    pub fn try_save(&self, snapshot: &CacheSnapshot) -> Result<(), SyncError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| SyncError::Persistence(format!("encode: {e}")))?;
        atomic_write(&self.path, &json).map_err(|e| SyncError::Persistence(e.to_string()))
    }
}

/// Temp file + rename so a crash never leaves a half-written mirror.
fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content.as_bytes())?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
