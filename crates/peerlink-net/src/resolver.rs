//! Peer index resolution.
//!
//! Every remote node is known to the rest of the system by a small stable
//! number. The resolver maps a static key to that number; the core never
//! invents one itself. [`PeerBook`] is the default resolver: an in-memory
//! book of key → index assignments, optionally persisted as JSON so indices
//! survive restarts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use peerlink_core::{PeerIndex, PublicKey};

pub trait PeerIndexResolver: Send + Sync {
    /// Index for `key`. The same key always yields the same index.
    /// `host_hint` is the dialed `host:port`, or None for inbound sessions.
    fn resolve(&self, key: &PublicKey, host_hint: Option<&str>) -> Result<PeerIndex, ResolveError>;

    /// What the resolver knows about `index`, if anything.
    fn lookup(&self, index: PeerIndex) -> Option<PeerRecord>;
}

/// One entry of the peer book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub index: PeerIndex,
    pub key: PublicKey,
    /// Last `host:port` this peer was dialed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read peer book {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse peer book {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("peer index space exhausted")]
    Exhausted,
}

/// Default resolver. Indices start at 1 and are never reused.
pub struct PeerBook {
    by_key: DashMap<PublicKey, PeerRecord>,
    by_index: DashMap<PeerIndex, PublicKey>,
    next_index: AtomicU32,
    persist_path: Option<PathBuf>,
    save_lock: Mutex<()>,
}

impl Default for PeerBook {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerBook {
    /// In-memory book.
    pub fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            by_index: DashMap::new(),
            next_index: AtomicU32::new(1),
            persist_path: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Book persisted at `path`, loading existing assignments if the file
    /// exists. A missing file is an empty book.
    pub fn with_persistence(path: PathBuf) -> Result<Self, ResolveError> {
        let mut book = Self::new();
        let records: Vec<PeerRecord> = match std::fs::read_to_string(&path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| ResolveError::Parse(path.clone(), e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ResolveError::Read(path, e)),
        };

        let mut next = 1;
        for record in records {
            next = next.max(record.index.saturating_add(1));
            book.by_index.insert(record.index, record.key);
            book.by_key.insert(record.key, record);
        }
        book.next_index = AtomicU32::new(next);
        tracing::info!(path = %path.display(), peers = book.by_key.len(), "peer book loaded");
        book.persist_path = Some(path);
        Ok(book)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// All records, ordered by index.
    pub fn records(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.by_key.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| r.index);
        records
    }

    fn allocate(&self) -> Result<PeerIndex, ResolveError> {
        self.next_index
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| ResolveError::Exhausted)
    }

    fn save_to_disk(&self) {
        let Some(path) = self.persist_path.as_ref() else {
            return;
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        let json = match serde_json::to_string_pretty(&self.records()) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize peer book");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, path = %path.display(), "failed to create peer book directory");
                return;
            }
        }
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, json).and_then(|_| std::fs::rename(&tmp, path)) {
            tracing::warn!(error = %e, path = %path.display(), "failed to persist peer book");
        }
    }
}

impl PeerIndexResolver for PeerBook {
    fn resolve(&self, key: &PublicKey, host_hint: Option<&str>) -> Result<PeerIndex, ResolveError> {
        let hint = host_hint.filter(|h| !h.is_empty());
        let (index, changed) = match self.by_key.entry(*key) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                match hint {
                    Some(host) if record.host.as_deref() != Some(host) => {
                        record.host = Some(host.to_string());
                        (record.index, true)
                    }
                    _ => (record.index, false),
                }
            }
            Entry::Vacant(entry) => {
                let index = self.allocate()?;
                self.by_index.insert(index, *key);
                entry.insert(PeerRecord {
                    index,
                    key: *key,
                    host: hint.map(str::to_string),
                });
                tracing::debug!(peer = index, key = %key, "assigned peer index");
                (index, true)
            }
        };
        if changed {
            self.save_to_disk();
        }
        Ok(index)
    }

    fn lookup(&self, index: PeerIndex) -> Option<PeerRecord> {
        let key = *self.by_index.get(&index)?;
        self.by_key.get(&key).map(|r| r.value().clone())
    }
}
