//! Transfer history storage
//!
//! The sync layer only needs `save`, `query` and `clear`; two stores are
//! provided, one in memory and one persisted as a JSON file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::protocol::TransferItem;
use crate::{Error, Result};

/// Maximum number of items a store keeps; oldest are dropped first
pub const DEFAULT_CAPACITY: usize = 500;

/// Record of transferred items
pub trait HistoryStore: Send + Sync {
    fn save(&self, item: &TransferItem) -> Result<()>;
    /// Up to `limit` items, newest first
    fn query(&self, limit: usize) -> Result<Vec<TransferItem>>;
    fn clear(&self) -> Result<()>;
}

fn newest_first(items: &[TransferItem], limit: usize) -> Vec<TransferItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.len().cmp(&a.id.len()))
            .then_with(|| b.id.cmp(&a.id))
    });
    sorted.truncate(limit);
    sorted
}

fn push_bounded(items: &mut Vec<TransferItem>, item: &TransferItem, capacity: usize) {
    items.retain(|existing| existing.delivery_key() != item.delivery_key());
    items.push(item.for_history());
    if items.len() > capacity {
        let excess = items.len() - capacity;
        items.drain(..excess);
    }
}

fn poisoned() -> Error {
    Error::History("history lock poisoned".to_string())
}

/// Volatile history
#[derive(Debug)]
pub struct MemoryHistory {
    items: Mutex<Vec<TransferItem>>,
    capacity: usize,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            capacity,
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistory {
    fn save(&self, item: &TransferItem) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        push_bounded(&mut items, item, self.capacity);
        Ok(())
    }

    fn query(&self, limit: usize) -> Result<Vec<TransferItem>> {
        let items = self.items.lock().map_err(|_| poisoned())?;
        Ok(newest_first(&items, limit))
    }

    fn clear(&self) -> Result<()> {
        self.items.lock().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

/// History persisted as a JSON array, rewritten on every change
#[derive(Debug)]
pub struct JsonHistory {
    path: PathBuf,
    items: Mutex<Vec<TransferItem>>,
    capacity: usize,
}

impl JsonHistory {
    /// Open the store at `path`, loading existing entries
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::History(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("loaded {} history item(s) from {}", items.len(), path.display());
        Ok(Self {
            path,
            items: Mutex::new(items),
            capacity: DEFAULT_CAPACITY,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &[TransferItem]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(items)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl HistoryStore for JsonHistory {
    fn save(&self, item: &TransferItem) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        push_bounded(&mut items, item, self.capacity);
        self.persist(&items)
    }

    fn query(&self, limit: usize) -> Result<Vec<TransferItem>> {
        let items = self.items.lock().map_err(|_| poisoned())?;
        Ok(newest_first(&items, limit))
    }

    fn clear(&self) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        items.clear();
        self.persist(&items)
    }
}
