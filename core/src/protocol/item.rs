//! Transfer items: the unit of synchronized content

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Kind of content an item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    File,
    /// Reserved, never produced by the core protocol
    Image,
}

/// Clipboard or file payload, either in flight or at rest in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub id: String,
    pub kind: ItemKind,
    /// Literal text, or base64-encoded bytes for files
    pub content: String,
    /// Local path; only set when the file exists on this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub created_at: u64,
    pub origin_device: String,
}

impl TransferItem {
    /// Create a text item
    pub fn text(id: String, content: impl Into<String>, origin_device: impl Into<String>) -> Self {
        Self {
            id,
            kind: ItemKind::Text,
            content: content.into(),
            file_path: None,
            file_name: None,
            created_at: now_millis(),
            origin_device: origin_device.into(),
        }
    }

    /// Create a file item from raw bytes
    pub fn file(
        id: String,
        file_name: impl Into<String>,
        bytes: &[u8],
        file_path: Option<PathBuf>,
        origin_device: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind: ItemKind::File,
            content: BASE64.encode(bytes),
            file_path,
            file_name: Some(file_name.into()),
            created_at: now_millis(),
            origin_device: origin_device.into(),
        }
    }

    /// Decode the base64 payload of a file item
    pub fn file_bytes(&self) -> Result<Vec<u8>> {
        if self.kind != ItemKind::File {
            return Err(Error::InvalidContent(format!("item {} is not a file", self.id)));
        }
        BASE64
            .decode(self.content.as_bytes())
            .map_err(|e| Error::InvalidContent(format!("bad file payload: {}", e)))
    }

    /// Copy suitable for transmission; local paths never leave the device
    pub fn for_wire(&self) -> Self {
        Self {
            file_path: None,
            ..self.clone()
        }
    }

    /// Copy kept in history. A file already saved on this device keeps its
    /// path and drops the encoded bytes.
    pub fn for_history(&self) -> Self {
        let saved_file = self.kind == ItemKind::File && self.file_path.is_some();
        Self {
            id: self.id.clone(),
            kind: self.kind,
            content: if saved_file { String::new() } else { self.content.clone() },
            file_path: self.file_path.clone(),
            file_name: self.file_name.clone(),
            created_at: self.created_at,
            origin_device: self.origin_device.clone(),
        }
    }

    /// Key used to recognize the same item delivered twice
    pub fn delivery_key(&self) -> String {
        format!("{}:{}", self.origin_device, self.id)
    }

    /// Human-readable age relative to `now` (milliseconds since epoch)
    pub fn age_label(&self, now: u64) -> String {
        let secs = now.saturating_sub(self.created_at) / 1000;
        match secs {
            0..=59 => "just now".to_string(),
            60..=3599 => format!("{}m ago", secs / 60),
            3600..=86_399 => format!("{}h ago", secs / 3600),
            _ => format!("{}d ago", secs / 86_400),
        }
    }
}

/// Time-based item ids, strictly increasing within one process
#[derive(Debug, Default)]
pub struct ItemIdGenerator {
    last: AtomicU64,
}

impl ItemIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id: the current time in milliseconds, bumped past the previous id
    /// when two items are created within the same millisecond
    pub fn next_id(&self) -> String {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now_millis().max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => prev = actual,
            }
        }
    }
}
