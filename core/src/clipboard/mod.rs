//! Clipboard access and change monitoring

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arboard::Clipboard as ArboardClipboard;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Host clipboard primitives
pub trait ClipboardAccess: Send + Sync {
    /// Current text, `None` when the clipboard holds no text
    fn read_text(&self) -> Result<Option<String>>;
    fn write_text(&self, text: &str) -> Result<()>;
}

/// The operating system clipboard
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardAccess for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        let mut clipboard = ArboardClipboard::new()
            .map_err(|e| Error::Clipboard(e.to_string()))?;

        match clipboard.get_text() {
            Ok(text) if !text.is_empty() => Ok(Some(text)),
            Ok(_) => Ok(None),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(Error::Clipboard(e.to_string())),
        }
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut clipboard = ArboardClipboard::new()
            .map_err(|e| Error::Clipboard(e.to_string()))?;

        clipboard.set_text(text)
            .map_err(|e| Error::Clipboard(e.to_string()))
    }
}

/// In-process clipboard, for headless hosts and tests
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    text: Option<String>,
    writes: usize,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_text` calls so far
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|state| state.writes).unwrap_or_default()
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        let state = self.state.lock()
            .map_err(|_| Error::Clipboard("clipboard lock poisoned".to_string()))?;
        Ok(state.text.clone().filter(|text| !text.is_empty()))
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock()
            .map_err(|_| Error::Clipboard("clipboard lock poisoned".to_string()))?;
        state.text = Some(text.to_string());
        state.writes += 1;
        Ok(())
    }
}

/// SHA256 hash of clipboard text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn of_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"text:");
        hasher.update(text.as_bytes());
        ContentHash(hasher.finalize().into())
    }
}

/// Clipboard change event
#[derive(Debug, Clone)]
pub struct ClipboardChange {
    pub text: String,
    pub hash: ContentHash,
}

/// Detects clipboard changes between polls by content hash
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_hash: Option<ContentHash>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current content without reporting it as a change
    pub fn prime(&mut self, clipboard: &dyn ClipboardAccess) {
        if let Ok(Some(text)) = clipboard.read_text() {
            self.last_hash = Some(ContentHash::of_text(&text));
        }
    }

    /// Check if clipboard content has changed since last check
    pub fn check(&mut self, clipboard: &dyn ClipboardAccess) -> Result<Option<ClipboardChange>> {
        match clipboard.read_text()? {
            Some(text) => {
                let hash = ContentHash::of_text(&text);
                if self.last_hash == Some(hash) {
                    return Ok(None);
                }
                self.last_hash = Some(hash);
                Ok(Some(ClipboardChange { text, hash }))
            }
            None => {
                self.last_hash = None;
                Ok(None)
            }
        }
    }
}

/// Start a clipboard monitoring task that sends changes to a channel.
/// Content present when monitoring starts is not reported.
pub fn start_monitor(
    clipboard: Arc<dyn ClipboardAccess>,
    poll_interval: Duration,
) -> (mpsc::Receiver<ClipboardChange>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);

    let handle = tokio::spawn(async move {
        let mut detector = ChangeDetector::new();
        detector.prime(clipboard.as_ref());

        loop {
            tokio::time::sleep(poll_interval).await;

            match detector.check(clipboard.as_ref()) {
                Ok(Some(change)) => {
                    if tx.send(change).await.is_err() {
                        // Receiver dropped, stop monitoring
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("clipboard read error: {}", e);
                }
            }
        }
    });

    (rx, handle)
}
