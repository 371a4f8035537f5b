//! Sync dispatcher: local content to the wire, wire messages to local effects
//!
//! Sends are fire-and-forget; acknowledgments are reported but never drive
//! retries. Inbound items are applied at most once per `(origin, id)`, and
//! acked on every delivery.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::clipboard::{self, ClipboardAccess, ContentHash};
use crate::files::FileStore;
use crate::history::HistoryStore;
use crate::notify::Notifier;
use crate::protocol::constants::RECENT_ITEM_CAPACITY;
use crate::protocol::{ItemIdGenerator, ItemKind, Message, TransferItem};
use crate::sync::manager::ConnectionManager;
use crate::{Error, Result};

/// Host services the dispatcher drives
#[derive(Clone)]
pub struct Collaborators {
    pub clipboard: Arc<dyn ClipboardAccess>,
    pub history: Arc<dyn HistoryStore>,
    pub notifier: Arc<dyn Notifier>,
    /// When set, received files are written to disk before being reported
    pub files: Option<Arc<dyn FileStore>>,
}

/// Events from the dispatcher
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Item transmitted to the peer
    Sent(TransferItem),
    /// Text received and applied to the clipboard
    TextReceived(TransferItem),
    /// File received; `file_path` is set if it was saved
    FileReceived(TransferItem),
    /// Peer confirmed receipt
    Acknowledged { item_id: String, kind: ItemKind },
}

/// Bounded memory of delivered items
#[derive(Debug, Default)]
struct RecentItems {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentItems {
    /// Returns false if `key` was already recorded
    fn insert(&mut self, key: String) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > RECENT_ITEM_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct SyncDispatcher {
    manager: ConnectionManager,
    collaborators: Collaborators,
    ids: Arc<ItemIdGenerator>,
    recent: Arc<Mutex<RecentItems>>,
    /// Hash of the text last sent or applied, so it is not echoed back
    last_synced: Arc<Mutex<Option<ContentHash>>>,
    events: mpsc::Sender<SyncEvent>,
}

impl SyncDispatcher {
    pub fn new(manager: ConnectionManager, collaborators: Collaborators) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let dispatcher = Self {
            manager,
            collaborators,
            ids: Arc::new(ItemIdGenerator::new()),
            recent: Arc::new(Mutex::new(RecentItems::default())),
            last_synced: Arc::new(Mutex::new(None)),
            events: tx,
        };
        (dispatcher, rx)
    }

    fn origin(&self) -> &str {
        &self.manager.identity().name
    }

    /// Send clipboard text to the peer
    pub async fn send_text(&self, content: &str) -> Result<TransferItem> {
        if content.is_empty() {
            return Err(Error::InvalidContent("empty text".to_string()));
        }

        let item = TransferItem::text(self.ids.next_id(), content, self.origin());
        self.manager.send(&Message::data(item.for_wire())?).await?;
        *self.last_synced.lock().await = Some(ContentHash::of_text(content));

        tracing::debug!("sent clipboard item {} ({} bytes)", item.id, content.len());
        self.record(&item).await;
        self.emit(SyncEvent::Sent(item.clone())).await;
        Ok(item)
    }

    /// Send a file to the peer. `path` stays local; only name and bytes
    /// are transmitted.
    pub async fn send_file(&self, path: impl Into<PathBuf>, name: &str, bytes: &[u8]) -> Result<TransferItem> {
        let item = TransferItem::file(self.ids.next_id(), name, bytes, Some(path.into()), self.origin());
        self.manager.send(&Message::data(item.for_wire())?).await?;

        tracing::info!("sent file {} ({} bytes)", name, bytes.len());
        self.record(&item).await;
        self.emit(SyncEvent::Sent(item.clone())).await;
        Ok(item)
    }

    /// Route one inbound message
    pub async fn handle(&self, message: Message) {
        match message {
            Message::ClipboardData { data, .. } => self.receive_text(data).await,
            Message::FileData { data, .. } => self.receive_file(data).await,
            Message::ClipboardAck { item_id, .. } => {
                tracing::debug!("peer acknowledged clipboard item {}", item_id);
                self.emit(SyncEvent::Acknowledged { item_id, kind: ItemKind::Text }).await;
            }
            Message::FileAck { item_id, .. } => {
                tracing::debug!("peer acknowledged file item {}", item_id);
                self.emit(SyncEvent::Acknowledged { item_id, kind: ItemKind::File }).await;
            }
            other => tracing::debug!("dispatcher ignoring {}", other.kind()),
        }
    }

    /// Consume inbound messages until the channel closes
    pub fn run(self, mut inbound: mpsc::Receiver<Message>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                self.handle(message).await;
            }
        })
    }

    /// Poll the local clipboard and send new text while connected
    pub fn watch_clipboard(&self, poll_interval: Duration) -> JoinHandle<()> {
        let dispatcher = self.clone();
        let (mut changes, monitor) =
            clipboard::start_monitor(self.collaborators.clipboard.clone(), poll_interval);

        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                if *dispatcher.last_synced.lock().await == Some(change.hash) {
                    continue;
                }
                if !dispatcher.manager.is_connected().await {
                    tracing::trace!("clipboard changed while disconnected, not sent");
                    continue;
                }
                if let Err(e) = dispatcher.send_text(&change.text).await {
                    tracing::warn!("failed to send clipboard: {}", e);
                }
            }
            monitor.abort();
        })
    }

    async fn receive_text(&self, item: TransferItem) {
        if self.first_delivery(&item).await {
            // Recorded before the write so the monitor never sees it as local
            *self.last_synced.lock().await = Some(ContentHash::of_text(&item.content));
            if let Err(e) = self.collaborators.clipboard.write_text(&item.content) {
                tracing::warn!("failed to apply clipboard item {}: {}", item.id, e);
            }
            tracing::debug!("received clipboard item {} from {}", item.id, item.origin_device);
            self.record(&item).await;
            self.collaborators
                .notifier
                .notify(&format!("Clipboard from {}", item.origin_device), &preview(&item.content));
            self.emit(SyncEvent::TextReceived(item.clone())).await;
        }
        self.acknowledge(&item).await;
    }

    async fn receive_file(&self, mut item: TransferItem) {
        item.file_path = None;
        if self.first_delivery(&item).await {
            if let Some(files) = self.collaborators.files.clone() {
                let received = item.clone();
                match tokio::task::spawn_blocking(move || files.materialize(&received)).await {
                    Ok(Ok(path)) => item.file_path = Some(path),
                    Ok(Err(e)) => tracing::warn!("failed to save file item {}: {}", item.id, e),
                    Err(e) => tracing::warn!("file writer for item {} failed: {}", item.id, e),
                }
            }
            let name = item.file_name.clone().unwrap_or_else(|| item.id.clone());
            tracing::info!("received file {} from {}", name, item.origin_device);
            self.record(&item).await;
            self.collaborators
                .notifier
                .notify(&format!("File from {}", item.origin_device), &name);
            self.emit(SyncEvent::FileReceived(item.clone())).await;
        }
        self.acknowledge(&item).await;
    }

    async fn first_delivery(&self, item: &TransferItem) -> bool {
        let fresh = self.recent.lock().await.insert(item.delivery_key());
        if !fresh {
            tracing::debug!("duplicate delivery of item {}, not applied again", item.id);
        }
        fresh
    }

    async fn acknowledge(&self, item: &TransferItem) {
        if let Err(e) = self.manager.send(&Message::ack(item)).await {
            tracing::debug!("could not acknowledge item {}: {}", item.id, e);
        }
    }

    /// Saved on a blocking thread; stores may write to disk
    async fn record(&self, item: &TransferItem) {
        let history = self.collaborators.history.clone();
        let entry = item.for_history();
        match tokio::task::spawn_blocking(move || history.save(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to record item {} in history: {}", item.id, e),
            Err(e) => tracing::warn!("history writer for item {} failed: {}", item.id, e),
        }
    }

    async fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event).await;
    }
}

/// First line of `text`, shortened for notifications
pub fn preview(text: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 50;

    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > MAX_PREVIEW_CHARS {
        format!("{}...", line.chars().take(MAX_PREVIEW_CHARS).collect::<String>())
    } else {
        line.to_string()
    }
}
