//! High-level Peerclip service that owns and wires all components
//!
//! One `PeerclipService` is built at process start and handed to whatever
//! needs the connection; there is no global state.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::discovery::Discovery;
use crate::peer::Peer;
use crate::protocol::{AutoAccept, Message, PairingGate, TransferItem};
use crate::sync::{Collaborators, ConnectionManager, ConnectionState, Status, SyncDispatcher, SyncEvent};
use crate::{Config, DeviceIdentity, Error, Result};

/// Events emitted by the service
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Connection state changed
    Status(Status),
    /// Payload sent, received or acknowledged
    Sync(SyncEvent),
}

/// Channels created at construction, consumed by `start`
struct Pending {
    inbound: mpsc::Receiver<Message>,
    status: mpsc::UnboundedReceiver<Status>,
    sync: mpsc::Receiver<SyncEvent>,
}

/// Main Peerclip service
pub struct PeerclipService {
    config: Config,
    manager: ConnectionManager,
    dispatcher: SyncDispatcher,
    discovery: Discovery,
    collaborators: Collaborators,
    pending: Option<Pending>,
    tasks: Vec<JoinHandle<()>>,
}

impl PeerclipService {
    /// Create a service that auto-accepts pairing requests
    pub fn new(config: Config, identity: DeviceIdentity, collaborators: Collaborators) -> Self {
        Self::build(config, identity, collaborators, Arc::new(AutoAccept))
    }

    /// Create a service whose listener asks `gate` before accepting a pairing
    pub fn with_pairing_gate(
        config: Config,
        identity: DeviceIdentity,
        collaborators: Collaborators,
        gate: impl PairingGate + 'static,
    ) -> Self {
        Self::build(config, identity, collaborators, Arc::new(gate))
    }

    fn build(
        config: Config,
        identity: DeviceIdentity,
        collaborators: Collaborators,
        gate: Arc<dyn PairingGate>,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (manager, inbound) = ConnectionManager::new(config.clone(), identity);
        let manager = manager
            .with_status_callback(move |status| {
                let _ = status_tx.send(status.clone());
            })
            .with_shared_gate(gate);

        let discovery = Discovery::new(manager.identity_arc(), config.discovery.clone(), config.port);
        let (dispatcher, sync_rx) = SyncDispatcher::new(manager.clone(), collaborators.clone());

        Self {
            config,
            manager,
            dispatcher,
            discovery,
            collaborators,
            pending: Some(Pending {
                inbound,
                status: status_rx,
                sync: sync_rx,
            }),
            tasks: Vec::new(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.manager.identity().name
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.manager.identity()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The connection manager, for hosts that need direct access
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Start listening, routing inbound payloads and, when `watch_clipboard`
    /// is set, sending local clipboard changes. Returns the event channel.
    pub async fn start(&mut self, watch_clipboard: bool) -> Result<mpsc::Receiver<ServiceEvent>> {
        if self.pending.is_none() {
            return Err(Error::AlreadyRunning);
        }
        let addr = self.manager.start_listening().await?;
        let pending = self.pending.take().ok_or(Error::AlreadyRunning)?;
        let (tx, rx) = mpsc::channel(64);

        self.tasks.push(self.dispatcher.clone().run(pending.inbound));

        // Forward status changes
        let tx_status = tx.clone();
        let mut status_rx = pending.status;
        self.tasks.push(tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                if tx_status.send(ServiceEvent::Status(status)).await.is_err() {
                    break;
                }
            }
        }));

        // Forward sync events
        let tx_sync = tx;
        let mut sync_rx = pending.sync;
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = sync_rx.recv().await {
                if tx_sync.send(ServiceEvent::Sync(event)).await.is_err() {
                    break;
                }
            }
        }));

        if watch_clipboard {
            self.tasks.push(self.dispatcher.watch_clipboard(self.config.clipboard_poll_interval));
        }

        tracing::info!("peerclip service started on {}", addr);
        Ok(rx)
    }

    /// Stop background work and close the connection
    pub async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.manager.stop_listening().await;
        if self.manager.state().await != ConnectionState::Idle {
            self.manager.disconnect().await;
        }
    }

    pub async fn listen_addr(&self) -> Result<SocketAddr> {
        self.manager.start_listening().await
    }

    /// Scan the local subnet for peers
    pub async fn discover(&self) -> Vec<Peer> {
        self.discovery.discover().await
    }

    pub async fn connect(&self, peer: &Peer) -> bool {
        self.manager.connect(peer).await
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await
    }

    pub async fn forget_peer(&self) {
        self.manager.forget_peer().await
    }

    pub async fn state(&self) -> ConnectionState {
        self.manager.state().await
    }

    pub async fn peer(&self) -> Option<Peer> {
        self.manager.peer().await
    }

    pub async fn send_text(&self, content: &str) -> Result<TransferItem> {
        self.dispatcher.send_text(content).await
    }

    /// Read a file from disk and send it
    pub async fn send_file(&self, path: &Path) -> Result<TransferItem> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::File(format!("{} has no file name", path.display())))?;
        self.dispatcher.send_file(path, &name, &bytes).await
    }

    /// Send the local clipboard's current text
    pub async fn send_clipboard(&self) -> Result<TransferItem> {
        let text = self
            .collaborators
            .clipboard
            .read_text()?
            .ok_or_else(|| Error::InvalidContent("clipboard holds no text".to_string()))?;
        self.dispatcher.send_text(&text).await
    }

    pub fn history(&self, limit: usize) -> Result<Vec<TransferItem>> {
        self.collaborators.history.query(limit)
    }

    pub fn clear_history(&self) -> Result<()> {
        self.collaborators.history.clear()
    }

    /// Open a received file with the default application
    pub fn open_file(&self, path: &Path) -> Result<()> {
        let files = self
            .collaborators
            .files
            .as_ref()
            .ok_or_else(|| Error::File("no file store configured".to_string()))?;
        files.open(path)
    }

    /// Where history is kept under the configured data directory
    pub fn history_path(config: &Config) -> PathBuf {
        config.data_dir.join("history.json")
    }
}
