//! One-shot file send.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::timeout;

use peerclip_core::clipboard::MemoryClipboard;
use peerclip_core::history::JsonHistory;
use peerclip_core::notify::SilentNotifier;
use peerclip_core::sync::Collaborators;
use peerclip_core::{Config, ConnectionManager, DeviceIdentity, Message, Peer, PeerclipService, SyncDispatcher};

const ACK_WAIT: Duration = Duration::from_secs(10);

/// Pair with `peer`, send `path` and wait for the file acknowledgment.
pub async fn send_file(device_name: String, config: Config, peer: IpAddr, path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("path has no file name")?;

    let collaborators = Collaborators {
        clipboard: Arc::new(MemoryClipboard::new()),
        history: Arc::new(JsonHistory::open(PeerclipService::history_path(&config))?),
        notifier: Arc::new(SilentNotifier),
        files: None,
    };

    let target = Peer::at(peer).with_port(config.port);
    let (manager, mut inbound) = ConnectionManager::new(config, DeviceIdentity::new(device_name));
    manager.try_connect(&target).await?;

    let (dispatcher, _events) = SyncDispatcher::new(manager.clone(), collaborators);
    let item = dispatcher.send_file(path, &name, &bytes).await?;
    println!("\x1b[1;34m📤\x1b[0m Sent {} ({} bytes)", name, bytes.len());

    let acked = timeout(ACK_WAIT, async {
        while let Some(message) = inbound.recv().await {
            if let Message::FileAck { item_id, .. } = message {
                if item_id == item.id {
                    return true;
                }
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    if acked {
        println!("\x1b[1;32m✓\x1b[0m Peer confirmed receipt");
    } else {
        println!("\x1b[1;33m!\x1b[0m No acknowledgment from peer");
    }

    manager.disconnect().await;
    Ok(())
}
