//! Run command implementation.

use std::net::IpAddr;
use std::sync::Arc;

use peerclip_core::clipboard::SystemClipboard;
use peerclip_core::files::DownloadDir;
use peerclip_core::history::JsonHistory;
use peerclip_core::notify::LogNotifier;
use peerclip_core::sync::{dispatcher::preview, Collaborators};
use peerclip_core::{Config, DeviceIdentity, Peer, PeerclipService, ServiceEvent, Status, SyncEvent};

use crate::ui::{print_banner, print_peer};

/// Run the peerclip service until Ctrl+C.
pub async fn run_service(
    device_name: String,
    config: Config,
    peer: Option<IpAddr>,
    auto: bool,
) -> anyhow::Result<()> {
    print_banner();

    let downloads = DownloadDir::platform_default();
    let collaborators = Collaborators {
        clipboard: Arc::new(SystemClipboard),
        history: Arc::new(JsonHistory::open(PeerclipService::history_path(&config))?),
        notifier: Arc::new(LogNotifier),
        files: Some(Arc::new(downloads.clone())),
    };

    let port = config.port;
    let mut service = PeerclipService::new(config, DeviceIdentity::new(device_name), collaborators);

    println!("\x1b[1mDevice:\x1b[0m  {}", service.device_name());
    println!("\x1b[1mNetwork:\x1b[0m {}", service.identity().network_name);
    println!("\x1b[1mFiles:\x1b[0m   {}", downloads.root().display());

    let mut events = service.start(true).await?;
    println!(
        "\x1b[1;32m✓\x1b[0m Listening on {}",
        service.listen_addr().await?
    );

    if let Some(ip) = peer {
        let target = Peer::at(ip).with_port(port);
        if !service.connect(&target).await {
            eprintln!("\x1b[1;31m✗\x1b[0m Could not pair with {}", target.socket_addr());
        }
    } else if auto {
        println!("\x1b[2mScanning for peers...\x1b[0m");
        match service.discover().await.first() {
            Some(found) => {
                print_peer(found);
                if !service.connect(found).await {
                    eprintln!("\x1b[1;31m✗\x1b[0m Could not pair with {}", found.name);
                }
            }
            None => println!("No peers found, waiting for one to connect."),
        }
    }

    println!("\x1b[2mPress Ctrl+C to stop.\x1b[0m\n");

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = tx.blocking_send(());
    })?;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                handle_event(event);
            }
            _ = rx.recv() => {
                println!("\n\x1b[1;33mShutting down...\x1b[0m");
                break;
            }
        }
    }

    service.stop().await;
    Ok(())
}

/// Handle a service event and print appropriate output.
fn handle_event(event: ServiceEvent) {
    match event {
        ServiceEvent::Status(status @ (Status::Connected(_) | Status::Reconnected)) => {
            println!("\x1b[1;32m⬤\x1b[0m {}", status);
        }
        ServiceEvent::Status(status) => {
            println!("\x1b[1;31m⬤\x1b[0m {}", status);
        }
        ServiceEvent::Sync(SyncEvent::Sent(item)) => match &item.file_name {
            Some(name) => println!("\x1b[1;34m📤\x1b[0m Sent file {}", name),
            None => println!("\x1b[1;34m📤\x1b[0m Sent \"{}\"", preview(&item.content)),
        },
        ServiceEvent::Sync(SyncEvent::TextReceived(item)) => {
            println!(
                "\x1b[1;34m📋\x1b[0m Received from {}: \"{}\"",
                item.origin_device,
                preview(&item.content)
            );
        }
        ServiceEvent::Sync(SyncEvent::FileReceived(item)) => {
            let name = item.file_name.as_deref().unwrap_or(&item.id);
            match &item.file_path {
                Some(path) => println!("\x1b[1;34m📁\x1b[0m Received {} → {}", name, path.display()),
                None => println!("\x1b[1;34m📁\x1b[0m Received {} (not saved)", name),
            }
        }
        ServiceEvent::Sync(SyncEvent::Acknowledged { item_id, kind }) => {
            tracing::debug!("peer acknowledged {:?} item {}", kind, item_id);
        }
    }
}
