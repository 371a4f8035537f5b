//! Scan command implementation.

use std::sync::Arc;

use peerclip_core::{Config, DeviceIdentity, Discovery};

use crate::ui::print_peer;

/// Probe the local subnet and list responding peers.
pub async fn scan(device_name: String, config: Config) {
    let identity = Arc::new(DeviceIdentity::new(device_name));
    let discovery = Discovery::new(identity, config.discovery.clone(), config.port);

    println!("\x1b[2mScanning port {}...\x1b[0m", config.port);
    let peers = discovery.discover().await;

    if peers.is_empty() {
        println!("No peers found.");
        return;
    }
    for peer in &peers {
        print_peer(peer);
    }
}
