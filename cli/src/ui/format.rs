//! One-line renderings of peers and history items.

use peerclip_core::sync::dispatcher::preview;
use peerclip_core::{ItemKind, Peer, TransferItem};

pub fn print_peer(peer: &Peer) {
    println!(
        "\x1b[1;32m⬤\x1b[0m \x1b[1m{}\x1b[0m  {}  \x1b[2m{}\x1b[0m",
        peer.name,
        peer.socket_addr(),
        peer.network_name
    );
}

pub fn print_item(item: &TransferItem, now: u64) {
    let summary = match item.kind {
        ItemKind::File => format!("📁 {}", item.file_name.as_deref().unwrap_or(&item.id)),
        _ => format!("📋 \"{}\"", preview(&item.content)),
    };
    println!(
        "{:>9}  {:<16} {}",
        item.age_label(now),
        item.origin_device,
        summary
    );
}
