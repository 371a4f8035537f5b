//! History commands.

use peerclip_core::history::{HistoryStore, JsonHistory};
use peerclip_core::protocol::now_millis;
use peerclip_core::{Config, PeerclipService};

use crate::ui::print_item;

pub fn show_history(config: &Config, limit: usize) -> anyhow::Result<()> {
    let history = JsonHistory::open(PeerclipService::history_path(config))?;
    let items = history.query(limit)?;

    if items.is_empty() {
        println!("History is empty.");
        return Ok(());
    }

    let now = now_millis();
    for item in &items {
        print_item(item, now);
    }
    Ok(())
}

pub fn clear_history(config: &Config) -> anyhow::Result<()> {
    let history = JsonHistory::open(PeerclipService::history_path(config))?;
    history.clear()?;
    println!("\x1b[1;32m✓\x1b[0m History cleared");
    Ok(())
}
