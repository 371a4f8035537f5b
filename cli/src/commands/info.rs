//! Info command implementation.

use peerclip_core::discovery::{get_local_ips, local_network};
use peerclip_core::{Config, DeviceIdentity, PeerclipService};

/// Display device information.
pub fn show_info(device_name: String, config: &Config) {
    let identity = DeviceIdentity::new(device_name);

    println!("\n\x1b[1mPeerclip Device Info\x1b[0m");
    println!("═══════════════════════════════════════");
    println!("\x1b[1mName:\x1b[0m        {}", identity.name);
    println!("\x1b[1mNetwork:\x1b[0m     {}", identity.network_name);
    println!("\x1b[1mPort:\x1b[0m        {}", config.port);
    println!(
        "\x1b[1mHistory:\x1b[0m     {}",
        PeerclipService::history_path(config).display()
    );

    match local_network() {
        Ok(network) => println!("\x1b[1mScan range:\x1b[0m  {}/24", network.address),
        Err(e) => println!("\x1b[1mScan range:\x1b[0m  \x1b[2m{}\x1b[0m", e),
    }

    println!("\n\x1b[1mLocal IPs:\x1b[0m");
    for ip in get_local_ips() {
        println!("  • {}", ip);
    }
    println!();
}
