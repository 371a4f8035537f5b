//! Peerclip Core - LAN clipboard and file sync between two devices
//!
//! This library provides the peer connection subsystem: active subnet
//! discovery, a pairing handshake, heartbeat liveness, automatic
//! reconnection, and a typed, length-framed JSON protocol for moving
//! clipboard text and files with acknowledgment.

pub mod clipboard;
pub mod discovery;
pub mod files;
pub mod history;
pub mod notify;
pub mod protocol;
pub mod service;
pub mod sync;

mod error;
mod peer;

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{Error, Result};

/// How this device presents itself to peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable identifier, the host name by default
    pub id: String,
    pub name: String,
    /// Name of the local network this device is on
    pub network_name: String,
}

impl DeviceIdentity {
    /// Create an identity whose id and name are both `name`, reporting the
    /// local interface as the network name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let network_name = discovery::local_network()
            .map(|network| network.interface)
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            id: name.clone(),
            name,
            network_name,
        }
    }

    /// Identity named after this machine's host name
    pub fn from_hostname() -> Self {
        Self::new(default_device_name())
    }

    pub fn with_network_name(mut self, network_name: impl Into<String>) -> Self {
        self.network_name = network_name.into();
        self
    }
}

/// Host name of this machine, or a fixed fallback
pub fn default_device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "peerclip-device".to_string())
}

/// Configuration for the Peerclip service
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on and to dial on peers
    pub port: u16,
    /// Address the listener binds to
    pub bind_addr: IpAddr,
    pub heartbeat_interval: Duration,
    pub reconnect_interval: Duration,
    /// Handshake deadline for a fresh connect
    pub pair_timeout: Duration,
    /// Handshake deadline for a reconnection attempt
    pub reconnect_pair_timeout: Duration,
    pub discovery: discovery::DiscoveryConfig,
    pub clipboard_poll_interval: Duration,
    /// Path to store history and received files
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        use protocol::constants::*;

        Self {
            port: DEFAULT_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_interval: RECONNECT_INTERVAL,
            pair_timeout: PAIR_TIMEOUT,
            reconnect_pair_timeout: RECONNECT_PAIR_TIMEOUT,
            discovery: discovery::DiscoveryConfig::default(),
            clipboard_poll_interval: Duration::from_millis(CLIPBOARD_POLL_INTERVAL_MS),
            data_dir: dirs_home().join(".peerclip"),
        }
    }
}

fn dirs_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// Re-export key types for convenience
pub use discovery::{Discovery, DiscoveryConfig};
pub use peer::Peer;
pub use protocol::{ItemKind, Message, TransferItem};
pub use service::{PeerclipService, ServiceEvent};
pub use sync::{ConnectionManager, ConnectionState, Status, SyncDispatcher, SyncEvent};
