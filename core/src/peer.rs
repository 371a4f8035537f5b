//! Remote device records

use std::net::{IpAddr, SocketAddr};

use crate::protocol::constants::DEFAULT_PORT;

/// A remote device, discovered or connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Host name of the remote process
    pub id: String,
    pub name: String,
    /// Network the peer reported at discovery or pairing time
    pub network_name: String,
    pub address: IpAddr,
    /// TCP port the peer listens on
    pub port: u16,
    /// True only while a live socket to this peer exists
    pub connected: bool,
    /// True once a handshake with this peer has succeeded
    pub paired: bool,
}

impl Peer {
    /// A peer seen by discovery, neither connected nor paired
    pub fn discovered(
        id: impl Into<String>,
        name: impl Into<String>,
        network_name: impl Into<String>,
        address: IpAddr,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            network_name: network_name.into(),
            address,
            port,
            connected: false,
            paired: false,
        }
    }

    /// A peer known only by address, on the well-known port
    pub fn at(address: IpAddr) -> Self {
        let label = address.to_string();
        Self::discovered(label.clone(), label, String::new(), address, DEFAULT_PORT)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
