//! Active subnet discovery for finding peers on the local network
//!
//! Every host of the local `/24` is probed on the well-known port: a short
//! connect, a `discovery` message, and a brief wait for
//! `discovery_response`. Probes run concurrently under a fixed cap and each
//! carries its own deadline, so unreachable addresses never stall the scan.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::peer::Peer;
use crate::protocol::constants::{
    MAX_CONCURRENT_PROBES, PROBE_CONNECT_TIMEOUT, PROBE_RESPONSE_TIMEOUT,
};
use crate::protocol::Message;
use crate::sync::PeerConnection;
use crate::{DeviceIdentity, Error, Result};

/// Probe timing and fan-out
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_concurrent_probes: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout: PROBE_CONNECT_TIMEOUT,
            response_timeout: PROBE_RESPONSE_TIMEOUT,
            max_concurrent_probes: MAX_CONCURRENT_PROBES,
        }
    }
}

impl DiscoveryConfig {
    /// Hard deadline for one probe, start to finish
    pub fn probe_budget(&self) -> Duration {
        self.connect_timeout + self.response_timeout
    }
}

/// The interface this device uses on the LAN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNetwork {
    /// Interface name, reported to peers as the network name
    pub interface: String,
    pub address: Ipv4Addr,
}

/// Subnet scanner
pub struct Discovery {
    identity: Arc<DeviceIdentity>,
    config: DiscoveryConfig,
    port: u16,
}

impl Discovery {
    pub fn new(identity: Arc<DeviceIdentity>, config: DiscoveryConfig, port: u16) -> Self {
        Self { identity, config, port }
    }

    /// Scan the local `/24`. Returns an empty list when the local network
    /// cannot be determined.
    pub async fn discover(&self) -> Vec<Peer> {
        let network = match local_network() {
            Ok(network) => network,
            Err(e) => {
                tracing::warn!("discovery skipped: {}", e);
                return Vec::new();
            }
        };

        tracing::info!(
            "scanning {}/24 on {} (port {})",
            network.address,
            network.interface,
            self.port
        );
        self.scan(subnet_hosts(network.address)).await
    }

    /// Probe an explicit list of addresses
    pub async fn scan(&self, candidates: Vec<IpAddr>) -> Vec<Peer> {
        let identity = self.identity.clone();
        let config = self.config.clone();
        let port = self.port;

        let peers = scan_with(
            candidates,
            self.config.max_concurrent_probes,
            self.config.probe_budget(),
            move |ip| probe(SocketAddr::new(ip, port), identity.clone(), config.clone()),
        )
        .await;

        tracing::info!("discovery found {} peer(s)", peers.len());
        peers
    }
}

/// Run `probe` against every candidate with at most `max_concurrent` in
/// flight, each bounded by `budget`. Failed and timed-out probes are
/// skipped. Results are ordered by address.
pub async fn scan_with<F, Fut>(
    candidates: Vec<IpAddr>,
    max_concurrent: usize,
    budget: Duration,
    probe: F,
) -> Vec<Peer>
where
    F: Fn(IpAddr) -> Fut,
    Fut: Future<Output = Result<Peer>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut probes = JoinSet::new();

    for ip in candidates {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let attempt = probe(ip);
        probes.spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(budget, attempt).await {
                Ok(Ok(peer)) => Some(peer),
                Ok(Err(e)) => {
                    tracing::trace!("probe {} failed: {}", ip, e);
                    None
                }
                Err(_) => {
                    tracing::trace!("probe {} timed out", ip);
                    None
                }
            }
        });
    }

    let mut peers = Vec::new();
    while let Some(joined) = probes.join_next().await {
        if let Ok(Some(peer)) = joined {
            peers.push(peer);
        }
    }
    peers.sort_by_key(|peer| peer.address);
    peers
}

/// Probe one address over TCP
pub async fn probe(
    addr: SocketAddr,
    identity: Arc<DeviceIdentity>,
    config: DiscoveryConfig,
) -> Result<Peer> {
    let mut conn = PeerConnection::dial(addr, config.connect_timeout).await?;
    conn.send(&Message::Discovery {
        device_name: identity.name.clone(),
        network_name: identity.network_name.clone(),
    })
    .await?;

    let reply = tokio::time::timeout(config.response_timeout, conn.recv())
        .await
        .map_err(|_| Error::PeerUnreachable(format!("{}: no discovery response", addr)))??;

    match reply {
        Message::DiscoveryResponse {
            device_id,
            device_name,
            network_name,
        } => {
            tracing::debug!("discovered {} at {}", device_name, addr);
            Ok(Peer::discovered(
                device_id,
                device_name,
                network_name,
                addr.ip(),
                addr.port(),
            ))
        }
        other => Err(Error::Protocol(format!(
            "expected discovery_response, got {}",
            other.kind()
        ))),
    }
}

/// All other hosts of the `/24` containing `local`
pub fn subnet_hosts(local: Ipv4Addr) -> Vec<IpAddr> {
    let [a, b, c, own] = local.octets();
    (1..=254u8)
        .filter(|host| *host != own)
        .map(|host| IpAddr::V4(Ipv4Addr::new(a, b, c, host)))
        .collect()
}

/// Pick the IPv4 interface used on the LAN, preferring private ranges
pub fn local_network() -> Result<LocalNetwork> {
    let interfaces =
        get_if_addrs::get_if_addrs().map_err(|e| Error::NetworkUnavailable(e.to_string()))?;

    let mut candidates: Vec<LocalNetwork> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(address) => Some(LocalNetwork {
                interface: iface.name,
                address,
            }),
            IpAddr::V6(_) => None,
        })
        .collect();

    candidates.sort_by_key(|network| !network.address.is_private());
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::NetworkUnavailable("no IPv4 interface".to_string()))
}

/// Get local IP addresses (non-loopback)
pub fn get_local_ips() -> Vec<IpAddr> {
    let mut ips = Vec::new();

    if let Ok(interfaces) = get_if_addrs::get_if_addrs() {
        for iface in interfaces {
            if !iface.is_loopback() {
                ips.push(iface.ip());
            }
        }
    }

    ips
}
