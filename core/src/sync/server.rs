//! TCP listener for discovery probes and inbound pairing

use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::protocol::Message;
use crate::sync::connection::PeerConnection;
use crate::sync::manager::ConnectionManager;
use crate::{Error, Result};

/// Bound, not yet accepting, listener
pub struct SyncServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SyncServer {
    /// Bind to `addr:port`; port 0 picks an ephemeral port
    pub async fn bind(addr: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(addr, port))
            .await
            .map_err(|e| Error::Transport(format!("failed to bind {}:{}: {}", addr, port, e)))?;

        let local_addr = listener.local_addr()
            .map_err(|e| Error::Transport(e.to_string()))?;

        tracing::info!("sync server listening on {}", local_addr);

        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start accepting. Every socket is handled on its own task: its first
    /// frame decides whether it is a discovery probe or a pairing.
    pub fn start(self, manager: ConnectionManager) -> SyncServerHandle {
        let local_addr = self.local_addr;

        let task = tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, addr)) => {
                        tracing::debug!("incoming connection from {}", addr);
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, manager).await {
                                tracing::debug!("connection from {} ended: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("accept error: {}", e);
                    }
                }
            }
        });

        SyncServerHandle { local_addr, task }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, manager: ConnectionManager) -> Result<()> {
    let mut conn = PeerConnection::new(stream);
    let first = tokio::time::timeout(manager.config().pair_timeout, conn.recv())
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    match first {
        Message::Discovery { device_name, .. } => {
            tracing::debug!("discovery probe from {} at {}", device_name, addr);
            let identity = manager.identity();
            conn.send(&Message::DiscoveryResponse {
                device_id: identity.id.clone(),
                device_name: identity.name.clone(),
                network_name: identity.network_name.clone(),
            })
            .await?;
        }
        Message::PairRequest(request) => {
            tracing::info!(
                "pairing request from {} at {} (reconnection: {})",
                request.device_name,
                addr,
                request.is_reconnection
            );
            manager.accept_pairing(conn, request).await?;
        }
        other => {
            tracing::debug!("unexpected {} from unpaired {}", other.kind(), addr);
        }
    }

    Ok(())
}

/// Handle to the running listener
pub struct SyncServerHandle {
    local_addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl SyncServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the server
    pub fn abort(self) {
        self.task.abort();
    }
}
