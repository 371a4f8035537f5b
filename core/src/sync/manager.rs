//! Connection manager: the single active peer link and its state machine
//!
//! All transitions go through one async mutex. Each promoted link carries a
//! generation number so that a superseded socket reporting its own failure
//! later cannot tear down its replacement. `disconnect()` bumps an epoch,
//! which discards handshakes that were in flight when it ran.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::peer::Peer;
use crate::protocol::{pairing, AutoAccept, Message, PairRequest, PairingGate};
use crate::sync::connection::{PeerConnection, PeerReader, PeerWriter};
use crate::sync::server::{SyncServer, SyncServerHandle};
use crate::{Config, DeviceIdentity, Error, Result};

/// Connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, no target peer
    Idle,
    /// Dial or handshake in progress
    Connecting,
    /// Handshake done, heartbeat running
    Connected,
    /// Socket lost, deciding whether to reconnect
    Disconnected,
    /// Periodically re-pairing with the last known peer
    Reconnecting,
}

/// Status reported to the host on every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Connected(String),
    Disconnected,
    Reconnecting,
    Reconnected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Connected(name) => write!(f, "Connected to {}", name),
            Status::Disconnected => f.write_str("Disconnected"),
            Status::Reconnecting => f.write_str("Reconnecting"),
            Status::Reconnected => f.write_str("Reconnected"),
        }
    }
}

pub type StatusCallback = Arc<dyn Fn(&Status) + Send + Sync>;

/// Condition a finished handshake must still meet to be promoted
#[derive(Debug, Clone, Copy)]
enum Promotion {
    /// Inbound pairing, always wins
    Inbound,
    /// Explicit connect started in this epoch
    Fresh { epoch: u64 },
    /// Reconnection attempt; the manager must still be reconnecting
    Retry { epoch: u64 },
}

struct Link {
    generation: u64,
    writer: Arc<Mutex<PeerWriter>>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl Link {
    /// Stop both tasks; the socket closes once the halves are dropped
    fn abort(self) {
        self.reader.abort();
        self.heartbeat.abort();
    }
}

struct Inner {
    state: ConnectionState,
    /// Active peer, or the last connected one while reconnecting
    peer: Option<Peer>,
    link: Option<Link>,
    reconnect: Option<JoinHandle<()>>,
    server: Option<SyncServerHandle>,
    generation: u64,
    epoch: u64,
}

/// Owner of the one peer connection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    config: Arc<Config>,
    identity: Arc<DeviceIdentity>,
    gate: Arc<dyn PairingGate>,
    on_status: StatusCallback,
    inbound: mpsc::Sender<Message>,
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionManager {
    /// Create a manager. Data and ack messages received on the active link
    /// are delivered on the returned channel.
    pub fn new(config: Config, identity: DeviceIdentity) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(64);
        let manager = Self {
            config: Arc::new(config),
            identity: Arc::new(identity),
            gate: Arc::new(AutoAccept),
            on_status: Arc::new(|_: &Status| {}),
            inbound: tx,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Idle,
                peer: None,
                link: None,
                reconnect: None,
                server: None,
                generation: 0,
                epoch: 0,
            })),
        };
        (manager, rx)
    }

    /// Install the status callback
    pub fn with_status_callback(mut self, callback: impl Fn(&Status) + Send + Sync + 'static) -> Self {
        self.on_status = Arc::new(callback);
        self
    }

    /// Replace the default auto-accept pairing policy
    pub fn with_pairing_gate(self, gate: impl PairingGate + 'static) -> Self {
        self.with_shared_gate(Arc::new(gate))
    }

    pub(crate) fn with_shared_gate(mut self, gate: Arc<dyn PairingGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub(crate) fn identity_arc(&self) -> Arc<DeviceIdentity> {
        self.identity.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// The active peer, or the last one while reconnecting
    pub async fn peer(&self) -> Option<Peer> {
        self.inner.lock().await.peer.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.state == ConnectionState::Connected
    }

    /// Bind the listener and accept inbound pairings. Idempotent: a second
    /// call returns the address already bound.
    pub async fn start_listening(&self) -> Result<SocketAddr> {
        let mut inner = self.inner.lock().await;
        if let Some(server) = &inner.server {
            return Ok(server.local_addr());
        }

        let server = SyncServer::bind(self.config.bind_addr, self.config.port).await?;
        let handle = server.start(self.clone());
        let addr = handle.local_addr();
        inner.server = Some(handle);
        Ok(addr)
    }

    /// Stop accepting inbound connections; the active link is unaffected
    pub async fn stop_listening(&self) {
        if let Some(server) = self.inner.lock().await.server.take() {
            server.abort();
            tracing::info!("listener stopped");
        }
    }

    /// Pair with `peer` as initiator. Returns false on any failure; the
    /// state is left as it was.
    pub async fn connect(&self, peer: &Peer) -> bool {
        match self.try_connect(peer).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("connect to {} failed: {}", peer.socket_addr(), e);
                false
            }
        }
    }

    /// Like [`connect`](Self::connect) but reports why it failed
    pub async fn try_connect(&self, peer: &Peer) -> Result<()> {
        let (epoch, previous) = {
            let mut inner = self.inner.lock().await;
            let previous = inner.state;
            if matches!(previous, ConnectionState::Idle | ConnectionState::Disconnected) {
                inner.state = ConnectionState::Connecting;
            }
            (inner.epoch, previous)
        };

        let outcome = match self.handshake(peer, false).await {
            Ok((conn, remote)) => {
                let status = Status::Connected(remote.name.clone());
                if self.promote(conn, remote, status, Promotion::Fresh { epoch }).await {
                    Ok(())
                } else {
                    Err(Error::Transport("connection cancelled by disconnect".to_string()))
                }
            }
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            let mut inner = self.inner.lock().await;
            if inner.state == ConnectionState::Connecting {
                inner.state = previous;
            }
        }
        outcome
    }

    /// Tear everything down: timers, socket, pending reconnection
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Idle && inner.link.is_none() && inner.reconnect.is_none() {
            tracing::debug!("disconnect while idle, nothing to do");
            return;
        }
        inner.epoch += 1;
        if let Some(task) = inner.reconnect.take() {
            task.abort();
        }
        if let Some(link) = inner.link.take() {
            link.abort();
        }
        if let Some(peer) = inner.peer.as_mut() {
            peer.connected = false;
        }
        inner.state = ConnectionState::Idle;
        tracing::info!("disconnected");
        (self.on_status)(&Status::Disconnected);
    }

    /// Forget the last known peer. Stops reconnection; an active link is
    /// closed as well.
    pub async fn forget_peer(&self) {
        let mut inner = self.inner.lock().await;
        if inner.peer.take().is_none() {
            return;
        }
        inner.epoch += 1;
        if let Some(task) = inner.reconnect.take() {
            task.abort();
        }
        if let Some(link) = inner.link.take() {
            link.abort();
        }
        if inner.state != ConnectionState::Idle {
            inner.state = ConnectionState::Idle;
            (self.on_status)(&Status::Disconnected);
        }
        tracing::info!("forgot last peer");
    }

    /// Send a message on the active link. A write failure is handled as a
    /// disconnect before the error is returned.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let (writer, generation) = {
            let inner = self.inner.lock().await;
            let link = inner.link.as_ref().ok_or(Error::NotConnected)?;
            (link.writer.clone(), link.generation)
        };

        let result = { writer.lock().await.send(message).await };
        if let Err(e) = &result {
            if e.is_transport() {
                self.link_lost(generation, e).await;
            }
        }
        result
    }

    async fn handshake(&self, peer: &Peer, is_reconnection: bool) -> Result<(PeerConnection, Peer)> {
        let wait = if is_reconnection {
            self.config.reconnect_pair_timeout
        } else {
            self.config.pair_timeout
        };

        let mut conn = PeerConnection::dial(peer.socket_addr(), wait).await?;
        let remote_name = pairing::initiate(&mut conn, &self.identity, is_reconnection, wait).await?;

        let mut remote = peer.clone();
        if !remote_name.is_empty() {
            // Dialed by address only: the answering host's name identifies it
            if remote.id == remote.address.to_string() {
                remote.id = remote_name.clone();
            }
            remote.name = remote_name;
        }
        remote.connected = true;
        remote.paired = true;
        Ok((conn, remote))
    }

    /// Answer an inbound `pair_request` and, if accepted, make the socket
    /// the active link
    pub(crate) async fn accept_pairing(
        &self,
        mut conn: PeerConnection,
        request: PairRequest,
    ) -> Result<()> {
        let remote_addr = conn.peer_addr()?;
        if !pairing::respond(&mut conn, &self.identity, &request, self.gate.as_ref()).await? {
            tracing::info!("rejected pairing from {} at {}", request.device_name, remote_addr);
            return Ok(());
        }

        let peer = Peer {
            id: request.device_id,
            name: request.device_name,
            network_name: request.network_name,
            address: remote_addr.ip(),
            port: self.config.port,
            connected: true,
            paired: true,
        };
        let status = Status::Connected(peer.name.clone());
        self.promote(conn, peer, status, Promotion::Inbound).await;
        Ok(())
    }

    /// Make `conn` the active link, replacing any previous one
    async fn promote(&self, conn: PeerConnection, peer: Peer, status: Status, promotion: Promotion) -> bool {
        let mut inner = self.inner.lock().await;
        match promotion {
            Promotion::Inbound => {}
            Promotion::Fresh { epoch } if epoch == inner.epoch => {}
            Promotion::Retry { epoch }
                if epoch == inner.epoch && inner.state == ConnectionState::Reconnecting => {}
            _ => {
                tracing::debug!("discarding handshake with {}: superseded", peer.name);
                return false;
            }
        }

        if let Some(old) = inner.link.take() {
            tracing::info!("new pairing supersedes the previous connection");
            old.abort();
        }

        inner.generation += 1;
        let generation = inner.generation;
        let (reader, writer) = conn.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let reader = tokio::spawn(self.clone().read_loop(reader, writer.clone(), generation));
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop(writer.clone(), generation));
        inner.link = Some(Link {
            generation,
            writer,
            reader,
            heartbeat,
        });

        tracing::info!("connected to {} at {}", peer.name, peer.address);
        inner.peer = Some(peer);
        inner.state = ConnectionState::Connected;
        (self.on_status)(&status);

        // May be the calling task; nothing below awaits
        if let Some(task) = inner.reconnect.take() {
            task.abort();
        }
        true
    }

    /// Handle loss of the link with `generation`
    async fn link_lost(&self, generation: u64, cause: &Error) {
        let mut inner = self.inner.lock().await;
        let current = inner.link.as_ref().map(|link| link.generation);
        if current != Some(generation) {
            tracing::debug!("ignoring failure of superseded link: {}", cause);
            return;
        }

        // May be the calling task; nothing below awaits
        if let Some(link) = inner.link.take() {
            link.abort();
        }

        tracing::warn!("connection lost: {}", cause);
        inner.state = ConnectionState::Disconnected;
        (self.on_status)(&Status::Disconnected);

        let resumable = match inner.peer.as_mut() {
            Some(peer) => {
                peer.connected = false;
                peer.paired
            }
            None => false,
        };

        if resumable {
            inner.state = ConnectionState::Reconnecting;
            (self.on_status)(&Status::Reconnecting);
            let epoch = inner.epoch;
            inner.reconnect = Some(tokio::spawn(self.clone().reconnect_loop(epoch)));
        } else {
            inner.state = ConnectionState::Idle;
        }
    }

    async fn read_loop(self, mut reader: PeerReader, writer: Arc<Mutex<PeerWriter>>, generation: u64) {
        loop {
            match reader.recv().await {
                Ok(Message::Heartbeat { .. }) => {
                    let reply = { writer.lock().await.send(&Message::heartbeat_response()).await };
                    if let Err(e) = reply {
                        self.link_lost(generation, &e).await;
                        return;
                    }
                }
                Ok(Message::HeartbeatResponse { .. }) => {
                    tracing::trace!("heartbeat answered");
                }
                Ok(
                    message @ (Message::ClipboardData { .. }
                    | Message::FileData { .. }
                    | Message::ClipboardAck { .. }
                    | Message::FileAck { .. }),
                ) => {
                    if self.inbound.send(message).await.is_err() {
                        tracing::debug!("no dispatcher attached, dropping message");
                    }
                }
                Ok(other) => {
                    tracing::debug!("ignoring {} on active connection", other.kind());
                }
                Err(Error::Protocol(e)) => {
                    tracing::warn!("dropping malformed message: {}", e);
                }
                Err(e) => {
                    self.link_lost(generation, &e).await;
                    return;
                }
            }
        }
    }

    async fn heartbeat_loop(self, writer: Arc<Mutex<PeerWriter>>, generation: u64) {
        let period = self.config.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let sent = { writer.lock().await.send(&Message::heartbeat()).await };
            match sent {
                Ok(()) => tracing::trace!("heartbeat sent"),
                Err(e) => {
                    self.link_lost(generation, &e).await;
                    return;
                }
            }
        }
    }

    // Boxed: the retry loop promotes links whose tasks can start it again
    fn reconnect_loop(self, epoch: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move { self.retry_until_paired(epoch).await })
    }

    async fn retry_until_paired(self, epoch: u64) {
        let period = self.config.reconnect_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let target = {
                let mut inner = self.inner.lock().await;
                if inner.epoch != epoch || inner.state != ConnectionState::Reconnecting {
                    return;
                }
                match inner.peer.clone() {
                    Some(peer) => peer,
                    None => {
                        inner.state = ConnectionState::Idle;
                        inner.reconnect = None;
                        return;
                    }
                }
            };

            tracing::debug!("reconnecting to {} at {}", target.name, target.socket_addr());
            match self.handshake(&target, true).await {
                Ok((conn, remote)) => {
                    if self
                        .promote(conn, remote, Status::Reconnected, Promotion::Retry { epoch })
                        .await
                    {
                        tracing::info!("reconnected to {}", target.name);
                    }
                    return;
                }
                Err(e) => tracing::debug!("reconnection attempt failed: {}", e),
            }
        }
    }
}
