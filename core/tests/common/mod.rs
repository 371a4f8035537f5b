#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Instant};

use peerclip_core::protocol::PairRequest;
use peerclip_core::sync::PeerConnection;
use peerclip_core::{Config, ConnectionManager, ConnectionState, DeviceIdentity, Message, Peer, Status};

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Loopback config with short timers
pub fn test_config() -> Config {
    Config {
        port: 0,
        bind_addr: LOOPBACK,
        reconnect_interval: Duration::from_millis(50),
        pair_timeout: Duration::from_secs(2),
        reconnect_pair_timeout: Duration::from_secs(3),
        clipboard_poll_interval: Duration::from_millis(20),
        ..Config::default()
    }
}

pub fn identity(name: &str) -> DeviceIdentity {
    DeviceIdentity::new(name).with_network_name("test-lan")
}

pub fn loopback_peer(name: &str, port: u16) -> Peer {
    Peer::discovered(name, name, "test-lan", LOOPBACK, port)
}

/// Collects status strings in order
#[derive(Clone, Default)]
pub struct StatusLog(Arc<Mutex<Vec<String>>>);

impl StatusLog {
    pub fn callback(&self) -> impl Fn(&Status) + Send + Sync + 'static {
        let log = self.0.clone();
        move |status| log.lock().unwrap().push(status.to_string())
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn manager(name: &str, config: Config) -> (ConnectionManager, StatusLog) {
    let log = StatusLog::default();
    let (manager, _inbound) = ConnectionManager::new(config, identity(name));
    (manager.with_status_callback(log.callback()), log)
}

pub async fn wait_for_state(manager: &ConnectionManager, expected: ConnectionState) {
    let deadline = Instant::now() + PATIENCE;
    loop {
        let state = manager.state().await;
        if state == expected {
            return;
        }
        assert!(Instant::now() < deadline, "still {:?}, wanted {:?}", state, expected);
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_peer_named(manager: &ConnectionManager, name: &str) -> Peer {
    let deadline = Instant::now() + PATIENCE;
    loop {
        if let Some(peer) = manager.peer().await {
            if peer.name == name && peer.connected {
                return peer;
            }
        }
        assert!(Instant::now() < deadline, "never connected to {}", name);
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn fake_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind(SocketAddr::new(LOOPBACK, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Play the listener side of a pairing on the next dialed socket
pub async fn accept_pairing(listener: &TcpListener, name: &str) -> (PeerConnection, PairRequest) {
    let (stream, _) = timeout(PATIENCE, listener.accept()).await.expect("nobody dialed").unwrap();
    let mut conn = PeerConnection::new(stream);
    let request = match timeout(PATIENCE, conn.recv()).await.unwrap().unwrap() {
        Message::PairRequest(request) => request,
        other => panic!("expected pair_request, got {:?}", other),
    };
    conn.send(&Message::PairResponse {
        accepted: true,
        device_name: name.to_string(),
    })
    .await
    .unwrap();
    (conn, request)
}

/// Play the initiator side of a pairing against `addr`
pub async fn pair_with(addr: SocketAddr, name: &str) -> PeerConnection {
    let mut conn = PeerConnection::dial(addr, PATIENCE).await.unwrap();
    conn.send(&Message::PairRequest(PairRequest {
        device_id: name.to_string(),
        device_name: name.to_string(),
        network_name: "test-lan".to_string(),
        is_reconnection: false,
    }))
    .await
    .unwrap();
    match timeout(PATIENCE, conn.recv()).await.unwrap().unwrap() {
        Message::PairResponse { accepted: true, .. } => conn,
        other => panic!("pairing not accepted: {:?}", other),
    }
}

/// Next message that is not one of the peer's own heartbeats
pub async fn recv_skipping_heartbeats(conn: &mut PeerConnection) -> Message {
    loop {
        match timeout(PATIENCE, conn.recv()).await.expect("no message").unwrap() {
            Message::Heartbeat { .. } => continue,
            message => return message,
        }
    }
}
