//! Pairing handshake: `pair_request` followed by `pair_response`

use std::time::Duration;

use super::messages::{Message, PairRequest};
use crate::sync::connection::PeerConnection;
use crate::{DeviceIdentity, Error, Result};

/// Decides whether an inbound pairing request is accepted.
///
/// The listener consults the gate before answering; the message shapes are
/// the same whichever verdict it returns.
pub trait PairingGate: Send + Sync {
    fn approve(&self, request: &PairRequest) -> bool;
}

/// Accepts every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAccept;

impl PairingGate for AutoAccept {
    fn approve(&self, _request: &PairRequest) -> bool {
        true
    }
}

impl<F> PairingGate for F
where
    F: Fn(&PairRequest) -> bool + Send + Sync,
{
    fn approve(&self, request: &PairRequest) -> bool {
        self(request)
    }
}

/// Build the request this device sends when it initiates pairing
pub fn request_for(local: &DeviceIdentity, is_reconnection: bool) -> PairRequest {
    PairRequest {
        device_id: local.id.clone(),
        device_name: local.name.clone(),
        network_name: local.network_name.clone(),
        is_reconnection,
    }
}

/// Initiator side. Sends `pair_request` and waits up to `wait` for the
/// verdict; returns the remote device name on acceptance.
pub async fn initiate(
    conn: &mut PeerConnection,
    local: &DeviceIdentity,
    is_reconnection: bool,
    wait: Duration,
) -> Result<String> {
    conn.send(&Message::PairRequest(request_for(local, is_reconnection)))
        .await?;

    let reply = tokio::time::timeout(wait, conn.recv())
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    match reply {
        Message::PairResponse { accepted: true, device_name } => Ok(device_name),
        Message::PairResponse { accepted: false, device_name } => {
            Err(Error::HandshakeRejected(device_name))
        }
        other => Err(Error::Protocol(format!(
            "expected pair_response, got {}",
            other.kind()
        ))),
    }
}

/// Listener side. Answers a received request with the gate's verdict.
pub async fn respond(
    conn: &mut PeerConnection,
    local: &DeviceIdentity,
    request: &PairRequest,
    gate: &dyn PairingGate,
) -> Result<bool> {
    let accepted = gate.approve(request);
    conn.send(&Message::PairResponse {
        accepted,
        device_name: local.name.clone(),
    })
    .await?;
    Ok(accepted)
}
