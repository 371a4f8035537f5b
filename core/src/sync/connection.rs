//! Peer connection handling

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::protocol::Message;
use crate::sync::framing::{read_message, write_message};
use crate::{Error, Result};

/// Framed connection to a peer, before or during pairing
pub struct PeerConnection {
    stream: TcpStream,
}

impl PeerConnection {
    /// Wrap an established stream
    pub fn new(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("could not set TCP_NODELAY: {}", e);
        }
        Self { stream }
    }

    /// Dial a peer, giving up after `wait`
    pub async fn dial(addr: SocketAddr, wait: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(wait, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::PeerUnreachable(format!("{}: connect timed out", addr)))?
            .map_err(|e| Error::PeerUnreachable(format!("{}: {}", addr, e)))?;

        Ok(Self::new(stream))
    }

    /// Send a message to the peer
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        write_message(&mut self.stream, message).await
    }

    /// Receive a message from the peer
    pub async fn recv(&mut self) -> Result<Message> {
        read_message(&mut self.stream).await
    }

    /// Get peer address
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream
            .peer_addr()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Split into read and write halves for concurrent processing
    pub fn into_split(self) -> (PeerReader, PeerWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (PeerReader { stream: read_half }, PeerWriter { stream: write_half })
    }
}

/// Read half of a peer connection
pub struct PeerReader {
    stream: OwnedReadHalf,
}

impl PeerReader {
    /// Receive a message
    pub async fn recv(&mut self) -> Result<Message> {
        read_message(&mut self.stream).await
    }
}

/// Write half of a peer connection. Dropping it shuts down the write
/// direction of the socket.
pub struct PeerWriter {
    stream: OwnedWriteHalf,
}

impl PeerWriter {
    /// Send a message
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        write_message(&mut self.stream, message).await
    }

    /// Close the write direction while the link is still registered
    #[cfg(test)]
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        self.stream
            .shutdown()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_refused_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = PeerConnection::dial(addr, Duration::from_millis(500)).await;
        assert!(matches!(result, Err(Error::PeerUnreachable(_))));
    }

    #[tokio::test]
    async fn test_split_halves_exchange_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let conn = PeerConnection::dial(addr, Duration::from_secs(1)).await.unwrap();
            let (mut reader, mut writer) = conn.into_split();
            writer.send(&Message::Heartbeat { timestamp: 1 }).await.unwrap();
            reader.recv().await.unwrap()
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = PeerConnection::new(stream);
        assert_eq!(server.recv().await.unwrap(), Message::Heartbeat { timestamp: 1 });
        server.send(&Message::HeartbeatResponse { timestamp: 2 }).await.unwrap();

        assert_eq!(client.await.unwrap(), Message::HeartbeatResponse { timestamp: 2 });
    }
}
