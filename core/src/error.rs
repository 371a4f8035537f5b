use thiserror::Error;

/// Peerclip error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Local network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Pairing rejected by {0}")]
    HandshakeRejected(String),

    #[error("Pairing handshake timed out")]
    HandshakeTimeout,

    #[error("No connected peer")]
    NotConnected,

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Service already running")]
    AlreadyRunning,

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("File error: {0}")]
    File(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Failed to serialize/deserialize: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the underlying socket can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
