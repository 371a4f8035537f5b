//! TCP peer connection, state machine and payload dispatch

pub mod connection;
pub mod dispatcher;
pub mod framing;
pub mod manager;
pub mod server;

pub use connection::PeerConnection;
pub use dispatcher::{Collaborators, SyncDispatcher, SyncEvent};
pub use framing::{read_framed_message, read_message, write_framed_message, write_message};
pub use manager::{ConnectionManager, ConnectionState, Status, StatusCallback};
pub use server::{SyncServer, SyncServerHandle};
