//! Protocol message types, transfer items and the pairing handshake

pub mod constants;
mod item;
mod messages;
pub mod pairing;

pub use item::{now_millis, ItemIdGenerator, ItemKind, TransferItem};
pub use messages::{Message, PairRequest};
pub use pairing::{AutoAccept, PairingGate};
