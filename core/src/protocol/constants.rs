//! Centralized protocol constants
//!
//! All protocol-level constants are defined here to ensure consistency
//! across the codebase. Every timing value can be overridden through
//! [`crate::Config`].

use std::time::Duration;

/// Well-known TCP port every peer listens on
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum frame payload (32 MB). Files travel base64-encoded in one frame.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Interval between heartbeats while connected
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Interval between reconnection attempts
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// How long a fresh pairing waits for `pair_response`
pub const PAIR_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a reconnection attempt waits for `pair_response`
pub const RECONNECT_PAIR_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for a single discovery probe
pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// How long a probe waits for `discovery_response` once connected
pub const PROBE_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on simultaneous discovery probes
pub const MAX_CONCURRENT_PROBES: usize = 32;

/// Clipboard polling interval in milliseconds
pub const CLIPBOARD_POLL_INTERVAL_MS: u64 = 500;

/// Number of recently received item ids remembered for duplicate suppression
pub const RECENT_ITEM_CAPACITY: usize = 256;
