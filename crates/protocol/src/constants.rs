//! Protocol-wide constants shared by the tunnel engine crates.

use std::time::Duration;

/// Maximum WebSocket message size (16 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Timeout for the TLS + WebSocket connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Idle budget for an established tunnel. Tunnels are long-lived and
/// mostly silent; the keep-alive pump is expected to fire well inside
/// this window.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Period of the keep-alive pump (one zero byte per tick).
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(120);

/// Chunk size for file downloads served over the tunnel.
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Outbound queue depth (in bytes) above which the download loop pauses.
pub const SEND_QUEUE_HIGH_WATER: usize = 640 * 1024;

/// How long the download loop sleeps when the send queue is saturated.
pub const BACKPRESSURE_PAUSE: Duration = Duration::from_millis(100);

/// First byte of a control JSON frame (ASCII `{`).
pub const JSON_FRAME_MARKER: u8 = b'{';

/// Leading byte that escapes upload payload frames which would otherwise
/// be mistaken for control JSON.
pub const UPLOAD_ESCAPE_BYTE: u8 = 0;

/// Fixed discriminator carried by every control-channel response.
pub const CTRL_CHANNEL_ID: &str = "102938";

/// Negotiation hello literals. Anything else before the hello is ignored.
pub const HELLO: &str = "c";
pub const HELLO_RECORDED: &str = "cr";
