//! Tunnel session engine for Vantage remote management.
//!
//! A tunnel is one outbound, certificate-pinned WebSocket to the relay.
//! After the text negotiation (`"c"` hello, optional options object,
//! usage code) the session settles into one of three roles: remote
//! desktop (framed binary input commands), file browsing (control JSON
//! `ls`/`rm`/`upload`), or a one-shot file transfer (download stream).
//!
//! Sessions are independent of each other; shared process-wide state is
//! limited to [`DesktopSettings`] and the remote-input lock. Teardown is
//! a single idempotent cancel that releases the socket, stops the
//! keep-alive pump, closes any open upload and deregisters the tunnel.
//!
//! [`DesktopSettings`]: vantage_input::DesktopSettings

mod connect;
mod download;
mod hooks;
mod pending;
mod pumps;
mod registry;
mod session;
mod upload;

use vantage_pintls::PinError;
use vantage_store::StoreError;

pub use connect::{TunnelConfig, start_tunnel};
pub use hooks::{
    AUDIT_FILE_DELETE, AUDIT_UPLOAD_COMPLETE, AUDIT_DOWNLOAD_START, AuditEvent, AuditSink,
    ConsentResolver, HostEvent, HostEventSender, ProjectionHost,
};
pub use registry::{TunnelHandle, TunnelRegistry};
pub use session::{SessionDeps, run_session};

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error(transparent)]
    Pin(#[from] PinError),

    #[error("peer declared usage {declared} but the server expects {expected}")]
    UsageMismatch { expected: i64, declared: i64 },

    #[error("unsupported usage code {0}")]
    BadUsageCode(i64),

    #[error("file-transfer tunnel negotiated without a \"file\" option")]
    MissingFile,

    #[error("outbound channel closed")]
    OutboundClosed,

    #[error("storage: {0}")]
    Store(#[from] StoreError),
}
