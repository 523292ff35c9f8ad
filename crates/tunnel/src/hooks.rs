//! Host-side collaborators consumed by tunnel sessions.
//!
//! The engine never talks to the screen, the event log or a consent UI
//! directly; the embedding agent implements these traits and feeds
//! asynchronous outcomes back through a [`HostEventSender`].

use tokio::sync::mpsc;
use uuid::Uuid;
use vantage_store::ConsentTicket;

/// Event-log code for a file deletion.
pub const AUDIT_FILE_DELETE: u32 = 45;
/// Event-log code for a completed upload.
pub const AUDIT_UPLOAD_COMPLETE: u32 = 105;
/// Event-log code emitted when a download starts.
pub const AUDIT_DOWNLOAD_START: u32 = 106;

/// One audited file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub code: u32,
    /// `userid` or `userid/guest:<b64>` of the requesting user.
    pub session_user: Option<String>,
    pub file_name: String,
    pub size: u64,
}

/// Receives audit events for the device event log.
pub trait AuditSink: Send + Sync {
    fn log_event(&self, event: AuditEvent);
}

/// Asynchronous outcomes the host pushes back into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Screen capture became available (width/height in capture space).
    ProjectionReady { width: u16, height: u16 },
    /// A parked deletion's consent flow finished.
    ConsentResolved { id: Uuid, approved: bool },
}

pub type HostEventSender = mpsc::Sender<HostEvent>;

/// Screen-capture side of the host.
pub trait ProjectionHost: Send + Sync {
    /// Size of the capture source, if projection is already running.
    fn capture_size(&self) -> Option<(u16, u16)>;

    /// Size of the surface input is injected into, when it differs from
    /// the capture size (system chrome such as status bars).
    fn display_size(&self) -> Option<(u16, u16)> {
        self.capture_size()
    }

    /// Kicks off projection consent. The host reports completion with
    /// [`HostEvent::ProjectionReady`] on `notify`.
    fn start_projection(&self, notify: HostEventSender);
}

/// Resolves deletion-consent tickets, eventually replying with
/// [`HostEvent::ConsentResolved`] on `reply`.
pub trait ConsentResolver: Send + Sync {
    fn resolve(&self, ticket: &ConsentTicket, reply: HostEventSender);
}
