//! Download streaming for file-transfer tunnels.
//!
//! The file is pushed in fixed-size binary chunks with no per-chunk
//! acknowledgement; the only backpressure is a bounded pause whenever
//! the outbound queue is saturated. End of file (or a closed socket)
//! ends the session.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info};
use vantage_protocol::{BACKPRESSURE_PAUSE, DOWNLOAD_CHUNK_SIZE, SEND_QUEUE_HIGH_WATER};
use vantage_store::FileStore;

use crate::hooks::{AUDIT_DOWNLOAD_START, AuditEvent, AuditSink};
use crate::TunnelError;

/// Streams `locator` to the peer. Returns the number of bytes sent.
pub(crate) async fn stream_download(
    store: &dyn FileStore,
    locator: &str,
    out: &mpsc::Sender<tungstenite::Message>,
    audit: &dyn AuditSink,
    session_user: Option<String>,
) -> Result<u64, TunnelError> {
    let (mut reader, info) = store.open_for_read(locator)?;
    info!(name = %info.name, size = info.size, "serving download");
    audit.log_event(AuditEvent {
        code: AUDIT_DOWNLOAD_START,
        session_user,
        file_name: info.name.clone(),
        size: info.size,
    });

    let mut sent = 0u64;
    let mut chunk = vec![0u8; DOWNLOAD_CHUNK_SIZE];
    loop {
        let n = std::io::Read::read(&mut reader, &mut chunk).map_err(vantage_store::StoreError::Io)?;
        if n == 0 {
            break;
        }
        out.send(tungstenite::Message::Binary(chunk[..n].to_vec().into()))
            .await
            .map_err(|_| TunnelError::OutboundClosed)?;
        sent += n as u64;

        // Queue depth in messages, approximated as bytes by chunk size.
        let queued = out.max_capacity() - out.capacity();
        if queued * DOWNLOAD_CHUNK_SIZE > SEND_QUEUE_HIGH_WATER {
            debug!(queued, "send queue saturated, pausing");
            tokio::time::sleep(BACKPRESSURE_PAUSE).await;
        }
    }
    debug!(sent, "download complete");
    Ok(sent)
}
