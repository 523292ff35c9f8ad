//! WebSocket write pump — serialises outbound messages.
//!
//! Cancellation only stops the intake of new work: frames already
//! queued (tail chunks of a download, a final control response) are
//! still written before the close frame goes out.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Refuse further sends, then flush everything already queued.
    write_rx.close();
    let mut drained = 0usize;
    while let Some(m) = write_rx.recv().await {
        if let Err(e) = write.send(m).await {
            error!("WebSocket write error while draining: {e}");
            return;
        }
        drained += 1;
    }
    if drained > 0 {
        debug!(drained, "flushed queued frames on shutdown");
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
