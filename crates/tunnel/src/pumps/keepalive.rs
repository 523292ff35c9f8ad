//! Keep-alive pump — one zero byte every two minutes.
//!
//! Relays drop tunnels that stay silent; desktop and file-browse
//! sessions can legitimately idle for long stretches, so a single-byte
//! binary frame is sent on a fixed period. File-transfer sessions never
//! idle (the download stream is the traffic) and skip this pump.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use vantage_protocol::KEEPALIVE_PERIOD;

pub(crate) async fn keepalive_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(KEEPALIVE_PERIOD);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let beat = tungstenite::Message::Binary(vec![0u8].into());
                if write_tx.send(beat).await.is_err() {
                    break;
                }
            }
        }
    }
}
