//! Certificate-pinned WebSocket dialing.
//!
//! Tunnel connections authenticate the server by pinning the SHA-384
//! hash of the presented leaf certificate instead of chain validation:
//! the server uses a self-managed certificate, and the expected hash
//! arrives out of band over the already-authenticated control channel.
//! Chain building, hostname checks and expiry are intentionally not
//! performed; the pin is the whole trust decision.

mod verifier;

use std::sync::Arc;

use sha2::{Digest, Sha384};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::debug;
use vantage_protocol::{CONNECT_TIMEOUT, WS_MAX_MESSAGE_SIZE};

pub use verifier::PinnedCertVerifier;

/// A pinned SHA-384 certificate digest.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CertHash([u8; 48]);

impl CertHash {
    /// Parses a 96-character hex digest, case-insensitive.
    pub fn from_hex(s: &str) -> Result<Self, PinError> {
        let mut out = [0u8; 48];
        hex::decode_to_slice(s, &mut out).map_err(|_| PinError::InvalidHash(s.to_owned()))?;
        Ok(Self(out))
    }

    /// Hashes a DER-encoded certificate.
    pub fn of_der(der: &[u8]) -> Self {
        let mut hasher = Sha384::new();
        hasher.update(der);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 48] {
        &self.0
    }
}

impl std::fmt::Debug for CertHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CertHash({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for CertHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("no certificate pins provided")]
    NoPins,

    #[error("invalid pin hash: {0:?}")]
    InvalidHash(String),

    #[error("server certificate does not match any pin (presented {presented})")]
    CertificateMismatch { presented: String },

    #[error("connection not established within {CONNECT_TIMEOUT:?}")]
    ConnectTimeout,

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type PinnedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `url` over TLS, accepting the server only if its leaf
/// certificate hashes to one of `pins`. Any matching pin wins; there is
/// no precedence among them.
pub async fn connect_pinned(url: &str, pins: Vec<CertHash>) -> Result<PinnedStream, PinError> {
    if pins.is_empty() {
        return Err(PinError::NoPins);
    }
    debug!(url, pins = pins.len(), "dialing pinned endpoint");

    let verifier = Arc::new(PinnedCertVerifier::new(pins)?);
    let tls_config = verifier.clone().client_config()?;
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

    let connect = connect_async_tls_with_config(
        url,
        Some(ws_config),
        false,
        Some(Connector::Rustls(Arc::new(tls_config))),
    );
    let result = tokio::time::timeout(CONNECT_TIMEOUT, connect)
        .await
        .map_err(|_| PinError::ConnectTimeout)?;

    match result {
        Ok((stream, _response)) => Ok(stream),
        Err(err) => {
            // The TLS layer can only surface a generic handshake error;
            // recover the actual reason from the verifier.
            if let Some(presented) = verifier.take_mismatch() {
                Err(PinError::CertificateMismatch { presented })
            } else {
                Err(err.into())
            }
        }
    }
}
