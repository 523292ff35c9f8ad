//! Outbound tunnel establishment.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vantage_pintls::{CertHash, PinError, connect_pinned};
use vantage_protocol::{TunnelDescriptor, TunnelUsage};

use crate::TunnelError;
use crate::pumps::write_pump;
use crate::registry::{TunnelHandle, TunnelRegistry};
use crate::session::{SessionDeps, run_session};

/// Per-tunnel connection parameters, as received from the management
/// server.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub url: String,
    pub descriptor: TunnelDescriptor,
    /// Agent-wide certificate pin, accepted alongside the descriptor's
    /// tunnel-specific hash.
    pub agent_cert_hash: Option<CertHash>,
}

/// Dials the relay and spawns the session and its write pump. The
/// returned handle is already registered; the session deregisters
/// itself on teardown.
pub async fn start_tunnel(
    config: TunnelConfig,
    deps: SessionDeps,
    registry: Arc<TunnelRegistry>,
) -> Result<TunnelHandle, TunnelError> {
    let pins = assemble_pins(&config.descriptor, config.agent_cert_hash)?;
    let stream = connect_pinned(&config.url, pins).await?;
    let (write, read) = stream.split();

    let id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let usage = TunnelUsage::from_code(config.descriptor.usage);
    let handle = TunnelHandle::new(id, usage, cancel.clone());
    registry.register(handle.clone()).await;
    info!(%id, url = %config.url, "tunnel connected");

    let (out_tx, out_rx) = mpsc::channel(64);
    let (ev_tx, ev_rx) = mpsc::channel(16);
    tokio::spawn(write_pump(write, out_rx, cancel.clone()));

    let descriptor = config.descriptor;
    let session_registry = registry.clone();
    let session_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) =
            run_session(read, out_tx, ev_tx, ev_rx, descriptor, deps, session_cancel).await
        {
            warn!(%id, "tunnel session failed: {e}");
        }
        session_registry.deregister(id).await;
    });

    Ok(handle)
}

/// Collects the accepted pins: the descriptor's tunnel hash and the
/// agent-wide hash, with no precedence between them.
fn assemble_pins(
    descriptor: &TunnelDescriptor,
    agent_cert_hash: Option<CertHash>,
) -> Result<Vec<CertHash>, PinError> {
    let mut pins = Vec::new();
    if !descriptor.server_tls_hash.is_empty() {
        pins.push(CertHash::from_hex(&descriptor.server_tls_hash)?);
    }
    if let Some(hash) = agent_cert_hash {
        pins.push(hash);
    }
    if pins.is_empty() {
        return Err(PinError::NoPins);
    }
    Ok(pins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(hash: &str) -> TunnelDescriptor {
        serde_json::from_value(serde_json::json!({ "servertlshash": hash })).unwrap()
    }

    #[test]
    fn both_pins_are_accepted_without_precedence() {
        let tunnel_pin = CertHash::of_der(b"tunnel cert");
        let agent_pin = CertHash::of_der(b"agent cert");
        let pins = assemble_pins(
            &descriptor(&tunnel_pin.to_string()),
            Some(agent_pin),
        )
        .unwrap();
        assert_eq!(pins, vec![tunnel_pin, agent_pin]);
    }

    #[test]
    fn agent_pin_alone_suffices() {
        let agent_pin = CertHash::of_der(b"agent cert");
        let pins = assemble_pins(&descriptor(""), Some(agent_pin)).unwrap();
        assert_eq!(pins, vec![agent_pin]);
    }

    #[test]
    fn no_pins_at_all_is_refused() {
        assert!(matches!(
            assemble_pins(&descriptor(""), None),
            Err(PinError::NoPins)
        ));
    }

    #[test]
    fn malformed_tunnel_hash_is_rejected() {
        assert!(matches!(
            assemble_pins(&descriptor("zz"), None),
            Err(PinError::InvalidHash(_))
        ));
    }
}
