//! Registry of live tunnels.
//!
//! Sessions register on start and deregister on teardown; the host uses
//! the registry to enumerate or stop tunnels (user hit "disconnect",
//! agent shutting down). Stopping is an idempotent cancel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;
use vantage_protocol::TunnelUsage;

/// Handle to one live tunnel.
#[derive(Debug, Clone)]
pub struct TunnelHandle {
    pub id: Uuid,
    pub usage: Option<TunnelUsage>,
    cancel: CancellationToken,
}

impl TunnelHandle {
    pub(crate) fn new(id: Uuid, usage: Option<TunnelUsage>, cancel: CancellationToken) -> Self {
        Self { id, usage, cancel }
    }

    /// Requests teardown. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Live-tunnel table shared between the host and session tasks.
#[derive(Debug, Default)]
pub struct TunnelRegistry {
    tunnels: RwLock<HashMap<Uuid, TunnelHandle>>,
}

impl TunnelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, handle: TunnelHandle) {
        info!(id = %handle.id, usage = ?handle.usage, "tunnel registered");
        self.tunnels.write().await.insert(handle.id, handle);
    }

    pub async fn deregister(&self, id: Uuid) {
        if self.tunnels.write().await.remove(&id).is_some() {
            info!(%id, "tunnel deregistered");
        }
    }

    /// Stops one tunnel. No-op if it is unknown or already stopped.
    pub async fn stop(&self, id: Uuid) {
        if let Some(handle) = self.tunnels.read().await.get(&id) {
            handle.stop();
        }
    }

    /// Stops every live tunnel.
    pub async fn stop_all(&self) {
        for handle in self.tunnels.read().await.values() {
            handle.stop();
        }
    }

    pub async fn len(&self) -> usize {
        self.tunnels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tunnels.read().await.is_empty()
    }
}
