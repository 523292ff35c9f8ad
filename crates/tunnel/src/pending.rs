//! Deletions parked on user consent.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// One deletion blocked on OS-level consent, held until the consent
/// flow replies so a `rm` response can still be emitted.
#[derive(Debug, Clone)]
pub struct PendingDeletion {
    pub locator: String,
    pub reqid: Value,
}

/// Pending-deletion table keyed by consent correlation id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<Uuid, PendingDeletion>,
}

impl PendingTable {
    pub fn insert(&mut self, id: Uuid, entry: PendingDeletion) {
        self.entries.insert(id, entry);
    }

    /// Takes the entry for a resolved ticket. A second resolution for
    /// the same id finds nothing and is ignored by the caller.
    pub fn take(&mut self, id: Uuid) -> Option<PendingDeletion> {
        self.entries.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
