//! The File Store boundary for Vantage tunnels.
//!
//! Tunnel sessions never touch the filesystem directly; they go through
//! the [`FileStore`] trait so that hosts can plug in whatever storage
//! model they have (plain directories, a media database with per-file
//! consent, a sandbox). [`CategoryStore`] is the plain-directory
//! implementation.

mod category;

use std::io::{Read, Write};

use uuid::Uuid;
use vantage_protocol::ListingEntry;

pub use category::{CategoryRoots, CategoryStore};

/// Metadata for a file opened for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
}

/// Correlation token for a deletion blocked on user consent. The host
/// resolves it asynchronously through the consent flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentTicket {
    pub id: Uuid,
    pub locator: String,
}

impl ConsentTicket {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            locator: locator.into(),
        }
    }
}

/// Outcome of a delete attempt. Hard failures are reported through
/// [`StoreError`] instead.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// The store cannot delete this file without user approval; the
    /// caller parks the request and resumes it when the ticket resolves.
    NeedsConsent(ConsentTicket),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    #[error("not found: {0:?}")]
    NotFound(String),

    #[error("path escapes the store root: {0:?}")]
    PathTraversal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Storage collaborator consumed by tunnel sessions.
pub trait FileStore: Send + Sync {
    /// Lists one virtual folder. The empty path (or `/`) is the root
    /// listing of top-level categories.
    fn list_category(&self, path: &str) -> Result<Vec<ListingEntry>, StoreError>;

    /// Opens a destination sink for an upload. `path` is the peer's
    /// requested virtual folder; `name` is the file name, whose
    /// extension may drive category routing. The sink must be `Sync` so
    /// the session holding it stays spawnable.
    fn open_for_write(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Box<dyn Write + Send + Sync>, StoreError>;

    /// Opens a file for a download stream.
    fn open_for_read(&self, locator: &str) -> Result<(Box<dyn Read + Send>, FileInfo), StoreError>;

    /// Attempts to delete a file.
    fn delete(&self, locator: &str) -> Result<DeleteOutcome, StoreError>;
}
