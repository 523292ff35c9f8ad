//! Upload substream state.
//!
//! At most one upload is open per session; opening a new one silently
//! discards the previous sink. Each payload frame is acknowledged with
//! `uploadack`, which is the sender's only flow-control signal.

use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tracing::debug;
use vantage_protocol::unescape_upload;
use vantage_store::{FileStore, StoreError};

/// The currently open upload destination.
pub struct UploadState {
    pub reqid: Value,
    pub name: String,
    sink: Box<dyn Write + Send + Sync>,
    written: u64,
}

impl UploadState {
    /// Resolves and opens the destination. An absolute `path` bypasses
    /// the store and writes to that filesystem location directly;
    /// anything else goes through the store's category routing.
    pub fn open(
        store: &dyn FileStore,
        path: &str,
        name: &str,
        reqid: Value,
    ) -> Result<Self, StoreError> {
        let sink: Box<dyn Write + Send + Sync> = if path.starts_with('/') {
            let dest = Path::new(path).join(name);
            debug!(dest = %dest.display(), "upload to absolute path");
            Box::new(std::fs::File::create(dest)?)
        } else {
            store.open_for_write(path, name)?
        };
        Ok(Self {
            reqid,
            name: name.to_owned(),
            sink,
            written: 0,
        })
    }

    /// Writes one payload frame, stripping the leading-zero escape.
    pub fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        let payload = unescape_upload(frame);
        self.sink.write_all(payload)?;
        self.written += payload.len() as u64;
        Ok(())
    }

    /// Flushes and closes the sink, returning the byte total for the
    /// audit event.
    pub fn finish(mut self) -> std::io::Result<u64> {
        self.sink.flush()?;
        Ok(self.written)
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl std::fmt::Debug for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadState")
            .field("reqid", &self.reqid)
            .field("name", &self.name)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}
