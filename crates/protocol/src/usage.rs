//! Tunnel usage codes.

/// The negotiated purpose of a tunnel.
///
/// The peer declares a small integer during negotiation: codes 1 and
/// 3–5 are file-browsing variants, 2 is remote desktop, 10 is a raw
/// file transfer. Usage is fixed for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelUsage {
    Desktop,
    FileBrowse,
    FileTransfer,
}

impl TunnelUsage {
    /// Maps a wire usage code to a usage, or `None` for codes outside
    /// the accepted set {1..=5, 10}.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(Self::Desktop),
            1 | 3..=5 => Some(Self::FileBrowse),
            10 => Some(Self::FileTransfer),
            _ => None,
        }
    }
}
