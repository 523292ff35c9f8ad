//! Server-provided tunnel descriptor.

use base64::Engine;
use serde::Deserialize;

/// The JSON descriptor the management server attaches to a tunnel
/// request. Carries the expected usage code, the tunnel-specific TLS
/// certificate hash, and the identity of the requesting user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelDescriptor {
    /// Hex-encoded SHA-384 of the relay's leaf certificate. Empty when
    /// the server did not supply a tunnel-specific pin.
    #[serde(default, rename = "servertlshash")]
    pub server_tls_hash: String,

    /// Usage code the server expects the peer to declare; `0` means
    /// unspecified (any accepted code is fine).
    #[serde(default)]
    pub usage: i64,

    /// Requesting user, e.g. `user//server//alice`.
    #[serde(default)]
    pub userid: String,

    /// Guest name for shared sessions.
    #[serde(default)]
    pub guestname: String,
}

impl TunnelDescriptor {
    /// Session user identifier: `userid`, or
    /// `userid/guest:<base64 guestname>` for shared sessions.
    pub fn session_user(&self) -> Option<String> {
        if self.userid.is_empty() {
            return None;
        }
        if self.guestname.is_empty() {
            return Some(self.userid.clone());
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.guestname);
        Some(format!("{}/guest:{}", self.userid, encoded))
    }
}
