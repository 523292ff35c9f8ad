//! Inbound binary frame classification.
//!
//! Every binary frame on an active tunnel is one of three things,
//! decided by the first byte and whether an upload is open:
//! control JSON (`{`), raw upload payload, or a framed desktop command.

use crate::constants::{JSON_FRAME_MARKER, UPLOAD_ESCAPE_BYTE};

/// Classification of an inbound binary frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameClass<'a> {
    /// UTF-8 JSON control message (first byte `{`).
    Control(&'a [u8]),
    /// File payload for the currently open upload.
    UploadData(&'a [u8]),
    /// Framed desktop command.
    Command(&'a [u8]),
}

/// Classifies a binary frame. Returns `None` for frames under 2 bytes,
/// which carry no meaning and are dropped.
pub fn classify_frame(frame: &[u8], upload_open: bool) -> Option<FrameClass<'_>> {
    if frame.len() < 2 {
        return None;
    }
    if frame[0] == JSON_FRAME_MARKER {
        Some(FrameClass::Control(frame))
    } else if upload_open {
        Some(FrameClass::UploadData(frame))
    } else {
        Some(FrameClass::Command(frame))
    }
}

/// Strips the leading-zero escape from an upload payload frame.
///
/// A `0` first byte marks the rest of the frame as payload (escaping
/// data that would otherwise start with the JSON marker); any other
/// first byte means the whole frame is payload.
pub fn unescape_upload(frame: &[u8]) -> &[u8] {
    match frame.first() {
        Some(&UPLOAD_ESCAPE_BYTE) => &frame[1..],
        _ => frame,
    }
}
