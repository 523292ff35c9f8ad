//! Wire protocol types for Vantage management tunnels.
//!
//! A tunnel carries three kinds of traffic over one WebSocket:
//!
//! - **Negotiation text**: the `"c"`/`"cr"` hello, an optional
//!   `{"type":"options",...}` object, and a bare usage-code integer.
//! - **Control JSON**: binary frames whose first byte is `{` (123),
//!   dispatched on their `action` field (`ls`, `rm`, `upload`,
//!   `uploaddone`).
//! - **Framed binary commands**: `[2 bytes BE opcode][2 bytes BE total
//!   length][payload]` for remote-desktop input, plus raw (optionally
//!   zero-escaped) file payload while an upload is open.
//!
//! This crate is pure parsing/encoding; it performs no I/O.

pub mod classify;
pub mod constants;
pub mod control;
pub mod descriptor;
pub mod desktop;
pub mod usage;

pub use classify::{FrameClass, classify_frame, unescape_upload};
pub use constants::*;
pub use control::{ControlRequest, EntryKind, ListingEntry};
pub use descriptor::TunnelDescriptor;
pub use desktop::{DesktopCommand, FrameError, MouseFrame, SettingsFrame};
pub use usage::TunnelUsage;
