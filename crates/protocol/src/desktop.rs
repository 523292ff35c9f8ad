//! Framed remote-desktop commands.
//!
//! Wire format: `[2 bytes BE: opcode][2 bytes BE: total frame length]`
//! followed by the payload. The declared length covers the whole frame
//! including the 4-byte header; a frame whose declared length disagrees
//! with its actual size is dropped by the session.

/// Opcodes understood by the desktop dispatcher.
pub const OP_KEY_LEGACY: u16 = 1;
pub const OP_MOUSE: u16 = 2;
pub const OP_SETTINGS: u16 = 5;
pub const OP_REFRESH: u16 = 6;
pub const OP_DISPLAY_SIZE: u16 = 7;
pub const OP_PAUSE: u16 = 8;
pub const OP_KEY_UNICODE: u16 = 85;
pub const OP_INPUT_LOCK: u16 = 87;

/// A parsed desktop command frame.
///
/// Key payloads are kept raw here; translation to abstract input events
/// (including action-flag validation) is the decoder's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopCommand {
    /// Opcode 1: legacy numeric key code.
    LegacyKey { flag: u8, code: u8 },
    /// Opcode 2: pointer event.
    Mouse(MouseFrame),
    /// Opcode 5: remote display settings update.
    Settings(SettingsFrame),
    /// Opcode 6: reserved, no-op.
    Refresh,
    /// Opcode 8: reserved, no-op.
    Pause,
    /// Opcode 85: UTF-16 code unit key.
    UnicodeKey { flag: u8, code_unit: u16 },
    /// Opcode 87: toggle the global remote-input lock.
    InputLock { locked: bool },
}

/// Raw pointer payload: button bitmask, wire coordinates, and an
/// optional scroll delta (present when the payload is at least 8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseFrame {
    pub button: u8,
    pub x: u16,
    pub y: u16,
    pub scroll: Option<i16>,
}

/// Display settings payload. Scaling (1024 = 100%) and the frame-rate
/// cap are optional trailing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsFrame {
    pub image_kind: u8,
    pub compression: u8,
    pub scaling: Option<u16>,
    pub frame_rate: Option<u16>,
}

/// Errors from desktop frame parsing. All of these are transient: the
/// session drops the frame and carries on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short ({len} bytes)")]
    TooShort { len: usize },

    #[error("declared length {declared} != actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload truncated for opcode {opcode}")]
    Truncated { opcode: u16 },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),
}

/// Parses a framed desktop command.
pub fn parse_desktop_frame(frame: &[u8]) -> Result<DesktopCommand, FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::TooShort { len: frame.len() });
    }
    let opcode = u16::from_be_bytes([frame[0], frame[1]]);
    let declared = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    if declared != frame.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }
    let payload = &frame[4..];

    match opcode {
        OP_KEY_LEGACY => {
            if payload.len() < 2 {
                return Err(FrameError::Truncated { opcode });
            }
            Ok(DesktopCommand::LegacyKey {
                flag: payload[0],
                code: payload[1],
            })
        }
        OP_MOUSE => {
            if payload.len() < 6 {
                return Err(FrameError::Truncated { opcode });
            }
            let scroll = if payload.len() >= 8 {
                Some(i16::from_be_bytes([payload[6], payload[7]]))
            } else {
                None
            };
            Ok(DesktopCommand::Mouse(MouseFrame {
                button: payload[1],
                x: u16::from_be_bytes([payload[2], payload[3]]),
                y: u16::from_be_bytes([payload[4], payload[5]]),
                scroll,
            }))
        }
        OP_SETTINGS => {
            if payload.len() < 2 {
                return Err(FrameError::Truncated { opcode });
            }
            let scaling = (payload.len() >= 4)
                .then(|| u16::from_be_bytes([payload[2], payload[3]]));
            let frame_rate = (payload.len() >= 6)
                .then(|| u16::from_be_bytes([payload[4], payload[5]]));
            Ok(DesktopCommand::Settings(SettingsFrame {
                image_kind: payload[0],
                compression: payload[1],
                scaling,
                frame_rate,
            }))
        }
        OP_REFRESH => Ok(DesktopCommand::Refresh),
        OP_PAUSE => Ok(DesktopCommand::Pause),
        OP_KEY_UNICODE => {
            if payload.len() < 3 {
                return Err(FrameError::Truncated { opcode });
            }
            Ok(DesktopCommand::UnicodeKey {
                flag: payload[0],
                code_unit: u16::from_be_bytes([payload[1], payload[2]]),
            })
        }
        OP_INPUT_LOCK => {
            if payload.len() < 5 {
                return Err(FrameError::Truncated { opcode });
            }
            Ok(DesktopCommand::InputLock {
                locked: payload[4] != 0,
            })
        }
        other => Err(FrameError::UnknownOpcode(other)),
    }
}

/// Encodes the outgoing display-size command (opcode 7, length 8).
pub fn encode_display_size(width: u16, height: u16) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[..2].copy_from_slice(&OP_DISPLAY_SIZE.to_be_bytes());
    buf[2..4].copy_from_slice(&8u16.to_be_bytes());
    buf[4..6].copy_from_slice(&width.to_be_bytes());
    buf[6..8].copy_from_slice(&height.to_be_bytes());
    buf
}
