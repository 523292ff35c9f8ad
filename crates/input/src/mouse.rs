//! Mouse bitmask decoding.

use vantage_protocol::MouseFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A decoded pointer event, in wire coordinates (mapping to local
/// coordinates happens afterwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Move { x: u16, y: u16 },
    Down { x: u16, y: u16, button: MouseButton },
    Up { x: u16, y: u16, button: MouseButton },
    /// Bitmask 136. The engine expands this into two full down/up
    /// pairs; peers depend on receiving four discrete events.
    DoubleClick { x: u16, y: u16 },
    Scroll { x: u16, y: u16, delta: i16 },
}

/// Decodes the button bitmask. A frame carrying a scroll delta is
/// always a scroll, regardless of the button byte; unknown bitmasks
/// fall back to a move.
pub fn decode_pointer(frame: &MouseFrame) -> PointerEvent {
    let (x, y) = (frame.x, frame.y);
    if let Some(delta) = frame.scroll {
        return PointerEvent::Scroll { x, y, delta };
    }
    match frame.button {
        0 => PointerEvent::Move { x, y },
        2 => PointerEvent::Down { x, y, button: MouseButton::Left },
        4 => PointerEvent::Up { x, y, button: MouseButton::Left },
        8 => PointerEvent::Down { x, y, button: MouseButton::Right },
        16 => PointerEvent::Up { x, y, button: MouseButton::Right },
        32 => PointerEvent::Down { x, y, button: MouseButton::Middle },
        64 => PointerEvent::Up { x, y, button: MouseButton::Middle },
        136 => PointerEvent::DoubleClick { x, y },
        _ => PointerEvent::Move { x, y },
    }
}
