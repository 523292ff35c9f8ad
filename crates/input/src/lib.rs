//! Input decoding for Vantage desktop tunnels.
//!
//! Pure translation from wire payloads to abstract input events: the
//! legacy and Unicode key tables, the mouse button bitmask, and the
//! remote-to-local coordinate mapper. The engine pushes decoded events
//! into an [`InputSink`]; how injection actually happens (accessibility
//! service, uinput, ...) is the host's concern.

pub mod keymap;
pub mod mapper;
pub mod mouse;
pub mod settings;

pub use keymap::{Key, KeyAction, KeyPress, decode_legacy_key, decode_unicode_key};
pub use mapper::{Extent, map_coordinates};
pub use mouse::{MouseButton, PointerEvent, decode_pointer};
pub use settings::{DesktopSettings, RemoteInputLock};

/// Receiver for decoded, coordinate-mapped input events.
///
/// Implementations must tolerate calls from multiple tunnel tasks.
pub trait InputSink: Send + Sync {
    fn inject_key(&self, action: KeyAction, press: KeyPress);
    fn inject_mouse_move(&self, x: i32, y: i32);
    fn inject_mouse_down(&self, x: i32, y: i32, button: MouseButton);
    fn inject_mouse_up(&self, x: i32, y: i32, button: MouseButton);
    fn inject_mouse_scroll(&self, x: i32, y: i32, delta: i16);

    /// Mirror of the global remote-input lock, so the sink can keep its
    /// cursor overlay in sync even while injection is suppressed.
    fn set_remote_input_locked(&self, locked: bool);
}
