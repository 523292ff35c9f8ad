//! Shared desktop settings and the remote-input lock.
//!
//! Both are process-wide, read-mostly state shared by every tunnel of
//! the device. Writes happen only on explicit `Settings`/`InputLock`
//! commands; last-writer-wins is acceptable, so plain atomics with
//! relaxed ordering are enough.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use vantage_protocol::SettingsFrame;

/// Scaling level that means 100%.
pub const SCALING_UNITY: u32 = 1024;

/// Process-wide desktop encoding settings, injected into each tunnel
/// session rather than referenced as ambient globals.
#[derive(Debug)]
pub struct DesktopSettings {
    /// 1 = JPEG, 2 = PNG, 4 = WebP.
    image_kind: AtomicU8,
    /// Compression level 1–100.
    compression: AtomicU8,
    /// 1024 = 100%.
    scaling: AtomicU32,
    /// Frame-rate cap; 0 = uncapped.
    frame_rate: AtomicU32,
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self {
            image_kind: AtomicU8::new(1),
            compression: AtomicU8::new(60),
            scaling: AtomicU32::new(SCALING_UNITY),
            frame_rate: AtomicU32::new(0),
        }
    }
}

impl DesktopSettings {
    /// Applies a `Settings` command; omitted optional fields keep their
    /// current values.
    pub fn apply(&self, frame: &SettingsFrame) {
        self.image_kind.store(frame.image_kind, Ordering::Relaxed);
        self.compression.store(frame.compression, Ordering::Relaxed);
        if let Some(scaling) = frame.scaling {
            self.scaling.store(u32::from(scaling), Ordering::Relaxed);
        }
        if let Some(rate) = frame.frame_rate {
            self.frame_rate.store(u32::from(rate), Ordering::Relaxed);
        }
    }

    pub fn image_kind(&self) -> u8 {
        self.image_kind.load(Ordering::Relaxed)
    }

    pub fn compression(&self) -> u8 {
        self.compression.load(Ordering::Relaxed)
    }

    pub fn scaling_level(&self) -> u32 {
        self.scaling.load(Ordering::Relaxed)
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.load(Ordering::Relaxed)
    }

    /// Applies the scaling level to a capture size, producing the
    /// display size advertised to the peer.
    pub fn scaled_size(&self, width: u16, height: u16) -> (u16, u16) {
        let scaling = self.scaling_level();
        if scaling == SCALING_UNITY || scaling == 0 {
            return (width, height);
        }
        let w = (u32::from(width) * scaling) / SCALING_UNITY;
        let h = (u32::from(height) * scaling) / SCALING_UNITY;
        (w.min(u32::from(u16::MAX)) as u16, h.min(u32::from(u16::MAX)) as u16)
    }
}

/// Process-wide remote-input lock. While locked, the engine suppresses
/// all key/mouse emission; cursor tracking in the sink still runs.
#[derive(Debug, Default)]
pub struct RemoteInputLock(AtomicBool);

impl RemoteInputLock {
    pub fn set(&self, locked: bool) {
        self.0.store(locked, Ordering::Relaxed);
    }

    pub fn locked(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
