//! Remote-to-local coordinate mapping.
//!
//! Two corrections apply, in this order:
//!
//! 1. Undo the remote display scaling (`scaling_level`: 1024 = 100%,
//!    512 = 50%), since the peer reports coordinates in scaled image
//!    space.
//! 2. Scale from the remote-reported display size to the actual local
//!    display size (the difference is system chrome such as status and
//!    navigation bars).
//!
//! All arithmetic is integer/truncating, matching the wire protocol's
//! integer coordinates.

/// A display size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub width: i32,
    pub height: i32,
}

impl Extent {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Maps a remote-reported coordinate pair into local display space.
pub fn map_coordinates(
    x: i32,
    y: i32,
    scaling_level: u32,
    remote: Extent,
    actual: Extent,
) -> (i32, i32) {
    let scaling = scaling_level as i32;
    let (dx, dy) = if scaling != 1024 && scaling > 0 {
        ((x * 1024) / scaling, (y * 1024) / scaling)
    } else {
        (x, y)
    };

    let lx = if remote.width > 0 && actual.width > 0 && remote.width != actual.width {
        (dx * actual.width) / remote.width
    } else {
        dx
    };
    let ly = if remote.height > 0 && actual.height > 0 && remote.height != actual.height {
        (dy * actual.height) / remote.height
    } else {
        dy
    };
    (lx, ly)
}
