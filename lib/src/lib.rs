//! This library allocates shareable graphics buffers on top of the Linux DRM interface, and
//! provides two levels of abstraction over it:
//!
//! * The `ioctl` module provides direct, thin wrappers over the DRM ioctls the allocator needs,
//!   with added safety. Note that "safety" here is in terms of memory safety: this layer won't
//!   guard against passing invalid data that the ioctls will reject - it just makes sure that
//!   data passed from and to the kernel can be accessed safely.
//!
//! * The `gralloc` module provides the buffer-object layer: buffers are allocated by a
//!   hardware `backend` selected at runtime from the kernel driver name, handed out as
//!   shareable `handle`s, resolved back to live buffer objects through a process-wide registry,
//!   and locked for CPU access according to their declared usage.
//!
//! Backends only see the `backend::Backend` trait, so support for a new family of devices can
//! be added without touching the buffer-object bookkeeping.
pub mod backend;
#[doc(hidden)]
pub mod bindings;
pub mod bo;
pub mod context;
pub mod device;
pub mod error;
pub mod format;
pub mod gralloc;
pub mod handle;
pub mod ioctl;
mod lock;
pub mod registry;
pub mod usage;

#[cfg(test)]
mod testing;

use std::fmt;
use std::fmt::Display;

pub use context::DeviceContext;
pub use device::{Card, DeviceConfig, KernelDevice};
pub use error::{Error, Result};
pub use format::{PixelFormat, YCbCr};
pub use gralloc::Gralloc;
pub use handle::{BufferDescriptor, BufferHandle, MemoryRef};
pub use usage::Usage;

/// A DRM Fourcc pixel format, used to describe scanout framebuffers to the kernel. It can be
/// converted back and forth from a 32-bit integer, or a 4-bytes string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct DrmFourcc(u32);

impl DrmFourcc {
    pub const fn from_u32(v: u32) -> Self {
        Self(v)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn from_fourcc(n: &[u8; 4]) -> Self {
        Self(n[0] as u32 | (n[1] as u32) << 8 | (n[2] as u32) << 16 | (n[3] as u32) << 24)
    }

    pub const fn to_fourcc(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

/// Simple way to convert a string litteral (e.g. b"NV12") into a fourcc.
///
/// # Examples
///
/// ```
/// # use grallocr::DrmFourcc;
/// let nv12 = b"NV12";
/// let f = DrmFourcc::from(nv12);
/// assert_eq!(&<[u8; 4]>::from(f), nv12);
/// ```
impl From<&[u8; 4]> for DrmFourcc {
    fn from(n: &[u8; 4]) -> Self {
        Self::from_fourcc(n)
    }
}

/// Convert a fourcc back to its 4-character representation.
impl From<DrmFourcc> for [u8; 4] {
    fn from(format: DrmFourcc) -> Self {
        format.to_fourcc()
    }
}

/// Produces a debug string for this fourcc, including its hexadecimal and string
/// representation.
///
/// # Examples
///
/// ```
/// # use grallocr::DrmFourcc;
/// let f = DrmFourcc::from(b"XR24");
/// assert_eq!(format!("{:?}", f), "0x34325258 (XR24)");
/// ```
impl fmt::Debug for DrmFourcc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_fmt(format_args!("0x{:08x} ({})", self.0, self))
    }
}

impl fmt::Display for DrmFourcc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fourcc = self
            .0
            .to_le_bytes()
            .iter()
            .map(|&x| x as char)
            .collect::<String>();
        f.write_str(fourcc.as_str())
    }
}

/// Memory layout of up to four planes of a buffer, in the shape `DRM_IOCTL_MODE_ADDFB2` expects
/// it. Unused planes are left zeroed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct PlaneLayout {
    /// GEM handle backing each plane.
    pub handles: [u32; 4],
    /// Bytes per line of each plane.
    pub pitches: [u32; 4],
    /// Offset of each plane from the start of its memory object.
    pub offsets: [u32; 4],
}

impl PlaneLayout {
    /// Layout of a buffer whose pixels all live in a single plane.
    pub fn single(handle: u32, pitch: u32) -> Self {
        PlaneLayout {
            handles: [handle, 0, 0, 0],
            pitches: [pitch, 0, 0, 0],
            offsets: [0; 4],
        }
    }
}

/// Sub-region of a buffer requested for CPU access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Rect {
        Rect {
            left,
            top,
            width,
            height,
        }
    }
}

impl Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}), {}x{}",
            self.left, self.top, self.width, self.height
        )
    }
}
