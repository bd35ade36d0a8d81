//! Usage flags callers declare when allocating a buffer and pass again when locking it.
//!
//! The bit values are shared with callers and are never redefined here. Bits this module does
//! not name are preserved as-is, so they still take part in subset checks.
use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Usage: u32 {
        const SW_READ_RARELY = 0x0000_0002;
        const SW_READ_OFTEN = 0x0000_0003;
        const SW_READ_MASK = 0x0000_000f;

        const SW_WRITE_RARELY = 0x0000_0020;
        const SW_WRITE_OFTEN = 0x0000_0030;
        const SW_WRITE_MASK = 0x0000_00f0;

        const HW_TEXTURE = 0x0000_0100;
        const HW_RENDER = 0x0000_0200;
        const HW_2D = 0x0000_0400;
        const HW_COMPOSER = 0x0000_0800;
        const HW_FB = 0x0000_1000;
        const EXTERNAL_DISP = 0x0000_2000;
        const PROTECTED = 0x0000_4000;
        const CURSOR = 0x0000_8000;
        const HW_VIDEO_ENCODER = 0x0001_0000;
        const HW_CAMERA_WRITE = 0x0002_0000;
        const HW_CAMERA_READ = 0x0004_0000;
        const HW_MASK = 0x0007_1f00;

        const RENDERSCRIPT = 0x0010_0000;

        const PRIVATE_MASK = 0xf000_0000;

        // Keep unnamed bits around.
        const _ = !0;
    }
}

impl Usage {
    /// Builds a usage mask from raw caller bits, keeping bits we do not know about.
    pub const fn from_raw(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }

    /// Declared usages that allow a buffer to be locked with any usage at all, so that the
    /// display and test rendering paths can read or write them from the CPU.
    pub const LOCK_ANY: Usage = Usage::SW_READ_OFTEN
        .union(Usage::HW_FB)
        .union(Usage::HW_TEXTURE)
        .union(Usage::HW_VIDEO_ENCODER);

    /// Whether any software read access is requested.
    pub fn sw_read(self) -> bool {
        self.intersects(Usage::SW_READ_MASK)
    }

    /// Whether any software write access is requested.
    pub fn sw_write(self) -> bool {
        self.intersects(Usage::SW_WRITE_MASK)
    }

    /// Whether the CPU needs a mapping of the buffer to honor this usage.
    pub fn sw_access(self) -> bool {
        self.sw_read() || self.sw_write()
    }

    /// Whether a buffer declared with this usage must be attached to a scanout framebuffer.
    pub fn needs_framebuffer(self) -> bool {
        self.contains(Usage::HW_FB)
    }

    /// Whether a buffer declared with this usage tolerates locks for usages it did not declare.
    pub fn allows_any_lock(self) -> bool {
        self.intersects(Usage::LOCK_ANY)
    }
}
