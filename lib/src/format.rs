//! Pixel formats known to the allocator, and the geometry computations that depend on them.
use enumn::N;

use crate::DrmFourcc;

/// Pixel formats callers may allocate, with their shared numeric identifiers.
#[allow(non_camel_case_types)]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, N)]
pub enum PixelFormat {
    Rgba8888 = 1,
    Rgbx8888 = 2,
    Rgb888 = 3,
    Rgb565 = 4,
    Bgra8888 = 5,
    YCbCr_422_SP = 0x10,
    YCrCb_420_SP = 0x11,
    YCbCr_422_I = 0x14,
    YCbCr_420_888 = 0x23,
    Yv12 = 0x3231_5659,
}

/// Allocation geometry of a buffer once the format's alignment constraints are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    /// Number of lines to allocate, chroma planes included.
    pub height: u32,
    /// Number of lines of the first plane.
    pub planar_height: u32,
}

fn align(v: u32, a: u32) -> Option<u32> {
    Some(v.checked_add(a - 1)? & !(a - 1))
}

impl Geometry {
    /// Bytes per line of a tightly packed buffer of `format`.
    pub fn min_stride(&self, format: PixelFormat) -> Option<u32> {
        self.width.checked_mul(format.bpp())
    }

    /// Bytes covered by all the lines of the buffer when they are `stride` bytes apart. Plane
    /// offsets are 32-bit, so `None` is returned if that size does not fit.
    pub fn size(&self, stride: u32) -> Option<u32> {
        stride.checked_mul(self.height)
    }
}

impl PixelFormat {
    /// Converts a raw format identifier, returning `None` for unknown formats.
    pub fn from_raw(format: i32) -> Option<Self> {
        Self::n(format)
    }

    /// Bytes per pixel. For planar formats only the first plane is considered.
    pub fn bpp(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 | PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb565 | PixelFormat::YCbCr_422_I => 2,
            PixelFormat::Yv12
            | PixelFormat::YCbCr_422_SP
            | PixelFormat::YCrCb_420_SP
            | PixelFormat::YCbCr_420_888 => 1,
        }
    }

    /// Whether the format stores chroma in planes following the luma plane.
    pub fn is_planar(self) -> bool {
        self.bpp() == 1
    }

    /// Applies the alignment constraints of the format to a requested size, and accounts for the
    /// lines taken by chroma planes. Returns `None` if the result does not fit in 32 bits.
    pub fn align_geometry(self, width: u32, height: u32) -> Option<Geometry> {
        let (align_w, align_h, extra_height_div) = match self {
            PixelFormat::Yv12 => (32, 2, 2),
            PixelFormat::YCbCr_422_SP => (2, 1, 1),
            PixelFormat::YCrCb_420_SP | PixelFormat::YCbCr_420_888 => (2, 2, 2),
            PixelFormat::YCbCr_422_I => (2, 1, 0),
            _ => (1, 1, 0),
        };

        let width = align(width, align_w)?;
        let planar_height = align(height, align_h)?;
        let height = match extra_height_div {
            0 => planar_height,
            div => planar_height.checked_add(planar_height / div)?,
        };

        Some(Geometry {
            width,
            height,
            planar_height,
        })
    }

    /// Format of a scanout framebuffer showing a buffer of this format.
    pub fn drm_fourcc(self) -> DrmFourcc {
        DrmFourcc::from(match self {
            PixelFormat::Rgba8888 => b"AB24",
            PixelFormat::Rgbx8888 => b"XB24",
            PixelFormat::Rgb888 => b"BG24",
            PixelFormat::Rgb565 => b"RG16",
            PixelFormat::Bgra8888 => b"AR24",
            PixelFormat::YCbCr_422_SP => b"NV16",
            PixelFormat::YCrCb_420_SP => b"NV21",
            PixelFormat::YCbCr_422_I => b"YUYV",
            PixelFormat::YCbCr_420_888 => b"NV12",
            PixelFormat::Yv12 => b"YV12",
        })
    }
}

/// CPU addresses of the planes of a locked `YCbCr_420_888` buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YCbCr {
    pub y: *mut u8,
    pub cb: *mut u8,
    pub cr: *mut u8,
    /// Bytes per line of the luma plane.
    pub ystride: usize,
    /// Bytes per line of the chroma plane.
    pub cstride: usize,
    /// Distance in bytes between two consecutive samples of the same chroma component.
    pub chroma_step: usize,
}

/// Computes the plane addresses of a `YCbCr_420_888` buffer mapped at `base`. The interleaved
/// chroma plane immediately follows the `height` lines of the luma plane, Cb first.
pub fn ycbcr_layout(base: *mut u8, stride: u32, height: u32) -> YCbCr {
    let stride = stride as usize;
    let cb = base.wrapping_add(stride * height as usize);

    YCbCr {
        y: base,
        cb,
        cr: cb.wrapping_add(1),
        ystride: stride,
        cstride: stride,
        chroma_step: 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(PixelFormat::from_raw(1), Some(PixelFormat::Rgba8888));
        assert_eq!(
            PixelFormat::from_raw(0x3231_5659),
            Some(PixelFormat::Yv12)
        );
        assert_eq!(PixelFormat::from_raw(0), None);
        assert_eq!(PixelFormat::from_raw(0x22), None);
    }

    #[test]
    fn test_bpp() {
        assert_eq!(PixelFormat::Rgba8888.bpp(), 4);
        assert_eq!(PixelFormat::Rgb888.bpp(), 3);
        assert_eq!(PixelFormat::Rgb565.bpp(), 2);
        assert_eq!(PixelFormat::YCbCr_422_I.bpp(), 2);
        assert_eq!(PixelFormat::YCbCr_420_888.bpp(), 1);
        assert!(PixelFormat::Yv12.is_planar());
        assert!(!PixelFormat::YCbCr_422_I.is_planar());
    }

    #[test]
    fn test_align_geometry() {
        assert_eq!(
            PixelFormat::Rgba8888.align_geometry(17, 9),
            Some(Geometry {
                width: 17,
                height: 9,
                planar_height: 9
            })
        );
        assert_eq!(
            PixelFormat::Yv12.align_geometry(33, 9),
            Some(Geometry {
                width: 64,
                height: 15,
                planar_height: 10
            })
        );
        assert_eq!(
            PixelFormat::YCbCr_420_888.align_geometry(64, 64),
            Some(Geometry {
                width: 64,
                height: 96,
                planar_height: 64
            })
        );
        assert_eq!(
            PixelFormat::YCbCr_422_SP.align_geometry(63, 10),
            Some(Geometry {
                width: 64,
                height: 20,
                planar_height: 10
            })
        );
    }

    #[test]
    fn test_align_geometry_overflow() {
        assert_eq!(PixelFormat::Yv12.align_geometry(u32::MAX, 2), None);
        assert_eq!(PixelFormat::YCbCr_420_888.align_geometry(64, u32::MAX), None);
        assert_eq!(
            PixelFormat::YCrCb_420_SP.align_geometry(64, 0xc000_0000),
            None
        );

        let geometry = PixelFormat::Rgba8888.align_geometry(u32::MAX, 1).unwrap();
        assert_eq!(geometry.min_stride(PixelFormat::Rgba8888), None);
        assert_eq!(geometry.size(2), Some(2));
    }

    #[test]
    fn test_geometry_size() {
        let geometry = PixelFormat::Yv12.align_geometry(33, 9).unwrap();
        assert_eq!(geometry.min_stride(PixelFormat::Yv12), Some(64));
        assert_eq!(geometry.size(64), Some(64 * 15));
        assert_eq!(geometry.size(u32::MAX), None);
    }

    #[test]
    fn test_drm_fourcc() {
        assert_eq!(PixelFormat::Bgra8888.drm_fourcc().to_string(), "AR24");
        assert_eq!(PixelFormat::YCbCr_420_888.drm_fourcc().to_string(), "NV12");
    }

    #[test]
    fn test_ycbcr_layout() {
        let base = 0x10_0000 as *mut u8;
        let planes = ycbcr_layout(base, 64, 64);

        assert_eq!(planes.y, base);
        assert_eq!(planes.cb as usize, base as usize + 64 * 64);
        assert_eq!(planes.cr as usize, planes.cb as usize + 1);
        assert_eq!(planes.ystride, 64);
        assert_eq!(planes.cstride, 64);
        assert_eq!(planes.chroma_step, 2);
    }
}
