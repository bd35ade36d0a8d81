//! Safe wrappers for the dumb-buffer ioctls (`DRM_IOCTL_MODE_{CREATE,MAP,DESTROY}_DUMB`).
//!
//! Dumb buffers are linear, CPU-mappable buffers any mode-setting driver can allocate. They
//! are not meant for GPU rendering but are always available.
use std::os::unix::io::{AsFd, AsRawFd};

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::*;
    nix::ioctl_readwrite!(
        drm_ioctl_mode_create_dumb,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_MODE_CREATE_DUMB,
        drm_mode_create_dumb
    );
    nix::ioctl_readwrite!(
        drm_ioctl_mode_map_dumb,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_MODE_MAP_DUMB,
        drm_mode_map_dumb
    );
    nix::ioctl_readwrite!(
        drm_ioctl_mode_destroy_dumb,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_MODE_DESTROY_DUMB,
        drm_mode_destroy_dumb
    );
}

/// What the kernel tells us about a freshly created dumb buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBuffer {
    /// GEM handle, local to the DRM file description.
    pub handle: u32,
    /// Bytes per line.
    pub pitch: u32,
    /// Total size of the allocation in bytes.
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum DumbError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<DumbError> for Errno {
    fn from(err: DumbError) -> Self {
        match err {
            DumbError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `DRM_IOCTL_MODE_CREATE_DUMB` ioctl.
pub fn create_dumb(
    fd: &impl AsFd,
    width: u32,
    height: u32,
    bpp: u32,
) -> Result<DumbBuffer, DumbError> {
    let mut create = bindings::drm_mode_create_dumb {
        width,
        height,
        bpp,
        ..Default::default()
    };

    unsafe { ioctl::drm_ioctl_mode_create_dumb(fd.as_fd().as_raw_fd(), &mut create) }?;

    Ok(DumbBuffer {
        handle: create.handle,
        pitch: create.pitch,
        size: create.size,
    })
}

/// Safe wrapper around the `DRM_IOCTL_MODE_MAP_DUMB` ioctl. Returns the fake offset to pass to
/// `mmap` on the device fd.
pub fn map_dumb(fd: &impl AsFd, handle: u32) -> Result<u64, DumbError> {
    let mut map = bindings::drm_mode_map_dumb {
        handle,
        ..Default::default()
    };

    unsafe { ioctl::drm_ioctl_mode_map_dumb(fd.as_fd().as_raw_fd(), &mut map) }?;

    Ok(map.offset)
}

/// Safe wrapper around the `DRM_IOCTL_MODE_DESTROY_DUMB` ioctl.
pub fn destroy_dumb(fd: &impl AsFd, handle: u32) -> Result<(), DumbError> {
    let mut destroy = bindings::drm_mode_destroy_dumb { handle };

    unsafe { ioctl::drm_ioctl_mode_destroy_dumb(fd.as_fd().as_raw_fd(), &mut destroy) }?;

    Ok(())
}
