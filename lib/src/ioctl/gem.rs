//! Safe wrappers for the GEM naming ioctls (`DRM_IOCTL_GEM_{CLOSE,FLINK,OPEN}`).
use std::os::unix::io::{AsFd, AsRawFd};

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::*;
    nix::ioctl_write_ptr!(
        drm_ioctl_gem_close,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_GEM_CLOSE,
        drm_gem_close
    );
    nix::ioctl_readwrite!(
        drm_ioctl_gem_flink,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_GEM_FLINK,
        drm_gem_flink
    );
    nix::ioctl_readwrite!(drm_ioctl_gem_open, DRM_IOCTL_BASE, DRM_IOCTL_NR_GEM_OPEN, drm_gem_open);
}

/// A GEM object opened from its global name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemObject {
    pub handle: u32,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum GemError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<GemError> for Errno {
    fn from(err: GemError) -> Self {
        match err {
            GemError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `DRM_IOCTL_GEM_CLOSE` ioctl.
pub fn gem_close(fd: &impl AsFd, handle: u32) -> Result<(), GemError> {
    let close = bindings::drm_gem_close { handle, pad: 0 };

    unsafe { ioctl::drm_ioctl_gem_close(fd.as_fd().as_raw_fd(), &close) }?;

    Ok(())
}

/// Safe wrapper around the `DRM_IOCTL_GEM_FLINK` ioctl. Returns a global name other processes
/// can open the object with.
pub fn gem_flink(fd: &impl AsFd, handle: u32) -> Result<u32, GemError> {
    let mut flink = bindings::drm_gem_flink { handle, name: 0 };

    unsafe { ioctl::drm_ioctl_gem_flink(fd.as_fd().as_raw_fd(), &mut flink) }?;

    Ok(flink.name)
}

/// Safe wrapper around the `DRM_IOCTL_GEM_OPEN` ioctl.
pub fn gem_open(fd: &impl AsFd, name: u32) -> Result<GemObject, GemError> {
    let mut open = bindings::drm_gem_open {
        name,
        ..Default::default()
    };

    unsafe { ioctl::drm_ioctl_gem_open(fd.as_fd().as_raw_fd(), &mut open) }?;

    Ok(GemObject {
        handle: open.handle,
        size: open.size,
    })
}
