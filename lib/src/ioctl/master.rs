//! Safe wrappers for the `DRM_IOCTL_SET_MASTER` and `DRM_IOCTL_DROP_MASTER` ioctls.
use std::os::unix::io::{AsFd, AsRawFd};

use nix::errno::Errno;
use thiserror::Error;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::{DRM_IOCTL_BASE, DRM_IOCTL_NR_DROP_MASTER, DRM_IOCTL_NR_SET_MASTER};
    nix::ioctl_none!(drm_ioctl_set_master, DRM_IOCTL_BASE, DRM_IOCTL_NR_SET_MASTER);
    nix::ioctl_none!(drm_ioctl_drop_master, DRM_IOCTL_BASE, DRM_IOCTL_NR_DROP_MASTER);
}

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<MasterError> for Errno {
    fn from(err: MasterError) -> Self {
        match err {
            MasterError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `DRM_IOCTL_SET_MASTER` ioctl.
pub fn set_master(fd: &impl AsFd) -> Result<(), MasterError> {
    unsafe { ioctl::drm_ioctl_set_master(fd.as_fd().as_raw_fd()) }?;

    Ok(())
}

/// Safe wrapper around the `DRM_IOCTL_DROP_MASTER` ioctl.
pub fn drop_master(fd: &impl AsFd) -> Result<(), MasterError> {
    unsafe { ioctl::drm_ioctl_drop_master(fd.as_fd().as_raw_fd()) }?;

    Ok(())
}
