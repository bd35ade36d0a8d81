//! Safe wrappers for the `DRM_IOCTL_GET_MAGIC` and `DRM_IOCTL_AUTH_MAGIC` ioctls.
use std::os::unix::io::{AsFd, AsRawFd};

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::{
        drm_auth, DRM_IOCTL_BASE, DRM_IOCTL_NR_AUTH_MAGIC, DRM_IOCTL_NR_GET_MAGIC,
    };
    nix::ioctl_read!(drm_ioctl_get_magic, DRM_IOCTL_BASE, DRM_IOCTL_NR_GET_MAGIC, drm_auth);
    nix::ioctl_write_ptr!(drm_ioctl_auth_magic, DRM_IOCTL_BASE, DRM_IOCTL_NR_AUTH_MAGIC, drm_auth);
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<AuthError> for Errno {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `DRM_IOCTL_GET_MAGIC` ioctl. Returns the token another client
/// holding master rights can use to authenticate us.
pub fn get_magic(fd: &impl AsFd) -> Result<u32, AuthError> {
    let mut auth = bindings::drm_auth::default();

    unsafe { ioctl::drm_ioctl_get_magic(fd.as_fd().as_raw_fd(), &mut auth) }?;

    Ok(auth.magic)
}

/// Safe wrapper around the `DRM_IOCTL_AUTH_MAGIC` ioctl.
pub fn auth_magic(fd: &impl AsFd, magic: u32) -> Result<(), AuthError> {
    let auth = bindings::drm_auth { magic };

    unsafe { ioctl::drm_ioctl_auth_magic(fd.as_fd().as_raw_fd(), &auth) }?;

    Ok(())
}
