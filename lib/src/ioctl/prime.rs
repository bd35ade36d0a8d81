//! Safe wrapper for importing PRIME (dma-buf) file descriptors.
use nix::errno::Errno;
use std::os::unix::io::{AsFd, AsRawFd};
use thiserror::Error;

use crate::bindings;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::*;
    nix::ioctl_readwrite!(
        drm_ioctl_prime_fd_to_handle,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_PRIME_FD_TO_HANDLE,
        drm_prime_handle
    );
}

#[derive(Debug, Error)]
pub enum PrimeError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<PrimeError> for Errno {
    fn from(err: PrimeError) -> Self {
        match err {
            PrimeError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `DRM_IOCTL_PRIME_FD_TO_HANDLE` ioctl. Returns the GEM handle the
/// dma-buf is bound to on `fd`.
pub fn prime_fd_to_handle(fd: &impl AsFd, dmabuf: &impl AsFd) -> Result<u32, PrimeError> {
    let mut prime = bindings::drm_prime_handle {
        fd: dmabuf.as_fd().as_raw_fd(),
        ..Default::default()
    };

    unsafe { ioctl::drm_ioctl_prime_fd_to_handle(fd.as_fd().as_raw_fd(), &mut prime) }?;

    Ok(prime.handle)
}
