//! Safe wrapper for the `DRM_IOCTL_VERSION` ioctl.
use std::mem;
use std::os::unix::io::{AsFd, AsRawFd};

use nix::errno::Errno;
use thiserror::Error;

use super::string_from_cstr;
use crate::bindings;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::{drm_version, DRM_IOCTL_BASE, DRM_IOCTL_NR_VERSION};
    nix::ioctl_readwrite!(drm_ioctl_version, DRM_IOCTL_BASE, DRM_IOCTL_NR_VERSION, drm_version);
}

/// Safe variant of `struct drm_version`. Only the name of the kernel driver is retrieved, which
/// is what backend selection is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patchlevel: i32,
    /// Name of the kernel module driving the device, e.g. `i915` or `virtio_gpu`.
    pub name: String,
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
    #[error("driver name is not a valid C string")]
    InvalidName,
}

impl From<VersionError> for Errno {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::IoctlError(e) => e,
            VersionError::InvalidName => Errno::EINVAL,
        }
    }
}

fn empty_version() -> bindings::drm_version {
    // Safe because all-zero is a valid value for the integers and null pointers of this
    // structure.
    unsafe { mem::zeroed() }
}

/// Safe wrapper around the `DRM_IOCTL_VERSION` ioctl.
///
/// The kernel reports the length of its strings on a first call; the name is then retrieved
/// with a second call into a buffer of that size.
pub fn version(fd: &impl AsFd) -> Result<Version, VersionError> {
    let mut drm_version = empty_version();
    unsafe { ioctl::drm_ioctl_version(fd.as_fd().as_raw_fd(), &mut drm_version) }?;

    // One extra byte so the name is always nul-terminated.
    let mut name = vec![0u8; drm_version.name_len + 1];
    let mut drm_version = bindings::drm_version {
        name_len: drm_version.name_len,
        name: name.as_mut_ptr() as *mut _,
        ..empty_version()
    };
    unsafe { ioctl::drm_ioctl_version(fd.as_fd().as_raw_fd(), &mut drm_version) }?;

    Ok(Version {
        major: drm_version.version_major,
        minor: drm_version.version_minor,
        patchlevel: drm_version.version_patchlevel,
        name: string_from_cstr(&name).map_err(|_| VersionError::InvalidName)?,
    })
}
