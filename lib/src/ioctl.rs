//! This module provides safer versions of the DRM ioctls used by the allocator through simple
//! functions working on anything that implements `AsFd`. This module can be used directly, but
//! the `device` and `gralloc` modules are very likely to be a better fit for application code.
//!
//! DRM ioctls are called with a single structure as argument, which serves to store both the
//! input and output of the ioctl. As with any such interface, it is easy to forget which parts of
//! the structure are to be filled by user-space and which parts the kernel will update.
//!
//! Consequently, each ioctl proxy function is designed as follows:
//!
//! * It takes the relevant input as parameters and not the entire input/output structure. This
//!   lifts any ambiguity as to which parts of the structure user-space is supposed to fill.
//! * It returns only the fields the kernel filled, as plain Rust values or small safe structures.
//!
//! For instance, `DRM_IOCTL_MODE_CREATE_DUMB` takes a `struct drm_mode_create_dumb` of which
//! user-space sets the geometry, and the kernel fills the handle, pitch and size. Our
//! [`crate::ioctl::create_dumb()`] function therefore takes the geometry and returns a
//! [`crate::ioctl::DumbBuffer`]:
//!
//! ```text
//! pub fn create_dumb(
//!     fd: &impl AsFd,
//!     width: u32,
//!     height: u32,
//!     bpp: u32,
//! ) -> Result<DumbBuffer, DumbError>;
//! ```
//!
//! Each ioctl family also has its own error type. Actual errors are captured by the `IoctlError`
//! variant, and all error types can be converted to their original error code using their
//! `Into<Errno>` implementation.

mod auth;
mod dumb;
mod gem;
mod master;
mod mmap;
mod mode;
mod prime;
mod version;

pub use auth::*;
pub use dumb::*;
pub use gem::*;
pub use master::*;
pub use mmap::*;
pub use mode::*;
pub use prime::*;
pub use version::*;

use std::ffi::CStr;
use std::ffi::FromBytesWithNulError;

use nix::errno::Errno;

/// Utility function for sub-modules.
/// Constructs an owned String instance from a slice containing a nul-terminated
/// C string, after checking that the passed slice indeed contains a nul
/// character.
fn string_from_cstr(c_str: &[u8]) -> Result<String, FromBytesWithNulError> {
    // Make sure that our string contains a nul character.
    let slice = match c_str.iter().position(|x| *x == b'\0') {
        // Pass the full slice, `from_bytes_with_nul` will return an error.
        None => c_str,
        Some(pos) => &c_str[..pos + 1],
    };

    Ok(CStr::from_bytes_with_nul(slice)?
        .to_string_lossy()
        .into_owned())
}

/// Extension trait for allowing easy conversion of ioctl errors into their originating error code.
pub trait IntoErrno {
    fn into_errno(self) -> i32;
}

impl<T> IntoErrno for T
where
    T: Into<Errno>,
{
    fn into_errno(self) -> i32 {
        self.into() as i32
    }
}
