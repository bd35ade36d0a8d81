use core::num::NonZeroUsize;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;
use std::slice;

use log::error;
use nix::{errno::Errno, libc::off_t, sys::mman};
use thiserror::Error;

/// A CPU mapping of buffer memory. The mapping remains valid until the `Mapping` is dropped.
pub struct Mapping {
    addr: NonNull<u8>,
    len: usize,
}

// The mapping is plain memory and does not depend on the thread that created it.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the mapping.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.addr
    }

    pub fn as_slice(&self) -> &[u8] {
        // Safe because the pointer and length were constructed in `mmap()` and remain valid
        // for as long as `self` lives.
        unsafe { slice::from_raw_parts(self.addr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("addr", &self.addr)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // Safe because the pointer and length were constructed in mmap() and are always valid.
        unsafe { mman::munmap(self.addr.cast(), self.len) }.unwrap_or_else(|e| {
            error!("Error while unmapping buffer: {}", e);
        });
    }
}

#[derive(Debug, Error)]
pub enum MmapError {
    #[error("cannot map an empty buffer")]
    ZeroLength,
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<MmapError> for Errno {
    fn from(err: MmapError) -> Self {
        match err {
            MmapError::ZeroLength => Errno::EINVAL,
            MmapError::IoctlError(e) => e,
        }
    }
}

fn prot_flags(write: bool) -> mman::ProtFlags {
    if write {
        mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE
    } else {
        mman::ProtFlags::PROT_READ
    }
}

/// Maps `length` bytes of `fd` starting at `offset`, shared with every other mapping of the
/// same memory.
pub fn mmap(fd: &impl AsFd, offset: u64, length: usize, write: bool) -> Result<Mapping, MmapError> {
    let non_zero_length = NonZeroUsize::new(length).ok_or(MmapError::ZeroLength)?;
    let addr = unsafe {
        mman::mmap(
            None,
            non_zero_length,
            prot_flags(write),
            mman::MapFlags::MAP_SHARED,
            fd.as_fd(),
            offset as off_t,
        )
    }?;

    Ok(Mapping {
        addr: addr.cast(),
        len: length,
    })
}

/// Maps `length` bytes of zeroed, process-private memory.
pub fn mmap_anonymous(length: usize) -> Result<Mapping, MmapError> {
    let non_zero_length = NonZeroUsize::new(length).ok_or(MmapError::ZeroLength)?;
    let addr = unsafe {
        mman::mmap_anonymous(
            None,
            non_zero_length,
            prot_flags(true),
            mman::MapFlags::MAP_PRIVATE,
        )
    }?;

    Ok(Mapping {
        addr: addr.cast(),
        len: length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_mapping() {
        let mapping = mmap_anonymous(4096).unwrap();
        assert_eq!(mapping.len(), 4096);
        assert!(mapping.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_length_mapping() {
        assert!(matches!(mmap_anonymous(0), Err(MmapError::ZeroLength)));
    }
}
