//! Backend allocating KMS dumb buffers. Any mode-setting driver supports them, which makes this
//! backend usable on virtual and simple display devices that have no GPU-specific allocator.
use std::os::unix::io::{AsFd, BorrowedFd};
use std::ptr::NonNull;
use std::sync::Arc;

use log::{debug, error};
use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd::{lseek, Whence};

use super::{Backend, BackendBuffer, BackendError};
use crate::device::KernelDevice;
use crate::format::PixelFormat;
use crate::handle::{BufferDescriptor, MemoryRef};
use crate::ioctl;
use crate::{PlaneLayout, Rect};

pub struct DumbBackend {
    device: Arc<dyn KernelDevice>,
}

impl DumbBackend {
    pub fn new(device: Arc<dyn KernelDevice>) -> Self {
        DumbBackend { device }
    }

    /// Constructor suitable for a `BackendTable`.
    pub fn create(device: Arc<dyn KernelDevice>) -> Result<Arc<dyn Backend>, BackendError> {
        Ok(Arc::new(DumbBackend::new(device)))
    }

    fn fd(&self) -> BorrowedFd<'_> {
        self.device.as_fd()
    }

    fn open(
        &self,
        descriptor: &BufferDescriptor,
        memory: MemoryRef,
    ) -> Result<BackendBuffer, BackendError> {
        let (handle, size) = match memory {
            MemoryRef::Name(name) => {
                let object = ioctl::gem_open(&self.fd(), name)?;
                (object.handle, object.size)
            }
            MemoryRef::Prime(fd) => {
                fcntl(fd, FcntlArg::F_GETFD).map_err(|e| {
                    error!("invalid dma-buf descriptor {}: {}", fd, e);
                    BackendError::Ioctl(e)
                })?;
                // Some exporters do not support seeking.
                let size = match lseek(fd, 0, Whence::SeekEnd) {
                    Ok(size) if size > 0 => size as u64,
                    _ => descriptor.byte_size().ok_or(BackendError::OutOfMemory)? as u64,
                };

                // Safe because the fd was checked to be open above, and the descriptor keeps the
                // dma-buf open for as long as it is registered.
                let dmabuf = unsafe { BorrowedFd::borrow_raw(fd) };
                let handle = ioctl::prime_fd_to_handle(&self.fd(), &dmabuf)?;
                (handle, size)
            }
        };
        debug!("opened {:?} as GEM handle {}", memory, handle);

        Ok(BackendBuffer::new(
            handle,
            size,
            descriptor.stride,
            memory,
            true,
        ))
    }

    fn create_dumb(&self, descriptor: &BufferDescriptor) -> Result<BackendBuffer, BackendError> {
        let geometry = descriptor
            .format
            .align_geometry(descriptor.width, descriptor.height)
            .ok_or(BackendError::OutOfMemory)?;
        let dumb = ioctl::create_dumb(
            &self.fd(),
            geometry.width,
            geometry.height,
            descriptor.format.bpp() * 8,
        )?;

        let name = match ioctl::gem_flink(&self.fd(), dumb.handle) {
            Ok(name) => name,
            Err(e) => {
                error!("failed to name dumb buffer {}: {}", dumb.handle, e);
                if let Err(e) = ioctl::destroy_dumb(&self.fd(), dumb.handle) {
                    error!("failed to destroy dumb buffer {}: {}", dumb.handle, e);
                }
                return Err(e.into());
            }
        };

        Ok(BackendBuffer::new(
            dumb.handle,
            dumb.size,
            dumb.pitch,
            MemoryRef::Name(name),
            false,
        ))
    }
}

impl Backend for DumbBackend {
    fn name(&self) -> &'static str {
        "dumb"
    }

    fn allocate(&self, descriptor: &BufferDescriptor) -> Result<BackendBuffer, BackendError> {
        match descriptor.key() {
            Some(memory) => self.open(descriptor, memory),
            None => self.create_dumb(descriptor),
        }
    }

    fn free(&self, mut buffer: BackendBuffer) {
        buffer.mapping = None;

        let res = if buffer.imported {
            ioctl::gem_close(&self.fd(), buffer.handle).map_err(BackendError::from)
        } else {
            ioctl::destroy_dumb(&self.fd(), buffer.handle).map_err(BackendError::from)
        };
        if let Err(e) = res {
            error!("failed to free GEM handle {}: {}", buffer.handle, e);
        }
    }

    // Dumb buffers are linear and coherent: the whole buffer is mapped read-write once and the
    // mapping is shared by nested locks.
    fn map(
        &self,
        buffer: &mut BackendBuffer,
        _region: Rect,
        _write: bool,
    ) -> Result<NonNull<u8>, BackendError> {
        let addr = match &buffer.mapping {
            Some(mapping) => mapping.as_ptr(),
            None => {
                let offset = ioctl::map_dumb(&self.fd(), buffer.handle)?;
                let mapping = ioctl::mmap(&self.fd(), offset, buffer.size as usize, true)?;
                let addr = mapping.as_ptr();
                buffer.mapping = Some(mapping);
                addr
            }
        };
        buffer.map_count += 1;

        Ok(addr)
    }

    fn unmap(&self, buffer: &mut BackendBuffer) {
        if buffer.map_count == 0 {
            return;
        }

        buffer.map_count -= 1;
        if buffer.map_count == 0 {
            buffer.mapping = None;
        }
    }

    fn resolve_planes(
        &self,
        buffer: &BackendBuffer,
        descriptor: &BufferDescriptor,
    ) -> Option<PlaneLayout> {
        planes_of(buffer.handle, descriptor)
    }
}

/// Layout of the planes of a linear buffer of `descriptor`'s format, all stored in the memory
/// object `handle`. `None` for single-plane formats, and for geometries whose plane offsets do
/// not fit in 32 bits.
pub fn planes_of(handle: u32, descriptor: &BufferDescriptor) -> Option<PlaneLayout> {
    let stride = descriptor.stride;
    let luma_size = stride.checked_mul(descriptor.planar_height)?;

    match descriptor.format {
        PixelFormat::YCbCr_420_888 | PixelFormat::YCrCb_420_SP | PixelFormat::YCbCr_422_SP => {
            Some(PlaneLayout {
                handles: [handle, handle, 0, 0],
                pitches: [stride, stride, 0, 0],
                offsets: [0, luma_size, 0, 0],
            })
        }
        PixelFormat::Yv12 => {
            let cstride = ((stride / 2) + 15) & !15;
            let chroma_size = cstride.checked_mul(descriptor.planar_height / 2)?;
            // V comes before U.
            Some(PlaneLayout {
                handles: [handle, handle, handle, 0],
                pitches: [stride, cstride, cstride, 0],
                offsets: [0, luma_size, luma_size.checked_add(chroma_size)?, 0],
            })
        }
        _ => None,
    }
}
