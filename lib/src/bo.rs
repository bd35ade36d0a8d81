//! Buffer objects: the in-process counterpart of a buffer handle.
//!
//! A buffer object binds a descriptor to the backend memory behind it. It is created either by
//! allocating new memory (the object then owns its descriptor), or by importing a descriptor
//! received from another process (the descriptor is only borrowed). Reference counting is done
//! by the registry; this module only knows how to bring an object to life and how to release
//! it.
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, warn};
use nix::errno::Errno;

use crate::backend::{Backend, BackendBuffer, BackendError};
use crate::device::KernelDevice;
use crate::error::{Error, Result};
use crate::format::PixelFormat;
use crate::handle::{BufferDescriptor, BufferHandle, MemoryRef};
use crate::usage::Usage;
use crate::PlaneLayout;

pub(crate) enum Descriptor {
    /// Produced by a local allocation. Resources it references are released with the object.
    Owned(BufferHandle),
    /// Received from another process, which remains responsible for it.
    Borrowed(BufferHandle),
}

impl Descriptor {
    fn handle(&self) -> &BufferHandle {
        match self {
            Descriptor::Owned(handle) | Descriptor::Borrowed(handle) => handle,
        }
    }
}

/// Mutable state of a buffer object.
pub(crate) struct BoState {
    /// Backend memory. `None` once the object has been destroyed.
    pub buffer: Option<BackendBuffer>,
    /// Number of outstanding locks.
    pub lock_count: u32,
    /// Union of the usages of the outstanding locks. Empty when `lock_count` is 0.
    pub locked_for: Usage,
    /// Scanout framebuffer created over the memory, if any.
    pub fb_id: Option<u32>,
}

pub struct BufferObject {
    descriptor: Descriptor,
    pub(crate) backend: Arc<dyn Backend>,
    device: Arc<dyn KernelDevice>,
    pub(crate) state: Mutex<BoState>,
}

fn allocation_error(e: BackendError) -> Error {
    match e {
        BackendError::OutOfMemory => Error::OutOfMemory,
        e => Error::Backend(e),
    }
}

impl BufferObject {
    fn with_buffer(
        descriptor: Descriptor,
        backend: Arc<dyn Backend>,
        device: Arc<dyn KernelDevice>,
        buffer: BackendBuffer,
    ) -> Self {
        BufferObject {
            descriptor,
            backend,
            device,
            state: Mutex::new(BoState {
                buffer: Some(buffer),
                lock_count: 0,
                locked_for: Usage::empty(),
                fb_id: None,
            }),
        }
    }

    /// Allocates a new `width` x `height` buffer of `format`. If `usage` includes `HW_FB`, a
    /// scanout framebuffer is attached to it as well.
    pub fn create(
        backend: Arc<dyn Backend>,
        device: Arc<dyn KernelDevice>,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: Usage,
    ) -> Result<BufferObject> {
        let geometry = format
            .align_geometry(width, height)
            .filter(|g| g.min_stride(format).and_then(|stride| g.size(stride)).is_some())
            .ok_or_else(|| {
                error!("{}x{} buffer of format {:?} is too large", width, height, format);
                Error::OutOfMemory
            })?;
        let request = BufferDescriptor::new(width, height, format, usage)
            .with_planar_height(geometry.planar_height);

        let buffer = backend.allocate(&request).map_err(|e| {
            error!(
                "failed to allocate {}x{} buffer of format {:?}: {}",
                width, height, format, e
            );
            allocation_error(e)
        })?;

        let memory = buffer.memory;
        if !memory.is_valid() {
            error!("{} backend returned invalid memory {:?}", backend.name(), memory);
            backend.free(buffer);
            return Err(Error::InvalidHandle);
        }

        let descriptor = request.with_memory(memory, buffer.stride);
        debug!(
            "created {}x{} {:?} buffer {:?}, stride {}",
            width, height, format, memory, descriptor.stride
        );
        let bo = BufferObject::with_buffer(
            Descriptor::Owned(Arc::new(descriptor)),
            backend,
            device,
            buffer,
        );

        if usage.needs_framebuffer() {
            if let Err(e) = bo.attach_framebuffer() {
                bo.destroy();
                return Err(e);
            }
        }

        Ok(bo)
    }

    /// Opens the memory referenced by `handle`, which was allocated by another process.
    pub fn import(
        backend: Arc<dyn Backend>,
        device: Arc<dyn KernelDevice>,
        handle: &BufferHandle,
    ) -> Result<BufferObject> {
        if !handle.is_valid() {
            return Err(Error::InvalidHandle);
        }
        if handle.byte_size().is_none() {
            error!(
                "{:?} is too large: {}x{}, stride {}",
                handle.memory, handle.width, handle.height, handle.stride
            );
            return Err(Error::InvalidHandle);
        }

        let buffer = backend.allocate(handle).map_err(|e| {
            error!("failed to import {:?}: {}", handle.memory, e);
            allocation_error(e)
        })?;
        debug!("imported {:?}", handle.memory);

        Ok(BufferObject::with_buffer(
            Descriptor::Borrowed(Arc::clone(handle)),
            backend,
            device,
            buffer,
        ))
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        self.descriptor.handle()
    }

    /// A new reference to the handle of the buffer.
    pub fn handle(&self) -> BufferHandle {
        Arc::clone(self.descriptor.handle())
    }

    /// Whether the buffer was imported from another process.
    pub fn is_imported(&self) -> bool {
        matches!(self.descriptor, Descriptor::Borrowed(_))
    }

    /// Stride of the buffer in pixels rather than bytes.
    pub fn stride_in_pixels(&self) -> u32 {
        let descriptor = self.descriptor();
        descriptor.stride / descriptor.format.bpp()
    }

    /// Whether the memory has been released.
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().buffer.is_none()
    }

    /// Per-plane layout of the memory, as the backend describes it.
    pub fn resolve_planes(&self) -> Option<PlaneLayout> {
        let state = self.state.lock().unwrap();
        let buffer = state.buffer.as_ref()?;

        self.backend.resolve_planes(buffer, self.descriptor())
    }

    /// Id of the scanout framebuffer attached to the buffer, if any.
    pub fn framebuffer(&self) -> Option<u32> {
        self.state.lock().unwrap().fb_id
    }

    /// Creates a scanout framebuffer over the buffer, or returns the one already attached.
    pub fn attach_framebuffer(&self) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        if let Some(fb_id) = state.fb_id {
            return Ok(fb_id);
        }

        let descriptor = self.descriptor();
        let buffer = state.buffer.as_ref().ok_or(Error::InvalidHandle)?;
        let layout = self
            .backend
            .resolve_planes(buffer, descriptor)
            .unwrap_or_else(|| PlaneLayout::single(buffer.handle, descriptor.stride));

        let fb_id = self
            .device
            .add_framebuffer(
                descriptor.width,
                descriptor.height,
                descriptor.format.drm_fourcc(),
                &layout,
            )
            .map_err(|e| {
                error!("failed to add framebuffer: {}", e);
                Error::Kernel(Errno::from(e))
            })?;
        debug!("attached framebuffer {} to {:?}", fb_id, descriptor.memory);
        state.fb_id = Some(fb_id);

        Ok(fb_id)
    }

    fn detach_framebuffer(&self, state: &mut BoState) {
        if let Some(fb_id) = state.fb_id.take() {
            if let Err(e) = self.device.remove_framebuffer(fb_id) {
                error!("failed to remove framebuffer {}: {}", fb_id, e);
            }
        }
    }

    /// Detaches the framebuffer, releases the memory, and, for locally allocated buffers, the
    /// resources referenced by the descriptor. Does nothing if already destroyed.
    pub(crate) fn destroy(&self) {
        // Also runs on drop, where a poisoned lock must not stop the memory from being freed.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = match state.buffer.take() {
            Some(buffer) => buffer,
            None => return,
        };

        if state.lock_count > 0 {
            warn!(
                "destroying {:?} while locked {} times",
                self.descriptor().memory,
                state.lock_count
            );
            state.lock_count = 0;
            state.locked_for = Usage::empty();
        }

        self.detach_framebuffer(&mut state);
        self.backend.free(buffer);

        if let Descriptor::Owned(handle) = &self.descriptor {
            if let Some(MemoryRef::Prime(fd)) = handle.key() {
                if let Err(e) = nix::unistd::close(fd) {
                    error!("failed to close dma-buf {}: {}", fd, e);
                }
            }
        }
        debug!("destroyed {:?}", self.descriptor().memory);
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;

    use super::*;
    use crate::testing::{FakeDevice, MockBackend};

    fn doubles(device: FakeDevice) -> (Arc<FakeDevice>, Arc<MockBackend>) {
        (Arc::new(device), Arc::new(MockBackend::new()))
    }

    #[test]
    fn test_create() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let bo = BufferObject::create(
            backend.clone(),
            device.clone(),
            100,
            50,
            PixelFormat::Rgba8888,
            Usage::SW_READ_OFTEN | Usage::HW_TEXTURE,
        )
        .unwrap();

        let descriptor = bo.descriptor();
        assert_eq!(descriptor.width, 100);
        assert_eq!(descriptor.height, 50);
        assert_eq!(descriptor.stride, 400);
        assert!(descriptor.is_valid());
        assert_eq!(bo.stride_in_pixels(), 100);
        assert!(!bo.is_imported());
        assert_eq!(bo.framebuffer(), None);
        assert_eq!(backend.allocs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_create_planar_geometry() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let bo = BufferObject::create(
            backend,
            device,
            63,
            63,
            PixelFormat::YCbCr_420_888,
            Usage::SW_WRITE_OFTEN,
        )
        .unwrap();

        assert_eq!(bo.descriptor().stride, 64);
        assert_eq!(bo.descriptor().planar_height, 64);
        let layout = bo.resolve_planes().unwrap();
        assert_eq!(layout.offsets[1], 64 * 64);
    }

    #[test]
    fn test_create_out_of_memory() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        backend.fail_alloc.store(true, Ordering::SeqCst);

        assert!(matches!(
            BufferObject::create(
                backend,
                device,
                16,
                16,
                PixelFormat::Rgb565,
                Usage::HW_RENDER
            ),
            Err(Error::OutOfMemory)
        ));
    }

    #[test]
    fn test_create_with_framebuffer() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let bo = BufferObject::create(
            backend.clone(),
            device.clone(),
            64,
            64,
            PixelFormat::Bgra8888,
            Usage::HW_FB | Usage::HW_RENDER,
        )
        .unwrap();

        let fb_id = bo.framebuffer().unwrap();
        assert_eq!(*device.framebuffers.lock().unwrap(), vec![fb_id]);
        assert_eq!(bo.attach_framebuffer().unwrap(), fb_id);

        bo.destroy();
        assert!(device.framebuffers.lock().unwrap().is_empty());
        assert_eq!(backend.live(), 0);
    }

    #[test]
    fn test_create_too_large() {
        let (device, backend) = doubles(FakeDevice::new("mock"));

        for (width, height, format) in [
            (u32::MAX, 2, PixelFormat::Yv12),
            (64, u32::MAX, PixelFormat::YCbCr_420_888),
            (u32::MAX, 1, PixelFormat::Rgba8888),
            (65536, 65536, PixelFormat::Rgb565),
        ] {
            assert!(matches!(
                BufferObject::create(
                    backend.clone(),
                    device.clone(),
                    width,
                    height,
                    format,
                    Usage::SW_READ_OFTEN
                ),
                Err(Error::OutOfMemory)
            ));
        }
        assert_eq!(backend.allocs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_framebuffer_failure_releases_buffer() {
        let (device, backend) = doubles(FakeDevice::new("mock").failing_framebuffer());

        assert!(matches!(
            BufferObject::create(
                backend.clone(),
                device,
                64,
                64,
                PixelFormat::Rgbx8888,
                Usage::HW_FB
            ),
            Err(Error::Kernel(Errno::EINVAL))
        ));
        assert_eq!(backend.allocs.load(Ordering::SeqCst), 1);
        assert_eq!(backend.frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let handle = Arc::new(
            BufferDescriptor::new(32, 32, PixelFormat::Rgb565, Usage::HW_TEXTURE)
                .with_memory(MemoryRef::Name(77), 64),
        );

        let bo = BufferObject::import(backend.clone(), device.clone(), &handle).unwrap();
        assert!(bo.is_imported());
        assert!(Arc::ptr_eq(&bo.handle(), &handle));
        assert_eq!(backend.imports.load(Ordering::SeqCst), 1);

        let invalid = Arc::new(BufferDescriptor::new(
            32,
            32,
            PixelFormat::Rgb565,
            Usage::HW_TEXTURE,
        ));
        assert!(matches!(
            BufferObject::import(backend.clone(), device, &invalid),
            Err(Error::InvalidHandle)
        ));
        assert_eq!(backend.imports.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import_too_large() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let handle = Arc::new(
            BufferDescriptor::new(65536, 65536, PixelFormat::YCbCr_420_888, Usage::HW_FB)
                .with_memory(MemoryRef::Name(78), 65536),
        );

        assert!(matches!(
            BufferObject::import(backend.clone(), device, &handle),
            Err(Error::InvalidHandle)
        ));
        assert_eq!(backend.imports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_destroy_once() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let bo = BufferObject::create(
            backend.clone(),
            device,
            8,
            8,
            PixelFormat::Rgb888,
            Usage::SW_READ_RARELY,
        )
        .unwrap();

        bo.destroy();
        assert!(bo.is_destroyed());
        assert!(bo.resolve_planes().is_none());
        bo.destroy();
        drop(bo);
        assert_eq!(backend.frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_after_panic_while_locked() {
        let (device, backend) = doubles(FakeDevice::new("mock"));
        let bo = Arc::new(
            BufferObject::create(
                backend.clone(),
                device.clone(),
                64,
                64,
                PixelFormat::Bgra8888,
                Usage::HW_FB,
            )
            .unwrap(),
        );

        let other = Arc::clone(&bo);
        let res = thread::spawn(move || {
            let _state = other.state.lock().unwrap();
            panic!("panicking while holding the state lock");
        })
        .join();
        assert!(res.is_err());
        assert!(bo.state.is_poisoned());

        drop(bo);
        assert_eq!(backend.frees.load(Ordering::SeqCst), 1);
        assert!(device.framebuffers.lock().unwrap().is_empty());
    }
}
