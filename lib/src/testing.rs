//! Stand-ins for the kernel device and for a hardware backend, so the buffer-object layer can be
//! exercised without a DRM card.
use std::fs::File;
use std::os::unix::io::{AsFd, BorrowedFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nix::errno::Errno;

use crate::backend::{dumb, Backend, BackendBuffer, BackendError, BackendTable};
use crate::context::DeviceContext;
use crate::device::KernelDevice;
use crate::gralloc::Gralloc;
use crate::handle::{BufferDescriptor, MemoryRef};
use crate::ioctl::{self, AuthError, CardResources, MasterError, ModeError, Version, VersionError};
use crate::{DrmFourcc, PlaneLayout, Rect};

/// A kernel device that never issues ioctls. Its file descriptor is `/dev/null`.
pub(crate) struct FakeDevice {
    file: File,
    driver: String,
    pub magic: u32,
    pub fail_display: bool,
    pub fail_framebuffer: bool,
    pub authenticated: Mutex<Vec<u32>>,
    pub master: AtomicBool,
    pub display_inits: AtomicUsize,
    /// Ids of the framebuffers currently attached.
    pub framebuffers: Mutex<Vec<u32>>,
    next_fb: AtomicU32,
}

impl FakeDevice {
    pub fn new(driver: &str) -> Self {
        FakeDevice {
            file: File::open("/dev/null").unwrap(),
            driver: driver.to_string(),
            magic: 0x1234,
            fail_display: false,
            fail_framebuffer: false,
            authenticated: Mutex::new(Vec::new()),
            master: AtomicBool::new(false),
            display_inits: AtomicUsize::new(0),
            framebuffers: Mutex::new(Vec::new()),
            next_fb: AtomicU32::new(40),
        }
    }

    pub fn failing_display(self) -> Self {
        FakeDevice {
            fail_display: true,
            ..self
        }
    }

    pub fn failing_framebuffer(self) -> Self {
        FakeDevice {
            fail_framebuffer: true,
            ..self
        }
    }
}

impl AsFd for FakeDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl KernelDevice for FakeDevice {
    fn version(&self) -> Result<Version, VersionError> {
        Ok(Version {
            major: 1,
            minor: 0,
            patchlevel: 0,
            name: self.driver.clone(),
        })
    }

    fn get_magic(&self) -> Result<u32, AuthError> {
        Ok(self.magic)
    }

    fn auth_magic(&self, magic: u32) -> Result<(), AuthError> {
        self.authenticated.lock().unwrap().push(magic);
        Ok(())
    }

    fn set_master(&self) -> Result<(), MasterError> {
        if self.master.swap(true, Ordering::SeqCst) {
            return Err(MasterError::IoctlError(Errno::EBUSY));
        }
        Ok(())
    }

    fn drop_master(&self) -> Result<(), MasterError> {
        if !self.master.swap(false, Ordering::SeqCst) {
            return Err(MasterError::IoctlError(Errno::EINVAL));
        }
        Ok(())
    }

    fn init_display(&self) -> Result<CardResources, ModeError> {
        self.display_inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_display {
            return Err(ModeError::NoCrtc);
        }

        Ok(CardResources {
            count_fbs: 0,
            count_crtcs: 1,
            count_connectors: 1,
            count_encoders: 1,
            min_width: 0,
            max_width: 4096,
            min_height: 0,
            max_height: 4096,
        })
    }

    fn add_framebuffer(
        &self,
        _width: u32,
        _height: u32,
        _format: DrmFourcc,
        _layout: &PlaneLayout,
    ) -> Result<u32, ModeError> {
        if self.fail_framebuffer {
            return Err(ModeError::IoctlError(Errno::EINVAL));
        }

        let fb_id = self.next_fb.fetch_add(1, Ordering::SeqCst);
        self.framebuffers.lock().unwrap().push(fb_id);
        Ok(fb_id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> Result<(), ModeError> {
        let mut framebuffers = self.framebuffers.lock().unwrap();
        match framebuffers.iter().position(|id| *id == fb_id) {
            Some(pos) => {
                framebuffers.remove(pos);
                Ok(())
            }
            None => Err(ModeError::IoctlError(Errno::ENOENT)),
        }
    }
}

/// A backend allocating anonymous memory, counting the calls made to it.
pub(crate) struct MockBackend {
    pub allocs: AtomicUsize,
    pub imports: AtomicUsize,
    pub frees: AtomicUsize,
    pub maps: AtomicUsize,
    pub unmaps: AtomicUsize,
    pub fail_alloc: AtomicBool,
    pub fail_map: AtomicBool,
    next_name: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            allocs: AtomicUsize::new(0),
            imports: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
            fail_alloc: AtomicBool::new(false),
            fail_map: AtomicBool::new(false),
            next_name: AtomicU32::new(1),
        }
    }

    pub fn create(_device: Arc<dyn KernelDevice>) -> Result<Arc<dyn Backend>, BackendError> {
        Ok(Arc::new(MockBackend::new()))
    }

    /// Number of buffers allocated or imported and not freed yet.
    pub fn live(&self) -> usize {
        self.allocs.load(Ordering::SeqCst) + self.imports.load(Ordering::SeqCst)
            - self.frees.load(Ordering::SeqCst)
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn allocate(&self, descriptor: &BufferDescriptor) -> Result<BackendBuffer, BackendError> {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return Err(BackendError::OutOfMemory);
        }

        let geometry = descriptor
            .format
            .align_geometry(descriptor.width, descriptor.height)
            .ok_or(BackendError::OutOfMemory)?;
        let (stride, memory) = match descriptor.key() {
            Some(memory) => (descriptor.stride, Some(memory)),
            None => (
                geometry
                    .min_stride(descriptor.format)
                    .ok_or(BackendError::OutOfMemory)?,
                None,
            ),
        };
        let size = geometry.size(stride).ok_or(BackendError::OutOfMemory)?;
        let handle = self.next_name.fetch_add(1, Ordering::SeqCst);

        match memory {
            Some(memory) => {
                self.imports.fetch_add(1, Ordering::SeqCst);
                Ok(BackendBuffer::new(handle, size as u64, stride, memory, true))
            }
            None => {
                self.allocs.fetch_add(1, Ordering::SeqCst);
                Ok(BackendBuffer::new(
                    handle,
                    size as u64,
                    stride,
                    MemoryRef::Name(handle),
                    false,
                ))
            }
        }
    }

    fn free(&self, _buffer: BackendBuffer) {
        self.frees.fetch_add(1, Ordering::SeqCst);
    }

    fn map(
        &self,
        buffer: &mut BackendBuffer,
        _region: Rect,
        _write: bool,
    ) -> Result<NonNull<u8>, BackendError> {
        if self.fail_map.load(Ordering::SeqCst) {
            return Err(BackendError::Ioctl(Errno::EFAULT));
        }

        let addr = match &buffer.mapping {
            Some(mapping) => mapping.as_ptr(),
            None => {
                let mapping = ioctl::mmap_anonymous(buffer.size as usize)?;
                let addr = mapping.as_ptr();
                buffer.mapping = Some(mapping);
                addr
            }
        };
        buffer.map_count += 1;
        self.maps.fetch_add(1, Ordering::SeqCst);

        Ok(addr)
    }

    fn unmap(&self, buffer: &mut BackendBuffer) {
        self.unmaps.fetch_add(1, Ordering::SeqCst);
        buffer.map_count = buffer.map_count.saturating_sub(1);
        if buffer.map_count == 0 {
            buffer.mapping = None;
        }
    }

    fn resolve_planes(
        &self,
        buffer: &BackendBuffer,
        descriptor: &BufferDescriptor,
    ) -> Option<PlaneLayout> {
        dumb::planes_of(buffer.handle, descriptor)
    }
}

/// A table serving `backend` for the `mock` driver.
pub(crate) fn mock_table(backend: &Arc<MockBackend>) -> BackendTable {
    let backend = Arc::clone(backend);
    BackendTable::new().register("mock", move |_| {
        Ok(Arc::clone(&backend) as Arc<dyn Backend>)
    })
}

/// A context over `device`, with `backend` serving the `mock` driver.
pub(crate) fn mock_context(device: &Arc<FakeDevice>, backend: &Arc<MockBackend>) -> DeviceContext {
    let device = Arc::clone(device);
    DeviceContext::with_opener(
        move || Ok(Arc::clone(&device) as Arc<dyn KernelDevice>),
        mock_table(backend),
    )
}

/// An allocator over a fake `mock` device, along with the doubles it uses.
pub(crate) fn mock_gralloc() -> (Gralloc, Arc<FakeDevice>, Arc<MockBackend>) {
    mock_gralloc_with(FakeDevice::new("mock"))
}

pub(crate) fn mock_gralloc_with(
    device: FakeDevice,
) -> (Gralloc, Arc<FakeDevice>, Arc<MockBackend>) {
    let device = Arc::new(device);
    let backend = Arc::new(MockBackend::new());
    let gralloc = Gralloc::new(mock_context(&device, &backend));

    (gralloc, device, backend)
}
