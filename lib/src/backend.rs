//! The capability interface hardware backends implement, and the table used to pick one from
//! the name of the kernel driver.
//!
//! A backend knows how one family of devices allocates, frees, and maps memory. The rest of the
//! crate never inspects hardware specifics: buffer objects only call through the `Backend`
//! trait, passing along the `BackendBuffer` the backend returned at allocation time.
pub mod dumb;

use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::Arc;

use log::info;
use nix::errno::Errno;
use thiserror::Error;

use crate::device::KernelDevice;
use crate::handle::{BufferDescriptor, MemoryRef};
use crate::ioctl::{DumbError, GemError, Mapping, MmapError, PrimeError};
use crate::{PlaneLayout, Rect};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("ioctl error: {0}")]
    Ioctl(#[from] Errno),
    #[error("mmap error: {0}")]
    Mmap(#[from] MmapError),
    #[error("out of memory")]
    OutOfMemory,
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

impl From<BackendError> for Errno {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Ioctl(e) => e,
            BackendError::Mmap(e) => e.into(),
            BackendError::OutOfMemory => Errno::ENOMEM,
            BackendError::Unsupported(_) => Errno::EOPNOTSUPP,
        }
    }
}

impl From<DumbError> for BackendError {
    fn from(err: DumbError) -> Self {
        BackendError::Ioctl(err.into())
    }
}

impl From<GemError> for BackendError {
    fn from(err: GemError) -> Self {
        BackendError::Ioctl(err.into())
    }
}

impl From<PrimeError> for BackendError {
    fn from(err: PrimeError) -> Self {
        BackendError::Ioctl(err.into())
    }
}

/// Backend-side state of an allocated or imported buffer.
#[derive(Debug)]
pub struct BackendBuffer {
    /// GEM handle of the buffer on the device file.
    pub handle: u32,
    /// Size of the memory in bytes.
    pub size: u64,
    /// Bytes per line of the first plane.
    pub stride: u32,
    /// Memory identity to publish in the descriptor of a local allocation.
    pub memory: MemoryRef,
    /// Whether the memory was opened from an external reference rather than allocated.
    pub imported: bool,
    /// CPU mapping of the buffer, if any.
    pub mapping: Option<Mapping>,
    /// Number of `map` calls the current mapping serves.
    pub map_count: u32,
}

impl BackendBuffer {
    pub fn new(handle: u32, size: u64, stride: u32, memory: MemoryRef, imported: bool) -> Self {
        BackendBuffer {
            handle,
            size,
            stride,
            memory,
            imported,
            mapping: None,
            map_count: 0,
        }
    }
}

/// Operations a hardware backend provides.
pub trait Backend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Allocates memory for `descriptor`. If the descriptor already references memory (it was
    /// received from another process), that memory is opened instead.
    fn allocate(&self, descriptor: &BufferDescriptor) -> Result<BackendBuffer, BackendError>;

    /// Releases the memory of `buffer`, along with any mapping still alive.
    fn free(&self, buffer: BackendBuffer);

    /// Makes `buffer` accessible to the CPU and returns the address of its first byte. Waits for
    /// pending hardware access to complete if needed.
    fn map(
        &self,
        buffer: &mut BackendBuffer,
        region: Rect,
        write: bool,
    ) -> Result<NonNull<u8>, BackendError>;

    /// Balances one successful `map` call.
    fn unmap(&self, buffer: &mut BackendBuffer);

    /// Returns the per-plane layout of multi-planar buffers. Backends that do not know better
    /// return `None`, in which case a single plane is assumed.
    fn resolve_planes(
        &self,
        _buffer: &BackendBuffer,
        _descriptor: &BufferDescriptor,
    ) -> Option<PlaneLayout> {
        None
    }
}

/// Creates a backend driving `device`.
pub type BackendConstructor =
    Arc<dyn Fn(Arc<dyn KernelDevice>) -> Result<Arc<dyn Backend>, BackendError> + Send + Sync>;

/// Kernel drivers served by the dumb-buffer backend in the default table. This covers every
/// driver a `/proc/fb` entry can lead to.
pub const DUMB_DRIVERS: &[&str] = &[
    "amdgpu",
    "i915",
    "nouveau",
    "radeon",
    "vmwgfx",
    "virtio_gpu",
    "vkms",
    "bochs-drm",
    "simpledrm",
    "qxl",
];

/// Maps kernel driver names to backend constructors. Lookups are exact: a driver that is not
/// listed has no backend.
#[derive(Clone)]
pub struct BackendTable {
    entries: Vec<(String, BackendConstructor)>,
}

impl BackendTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        BackendTable {
            entries: Vec::new(),
        }
    }

    /// Registers `constructor` for `driver`. A later registration for the same driver replaces
    /// the earlier one.
    pub fn register<F>(mut self, driver: &str, constructor: F) -> Self
    where
        F: Fn(Arc<dyn KernelDevice>) -> Result<Arc<dyn Backend>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.retain(|(name, _)| name != driver);
        self.entries.push((driver.to_string(), Arc::new(constructor)));
        self
    }

    pub fn lookup(&self, driver: &str) -> Option<&BackendConstructor> {
        self.entries
            .iter()
            .find(|(name, _)| name == driver)
            .map(|(_, constructor)| constructor)
    }

    /// Creates the backend registered for `driver`, or returns `None` if there is none.
    pub fn create(
        &self,
        driver: &str,
        device: Arc<dyn KernelDevice>,
    ) -> Option<Result<Arc<dyn Backend>, BackendError>> {
        let constructor = self.lookup(driver)?;
        let backend = constructor(device);
        if let Ok(backend) = &backend {
            info!("create {} for driver {}", backend.name(), driver);
        }

        Some(backend)
    }
}

impl Default for BackendTable {
    fn default() -> Self {
        DUMB_DRIVERS
            .iter()
            .fold(BackendTable::new(), |table, driver| {
                table.register(driver, dumb::DumbBackend::create)
            })
    }
}

impl Debug for BackendTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, MockBackend};

    #[test]
    fn test_default_table() {
        let table = BackendTable::default();
        assert!(table.lookup("vkms").is_some());
        assert!(table.lookup("virtio_gpu").is_some());
        assert!(table.lookup("nvidia-drm").is_none());
        assert!(table.lookup("").is_none());
    }

    #[test]
    fn test_default_table_serves_framebuffer_drivers() {
        let table = BackendTable::default();
        for (fb, driver) in crate::device::FB_DRIVERS {
            assert!(
                table.lookup(driver).is_some(),
                "no backend for {} ({})",
                driver,
                fb
            );
        }
    }

    #[test]
    fn test_register_and_create() {
        let table = BackendTable::new().register("mock", MockBackend::create);
        let device: Arc<dyn KernelDevice> = Arc::new(FakeDevice::new("mock"));

        let backend = table.create("mock", Arc::clone(&device)).unwrap().unwrap();
        assert_eq!(backend.name(), "mock");
        assert!(table.create("MOCK", device).is_none());
    }

    #[test]
    fn test_register_replaces() {
        fn failing(_: Arc<dyn KernelDevice>) -> Result<Arc<dyn Backend>, BackendError> {
            Err(BackendError::Unsupported("anything"))
        }

        let table = BackendTable::new()
            .register("mock", MockBackend::create)
            .register("mock", failing);
        let device: Arc<dyn KernelDevice> = Arc::new(FakeDevice::new("mock"));

        assert!(matches!(table.create("mock", device), Some(Err(_))));
    }
}
