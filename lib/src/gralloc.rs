//! The allocator as seen by its callers.
//!
//! `Gralloc` owns the device context and the handle registry of the process. Buffers are
//! designated by their handles: the process that allocated a buffer can use the handle
//! `bo_create` returned right away, and other processes make it usable with `bo_register`.
//! Every successful `bo_register` must eventually be balanced by a `bo_unregister`, and the
//! allocating process releases its own reference with `bo_decref_local`.
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use log::{debug, error};

use crate::bo::BufferObject;
use crate::context::DeviceContext;
use crate::device::DeviceConfig;
use crate::error::{Error, Result};
use crate::format::{PixelFormat, YCbCr};
use crate::handle::{BufferHandle, HandleKey};
use crate::registry::Registry;
use crate::usage::Usage;
use crate::{PlaneLayout, Rect};

pub struct Gralloc {
    context: DeviceContext,
    registry: Mutex<Registry>,
}

fn key_of(handle: &BufferHandle) -> Result<HandleKey> {
    handle.key().ok_or(Error::InvalidHandle)
}

impl Gralloc {
    pub fn new(context: DeviceContext) -> Self {
        Gralloc {
            context,
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Creates an allocator over the card selected by `config`. The card is only opened when
    /// first needed.
    pub fn open(config: DeviceConfig) -> Self {
        Gralloc::new(DeviceContext::new(config))
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    fn lookup(&self, handle: &BufferHandle) -> Result<Arc<BufferObject>> {
        let key = key_of(handle)?;
        self.registry
            .lock()
            .unwrap()
            .get(key)
            .ok_or(Error::InvalidHandle)
    }

    /// Allocates a buffer and returns its handle, along with its stride in pixels. The buffer
    /// starts with a single reference, owned by the caller.
    pub fn bo_create(
        &self,
        width: u32,
        height: u32,
        format: i32,
        usage: Usage,
    ) -> Result<(BufferHandle, u32)> {
        let format = PixelFormat::from_raw(format).ok_or_else(|| {
            error!("unknown pixel format {:#x}", format);
            Error::InvalidFormat(format)
        })?;

        let backend = self.context.backend()?;
        let device = self.context.device()?;
        let bo = BufferObject::create(backend, device, width, height, format, usage)?;
        let handle = bo.handle();
        let stride = bo.stride_in_pixels();

        self.registry.lock().unwrap().insert(Arc::new(bo))?;

        Ok((handle, stride))
    }

    /// Makes `handle` usable in this process, importing the buffer if it is not known yet.
    pub fn bo_register(&self, handle: &BufferHandle) -> Result<()> {
        let key = key_of(handle)?;
        self.context.ensure_ready(false)?;

        // Held across the import so that concurrent registrations of the same handle import it
        // only once.
        let mut registry = self.registry.lock().unwrap();
        if !registry.contains(key) {
            let backend = self.context.backend()?;
            let device = self.context.device()?;
            let bo = BufferObject::import(backend, device, handle)?;
            registry.insert(Arc::new(bo))?;
        }
        registry.acquire(key).ok_or(Error::InvalidHandle)?;
        debug!("registered {:?} ({:?} refs)", key, registry.refcount(key));

        Ok(())
    }

    /// Balances one `bo_register` call.
    pub fn bo_unregister(&self, handle: &BufferHandle) -> Result<()> {
        let key = key_of(handle)?;
        let mut registry = self.registry.lock().unwrap();
        let bo = registry.get(key).ok_or(Error::InvalidHandle)?;

        // The import holds a reference of its own.
        let count = if bo.is_imported() { 2 } else { 1 };
        registry.release(key, count)?;

        Ok(())
    }

    /// Drops the reference `bo_create` gave to the allocating process.
    pub fn bo_decref_local(&self, handle: &BufferHandle) -> Result<()> {
        let key = key_of(handle)?;
        self.registry.lock().unwrap().release(key, 1)?;

        Ok(())
    }

    /// Locks the buffer for `usage`. See `BufferObject::lock`.
    pub fn bo_lock(
        &self,
        handle: &BufferHandle,
        usage: Usage,
        region: Rect,
    ) -> Result<Option<NonNull<u8>>> {
        self.lookup(handle)?.lock(usage, region)
    }

    pub fn bo_lock_planar(
        &self,
        handle: &BufferHandle,
        usage: Usage,
        region: Rect,
    ) -> Result<YCbCr> {
        self.lookup(handle)?.lock_planar(usage, region)
    }

    /// Unlocks the buffer. Unknown handles are ignored.
    pub fn bo_unlock(&self, handle: &BufferHandle) {
        match self.lookup(handle) {
            Ok(bo) => bo.unlock(),
            Err(_) => debug!("unlock of unknown handle {:?}", handle.memory),
        }
    }

    /// Per-plane layout of the buffer, if the backend knows it.
    pub fn resolve_planes(&self, handle: &BufferHandle) -> Result<Option<PlaneLayout>> {
        Ok(self.lookup(handle)?.resolve_planes())
    }

    /// Number of references held on the buffer in this process, or `None` if it is not
    /// registered.
    pub fn bo_refcount(&self, handle: &BufferHandle) -> Option<usize> {
        let key = handle.key()?;
        self.registry.lock().unwrap().refcount(key)
    }

    /// The live buffer object behind `handle`.
    pub fn bo(&self, handle: &BufferHandle) -> Result<Arc<BufferObject>> {
        self.lookup(handle)
    }
}
