//! Maps buffer handles to the buffer objects that are alive in the process, and counts the
//! references to them. The registry itself is not synchronized: its owner keeps it behind a
//! single lock, and holds that lock across lookup-then-import sequences.
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::bo::BufferObject;
use crate::error::{Error, Result};
use crate::handle::HandleKey;

struct Entry {
    bo: Arc<BufferObject>,
    refcount: usize,
}

#[derive(Default)]
pub struct Registry {
    entries: HashMap<HandleKey, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: HandleKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: HandleKey) -> Option<Arc<BufferObject>> {
        self.entries.get(&key).map(|entry| Arc::clone(&entry.bo))
    }

    pub fn refcount(&self, key: HandleKey) -> Option<usize> {
        self.entries.get(&key).map(|entry| entry.refcount)
    }

    /// Adds a newly created or imported buffer object, with a single reference.
    pub fn insert(&mut self, bo: Arc<BufferObject>) -> Result<HandleKey> {
        let key = bo.descriptor().key().ok_or(Error::InvalidHandle)?;
        if self.entries.contains_key(&key) {
            warn!("{:?} is already registered", key);
            return Err(Error::InvalidHandle);
        }

        self.entries.insert(key, Entry { bo, refcount: 1 });
        Ok(key)
    }

    /// Takes one more reference to the object registered under `key`.
    pub fn acquire(&mut self, key: HandleKey) -> Option<Arc<BufferObject>> {
        let entry = self.entries.get_mut(&key)?;
        entry.refcount += 1;

        Some(Arc::clone(&entry.bo))
    }

    /// Drops `count` references to the object registered under `key`. When none remain, the
    /// object is destroyed and removed. Returns whether that happened.
    pub fn release(&mut self, key: HandleKey, count: usize) -> Result<bool> {
        let entry = self.entries.get_mut(&key).ok_or(Error::InvalidHandle)?;
        entry.refcount = entry.refcount.saturating_sub(count);
        if entry.refcount > 0 {
            return Ok(false);
        }

        if let Some(entry) = self.entries.remove(&key) {
            entry.bo.destroy();
            debug!("unregistered {:?}", key);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::format::PixelFormat;
    use crate::testing::{FakeDevice, MockBackend};
    use crate::usage::Usage;

    fn new_bo(backend: &Arc<MockBackend>) -> Arc<BufferObject> {
        Arc::new(
            BufferObject::create(
                backend.clone(),
                Arc::new(FakeDevice::new("mock")),
                16,
                16,
                PixelFormat::Rgba8888,
                Usage::SW_READ_OFTEN,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_refcounting() {
        let backend = Arc::new(MockBackend::new());
        let mut registry = Registry::new();

        let bo = new_bo(&backend);
        let key = registry.insert(bo.clone()).unwrap();
        assert_eq!(registry.refcount(key), Some(1));
        assert!(registry.insert(bo.clone()).is_err());

        assert!(Arc::ptr_eq(&registry.acquire(key).unwrap(), &bo));
        assert_eq!(registry.refcount(key), Some(2));

        assert!(!registry.release(key, 1).unwrap());
        assert!(!bo.is_destroyed());
        assert!(registry.release(key, 1).unwrap());
        assert!(bo.is_destroyed());
        assert!(registry.is_empty());
        assert_eq!(backend.frees.load(Ordering::SeqCst), 1);

        assert!(matches!(registry.release(key, 1), Err(Error::InvalidHandle)));
        assert!(registry.acquire(key).is_none());
    }

    #[test]
    fn test_release_saturates() {
        let backend = Arc::new(MockBackend::new());
        let mut registry = Registry::new();

        let key = registry.insert(new_bo(&backend)).unwrap();
        assert!(registry.release(key, 2).unwrap());
        assert_eq!(registry.len(), 0);
        assert_eq!(backend.frees.load(Ordering::SeqCst), 1);
    }
}
