//! CPU access to buffer objects.
//!
//! Locks nest: while a buffer is locked, it can be locked again for a subset of the usage it is
//! currently locked for. The memory is mapped for every lock that includes software access, and
//! each unlock balances one lock.
use std::ptr::NonNull;

use log::{debug, error};

use crate::bo::BufferObject;
use crate::error::{Error, Result};
use crate::format::{self, PixelFormat, YCbCr};
use crate::usage::Usage;
use crate::Rect;

impl BufferObject {
    /// Locks the buffer for `usage`. Returns the address of the mapped memory if `usage`, or the
    /// usage of the locks already held, includes software access, and `None` otherwise.
    pub fn lock(&self, usage: Usage, region: Rect) -> Result<Option<NonNull<u8>>> {
        let declared = self.descriptor().usage;

        // Some usages let clients lock for whatever they need.
        if !declared.contains(usage) && !declared.allows_any_lock() {
            error!(
                "lock usage {:#x} not declared by buffer (usage {:#x})",
                usage.bits(),
                declared.bits()
            );
            return Err(Error::UsageMismatch {
                declared,
                requested: usage,
            });
        }

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if state.lock_count > 0 && !state.locked_for.contains(usage) {
            error!(
                "bo is already locked for {:#x}, cannot lock for {:#x}",
                state.locked_for.bits(),
                usage.bits()
            );
            return Err(Error::IncompatibleLock {
                locked_for: state.locked_for,
                requested: usage,
            });
        }

        let usage = usage | state.locked_for;
        let buffer = state.buffer.as_mut().ok_or(Error::InvalidHandle)?;

        let addr = if usage.sw_access() {
            let addr = self
                .backend
                .map(buffer, region, usage.sw_write())
                .map_err(|e| {
                    error!("failed to map {:?}: {}", self.descriptor().memory, e);
                    Error::from(e)
                })?;
            Some(addr)
        } else {
            None
        };

        state.lock_count += 1;
        state.locked_for |= usage;
        debug!(
            "locked {:?} for {:#x} ({} {})",
            self.descriptor().memory,
            usage.bits(),
            region,
            state.lock_count
        );

        Ok(addr)
    }

    /// Balances one lock. Unlocking a buffer that is not locked does nothing.
    pub fn unlock(&self) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if state.lock_count == 0 {
            return;
        }

        if state.locked_for.sw_access() {
            if let Some(buffer) = state.buffer.as_mut() {
                self.backend.unmap(buffer);
            }
        }

        state.lock_count -= 1;
        if state.lock_count == 0 {
            state.locked_for = Usage::empty();
        }
    }

    /// Locks a `YCbCr_420_888` buffer for software access and returns the addresses of its
    /// planes.
    pub fn lock_planar(&self, usage: Usage, region: Rect) -> Result<YCbCr> {
        let descriptor = self.descriptor();
        if descriptor.format != PixelFormat::YCbCr_420_888 {
            return Err(Error::InvalidFormat(descriptor.format as i32));
        }

        let mismatch = Error::UsageMismatch {
            declared: descriptor.usage,
            requested: usage,
        };
        if !usage.sw_access() {
            return Err(mismatch);
        }

        let addr = self.lock(usage, region)?.ok_or(mismatch)?;

        Ok(format::ycbcr_layout(
            addr.as_ptr(),
            descriptor.stride,
            descriptor.planar_height,
        ))
    }

    pub fn lock_count(&self) -> u32 {
        self.state.lock().unwrap().lock_count
    }

    pub fn locked_for(&self) -> Usage {
        self.state.lock().unwrap().locked_for
    }
}
