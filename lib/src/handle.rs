//! Buffer handles: the opaque, shareable description of an allocated buffer.
//!
//! A `BufferDescriptor` carries everything another process needs to reconstruct a buffer:
//! geometry, format, declared usage, and the identity of the backing memory. It does not own
//! that memory. Descriptors are immutable once the allocation that produced them completed;
//! callers pass them around as `BufferHandle`s.
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::format::PixelFormat;
use crate::usage::Usage;

/// Identity of the memory backing a buffer, as seen by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRef {
    /// Global GEM name, valid on every open file of the same device.
    Name(u32),
    /// dma-buf file descriptor received from another process.
    Prime(RawFd),
}

impl MemoryRef {
    /// Whether the reference can possibly designate memory.
    pub fn is_valid(self) -> bool {
        match self {
            MemoryRef::Name(name) => name != 0,
            MemoryRef::Prime(fd) => fd >= 0,
        }
    }
}

/// Key under which buffer objects are registered in a process.
pub type HandleKey = MemoryRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Width of the buffer in pixels.
    pub width: u32,
    /// Height of the buffer in pixels.
    pub height: u32,
    /// Bytes per line of the first plane, as decided by the backend.
    pub stride: u32,
    /// Number of lines of the first plane. Chroma planes of planar formats start after it.
    pub planar_height: u32,
    pub format: PixelFormat,
    /// Usage declared at allocation time.
    pub usage: Usage,
    /// Backing memory, set once the buffer has been allocated.
    pub memory: Option<MemoryRef>,
}

/// Shareable handle to a buffer.
pub type BufferHandle = Arc<BufferDescriptor>;

impl BufferDescriptor {
    /// Describes a buffer that has not been allocated yet.
    pub fn new(width: u32, height: u32, format: PixelFormat, usage: Usage) -> Self {
        BufferDescriptor {
            width,
            height,
            stride: 0,
            planar_height: height,
            format,
            usage,
            memory: None,
        }
    }

    /// Completes the description with what the allocation produced, or with what was received
    /// from the process that allocated the buffer.
    pub fn with_memory(self, memory: MemoryRef, stride: u32) -> Self {
        BufferDescriptor {
            stride,
            memory: Some(memory),
            ..self
        }
    }

    pub fn with_planar_height(self, planar_height: u32) -> Self {
        BufferDescriptor {
            planar_height,
            ..self
        }
    }

    /// Registry key of the buffer, if it designates memory at all.
    pub fn key(&self) -> Option<HandleKey> {
        self.memory.filter(|m| m.is_valid())
    }

    /// Whether the descriptor can be used to reconstruct a buffer.
    pub fn is_valid(&self) -> bool {
        self.key().is_some()
    }

    /// Bytes spanned by the lines of the buffer at its stride, if that fits in 32 bits. Remote
    /// descriptors whose size does not fit cannot be described to the kernel.
    pub fn byte_size(&self) -> Option<u32> {
        self.format
            .align_geometry(self.width, self.height)?
            .size(self.stride)
    }

    /// Global GEM name of the buffer, or 0.
    pub fn gem_name(&self) -> u32 {
        match self.memory {
            Some(MemoryRef::Name(name)) => name,
            _ => 0,
        }
    }

    /// dma-buf descriptor of the buffer, or -1.
    pub fn prime_fd(&self) -> RawFd {
        match self.memory {
            Some(MemoryRef::Prime(fd)) => fd,
            _ => -1,
        }
    }
}
