//! Buffer types and descriptors.

use bitflags::bitflags;

/// Required alignment, in bytes, of buffer write and copy offsets and sizes.
pub const COPY_BUFFER_ALIGNMENT: u64 = 4;

/// Required alignment, in bytes, of the start of a mapped range.
pub const MAP_ALIGNMENT: u64 = 8;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer is mappable for CPU reads.
        const MAP_READ = 1 << 0;
        /// Buffer is mappable for CPU writes.
        const MAP_WRITE = 1 << 1;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 2;
        /// Buffer can be copied to, including queue writes.
        const COPY_DST = 1 << 3;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 4;
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 5;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 6;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 7;
        /// Buffer can be used as an indirect buffer.
        const INDIRECT = 1 << 8;

        /// Destination of a readback copy.
        const READBACK = Self::MAP_READ.bits() | Self::COPY_DST.bits();
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the debug label if one is given.
    pub fn with_optional_label(mut self, label: Option<&str>) -> Self {
        self.label = label.map(str::to_owned);
        self
    }
}
