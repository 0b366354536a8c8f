//! GPU error types.

use thiserror::Error;

use crate::registry::{ResourceKind, ResourceName};

/// Errors that can occur in the GPU resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    /// The platform exposes no GPU capability at all.
    #[error("no GPU capability available on this platform")]
    UnsupportedPlatform,
    /// Adapter negotiation failed.
    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(String),
    /// The adapter refused the device request.
    #[error("device request failed: {0}")]
    DeviceRequestFailed(String),
    /// An operation needed a device before `initialize` succeeded.
    #[error("device session is not initialized")]
    NotInitialized,
    /// Requested allocation exceeds the device storage buffer binding limit.
    #[error("buffer size {size} exceeds maximum storage buffer binding size {limit}")]
    BufferTooLarge { size: u64, limit: u64 },
    /// Lookup of a name that was never registered.
    #[error("{kind} '{name}' not found")]
    NotFound {
        kind: ResourceKind,
        name: ResourceName,
    },
    /// Host-side element range does not fit the source data.
    #[error("element range {offset}+{size} out of bounds for {len} elements")]
    DataRange {
        offset: usize,
        size: usize,
        len: usize,
    },
    /// Byte length is not a whole number of elements.
    #[error("{len} bytes is not a multiple of the element size {element_size}")]
    MisalignedData { len: u64, element_size: u64 },
    /// The command encoder was already submitted.
    #[error("command encoder already finished")]
    EncoderFinished,
    /// Work scheduled for the next frame failed. The cause is only logged.
    #[error("frame work rejected")]
    FrameRejected,
    /// Error reported by the device. Opaque to this layer.
    #[error("device error: {0}")]
    Device(String),
}

/// Result alias used across the crate.
pub type GpuResult<T> = Result<T, GpuError>;
