//! # RedLilium GPU
//!
//! Named GPU resource cache for RedLilium compute workloads.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GpuResourceManager`] - Device session, typed resource registries and
//!   the buffer upload/copy/readback pipeline
//! - [`Registry`] - Name to handle maps, one per resource kind
//! - [`GpuBackend`] - Device capability provider: wgpu, or Dummy (for testing)
//! - [`FrameScheduler`] - Hook for running work on the host's next frame
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_gpu::{BufferUsage, CopyRequest, DeviceOptions, ElementEncoding, GpuResourceManager};
//!
//! let mut manager = GpuResourceManager::new();
//! manager.initialize(&DeviceOptions::default()).await?;
//!
//! manager.create_registered_buffer(
//!     "weights",
//!     &vec![1.0f32, 2.0, 3.0, 4.0].into(),
//!     BufferUsage::STORAGE | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
//!     None,
//! )?;
//!
//! let copy = manager.copy_buffer(&CopyRequest::new("weights"), None, false).await?;
//! let view = manager.map_buffer(&copy, ElementEncoding::F32, None, None).await?;
//! println!("{:?}", view.data());
//! view.release();
//! ```

pub mod backend;
pub mod error;
pub mod frame;
pub mod manager;
pub mod registry;
pub mod resources;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend};
pub use error::{GpuError, GpuResult};
pub use frame::{FrameCallback, FrameScheduler, ManualFrameScheduler};
pub use manager::{CommandEncoder, CopyRequest, GpuResourceManager, MappedRange, MappedView};
pub use registry::{Registry, ResourceKind, ResourceName};
pub use resources::{BindGroup, BindGroupEntry, BindGroupLayout, Buffer, ComputePipeline, ShaderModule};
pub use session::{
    AdapterInfo, AdapterType, BACKEND_ENV_VAR, BackendType, DeviceLimits, DeviceOptions,
    DeviceSession, DummyAdapterConfig, PowerPreference,
};
pub use types::{BufferDescriptor, BufferUsage, ElementEncoding, TypedData};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the GPU subsystem.
///
/// Only logs the version; kept for symmetry with the other RedLilium crates.
pub fn init() {
    log::info!("RedLilium GPU v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_manager_starts_uninitialized() {
        let manager = GpuResourceManager::new();
        assert!(!manager.is_initialized());
        assert!(manager.buffers().is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new(&DummyAdapterConfig::default());
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
