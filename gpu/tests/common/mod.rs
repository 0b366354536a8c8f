//! Common utilities for GPU integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across different backend implementations.

use redlilium_gpu::{
    BackendType, DeviceLimits, DeviceOptions, DummyAdapterConfig, GpuBackend, GpuResourceManager,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (host memory, always available).
    Dummy,
    /// wgpu backend on whatever adapter the platform offers.
    Wgpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu => true,
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::Wgpu => false,
        }
    }

    /// Device options selecting this backend.
    pub fn to_device_options(self) -> DeviceOptions {
        match self {
            Backend::Dummy => DeviceOptions::default().with_backend(BackendType::Dummy),
            Backend::Wgpu => DeviceOptions::default().with_backend(BackendType::Wgpu),
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Initialized manager for one backend.
pub struct TestContext {
    #[allow(dead_code)]
    pub backend: Backend,
    pub manager: GpuResourceManager,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not compiled in or no adapter exists.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_options(backend, backend.to_device_options())
    }

    /// Create a context whose device reports `limits`.
    ///
    /// The dummy adapter is configured with `limits`; wgpu requests them.
    #[allow(dead_code)]
    pub fn with_limits(backend: Backend, limits: DeviceLimits) -> Option<Self> {
        let options = match backend {
            Backend::Dummy => backend
                .to_device_options()
                .with_dummy_config(DummyAdapterConfig::default().with_limits(limits)),
            Backend::Wgpu => backend.to_device_options().with_required_limits(limits),
        };
        Self::with_options(backend, options)
    }

    fn with_options(backend: Backend, options: DeviceOptions) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        if !backend.is_available() {
            return None;
        }

        let mut manager = GpuResourceManager::new();
        pollster::block_on(manager.initialize(&options)).ok()?;
        Some(Self { backend, manager })
    }

    /// Submissions made so far, when the backend counts them.
    #[allow(dead_code)]
    pub fn submission_count(&self) -> Option<u64> {
        match self.manager.backend().ok()? {
            GpuBackend::Dummy(dummy) => Some(dummy.submission_count()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Buffers allocated so far, when the backend counts them.
    #[allow(dead_code)]
    pub fn buffer_count(&self) -> Option<u64> {
        match self.manager.backend().ok()? {
            GpuBackend::Dummy(dummy) => Some(dummy.buffer_count()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

// ============================================================================
// Data Helpers
// ============================================================================

/// Byte pattern `seed, seed + 1, ...` of length `len`.
#[allow(dead_code)]
pub fn generate_byte_pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Float pattern with distinct, exactly representable values.
#[allow(dead_code)]
pub fn generate_float_pattern(len: usize, scale: f32) -> Vec<f32> {
    (0..len).map(|i| i as f32 * scale - 1.0).collect()
}
