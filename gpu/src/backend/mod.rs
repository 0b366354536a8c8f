//! GPU backend abstraction layer.
//!
//! The backend is the device capability provider: adapter and device
//! negotiation, resource creation, command encoding, queue submission and
//! buffer mapping. The rest of the crate only talks to [`GpuBackend`].
//!
//! # Available Backends
//!
//! - `dummy`: Host-memory device for tests and headless development
//! - `wgpu-backend` (default feature): Cross-platform backend using wgpu
//!
//! Both backends apply the same buffer validation rules (usage flags,
//! bounds, copy alignment and mapping state), so errors surface identically
//! regardless of which one is active.

pub mod dummy;
mod validation;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

use std::sync::Arc;

use crate::error::{GpuError, GpuResult};
use crate::resources::{BindGroupLayout, Buffer, ComputePipeline, ShaderModule};
use crate::session::{AdapterInfo, BackendType, DeviceLimits, DeviceOptions};
use crate::types::BufferDescriptor;

pub use dummy::{
    DummyBackend, DummyBindGroup, DummyBindGroupLayout, DummyBuffer, DummyCommandEncoder,
    DummyPipeline, DummyShaderModule,
};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::{WgpuBackend, WgpuBuffer};

/// Handle to a GPU buffer resource.
#[derive(Debug, Clone)]
pub enum GpuBuffer {
    /// Dummy backend buffer (host memory)
    Dummy(Arc<DummyBuffer>),
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<WgpuBuffer>),
}

impl GpuBuffer {
    /// Whether the buffer has a mapped range that was not released.
    pub fn is_mapped(&self) -> bool {
        match self {
            Self::Dummy(buffer) => buffer.is_mapped(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => buffer.is_mapped(),
        }
    }

    /// Release the mapped range.
    pub fn unmap(&self) {
        match self {
            Self::Dummy(buffer) => buffer.unmap(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => buffer.unmap(),
        }
    }

    /// Whether both handles refer to the same device buffer.
    pub fn ptr_eq(&self, other: &GpuBuffer) -> bool {
        match (self, other) {
            (Self::Dummy(a), Self::Dummy(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "wgpu-backend")]
            (Self::Wgpu(a), Self::Wgpu(b)) => Arc::ptr_eq(a, b),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

/// Handle to a shader module.
#[derive(Debug, Clone)]
pub enum GpuShaderModule {
    Dummy(Arc<DummyShaderModule>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::ShaderModule>),
}

/// Handle to a compute pipeline.
#[derive(Debug, Clone)]
pub enum GpuPipeline {
    Dummy(Arc<DummyPipeline>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::ComputePipeline>),
}

/// Handle to a bind group layout.
#[derive(Debug, Clone)]
pub enum GpuBindGroupLayout {
    Dummy(Arc<DummyBindGroupLayout>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::BindGroupLayout>),
}

/// Handle to a bind group.
#[derive(Debug, Clone)]
pub enum GpuBindGroup {
    Dummy(Arc<DummyBindGroup>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::BindGroup>),
}

/// Command recorder owned by one backend.
#[derive(Debug)]
pub enum GpuCommandEncoder {
    Dummy(DummyCommandEncoder),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::CommandEncoder),
}

/// GPU backend wrapper dispatching to the active implementation.
#[derive(Debug)]
pub enum GpuBackend {
    Dummy(DummyBackend),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(WgpuBackend),
}

impl GpuBackend {
    /// Negotiate an adapter and device for `options.backend`.
    ///
    /// [`BackendType::Auto`] tries wgpu first and falls back to the dummy
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::UnsupportedPlatform`], [`GpuError::NoAdapter`] or
    /// [`GpuError::DeviceRequestFailed`] depending on which step failed.
    pub async fn request(options: &DeviceOptions) -> GpuResult<Self> {
        match options.backend {
            BackendType::Dummy => Ok(Self::Dummy(DummyBackend::request(
                &options.dummy,
                options.required_limits.as_ref(),
            )?)),
            #[cfg(feature = "wgpu-backend")]
            BackendType::Wgpu => Ok(Self::Wgpu(WgpuBackend::request(options).await?)),
            #[cfg(not(feature = "wgpu-backend"))]
            BackendType::Wgpu => Err(GpuError::UnsupportedPlatform),
            BackendType::Auto => {
                #[cfg(feature = "wgpu-backend")]
                {
                    match WgpuBackend::request(options).await {
                        Ok(backend) => {
                            log::info!("Using wgpu backend");
                            return Ok(Self::Wgpu(backend));
                        }
                        Err(e) => {
                            log::warn!("Failed to create wgpu backend: {}", e);
                        }
                    }
                }

                log::info!("Using dummy backend");
                Ok(Self::Dummy(DummyBackend::request(
                    &options.dummy,
                    options.required_limits.as_ref(),
                )?))
            }
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dummy(backend) => backend.name(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.name(),
        }
    }

    /// Limits reported by the device.
    pub fn limits(&self) -> DeviceLimits {
        match self {
            Self::Dummy(backend) => backend.limits(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.limits(),
        }
    }

    /// Information about the adapter the device was created on.
    pub fn adapter_info(&self) -> AdapterInfo {
        match self {
            Self::Dummy(backend) => backend.adapter_info(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.adapter_info(),
        }
    }

    /// Allocate a buffer.
    ///
    /// Descriptors the device would reject (empty or conflicting usage, size
    /// above `max_buffer_size`) fail with [`GpuError::Device`] before the
    /// device is called.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<Buffer> {
        validation::validate_create_buffer(descriptor, &self.limits())?;
        let raw = match self {
            Self::Dummy(backend) => backend.create_buffer(descriptor)?,
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.create_buffer(descriptor)?,
        };
        Ok(Buffer::new(descriptor.clone(), raw))
    }

    /// Queue a host to device write of `data` at byte `offset`.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> GpuResult<()> {
        validation::validate_write(buffer, offset, data.len() as u64)?;
        match self {
            Self::Dummy(backend) => backend.write_buffer(buffer, offset, data),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.write_buffer(buffer, offset, data),
        }
    }

    /// Create a command encoder.
    pub fn create_command_encoder(&self, label: Option<&str>) -> GpuCommandEncoder {
        match self {
            Self::Dummy(backend) => GpuCommandEncoder::Dummy(backend.create_command_encoder(label)),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => GpuCommandEncoder::Wgpu(backend.create_command_encoder(label)),
        }
    }

    /// Record a buffer to buffer copy.
    pub fn copy_buffer_to_buffer(
        &self,
        encoder: &mut GpuCommandEncoder,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> GpuResult<()> {
        validation::validate_copy(source, source_offset, destination, destination_offset, size)?;
        match (self, encoder) {
            (Self::Dummy(backend), GpuCommandEncoder::Dummy(encoder)) => backend
                .copy_buffer_to_buffer(
                    encoder,
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                ),
            #[cfg(feature = "wgpu-backend")]
            (Self::Wgpu(backend), GpuCommandEncoder::Wgpu(encoder)) => backend
                .copy_buffer_to_buffer(
                    encoder,
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                ),
            #[allow(unreachable_patterns)]
            _ => Err(foreign_handle("command encoder")),
        }
    }

    /// Finish `encoder` and submit it to the queue.
    pub fn submit(&self, encoder: GpuCommandEncoder) -> GpuResult<()> {
        match (self, encoder) {
            (Self::Dummy(backend), GpuCommandEncoder::Dummy(encoder)) => backend.submit(encoder),
            #[cfg(feature = "wgpu-backend")]
            (Self::Wgpu(backend), GpuCommandEncoder::Wgpu(encoder)) => backend.submit(encoder),
            #[allow(unreachable_patterns)]
            _ => Err(foreign_handle("command encoder")),
        }
    }

    /// Resolve once every submission made so far has finished executing.
    pub async fn wait_idle(&self) -> GpuResult<()> {
        match self {
            Self::Dummy(backend) => backend.wait_idle().await,
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.wait_idle().await,
        }
    }

    /// Map `size` bytes at `offset` for reading and copy them out.
    ///
    /// The range stays mapped until [`GpuBuffer::unmap`] is called.
    pub async fn map_read(&self, buffer: &Buffer, offset: u64, size: u64) -> GpuResult<Vec<u8>> {
        validation::validate_map_read(buffer, offset, size)?;
        match self {
            Self::Dummy(backend) => backend.map_read(buffer, offset, size).await,
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.map_read(buffer, offset, size).await,
        }
    }

    /// Create a shader module from WGSL source.
    ///
    /// Compilation errors are reported as [`GpuError::Device`].
    pub async fn create_shader_module(
        &self,
        label: Option<&str>,
        source: &str,
    ) -> GpuResult<ShaderModule> {
        let raw = match self {
            Self::Dummy(backend) => backend.create_shader_module(label, source),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.create_shader_module(label, source).await?,
        };
        Ok(ShaderModule::new(label.map(str::to_owned), raw))
    }

    /// Create a compute pipeline with an automatic layout.
    pub async fn create_compute_pipeline(
        &self,
        label: Option<&str>,
        shader: &ShaderModule,
        entry_point: &str,
    ) -> GpuResult<ComputePipeline> {
        let raw = match self {
            Self::Dummy(backend) => backend.create_compute_pipeline(label, shader, entry_point)?,
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => {
                backend
                    .create_compute_pipeline(label, shader, entry_point)
                    .await?
            }
        };
        Ok(ComputePipeline::new(
            label.map(str::to_owned),
            entry_point.to_owned(),
            raw,
        ))
    }

    /// Fetch the layout of bind group `index` of `pipeline`.
    pub async fn pipeline_bind_group_layout(
        &self,
        label: Option<&str>,
        pipeline: &ComputePipeline,
        index: u32,
    ) -> GpuResult<BindGroupLayout> {
        let raw = match self {
            Self::Dummy(backend) => backend.pipeline_bind_group_layout(pipeline, index)?,
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.pipeline_bind_group_layout(pipeline, index).await?,
        };
        Ok(BindGroupLayout::new(label.map(str::to_owned), raw))
    }

    /// Create a bind group binding whole buffers at the given indices.
    pub async fn create_bind_group(
        &self,
        label: Option<&str>,
        layout: &BindGroupLayout,
        entries: &[(u32, &Buffer)],
    ) -> GpuResult<crate::resources::BindGroup> {
        let raw = match self {
            Self::Dummy(backend) => backend.create_bind_group(layout, entries)?,
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(backend) => backend.create_bind_group(label, layout, entries).await?,
        };
        Ok(crate::resources::BindGroup::new(label.map(str::to_owned), raw))
    }
}

/// Error for a handle created by a different backend than the active one.
pub(crate) fn foreign_handle(what: &str) -> GpuError {
    GpuError::Device(format!("{what} belongs to a different backend"))
}

// Ensure handles can cross threads on native targets
#[cfg(not(target_arch = "wasm32"))]
static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
#[cfg(not(target_arch = "wasm32"))]
static_assertions::assert_impl_all!(GpuBackend: Send, Sync);
