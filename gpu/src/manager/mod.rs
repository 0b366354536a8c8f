//! The GPU resource manager.
//!
//! [`GpuResourceManager`] owns one device session and the named resource
//! registries. Its operations are split across submodules:
//! - `buffers` - allocation, writes, copies, mapping and readback
//! - `submission` - command encoders, queue submission and sync barriers
//! - `pipelines` - shaders, compute pipelines and bind groups
//!
//! Registry mutation takes `&mut self`; device-side work takes `&self`.

mod buffers;
mod pipelines;
mod submission;

pub use buffers::{CopyRequest, MappedRange, MappedView};
pub use submission::CommandEncoder;

use crate::backend::GpuBackend;
use crate::error::{GpuError, GpuResult};
use crate::frame::{self, FrameScheduler};
use crate::registry::{Registry, ResourceKind};
use crate::resources::{BindGroup, BindGroupLayout, Buffer, ComputePipeline, ShaderModule};
use crate::session::{DeviceLimits, DeviceOptions, DeviceSession};

/// Device session plus typed registries of named GPU resources.
#[derive(Debug)]
pub struct GpuResourceManager {
    session: Option<DeviceSession>,
    buffers: Registry<Buffer>,
    shaders: Registry<ShaderModule>,
    pipelines: Registry<ComputePipeline>,
    bind_groups: Registry<Vec<BindGroup>>,
    bind_group_layouts: Registry<Vec<BindGroupLayout>>,
}

impl Default for GpuResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuResourceManager {
    /// Create a manager with no device and empty registries.
    pub fn new() -> Self {
        Self {
            session: None,
            buffers: Registry::new(ResourceKind::Buffer),
            shaders: Registry::new(ResourceKind::Shader),
            pipelines: Registry::new(ResourceKind::Pipeline),
            bind_groups: Registry::new(ResourceKind::BindGroup),
            bind_group_layouts: Registry::new(ResourceKind::BindGroupLayout),
        }
    }

    /// Request an adapter and a device and make them the active session.
    ///
    /// Re-initializing replaces the previous session. Registered resources
    /// are kept, but belong to the old device.
    ///
    /// # Errors
    ///
    /// - [`GpuError::UnsupportedPlatform`] if the platform has no GPU capability
    /// - [`GpuError::NoAdapter`] if adapter negotiation fails
    /// - [`GpuError::DeviceRequestFailed`] if the adapter refuses the device
    pub async fn initialize(&mut self, options: &DeviceOptions) -> GpuResult<()> {
        let session = DeviceSession::request(options).await?;
        if self.session.replace(session).is_some() {
            log::info!("GpuResourceManager: replaced previous device session");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// The active session.
    pub fn session(&self) -> GpuResult<&DeviceSession> {
        self.session.as_ref().ok_or(GpuError::NotInitialized)
    }

    /// Limits of the active device.
    pub fn limits(&self) -> GpuResult<&DeviceLimits> {
        Ok(self.session()?.limits())
    }

    /// Backend of the active device.
    pub fn backend(&self) -> GpuResult<&GpuBackend> {
        Ok(self.session()?.backend())
    }

    pub fn buffers(&self) -> &Registry<Buffer> {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut Registry<Buffer> {
        &mut self.buffers
    }

    pub fn shaders(&self) -> &Registry<ShaderModule> {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut Registry<ShaderModule> {
        &mut self.shaders
    }

    pub fn pipelines(&self) -> &Registry<ComputePipeline> {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut Registry<ComputePipeline> {
        &mut self.pipelines
    }

    pub fn bind_groups(&self) -> &Registry<Vec<BindGroup>> {
        &self.bind_groups
    }

    pub fn bind_groups_mut(&mut self) -> &mut Registry<Vec<BindGroup>> {
        &mut self.bind_groups
    }

    pub fn bind_group_layouts(&self) -> &Registry<Vec<BindGroupLayout>> {
        &self.bind_group_layouts
    }

    pub fn bind_group_layouts_mut(&mut self) -> &mut Registry<Vec<BindGroupLayout>> {
        &mut self.bind_group_layouts
    }

    /// Run `work` on the next frame of `scheduler`.
    ///
    /// See [`frame::wait_for_next_frame`].
    pub async fn wait_for_next_frame<S, F, T, E>(scheduler: &S, work: F) -> GpuResult<T>
    where
        S: FrameScheduler + ?Sized,
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display,
    {
        frame::wait_for_next_frame(scheduler, work).await
    }
}
