//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, and WebGPU.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{GpuError, GpuResult};
use crate::resources::{BindGroupLayout, Buffer, ComputePipeline, ShaderModule};
use crate::session::{AdapterInfo, AdapterType, DeviceLimits, DeviceOptions, PowerPreference};
use crate::types::{BufferDescriptor, BufferUsage};

use super::{
    GpuBindGroup, GpuBindGroupLayout, GpuBuffer, GpuPipeline, GpuShaderModule, foreign_handle,
};

/// wgpu buffer together with its host-side mapping state.
///
/// The flag is set once a read mapping resolves and cleared by
/// [`unmap`](Self::unmap).
#[derive(Debug)]
pub struct WgpuBuffer {
    raw: wgpu::Buffer,
    mapped: AtomicBool,
}

impl WgpuBuffer {
    fn new(raw: wgpu::Buffer) -> Self {
        Self {
            raw,
            mapped: AtomicBool::new(false),
        }
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    pub fn unmap(&self) {
        if self.mapped.swap(false, Ordering::AcqRel) {
            self.raw.unmap();
        }
    }
}

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Negotiate an adapter and device.
    pub async fn request(options: &DeviceOptions) -> GpuResult<Self> {
        let backends = wgpu::Backends::all() & wgpu::Instance::enabled_backend_features();
        if backends.is_empty() {
            return Err(GpuError::UnsupportedPlatform);
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags: wgpu::InstanceFlags::default(),
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: convert_power_preference(options.power_preference),
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .map_err(|e| GpuError::NoAdapter(e.to_string()))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let required_limits = convert_limits(adapter.limits(), options.required_limits.as_ref())?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(options.label.as_str()),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GpuError::DeviceRequestFailed(e.to_string()))?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    pub fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();
        DeviceLimits {
            max_storage_buffer_binding_size: u64::from(limits.max_storage_buffer_binding_size),
            max_buffer_size: limits.max_buffer_size,
        }
    }

    pub fn adapter_info(&self) -> AdapterInfo {
        let info = self.adapter.get_info();
        let device_type = match info.device_type {
            wgpu::DeviceType::DiscreteGpu => AdapterType::Discrete,
            wgpu::DeviceType::IntegratedGpu => AdapterType::Integrated,
            wgpu::DeviceType::Cpu => AdapterType::Software,
            _ => AdapterType::Unknown,
        };
        AdapterInfo {
            name: info.name,
            device_type,
        }
    }

    /// Create a buffer resource.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<GpuBuffer> {
        log::trace!(
            "WgpuBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu(Arc::new(WgpuBuffer::new(buffer))))
    }

    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> GpuResult<()> {
        let raw = wgpu_buffer(buffer)?;
        self.queue.write_buffer(raw.raw(), offset, data);
        Ok(())
    }

    pub fn create_command_encoder(&self, label: Option<&str>) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label })
    }

    pub fn copy_buffer_to_buffer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> GpuResult<()> {
        encoder.copy_buffer_to_buffer(
            wgpu_buffer(source)?.raw(),
            source_offset,
            wgpu_buffer(destination)?.raw(),
            destination_offset,
            size,
        );
        Ok(())
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) -> GpuResult<()> {
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Resolve once the queue has drained.
    pub async fn wait_idle(&self) -> GpuResult<()> {
        let (sender, receiver) = futures_channel::oneshot::channel();
        self.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });

        // Native targets only fire callbacks while polling
        #[cfg(not(target_arch = "wasm32"))]
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        receiver
            .await
            .map_err(|_| GpuError::Device("queue completion callback dropped".into()))
    }

    /// Map a range for reading and copy it out. The buffer stays mapped.
    ///
    /// The range must be non-empty.
    pub async fn map_read(&self, buffer: &Buffer, offset: u64, size: u64) -> GpuResult<Vec<u8>> {
        let buffer = wgpu_buffer(buffer)?;
        let slice = buffer.raw().slice(offset..offset + size);
        let (sender, receiver) = futures_channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        #[cfg(not(target_arch = "wasm32"))]
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        receiver
            .await
            .map_err(|_| GpuError::Device("mapping callback channel closed".into()))?
            .map_err(|e| GpuError::Device(format!("buffer mapping failed: {e:?}")))?;

        buffer.mapped.store(true, Ordering::Release);
        let data = slice.get_mapped_range().to_vec();
        Ok(data)
    }

    /// Run `create` inside a validation error scope.
    ///
    /// A captured error becomes [`GpuError::Device`] and the object wgpu
    /// returned for it is dropped.
    async fn scoped<T>(&self, what: &str, create: impl FnOnce(&wgpu::Device) -> T) -> GpuResult<T> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match scope.pop().await {
            Some(error) => Err(GpuError::Device(format!("{what}: {error}"))),
            None => Ok(value),
        }
    }

    pub async fn create_shader_module(
        &self,
        label: Option<&str>,
        source: &str,
    ) -> GpuResult<GpuShaderModule> {
        log::trace!("WgpuBackend: creating shader module {:?}", label);
        let module = self
            .scoped("create_shader_module", |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label,
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
            })
            .await?;
        Ok(GpuShaderModule::Wgpu(Arc::new(module)))
    }

    /// Create a compute pipeline whose layout is derived from the shader.
    pub async fn create_compute_pipeline(
        &self,
        label: Option<&str>,
        shader: &ShaderModule,
        entry_point: &str,
    ) -> GpuResult<GpuPipeline> {
        let GpuShaderModule::Wgpu(module) = shader.gpu_handle() else {
            return Err(foreign_handle("shader module"));
        };
        log::trace!(
            "WgpuBackend: creating compute pipeline {:?} ({})",
            label,
            entry_point
        );
        let pipeline = self
            .scoped("create_compute_pipeline", |device| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label,
                    layout: None,
                    module,
                    entry_point: Some(entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .await?;
        Ok(GpuPipeline::Wgpu(Arc::new(pipeline)))
    }

    pub async fn pipeline_bind_group_layout(
        &self,
        pipeline: &ComputePipeline,
        index: u32,
    ) -> GpuResult<GpuBindGroupLayout> {
        let GpuPipeline::Wgpu(pipeline) = pipeline.gpu_handle() else {
            return Err(foreign_handle("compute pipeline"));
        };
        let layout = self
            .scoped("get_bind_group_layout", |_| {
                pipeline.get_bind_group_layout(index)
            })
            .await?;
        Ok(GpuBindGroupLayout::Wgpu(Arc::new(layout)))
    }

    pub async fn create_bind_group(
        &self,
        label: Option<&str>,
        layout: &BindGroupLayout,
        entries: &[(u32, &Buffer)],
    ) -> GpuResult<GpuBindGroup> {
        let GpuBindGroupLayout::Wgpu(layout) = layout.gpu_handle() else {
            return Err(foreign_handle("bind group layout"));
        };
        let entries = entries
            .iter()
            .map(|(binding, buffer)| {
                Ok(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu_buffer(buffer)?.raw().as_entire_binding(),
                })
            })
            .collect::<GpuResult<Vec<_>>>()?;
        let bind_group = self
            .scoped("create_bind_group", |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label,
                    layout,
                    entries: &entries,
                })
            })
            .await?;
        Ok(GpuBindGroup::Wgpu(Arc::new(bind_group)))
    }
}

fn wgpu_buffer(buffer: &Buffer) -> GpuResult<&WgpuBuffer> {
    match buffer.gpu_handle() {
        GpuBuffer::Wgpu(raw) => Ok(raw.as_ref()),
        #[allow(unreachable_patterns)]
        _ => Err(foreign_handle("buffer")),
    }
}

/// Start from the adapter's limits and lower them to what was requested.
fn convert_limits(
    adapter_limits: wgpu::Limits,
    required: Option<&DeviceLimits>,
) -> GpuResult<wgpu::Limits> {
    let Some(required) = required else {
        return Ok(adapter_limits);
    };
    let max_storage_buffer_binding_size = required
        .max_storage_buffer_binding_size
        .try_into()
        .map_err(|_| {
            GpuError::DeviceRequestFailed(format!(
                "max storage buffer binding size {} not representable",
                required.max_storage_buffer_binding_size
            ))
        })?;
    Ok(wgpu::Limits {
        max_storage_buffer_binding_size,
        max_buffer_size: required.max_buffer_size,
        ..adapter_limits
    })
}

fn convert_power_preference(preference: PowerPreference) -> wgpu::PowerPreference {
    match preference {
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
    }
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::MAP_READ) {
        result |= wgpu::BufferUsages::MAP_READ;
    }
    if usage.contains(BufferUsage::MAP_WRITE) {
        result |= wgpu::BufferUsages::MAP_WRITE;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        result |= wgpu::BufferUsages::INDIRECT;
    }

    result
}
