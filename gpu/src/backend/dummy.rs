//! Dummy GPU backend for testing and development.
//!
//! Buffers live in host memory and copies execute at submission time, so the
//! full buffer pipeline (allocate, write, copy, map) can run without GPU
//! hardware. Adapter negotiation is driven by a [`DummyAdapterConfig`],
//! which lets tests reproduce platforms with no GPU or no adapter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{GpuError, GpuResult};
use crate::resources::{BindGroupLayout, Buffer, ComputePipeline, ShaderModule};
use crate::session::{AdapterInfo, AdapterType, DeviceLimits, DummyAdapterConfig};
use crate::types::BufferDescriptor;

use super::{
    GpuBindGroup, GpuBindGroupLayout, GpuBuffer, GpuPipeline, GpuShaderModule, foreign_handle,
};

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    config: DummyAdapterConfig,
    next_id: AtomicU64,
    buffers_created: AtomicU64,
    submissions: AtomicU64,
}

impl DummyBackend {
    /// Create a dummy backend without adapter negotiation.
    pub fn new(config: &DummyAdapterConfig) -> Self {
        Self {
            config: config.clone(),
            next_id: AtomicU64::new(1),
            buffers_created: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
        }
    }

    /// Negotiate a device the way a real platform would.
    ///
    /// # Errors
    ///
    /// Fails with [`GpuError::UnsupportedPlatform`] or [`GpuError::NoAdapter`]
    /// as configured, and with [`GpuError::DeviceRequestFailed`] when
    /// `required_limits` exceed the configured adapter limits.
    pub fn request(
        config: &DummyAdapterConfig,
        required_limits: Option<&DeviceLimits>,
    ) -> GpuResult<Self> {
        if !config.platform_supported {
            return Err(GpuError::UnsupportedPlatform);
        }
        if !config.adapter_available {
            return Err(GpuError::NoAdapter(
                "dummy adapter configured as unavailable".to_owned(),
            ));
        }
        if let Some(required) = required_limits
            && !required.fits_within(&config.limits)
        {
            return Err(GpuError::DeviceRequestFailed(format!(
                "required limits {:?} exceed adapter limits {:?}",
                required, config.limits
            )));
        }

        log::trace!("DummyBackend: device created on '{}'", config.adapter_name);
        Ok(Self::new(config))
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn limits(&self) -> DeviceLimits {
        self.config.limits
    }

    pub fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.config.adapter_name.clone(),
            device_type: AdapterType::Software,
        }
    }

    /// Number of buffers created so far.
    pub fn buffer_count(&self) -> u64 {
        self.buffers_created.load(Ordering::Relaxed)
    }

    /// Number of command buffers submitted so far.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a zero-filled buffer resource.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<GpuBuffer> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let len = usize::try_from(descriptor.size).map_err(|_| {
            GpuError::Device(format!("buffer size {} not addressable", descriptor.size))
        })?;
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
        Ok(GpuBuffer::Dummy(Arc::new(DummyBuffer::new(self.next_id(), len))))
    }

    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> GpuResult<()> {
        log::trace!(
            "DummyBackend: writing {} bytes to {:?} at offset {}",
            data.len(),
            buffer.label(),
            offset
        );
        let raw = dummy_buffer(buffer)?;
        let start = offset as usize;
        raw.state.lock().contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn create_command_encoder(&self, label: Option<&str>) -> DummyCommandEncoder {
        log::trace!("DummyBackend: creating command encoder {:?}", label);
        DummyCommandEncoder {
            label: label.map(str::to_owned),
            commands: Vec::new(),
        }
    }

    pub fn copy_buffer_to_buffer(
        &self,
        encoder: &mut DummyCommandEncoder,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> GpuResult<()> {
        log::trace!(
            "DummyBackend: recording copy of {} bytes {:?} -> {:?}",
            size,
            source.label(),
            destination.label()
        );
        encoder.commands.push(CopyCommand {
            source: Arc::clone(dummy_buffer(source)?),
            source_offset: source_offset as usize,
            destination: Arc::clone(dummy_buffer(destination)?),
            destination_offset: destination_offset as usize,
            size: size as usize,
        });
        Ok(())
    }

    /// Execute the recorded commands in order.
    ///
    /// Every command is validated before any of them runs.
    pub fn submit(&self, encoder: DummyCommandEncoder) -> GpuResult<()> {
        log::trace!(
            "DummyBackend: submitting {:?} with {} commands",
            encoder.label,
            encoder.commands.len()
        );
        if let Some(mapped) = encoder
            .commands
            .iter()
            .find(|c| c.source.is_mapped() || c.destination.is_mapped())
        {
            let id = if mapped.source.is_mapped() {
                mapped.source.id
            } else {
                mapped.destination.id
            };
            return Err(GpuError::Device(format!(
                "submit: buffer #{id} used while mapped"
            )));
        }

        for command in &encoder.commands {
            let bytes = command.source.state.lock().contents
                [command.source_offset..command.source_offset + command.size]
                .to_vec();
            command.destination.state.lock().contents
                [command.destination_offset..command.destination_offset + command.size]
                .copy_from_slice(&bytes);
        }
        self.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Submissions complete synchronously, so the queue is always idle.
    pub async fn wait_idle(&self) -> GpuResult<()> {
        Ok(())
    }

    pub async fn map_read(&self, buffer: &Buffer, offset: u64, size: u64) -> GpuResult<Vec<u8>> {
        log::trace!(
            "DummyBackend: mapping {:?} range {}+{}",
            buffer.label(),
            offset,
            size
        );
        let raw = dummy_buffer(buffer)?;
        let mut state = raw.state.lock();
        if state.mapped {
            return Err(GpuError::Device(format!(
                "map_read: buffer #{} is already mapped",
                raw.id
            )));
        }
        state.mapped = true;
        let start = offset as usize;
        Ok(state.contents[start..start + size as usize].to_vec())
    }

    pub fn create_shader_module(&self, label: Option<&str>, source: &str) -> GpuShaderModule {
        log::trace!("DummyBackend: creating shader module {:?}", label);
        GpuShaderModule::Dummy(Arc::new(DummyShaderModule {
            source: source.to_owned(),
        }))
    }

    /// Create a pipeline if `entry_point` names a function of the shader.
    pub fn create_compute_pipeline(
        &self,
        label: Option<&str>,
        shader: &ShaderModule,
        entry_point: &str,
    ) -> GpuResult<GpuPipeline> {
        log::trace!(
            "DummyBackend: creating compute pipeline {:?} ({})",
            label,
            entry_point
        );
        let GpuShaderModule::Dummy(module) = shader.gpu_handle() else {
            return Err(foreign_handle("shader module"));
        };
        if !module.declares_function(entry_point) {
            return Err(GpuError::Device(format!(
                "entry point '{entry_point}' not found in shader"
            )));
        }
        Ok(GpuPipeline::Dummy(Arc::new(DummyPipeline {
            id: self.next_id(),
            entry_point: entry_point.to_owned(),
            group_count: module.group_count(),
        })))
    }

    pub fn pipeline_bind_group_layout(
        &self,
        pipeline: &ComputePipeline,
        index: u32,
    ) -> GpuResult<GpuBindGroupLayout> {
        let GpuPipeline::Dummy(pipeline) = pipeline.gpu_handle() else {
            return Err(foreign_handle("compute pipeline"));
        };
        if index >= pipeline.group_count {
            return Err(GpuError::Device(format!(
                "bind group index {index} out of range for pipeline with {} groups",
                pipeline.group_count
            )));
        }
        Ok(GpuBindGroupLayout::Dummy(Arc::new(DummyBindGroupLayout {
            pipeline_id: pipeline.id,
            group_index: index,
        })))
    }

    pub fn create_bind_group(
        &self,
        layout: &BindGroupLayout,
        entries: &[(u32, &Buffer)],
    ) -> GpuResult<GpuBindGroup> {
        let GpuBindGroupLayout::Dummy(layout) = layout.gpu_handle() else {
            return Err(foreign_handle("bind group layout"));
        };
        let buffers = entries
            .iter()
            .map(|(binding, buffer)| Ok((*binding, Arc::clone(dummy_buffer(buffer)?))))
            .collect::<GpuResult<Vec<_>>>()?;
        Ok(GpuBindGroup::Dummy(Arc::new(DummyBindGroup {
            layout: Arc::clone(layout),
            buffers,
        })))
    }
}

fn dummy_buffer(buffer: &Buffer) -> GpuResult<&Arc<DummyBuffer>> {
    match buffer.gpu_handle() {
        GpuBuffer::Dummy(raw) => Ok(raw),
        #[allow(unreachable_patterns)]
        _ => Err(foreign_handle("buffer")),
    }
}

#[derive(Debug)]
struct DummyBufferState {
    contents: Vec<u8>,
    mapped: bool,
}

/// Host memory standing in for a device buffer.
#[derive(Debug)]
pub struct DummyBuffer {
    id: u64,
    state: Mutex<DummyBufferState>,
}

impl DummyBuffer {
    fn new(id: u64, len: usize) -> Self {
        Self {
            id,
            state: Mutex::new(DummyBufferState {
                contents: vec![0; len],
                mapped: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_mapped(&self) -> bool {
        self.state.lock().mapped
    }

    pub fn unmap(&self) {
        self.state.lock().mapped = false;
    }

    /// Snapshot of the buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().contents.clone()
    }
}

#[derive(Debug)]
struct CopyCommand {
    source: Arc<DummyBuffer>,
    source_offset: usize,
    destination: Arc<DummyBuffer>,
    destination_offset: usize,
    size: usize,
}

/// Recorded commands awaiting submission.
#[derive(Debug)]
pub struct DummyCommandEncoder {
    label: Option<String>,
    commands: Vec<CopyCommand>,
}

impl DummyCommandEncoder {
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

#[derive(Debug)]
pub struct DummyShaderModule {
    source: String,
}

impl DummyShaderModule {
    fn declares_function(&self, name: &str) -> bool {
        let needle = format!("fn {name}");
        self.source.match_indices(&needle).any(|(start, _)| {
            self.source[start + needle.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '(' || c.is_whitespace())
        })
    }

    /// One past the highest `@group(N)` index in the source.
    fn group_count(&self) -> u32 {
        self.source
            .split("@group(")
            .skip(1)
            .filter_map(|rest| rest.split(')').next()?.trim().parse::<u32>().ok())
            .map(|index| index + 1)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct DummyPipeline {
    id: u64,
    entry_point: String,
    group_count: u32,
}

impl DummyPipeline {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct DummyBindGroupLayout {
    pipeline_id: u64,
    group_index: u32,
}

impl DummyBindGroupLayout {
    pub fn group_index(&self) -> u32 {
        self.group_index
    }
}

#[derive(Debug)]
pub struct DummyBindGroup {
    layout: Arc<DummyBindGroupLayout>,
    buffers: Vec<(u32, Arc<DummyBuffer>)>,
}

impl DummyBindGroup {
    /// Binding indices, in the order they were given.
    pub fn bindings(&self) -> impl Iterator<Item = u32> + '_ {
        self.buffers.iter().map(|(binding, _)| *binding)
    }

    pub fn layout_pipeline_id(&self) -> u64 {
        self.layout.pipeline_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_dummy_backend_name() {
        let backend = DummyBackend::new(&DummyAdapterConfig::default());
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_request_respects_config() {
        let config = DummyAdapterConfig::default().with_platform_supported(false);
        assert_eq!(
            DummyBackend::request(&config, None).unwrap_err(),
            GpuError::UnsupportedPlatform
        );

        let config = DummyAdapterConfig::default().with_adapter_available(false);
        assert!(matches!(
            DummyBackend::request(&config, None),
            Err(GpuError::NoAdapter(_))
        ));

        let config = DummyAdapterConfig::default();
        let mut too_much = config.limits;
        too_much.max_buffer_size += 1;
        assert!(matches!(
            DummyBackend::request(&config, Some(&too_much)),
            Err(GpuError::DeviceRequestFailed(_))
        ));
    }

    #[test]
    fn test_buffers_start_zeroed() {
        let backend = DummyBackend::new(&DummyAdapterConfig::default());
        let descriptor = BufferDescriptor::new(8, BufferUsage::STORAGE);
        let GpuBuffer::Dummy(raw) = backend.create_buffer(&descriptor).unwrap() else {
            panic!("expected dummy buffer");
        };
        assert_eq!(raw.contents(), vec![0; 8]);
        assert_eq!(backend.buffer_count(), 1);

        let GpuBuffer::Dummy(second) = backend.create_buffer(&descriptor).unwrap() else {
            panic!("expected dummy buffer");
        };
        assert_ne!(raw.id(), second.id());
        assert_eq!(backend.buffer_count(), 2);
    }

    #[test]
    fn test_copy_runs_at_submit() {
        let backend = DummyBackend::new(&DummyAdapterConfig::default());
        let src_desc = BufferDescriptor::new(8, BufferUsage::COPY_SRC | BufferUsage::COPY_DST);
        let dst_desc = BufferDescriptor::new(8, BufferUsage::READBACK);
        let src = Buffer::new(src_desc.clone(), backend.create_buffer(&src_desc).unwrap());
        let dst = Buffer::new(dst_desc.clone(), backend.create_buffer(&dst_desc).unwrap());

        backend.write_buffer(&src, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut encoder = backend.create_command_encoder(Some("copy"));
        backend
            .copy_buffer_to_buffer(&mut encoder, &src, 4, &dst, 0, 4)
            .unwrap();
        assert_eq!(encoder.command_count(), 1);
        assert_eq!(dummy_buffer(&dst).unwrap().contents(), vec![0; 8]);

        backend.submit(encoder).unwrap();
        assert_eq!(
            dummy_buffer(&dst).unwrap().contents(),
            vec![5, 6, 7, 8, 0, 0, 0, 0]
        );
        assert_eq!(backend.submission_count(), 1);
    }

    #[test]
    fn test_entry_point_lookup() {
        let module = DummyShaderModule {
            source: "@compute @workgroup_size(64)\nfn main_cs(@builtin(global_invocation_id) id: vec3<u32>) {}".to_owned(),
        };
        assert!(module.declares_function("main_cs"));
        assert!(!module.declares_function("main"));
        assert_eq!(module.group_count(), 0);
    }

    #[test]
    fn test_group_count() {
        let module = DummyShaderModule {
            source: "@group(0) @binding(0) var<storage> a: array<f32>;\n\
                     @group( 2 ) @binding(1) var<storage> b: array<f32>;"
                .to_owned(),
        };
        assert_eq!(module.group_count(), 3);
    }

    #[test]
    fn test_bind_group_records_layout_and_bindings() {
        let backend = DummyBackend::new(&DummyAdapterConfig::default());
        let shader = ShaderModule::new(
            None,
            backend.create_shader_module(
                None,
                "@group(0) @binding(0) var<storage, read_write> v: array<f32>;\nfn main() {}",
            ),
        );
        let pipeline = ComputePipeline::new(
            None,
            "main".to_owned(),
            backend.create_compute_pipeline(None, &shader, "main").unwrap(),
        );
        let GpuPipeline::Dummy(raw_pipeline) = pipeline.gpu_handle() else {
            panic!("expected dummy pipeline");
        };

        assert!(matches!(
            backend.pipeline_bind_group_layout(&pipeline, 1),
            Err(GpuError::Device(_))
        ));
        let layout = BindGroupLayout::new(
            None,
            backend.pipeline_bind_group_layout(&pipeline, 0).unwrap(),
        );
        let GpuBindGroupLayout::Dummy(raw_layout) = layout.gpu_handle() else {
            panic!("expected dummy layout");
        };
        assert_eq!(raw_layout.group_index(), 0);

        let descriptor = BufferDescriptor::new(16, BufferUsage::STORAGE);
        let values = Buffer::new(descriptor.clone(), backend.create_buffer(&descriptor).unwrap());
        let GpuBindGroup::Dummy(group) = backend.create_bind_group(&layout, &[(0, &values)]).unwrap()
        else {
            panic!("expected dummy bind group");
        };
        assert_eq!(group.bindings().collect::<Vec<_>>(), vec![0]);
        assert_eq!(group.layout_pipeline_id(), raw_pipeline.id());
    }
}
