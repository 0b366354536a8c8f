//! GPU resources.
//!
//! This module contains the resource handles that the manager registers by
//! name:
//! - [`Buffer`] - GPU memory buffer
//! - [`ShaderModule`] - Compiled shader source
//! - [`ComputePipeline`] - Compute pipeline built from a shader entry point
//! - [`BindGroupLayout`] / [`BindGroup`] - Resource binding tables
//!
//! Handles are cheap to clone. They share the backend object, which the
//! device keeps alive for as long as any clone exists.

use crate::backend::{GpuBindGroup, GpuBindGroupLayout, GpuBuffer, GpuPipeline, GpuShaderModule};
use crate::registry::ResourceName;
use crate::types::{BufferDescriptor, BufferUsage};

/// A GPU buffer resource.
///
/// Buffers are created by [`GpuResourceManager::allocate_buffer`] and its
/// registering variants.
///
/// [`GpuResourceManager::allocate_buffer`]: crate::GpuResourceManager::allocate_buffer
#[derive(Debug, Clone)]
pub struct Buffer {
    descriptor: BufferDescriptor,
    raw: GpuBuffer,
}

impl Buffer {
    pub(crate) fn new(descriptor: BufferDescriptor, raw: GpuBuffer) -> Self {
        Self { descriptor, raw }
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the backend handle.
    pub fn gpu_handle(&self) -> &GpuBuffer {
        &self.raw
    }

    /// Whether the buffer currently has a mapped range.
    pub fn is_mapped(&self) -> bool {
        self.raw.is_mapped()
    }

    /// Whether both handles refer to the same device buffer.
    pub fn same_buffer(&self, other: &Buffer) -> bool {
        self.raw.ptr_eq(&other.raw)
    }
}

/// A shader module.
#[derive(Debug, Clone)]
pub struct ShaderModule {
    label: Option<String>,
    raw: GpuShaderModule,
}

impl ShaderModule {
    pub(crate) fn new(label: Option<String>, raw: GpuShaderModule) -> Self {
        Self { label, raw }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn gpu_handle(&self) -> &GpuShaderModule {
        &self.raw
    }
}

/// A compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipeline {
    label: Option<String>,
    entry_point: String,
    raw: GpuPipeline,
}

impl ComputePipeline {
    pub(crate) fn new(label: Option<String>, entry_point: String, raw: GpuPipeline) -> Self {
        Self {
            label,
            entry_point,
            raw,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Shader entry point the pipeline runs.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn gpu_handle(&self) -> &GpuPipeline {
        &self.raw
    }
}

/// A bind group layout.
#[derive(Debug, Clone)]
pub struct BindGroupLayout {
    label: Option<String>,
    raw: GpuBindGroupLayout,
}

impl BindGroupLayout {
    pub(crate) fn new(label: Option<String>, raw: GpuBindGroupLayout) -> Self {
        Self { label, raw }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn gpu_handle(&self) -> &GpuBindGroupLayout {
        &self.raw
    }
}

/// A bind group.
#[derive(Debug, Clone)]
pub struct BindGroup {
    label: Option<String>,
    raw: GpuBindGroup,
}

impl BindGroup {
    pub(crate) fn new(label: Option<String>, raw: GpuBindGroup) -> Self {
        Self { label, raw }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn gpu_handle(&self) -> &GpuBindGroup {
        &self.raw
    }
}

/// One buffer binding of a bind group, naming a registered buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupEntry {
    /// Binding index in the layout.
    pub binding: u32,
    /// Name of the registered buffer bound at this index.
    pub buffer: ResourceName,
}

impl BindGroupEntry {
    pub fn new(binding: u32, buffer: impl Into<ResourceName>) -> Self {
        Self {
            binding,
            buffer: buffer.into(),
        }
    }
}

// Ensure resource handles are Send + Sync
#[cfg(not(target_arch = "wasm32"))]
static_assertions::assert_impl_all!(Buffer: Send, Sync);
#[cfg(not(target_arch = "wasm32"))]
static_assertions::assert_impl_all!(ComputePipeline: Send, Sync);
