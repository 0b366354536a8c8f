//! Shader, pipeline and bind group helpers that fill the registries.
//!
//! These delegate to the device. Compilation and layout errors it reports
//! come back as [`GpuError::Device`] and nothing is registered.

use crate::error::{GpuError, GpuResult};
use crate::registry::{ResourceKind, ResourceName};
use crate::resources::{BindGroup, BindGroupEntry, BindGroupLayout, ComputePipeline, ShaderModule};

use super::GpuResourceManager;

impl GpuResourceManager {
    /// Compile WGSL `source` and register the module as `name`.
    pub async fn create_shader(
        &mut self,
        name: impl Into<ResourceName>,
        source: &str,
    ) -> GpuResult<ShaderModule> {
        let name = name.into();
        let module = self
            .backend()?
            .create_shader_module(Some(name.as_str()), source)
            .await?;
        self.shaders.set(name, module.clone());
        Ok(module)
    }

    /// Create a compute pipeline from the registered shader `shader_name`
    /// and register it as `name`. The layout is derived from the shader.
    pub async fn create_compute_pipeline(
        &mut self,
        name: impl Into<ResourceName>,
        shader_name: &str,
        entry_point: &str,
    ) -> GpuResult<ComputePipeline> {
        let name = name.into();
        let shader = self.shaders.get(shader_name)?;
        let pipeline = self
            .backend()?
            .create_compute_pipeline(Some(name.as_str()), shader, entry_point)
            .await?;
        self.pipelines.set(name, pipeline.clone());
        Ok(pipeline)
    }

    /// Append bind group `group_index` of the registered pipeline to the
    /// layout list `name`.
    pub async fn register_bind_group_layout(
        &mut self,
        name: impl Into<ResourceName>,
        pipeline_name: &str,
        group_index: u32,
    ) -> GpuResult<BindGroupLayout> {
        let name = name.into();
        let pipeline = self.pipelines.get(pipeline_name)?;
        let layout = self
            .backend()?
            .pipeline_bind_group_layout(Some(name.as_str()), pipeline, group_index)
            .await?;
        self.bind_group_layouts.append(name, layout.clone());
        Ok(layout)
    }

    /// Build a bind group from registered buffers and append it to the bind
    /// group list `name`.
    ///
    /// The layout is entry `layout_index` of the layout list `layout_name`.
    pub async fn create_bind_group(
        &mut self,
        name: impl Into<ResourceName>,
        layout_name: &str,
        layout_index: usize,
        entries: &[BindGroupEntry],
    ) -> GpuResult<BindGroup> {
        let name = name.into();
        let layout = self
            .bind_group_layouts
            .get(layout_name)?
            .get(layout_index)
            .ok_or_else(|| GpuError::NotFound {
                kind: ResourceKind::BindGroupLayout,
                name: format!("{layout_name}[{layout_index}]").into(),
            })?;

        let buffers = entries
            .iter()
            .map(|entry| Ok((entry.binding, self.buffers.get(entry.buffer.as_str())?)))
            .collect::<GpuResult<Vec<_>>>()?;

        let bind_group = self
            .backend()?
            .create_bind_group(Some(name.as_str()), layout, &buffers)
            .await?;
        self.bind_groups.append(name, bind_group.clone());
        Ok(bind_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuBindGroup, GpuBindGroupLayout, GpuPipeline};
    use crate::session::DeviceOptions;
    use crate::types::BufferUsage;
    use pollster::block_on;

    const SHADER: &str = r#"
@group(0) @binding(0) var<storage, read_write> values: array<f32>;

@compute @workgroup_size(64)
fn double(@builtin(global_invocation_id) id: vec3<u32>) {
    values[id.x] = values[id.x] * 2.0;
}
"#;

    fn manager() -> GpuResourceManager {
        let mut manager = GpuResourceManager::new();
        block_on(manager.initialize(&DeviceOptions::dummy())).unwrap();
        manager
    }

    #[test]
    fn test_pipeline_registration_chain() {
        let mut manager = manager();
        block_on(manager.create_shader("double", SHADER)).unwrap();
        let pipeline = block_on(manager.create_compute_pipeline("double", "double", "double")).unwrap();
        assert_eq!(pipeline.entry_point(), "double");

        let layout = block_on(manager.register_bind_group_layout("double_layouts", "double", 0)).unwrap();
        manager
            .allocate_and_register("values", 256, BufferUsage::STORAGE)
            .unwrap();
        let group = block_on(manager.create_bind_group(
            "double_groups",
            "double_layouts",
            0,
            &[BindGroupEntry::new(0, "values")],
        ))
        .unwrap();

        assert_eq!(manager.shaders().len(), 1);
        assert_eq!(manager.pipelines().len(), 1);
        assert_eq!(manager.bind_group_layouts().get("double_layouts").unwrap().len(), 1);
        assert_eq!(manager.bind_groups().get("double_groups").unwrap().len(), 1);

        let (
            GpuPipeline::Dummy(pipeline),
            GpuBindGroupLayout::Dummy(layout),
            GpuBindGroup::Dummy(group),
        ) = (pipeline.gpu_handle(), layout.gpu_handle(), group.gpu_handle())
        else {
            panic!("expected dummy handles");
        };
        assert_eq!(layout.group_index(), 0);
        assert_eq!(group.layout_pipeline_id(), pipeline.id());
        assert_eq!(group.bindings().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_missing_entry_point() {
        let mut manager = manager();
        block_on(manager.create_shader("double", SHADER)).unwrap();
        assert!(matches!(
            block_on(manager.create_compute_pipeline("p", "double", "main")),
            Err(GpuError::Device(_))
        ));
        assert!(!manager.pipelines().contains("p"));
    }

    #[test]
    fn test_undeclared_group_index() {
        let mut manager = manager();
        block_on(manager.create_shader("double", SHADER)).unwrap();
        block_on(manager.create_compute_pipeline("double", "double", "double")).unwrap();
        assert!(matches!(
            block_on(manager.register_bind_group_layout("layouts", "double", 3)),
            Err(GpuError::Device(_))
        ));
        assert!(!manager.bind_group_layouts().contains("layouts"));
    }

    #[test]
    fn test_missing_references() {
        let mut manager = manager();
        assert!(matches!(
            block_on(manager.create_compute_pipeline("p", "nope", "main")),
            Err(GpuError::NotFound {
                kind: ResourceKind::Shader,
                ..
            })
        ));
        assert!(matches!(
            block_on(manager.create_bind_group("g", "nope", 0, &[])),
            Err(GpuError::NotFound {
                kind: ResourceKind::BindGroupLayout,
                ..
            })
        ));
    }
}
