//! Metallic-roughness material pipelines and descriptor writing.
//!
//! One pipeline layout serves both the opaque and transparent variants;
//! instances differ only in which pipeline they reference and what their
//! per-material descriptor set binds.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use ember_rhi::descriptor::{
    DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorWriter,
};
use ember_rhi::device::Device;
use ember_rhi::pipeline::{BlendMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use ember_rhi::shader::{Shader, ShaderStage};
use ember_rhi::vertex::DrawPushConstants;
use ember_rhi::{RhiResult, vk};
use ember_scene::material::{MaterialConstants, MaterialInstance, MaterialPass, MaterialPipeline};

/// Images, samplers, and the uniform slice a material instance binds.
pub struct MaterialResources {
    pub color_image_view: vk::ImageView,
    pub color_sampler: vk::Sampler,
    pub metal_rough_image_view: vk::ImageView,
    pub metal_rough_sampler: vk::Sampler,
    pub data_buffer: vk::Buffer,
    pub data_buffer_offset: u64,
}

/// Builds and owns the mesh pipelines plus the per-material set layout.
///
/// [`MaterialInstance`]s handed out by [`write_material`] borrow the raw
/// pipeline handles held here, so the system must outlive every instance.
///
/// [`write_material`]: MaterialSystem::write_material
pub struct MaterialSystem {
    device: Arc<Device>,
    material_layout: vk::DescriptorSetLayout,
    pipeline_layout: PipelineLayout,
    _opaque_pipeline: Pipeline,
    _transparent_pipeline: Pipeline,
    opaque: Arc<MaterialPipeline>,
    transparent: Arc<MaterialPipeline>,
}

impl MaterialSystem {
    pub fn new(
        device: Arc<Device>,
        scene_data_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let material_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(
                &device,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?;

        let pipeline_layout = PipelineLayout::new(
            Arc::clone(&device),
            &[scene_data_layout, material_layout],
            &[DrawPushConstants::range()],
        )?;

        let vertex_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            Path::new("shaders/spirv/mesh.vert.spv"),
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            Path::new("shaders/spirv/mesh.frag.spv"),
            ShaderStage::Fragment,
        )?;

        let opaque_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::COUNTER_CLOCKWISE)
            .blend_mode(BlendMode::None)
            .color_format(color_format)
            .depth_format(depth_format)
            .depth_test(true, vk::CompareOp::LESS_OR_EQUAL)
            .build(Arc::clone(&device), &pipeline_layout)?;

        // Transparent surfaces blend additively and never write depth.
        let transparent_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::COUNTER_CLOCKWISE)
            .blend_mode(BlendMode::Additive)
            .color_format(color_format)
            .depth_format(depth_format)
            .depth_test(false, vk::CompareOp::LESS_OR_EQUAL)
            .build(Arc::clone(&device), &pipeline_layout)?;

        let opaque = Arc::new(MaterialPipeline {
            pipeline: opaque_pipeline.handle(),
            layout: pipeline_layout.handle(),
        });
        let transparent = Arc::new(MaterialPipeline {
            pipeline: transparent_pipeline.handle(),
            layout: pipeline_layout.handle(),
        });

        info!("Material system created (opaque + transparent pipelines)");

        Ok(Self {
            device,
            material_layout,
            pipeline_layout,
            _opaque_pipeline: opaque_pipeline,
            _transparent_pipeline: transparent_pipeline,
            opaque,
            transparent,
        })
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    /// Allocates and fills a descriptor set for one material instance.
    pub fn write_material(
        &self,
        pass: MaterialPass,
        resources: &MaterialResources,
        descriptors: &mut DescriptorAllocatorGrowable,
    ) -> RhiResult<MaterialInstance> {
        let set = descriptors.allocate(self.material_layout)?;

        let mut writer = DescriptorWriter::new();
        writer.write_buffer(
            0,
            resources.data_buffer,
            resources.data_buffer_offset,
            std::mem::size_of::<MaterialConstants>() as u64,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        writer.write_image(
            1,
            resources.color_image_view,
            resources.color_sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        );
        writer.write_image(
            2,
            resources.metal_rough_image_view,
            resources.metal_rough_sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        );
        writer.update_set(&self.device, set);

        let pipeline = match pass {
            MaterialPass::Opaque => Arc::clone(&self.opaque),
            MaterialPass::Transparent => Arc::clone(&self.transparent),
        };

        Ok(MaterialInstance {
            pipeline,
            descriptor_set: set,
            pass,
        })
    }
}

impl Drop for MaterialSystem {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.material_layout, None);
        }
    }
}
