//! Compute-shader background pass.
//!
//! The draw image is cleared by a compute dispatch instead of a render
//! pass clear, which makes the background a programmable effect. Effects
//! share one pipeline layout and are tweaked through push constants.

use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use tracing::info;

use ember_rhi::command::CommandBuffer;
use ember_rhi::descriptor::{DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorWriter};
use ember_rhi::device::Device;
use ember_rhi::pipeline::{Pipeline, PipelineLayout};
use ember_rhi::shader::{Shader, ShaderStage};
use ember_rhi::{RhiResult, vk};

/// Workgroup edge length of the background compute shaders.
const GROUP_SIZE: u32 = 16;

/// Push constant block shared by all background effects.
///
/// The meaning of each lane is up to the effect's shader; unused lanes
/// are simply ignored.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

/// One selectable background effect: a compute pipeline plus its
/// current push constant values.
pub struct ComputeEffect {
    pub name: &'static str,
    pipeline: Pipeline,
    pub data: ComputePushConstants,
}

/// Dispatch dimensions covering `extent` with [`GROUP_SIZE`] workgroups.
fn dispatch_size(extent: vk::Extent2D) -> (u32, u32) {
    (
        extent.width.div_ceil(GROUP_SIZE),
        extent.height.div_ceil(GROUP_SIZE),
    )
}

/// Owns the background effects and the descriptor set binding the draw
/// image as a storage image.
pub struct BackgroundPass {
    device: Arc<Device>,
    descriptor_layout: vk::DescriptorSetLayout,
    descriptor_set: vk::DescriptorSet,
    layout: PipelineLayout,
    effects: Vec<ComputeEffect>,
    current: usize,
}

impl BackgroundPass {
    /// Builds the gradient and sky effects and binds `draw_image_view`.
    ///
    /// The descriptor set comes from `descriptors` and stays valid until
    /// those pools are destroyed; it is rewritten in place if the draw
    /// image ever changes.
    pub fn new(
        device: Arc<Device>,
        descriptors: &mut DescriptorAllocatorGrowable,
        draw_image_view: vk::ImageView,
    ) -> RhiResult<Self> {
        let descriptor_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(&device, vk::ShaderStageFlags::COMPUTE)?;

        let descriptor_set = descriptors.allocate(descriptor_layout)?;
        write_draw_image(&device, descriptor_set, draw_image_view);

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(std::mem::size_of::<ComputePushConstants>() as u32);

        let layout = PipelineLayout::new(Arc::clone(&device), &[descriptor_layout], &[push_range])?;

        let gradient_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            Path::new("shaders/spirv/gradient.comp.spv"),
            ShaderStage::Compute,
        )?;
        let sky_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            Path::new("shaders/spirv/sky.comp.spv"),
            ShaderStage::Compute,
        )?;

        let gradient = ComputeEffect {
            name: "gradient",
            pipeline: Pipeline::new_compute(Arc::clone(&device), &layout, &gradient_shader)?,
            data: ComputePushConstants {
                data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
                data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
                ..Default::default()
            },
        };

        let sky = ComputeEffect {
            name: "sky",
            pipeline: Pipeline::new_compute(Arc::clone(&device), &layout, &sky_shader)?,
            data: ComputePushConstants {
                data1: Vec4::new(0.1, 0.2, 0.4, 0.97),
                ..Default::default()
            },
        };

        info!("Background pass created with 2 effects");

        Ok(Self {
            device,
            descriptor_layout,
            descriptor_set,
            layout,
            effects: vec![gradient, sky],
            current: 0,
        })
    }

    /// Records the current effect over `extent` of the draw image.
    ///
    /// The draw image must be in GENERAL layout.
    pub fn record(&self, cmd: &CommandBuffer, extent: vk::Extent2D) {
        let effect = &self.effects[self.current];

        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, effect.pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.layout.handle(),
            0,
            &[self.descriptor_set],
        );
        cmd.push_constants(
            self.layout.handle(),
            vk::ShaderStageFlags::COMPUTE,
            &effect.data,
        );

        let (x, y) = dispatch_size(extent);
        cmd.dispatch(x, y, 1);
    }

    /// Switches to the next effect, wrapping around.
    pub fn next_effect(&mut self) {
        self.current = (self.current + 1) % self.effects.len();
        info!("Background effect: {}", self.effects[self.current].name);
    }

    #[inline]
    pub fn current_effect(&self) -> &ComputeEffect {
        &self.effects[self.current]
    }

    #[inline]
    pub fn current_effect_mut(&mut self) -> &mut ComputeEffect {
        &mut self.effects[self.current]
    }
}

impl Drop for BackgroundPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.descriptor_layout, None);
        }
    }
}

fn write_draw_image(device: &Device, set: vk::DescriptorSet, view: vk::ImageView) {
    let mut writer = DescriptorWriter::new();
    writer.write_image(
        0,
        view,
        vk::Sampler::null(),
        vk::ImageLayout::GENERAL,
        vk::DescriptorType::STORAGE_IMAGE,
    );
    writer.update_set(device, set);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_are_four_vec4s() {
        assert_eq!(std::mem::size_of::<ComputePushConstants>(), 64);
    }

    #[test]
    fn test_dispatch_covers_exact_multiple() {
        let (x, y) = dispatch_size(vk::Extent2D {
            width: 1600,
            height: 960,
        });
        assert_eq!((x, y), (100, 60));
    }

    #[test]
    fn test_dispatch_rounds_up_partial_groups() {
        let (x, y) = dispatch_size(vk::Extent2D {
            width: 1601,
            height: 1,
        });
        assert_eq!((x, y), (101, 1));
    }
}
