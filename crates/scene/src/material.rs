//! Material pipelines and per-material GPU state.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ember_rhi::vk;
use glam::Vec4;

/// Which render pass a material draws in; decides draw-list placement
/// and ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialPass {
    Opaque,
    Transparent,
}

/// A compiled pipeline shared by every instance of one material kind.
///
/// Raw handles: the pipeline objects are owned by the material system
/// that built them and outlive all instances.
#[derive(Clone, Copy, Debug)]
pub struct MaterialPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// One material binding: a pipeline plus the descriptor set holding its
/// constants and textures.
#[derive(Clone, Debug)]
pub struct MaterialInstance {
    pub pipeline: Arc<MaterialPipeline>,
    pub descriptor_set: vk::DescriptorSet,
    pub pass: MaterialPass,
}

/// Uniform block for the PBR metallic-roughness material.
///
/// Padded to 256 bytes so instances can be suballocated from one buffer
/// at any minUniformBufferOffsetAlignment the hardware reports.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialConstants {
    pub color_factors: Vec4,
    /// x = metallic, y = roughness; z, w unused.
    pub metal_rough_factors: Vec4,
    pub extra: [Vec4; 14],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            color_factors: Vec4::ONE,
            metal_rough_factors: Vec4::new(1.0, 0.5, 0.0, 0.0),
            extra: [Vec4::ZERO; 14],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_constants_are_256_bytes() {
        // Matches the worst-case uniform buffer offset alignment.
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 256);
    }

    #[test]
    fn test_default_constants() {
        let constants = MaterialConstants::default();
        assert_eq!(constants.color_factors, Vec4::ONE);
        assert_eq!(constants.metal_rough_factors.x, 1.0);
        assert_eq!(constants.metal_rough_factors.y, 0.5);
    }
}
