//! Flattened per-frame draw lists.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ember_rhi::vk;
use ember_rhi::vk::Handle;
use glam::{Mat4, Vec4};

use crate::bounds::Bounds;
use crate::material::{MaterialInstance, MaterialPass};

/// Per-frame global uniforms, bound once for every draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub ambient_color: Vec4,
    /// xyz = direction toward the light, w = intensity.
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl Default for SceneData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            viewproj: Mat4::IDENTITY,
            ambient_color: Vec4::splat(0.1),
            sunlight_direction: Vec4::new(0.0, 1.0, 0.5, 1.0),
            sunlight_color: Vec4::ONE,
        }
    }
}

/// One draw, fully self-contained: everything the renderer needs to
/// record it without looking back at the scene graph.
#[derive(Clone)]
pub struct RenderObject {
    pub index_count: u32,
    pub first_index: u32,
    pub index_buffer: vk::Buffer,
    pub material: Arc<MaterialInstance>,
    pub bounds: Bounds,
    pub transform: Mat4,
    pub vertex_buffer_address: vk::DeviceAddress,
}

/// The draw lists produced by one scene traversal.
///
/// Rebuilt from scratch every frame; cleared rather than dropped so the
/// vectors keep their capacity.
#[derive(Default)]
pub struct DrawContext {
    pub opaque_surfaces: Vec<RenderObject>,
    pub transparent_surfaces: Vec<RenderObject>,
}

impl DrawContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: RenderObject) {
        match object.material.pass {
            MaterialPass::Opaque => self.opaque_surfaces.push(object),
            MaterialPass::Transparent => self.transparent_surfaces.push(object),
        }
    }

    pub fn clear(&mut self) {
        self.opaque_surfaces.clear();
        self.transparent_surfaces.clear();
    }

    /// Sorts the opaque list to minimize state changes: draws sharing a
    /// material stay adjacent, and within a material draws sharing an
    /// index buffer stay adjacent. The sort is stable, so submission
    /// order breaks ties.
    pub fn sort_opaque(&mut self) {
        self.opaque_surfaces.sort_by_key(|object| {
            (
                object.material.descriptor_set.as_raw(),
                object.index_buffer.as_raw(),
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn test_material(pass: MaterialPass, set: u64) -> Arc<MaterialInstance> {
        Arc::new(MaterialInstance {
            pipeline: Arc::new(crate::material::MaterialPipeline {
                pipeline: vk::Pipeline::null(),
                layout: vk::PipelineLayout::null(),
            }),
            descriptor_set: vk::DescriptorSet::from_raw(set),
            pass,
        })
    }

    fn test_object(material: Arc<MaterialInstance>, index_buffer: u64) -> RenderObject {
        RenderObject {
            index_count: 3,
            first_index: 0,
            index_buffer: vk::Buffer::from_raw(index_buffer),
            material,
            bounds: Bounds::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0)),
            transform: Mat4::IDENTITY,
            vertex_buffer_address: 0,
        }
    }

    #[test]
    fn test_push_routes_by_pass() {
        let mut ctx = DrawContext::new();
        ctx.push(test_object(test_material(MaterialPass::Opaque, 1), 1));
        ctx.push(test_object(test_material(MaterialPass::Transparent, 2), 1));
        ctx.push(test_object(test_material(MaterialPass::Opaque, 1), 2));

        assert_eq!(ctx.opaque_surfaces.len(), 2);
        assert_eq!(ctx.transparent_surfaces.len(), 1);
    }

    #[test]
    fn test_clear_empties_both_lists() {
        let mut ctx = DrawContext::new();
        ctx.push(test_object(test_material(MaterialPass::Opaque, 1), 1));
        ctx.clear();
        assert!(ctx.opaque_surfaces.is_empty());
        assert!(ctx.transparent_surfaces.is_empty());
    }

    #[test]
    fn test_sort_groups_by_material_then_index_buffer() {
        let mat_a = test_material(MaterialPass::Opaque, 1);
        let mat_b = test_material(MaterialPass::Opaque, 2);

        let mut ctx = DrawContext::new();
        ctx.push(test_object(Arc::clone(&mat_b), 20));
        ctx.push(test_object(Arc::clone(&mat_a), 10));
        ctx.push(test_object(Arc::clone(&mat_b), 10));
        ctx.push(test_object(Arc::clone(&mat_a), 20));

        ctx.sort_opaque();

        let keys: Vec<(u64, u64)> = ctx
            .opaque_surfaces
            .iter()
            .map(|o| (o.material.descriptor_set.as_raw(), o.index_buffer.as_raw()))
            .collect();
        assert_eq!(keys, vec![(1, 10), (1, 20), (2, 10), (2, 20)]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mat = test_material(MaterialPass::Opaque, 1);

        let mut ctx = DrawContext::new();
        let mut first = test_object(Arc::clone(&mat), 10);
        first.first_index = 0;
        let mut second = test_object(Arc::clone(&mat), 10);
        second.first_index = 100;
        ctx.push(first);
        ctx.push(second);

        ctx.sort_opaque();

        assert_eq!(ctx.opaque_surfaces[0].first_index, 0);
        assert_eq!(ctx.opaque_surfaces[1].first_index, 100);
    }

    #[test]
    fn test_scene_data_layout() {
        // 3 matrices + 3 vec4s, no implicit padding.
        assert_eq!(std::mem::size_of::<SceneData>(), 240);
    }
}
