//! Vertex formats and push constant blocks for mesh drawing.
//!
//! Meshes are not bound through the fixed-function vertex input stage.
//! Vertex data lives in a storage buffer and the vertex shader fetches it
//! through a buffer device address passed in push constants, so no
//! `VertexInputAttributeDescription`s exist anywhere in the crate.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// A single mesh vertex, laid out to match the shader-side storage buffer.
///
/// UV coordinates are interleaved into the padding lanes of `position` and
/// `normal` so the struct packs into 48 bytes with no dead space under
/// std430 rules.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
    pub color: Vec4,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2], color: Vec4) -> Self {
        Self {
            position,
            uv_x: uv[0],
            normal,
            uv_y: uv[1],
            color,
        }
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            uv_x: 0.0,
            normal: Vec3::Z,
            uv_y: 0.0,
            color: Vec4::ONE,
        }
    }
}

/// Push constants for mesh draws: the object's world matrix plus the
/// device address of its vertex buffer.
///
/// Not `Pod`: the `u64` address leaves 8 bytes of tail padding after the
/// 16-byte-aligned matrix. `CommandBuffer::push_constants` copies by raw
/// bytes so the padding is simply carried along.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrawPushConstants {
    pub world_matrix: Mat4,
    pub vertex_buffer: vk::DeviceAddress,
}

impl DrawPushConstants {
    pub fn new(world_matrix: Mat4, vertex_buffer: vk::DeviceAddress) -> Self {
        Self {
            world_matrix,
            vertex_buffer,
        }
    }

    /// Push constant range covering this block in the vertex stage.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(std::mem::size_of::<Self>() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_48_bytes() {
        // The shader-side struct is 3 vec4 lanes.
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
    }

    #[test]
    fn test_vertex_field_offsets() {
        use std::mem::offset_of;

        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, uv_x), 12);
        assert_eq!(offset_of!(Vertex, normal), 16);
        assert_eq!(offset_of!(Vertex, uv_y), 28);
        assert_eq!(offset_of!(Vertex, color), 32);
    }

    #[test]
    fn test_push_constants_fit_guaranteed_limit() {
        // Vulkan guarantees at least 128 bytes of push constant space.
        let range = DrawPushConstants::range();
        assert!(range.size <= 128);
        assert_eq!(range.offset, 0);
    }

    #[test]
    fn test_vertex_round_trips_through_bytes() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::Y,
            [0.25, 0.75],
            Vec4::new(1.0, 0.5, 0.0, 1.0),
        );

        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 48);

        let back: &Vertex = bytemuck::from_bytes(bytes);
        assert_eq!(*back, vertex);
    }
}
