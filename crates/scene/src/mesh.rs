//! Mesh assets: GPU geometry plus per-surface metadata.

use std::sync::Arc;

use ember_rhi::MeshBuffers;

use crate::bounds::Bounds;
use crate::material::MaterialInstance;

/// One drawable range of a mesh's index buffer, with its own material
/// and bounds.
#[derive(Clone)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    pub material: Option<Arc<MaterialInstance>>,
}

/// A named mesh: GPU buffers shared by all of its surfaces.
pub struct MeshAsset {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub buffers: MeshBuffers,
}
