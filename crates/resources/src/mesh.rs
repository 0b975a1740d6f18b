//! glTF mesh loading.

use std::path::Path;

use glam::{Vec3, Vec4};
use tracing::{debug, info};

use ember_rhi::Vertex;
use ember_scene::Bounds;

use crate::error::{ResourceError, ResourceResult};

/// One drawable index range within a loaded mesh.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceData {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    /// Index into the file's material list; `None` for the glTF default
    /// material.
    pub material_index: Option<usize>,
}

/// CPU-side mesh geometry as loaded from a file.
///
/// All primitives of a glTF mesh share one vertex/index array; each
/// primitive becomes a [`SurfaceData`] range into the indices.
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub surfaces: Vec<SurfaceData>,
}

/// Loads every mesh from a glTF or GLB file.
///
/// # Errors
///
/// Returns [`ResourceError::NoMeshes`] for a file without mesh data and
/// [`ResourceError::NoPositionData`] when a primitive lacks positions.
pub fn load_gltf_meshes(path: impl AsRef<Path>) -> ResourceResult<Vec<MeshData>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    info!("Loading glTF meshes from {}", path.display());

    let (document, buffers, _images) =
        gltf::import(path).map_err(|e| ResourceError::GltfLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let meshes = meshes_from_document(&document, &buffers)?;
    if meshes.is_empty() {
        return Err(ResourceError::NoMeshes(path.to_path_buf()));
    }
    Ok(meshes)
}

/// Reads every mesh from an already-imported document, in index order.
pub(crate) fn meshes_from_document(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> ResourceResult<Vec<MeshData>> {
    let mut meshes = Vec::new();

    for mesh in document.meshes() {
        let name = mesh
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("mesh_{}", mesh.index()));

        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut surfaces: Vec<SurfaceData> = Vec::new();

        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let positions: Vec<Vec3> = reader
                .read_positions()
                .ok_or_else(|| ResourceError::NoPositionData(name.clone()))?
                .map(Vec3::from)
                .collect();

            let start_index = indices.len() as u32;
            let vertex_offset = vertices.len() as u32;

            // Indices are rebased onto the shared vertex array.
            let mut count = 0u32;
            if let Some(read_indices) = reader.read_indices() {
                for index in read_indices.into_u32() {
                    indices.push(index + vertex_offset);
                    count += 1;
                }
            } else {
                for i in 0..positions.len() as u32 {
                    indices.push(i + vertex_offset);
                    count += 1;
                }
            }

            let bounds = Bounds::from_positions(positions.iter().copied());

            for position in &positions {
                vertices.push(Vertex {
                    position: *position,
                    ..Vertex::default()
                });
            }

            if let Some(normals) = reader.read_normals() {
                for (i, normal) in normals.enumerate() {
                    vertices[vertex_offset as usize + i].normal = Vec3::from(normal);
                }
            }

            if let Some(tex_coords) = reader.read_tex_coords(0) {
                for (i, uv) in tex_coords.into_f32().enumerate() {
                    let vertex = &mut vertices[vertex_offset as usize + i];
                    vertex.uv_x = uv[0];
                    vertex.uv_y = uv[1];
                }
            }

            if let Some(colors) = reader.read_colors(0) {
                for (i, color) in colors.into_rgba_f32().enumerate() {
                    vertices[vertex_offset as usize + i].color = Vec4::from(color);
                }
            }

            surfaces.push(SurfaceData {
                start_index,
                count,
                bounds,
                material_index: primitive.material().index(),
            });
        }

        debug!(
            "Loaded mesh '{}': {} vertices, {} indices, {} surface(s)",
            name,
            vertices.len(),
            indices.len(),
            surfaces.len()
        );

        meshes.push(MeshData {
            name,
            vertices,
            indices,
            surfaces,
        });
    }

    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_reported() {
        let result = load_gltf_meshes("/nonexistent/model.glb");
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
