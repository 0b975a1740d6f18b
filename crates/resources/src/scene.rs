//! Whole-scene glTF loading.
//!
//! Decodes everything a file carries beyond bare geometry: materials,
//! textures, samplers, and the node hierarchy. The result is plain CPU
//! data indexed the way the file indexes it; the renderer resolves the
//! indices while uploading.

use std::path::{Path, PathBuf};

use glam::{Mat4, Quat, Vec3, Vec4};
use tracing::{info, warn};

use ember_rhi::vk;

use crate::error::{ResourceError, ResourceResult};
use crate::mesh::{MeshData, meshes_from_document};
use crate::texture::ImageData;

/// Sampler filtering, already mapped to Vulkan enums.
#[derive(Clone, Copy, Debug)]
pub struct SamplerDesc {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
}

/// A material's reference to a texture: image index plus the sampler
/// index, `None` meaning the file's default sampler.
#[derive(Clone, Copy, Debug)]
pub struct TextureRef {
    pub image: usize,
    pub sampler: Option<usize>,
}

/// pbrMetallicRoughness material parameters.
#[derive(Clone, Copy, Debug)]
pub struct MaterialDesc {
    pub color_factors: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Alpha mode BLEND; drawn in the transparent pass.
    pub blended: bool,
    pub color_texture: Option<TextureRef>,
    pub metal_rough_texture: Option<TextureRef>,
}

/// One node of the file's hierarchy, with child links by index.
#[derive(Clone, Debug)]
pub struct NodeDesc {
    pub transform: Mat4,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

/// Everything decoded from one glTF file, CPU-side.
///
/// Images that could not be decoded are `None`; the renderer substitutes
/// its checkerboard fallback.
pub struct SceneDescription {
    pub name: String,
    pub meshes: Vec<MeshData>,
    pub images: Vec<Option<ImageData>>,
    pub samplers: Vec<SamplerDesc>,
    pub materials: Vec<MaterialDesc>,
    pub nodes: Vec<NodeDesc>,
    pub top_nodes: Vec<usize>,
}

/// Loads a glTF or GLB file in full.
pub fn load_gltf_scene(path: impl AsRef<Path>) -> ResourceResult<SceneDescription> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    info!("Loading glTF scene from {}", path.display());

    let (document, buffers, image_data) =
        gltf::import(path).map_err(|e| ResourceError::GltfLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let meshes = meshes_from_document(&document, &buffers)?;

    let images: Vec<Option<ImageData>> = image_data
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let decoded = rgba8_from_gltf(data);
            if decoded.is_none() {
                warn!("Image {i} has unsupported format {:?}, using fallback", data.format);
            }
            decoded
        })
        .collect();

    let samplers: Vec<SamplerDesc> = document
        .samplers()
        .map(|s| {
            let (min_filter, mipmap_mode) = min_filter_to_vk(s.min_filter());
            SamplerDesc {
                min_filter,
                mag_filter: mag_filter_to_vk(s.mag_filter()),
                mipmap_mode,
            }
        })
        .collect();

    let materials: Vec<MaterialDesc> = document
        .materials()
        .map(|m| {
            let pbr = m.pbr_metallic_roughness();
            MaterialDesc {
                color_factors: Vec4::from(pbr.base_color_factor()),
                metallic: pbr.metallic_factor(),
                roughness: pbr.roughness_factor(),
                blended: m.alpha_mode() == gltf::material::AlphaMode::Blend,
                color_texture: pbr.base_color_texture().map(|info| TextureRef {
                    image: info.texture().source().index(),
                    sampler: info.texture().sampler().index(),
                }),
                metal_rough_texture: pbr.metallic_roughness_texture().map(|info| TextureRef {
                    image: info.texture().source().index(),
                    sampler: info.texture().sampler().index(),
                }),
            }
        })
        .collect();

    let nodes: Vec<NodeDesc> = document
        .nodes()
        .map(|n| NodeDesc {
            transform: transform_to_mat4(n.transform()),
            mesh: n.mesh().map(|m| m.index()),
            children: n.children().map(|c| c.index()).collect(),
        })
        .collect();

    // Roots of every scene in the file; child nodes are reached through
    // the hierarchy.
    let top_nodes: Vec<usize> = document
        .scenes()
        .flat_map(|scene| scene.nodes().map(|n| n.index()))
        .collect();

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_owned());

    info!(
        "Scene '{}': {} meshes, {} images, {} materials, {} nodes",
        name,
        meshes.len(),
        images.len(),
        materials.len(),
        nodes.len()
    );

    Ok(SceneDescription {
        name,
        meshes,
        images,
        samplers,
        materials,
        nodes,
        top_nodes,
    })
}

/// Enumerates `*.gltf` / `*.glb` files directly under `dir`, sorted by
/// name. A missing directory yields an empty list.
pub fn discover_gltf_files(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir.as_ref()) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("gltf") | Some("glb")
            )
        })
        .collect();
    files.sort();
    files
}

fn transform_to_mat4(transform: gltf::scene::Transform) -> Mat4 {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Mat4::from_scale_rotation_translation(
            Vec3::from(scale),
            Quat::from_array(rotation),
            Vec3::from(translation),
        ),
    }
}

/// Expands the decoded pixel data to tightly packed RGBA8.
///
/// 16-bit and float formats are not expanded; callers fall back.
fn rgba8_from_gltf(data: &gltf::image::Data) -> Option<ImageData> {
    use gltf::image::Format;

    let pixels = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => data
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        _ => return None,
    };

    Some(ImageData {
        pixels,
        width: data.width,
        height: data.height,
    })
}

fn mag_filter_to_vk(filter: Option<gltf::texture::MagFilter>) -> vk::Filter {
    match filter {
        Some(gltf::texture::MagFilter::Nearest) => vk::Filter::NEAREST,
        _ => vk::Filter::LINEAR,
    }
}

fn min_filter_to_vk(filter: Option<gltf::texture::MinFilter>) -> (vk::Filter, vk::SamplerMipmapMode) {
    use gltf::texture::MinFilter;

    let min = match filter {
        Some(MinFilter::Nearest | MinFilter::NearestMipmapNearest | MinFilter::NearestMipmapLinear) => {
            vk::Filter::NEAREST
        }
        _ => vk::Filter::LINEAR,
    };
    let mipmap = match filter {
        Some(MinFilter::NearestMipmapNearest | MinFilter::LinearMipmapNearest) => {
            vk::SamplerMipmapMode::NEAREST
        }
        _ => vk::SamplerMipmapMode::LINEAR,
    };
    (min, mipmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gltf::texture::{MagFilter, MinFilter};

    #[test]
    fn test_missing_scene_file_is_reported() {
        let result = load_gltf_scene("/nonexistent/scene.glb");
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }

    #[test]
    fn test_discover_handles_missing_directory() {
        assert!(discover_gltf_files("/nonexistent/assets").is_empty());
    }

    #[test]
    fn test_mag_filter_mapping() {
        assert_eq!(mag_filter_to_vk(Some(MagFilter::Nearest)), vk::Filter::NEAREST);
        assert_eq!(mag_filter_to_vk(Some(MagFilter::Linear)), vk::Filter::LINEAR);
        assert_eq!(mag_filter_to_vk(None), vk::Filter::LINEAR);
    }

    #[test]
    fn test_min_filter_mapping_splits_mipmap_mode() {
        let (min, mip) = min_filter_to_vk(Some(MinFilter::NearestMipmapLinear));
        assert_eq!(min, vk::Filter::NEAREST);
        assert_eq!(mip, vk::SamplerMipmapMode::LINEAR);

        let (min, mip) = min_filter_to_vk(Some(MinFilter::LinearMipmapNearest));
        assert_eq!(min, vk::Filter::LINEAR);
        assert_eq!(mip, vk::SamplerMipmapMode::NEAREST);

        let (min, mip) = min_filter_to_vk(None);
        assert_eq!(min, vk::Filter::LINEAR);
        assert_eq!(mip, vk::SamplerMipmapMode::LINEAR);
    }

    #[test]
    fn test_rgb_expands_to_rgba() {
        let data = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };
        let image = rgba8_from_gltf(&data).unwrap();
        assert_eq!(image.pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_float_format_falls_back() {
        let data = gltf::image::Data {
            pixels: vec![0; 12],
            format: gltf::image::Format::R32G32B32FLOAT,
            width: 1,
            height: 1,
        };
        assert!(rgba8_from_gltf(&data).is_none());
    }

    #[test]
    fn test_matrix_and_trs_transforms_agree() {
        let trs = gltf::scene::Transform::Decomposed {
            translation: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
        };
        let expected = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform_to_mat4(trs), expected);
    }
}
