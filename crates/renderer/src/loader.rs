//! GPU residency for loaded scenes.
//!
//! Takes the CPU-side [`SceneDescription`] and uploads it: images become
//! mipmapped textures, samplers become `vk::Sampler`s, materials get
//! descriptor sets from a scene-owned allocator, meshes get device-local
//! buffers, and the node hierarchy is rebuilt as scene-graph nodes.
//!
//! Engine-owned defaults (fallback textures and samplers) are shared
//! with every scene and are never part of a scene's teardown.

use std::sync::Arc;

use glam::Mat4;
use tracing::{debug, warn};

use ember_resources::texture::{checkerboard_rgba, solid_rgba};
use ember_resources::{SceneDescription, TextureRef};
use ember_rhi::buffer::AllocatedBuffer;
use ember_rhi::deletion::{DeletionQueue, Release};
use ember_rhi::descriptor::{DescriptorAllocatorGrowable, PoolSizeRatio};
use ember_rhi::device::Device;
use ember_rhi::image::AllocatedImage;
use ember_rhi::sampler::SamplerPool;
use ember_rhi::upload::{ImmediateSubmit, upload_image, upload_mesh};
use ember_rhi::{MemoryLocation, RhiResult, vk};
use ember_scene::material::{MaterialConstants, MaterialInstance, MaterialPass};
use ember_scene::mesh::{GeoSurface, MeshAsset};
use ember_scene::node::{Node, NodeHandle};
use ember_scene::DrawContext;

use crate::material::{MaterialResources, MaterialSystem};

/// Engine-owned fallback images and samplers, shared across scenes.
pub struct EngineDefaults {
    pub white_image: AllocatedImage,
    pub grey_image: AllocatedImage,
    pub black_image: AllocatedImage,
    pub checkerboard_image: AllocatedImage,
    pub sampler_linear: vk::Sampler,
    pub sampler_nearest: vk::Sampler,
}

impl EngineDefaults {
    /// Uploads the fallback textures and creates the two samplers. The
    /// samplers go on `deletion_queue` for teardown; the images are RAII.
    pub fn new(
        device: &Arc<Device>,
        immediate: &ImmediateSubmit,
        deletion_queue: &mut DeletionQueue<Release>,
    ) -> RhiResult<Self> {
        let upload_solid = |name: &str, color: [u8; 4]| -> RhiResult<AllocatedImage> {
            let data = solid_rgba(color);
            upload_image(
                device,
                immediate,
                name,
                &data.pixels,
                vk::Extent3D {
                    width: data.width,
                    height: data.height,
                    depth: 1,
                },
                vk::Format::R8G8B8A8_UNORM,
                false,
            )
        };

        let white_image = upload_solid("default_white", [255, 255, 255, 255])?;
        let grey_image = upload_solid("default_grey", [170, 170, 170, 255])?;
        let black_image = upload_solid("default_black", [0, 0, 0, 255])?;

        let checkerboard = checkerboard_rgba(16);
        let checkerboard_image = upload_image(
            device,
            immediate,
            "missing_texture",
            &checkerboard.pixels,
            vk::Extent3D {
                width: checkerboard.width,
                height: checkerboard.height,
                depth: 1,
            },
            vk::Format::R8G8B8A8_UNORM,
            false,
        )?;

        let linear_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR);
        let sampler_linear = unsafe { device.handle().create_sampler(&linear_info, None)? };
        deletion_queue.push(Release::Sampler(sampler_linear));

        let nearest_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST);
        let sampler_nearest = unsafe { device.handle().create_sampler(&nearest_info, None)? };
        deletion_queue.push(Release::Sampler(sampler_nearest));

        Ok(Self {
            white_image,
            grey_image,
            black_image,
            checkerboard_image,
            sampler_linear,
            sampler_nearest,
        })
    }
}

/// A GPU-resident scene: everything one glTF file turned into.
///
/// Owns its textures, samplers, material sets, and mesh buffers; all of
/// it is released when the scene drops. Engine defaults referenced by
/// fallback materials are borrowed, never owned.
pub struct LoadedScene {
    pub name: String,
    pub top_nodes: Vec<NodeHandle>,
    pub nodes: Vec<NodeHandle>,
    pub meshes: Vec<Arc<MeshAsset>>,
    pub materials: Vec<Arc<MaterialInstance>>,
    _images: Vec<AllocatedImage>,
    _samplers: SamplerPool,
    _material_buffer: AllocatedBuffer,
    _descriptors: DescriptorAllocatorGrowable,
}

impl LoadedScene {
    /// Appends every surface of the scene to the draw context, placed at
    /// `top_matrix` on top of the world transforms computed at load time.
    pub fn draw(&self, top_matrix: &Mat4, ctx: &mut DrawContext) {
        for node in &self.top_nodes {
            Node::draw(node, top_matrix, ctx);
        }
    }
}

/// Uploads a decoded scene description to the GPU.
///
/// Primitives without a material get `default_material`; images that
/// failed to decode or upload get the checkerboard.
pub fn upload_scene(
    device: &Arc<Device>,
    immediate: &ImmediateSubmit,
    material_system: &MaterialSystem,
    defaults: &EngineDefaults,
    default_material: &Arc<MaterialInstance>,
    description: SceneDescription,
) -> RhiResult<LoadedScene> {
    // One descriptor set per material, all from a scene-owned allocator
    // so teardown is a single drop.
    let ratios = [
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 1.0),
    ];
    let mut descriptors = DescriptorAllocatorGrowable::new(
        Arc::clone(device),
        description.materials.len().max(1) as u32,
        &ratios,
    )?;

    // The pool owns each sampler the moment it exists, so an upload error
    // below tears them down on the way out.
    let mut samplers = SamplerPool::new(Arc::clone(device));
    for desc in &description.samplers {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .max_lod(vk::LOD_CLAMP_NONE);
        samplers.create(&info)?;
    }

    // Owned textures, with a parallel view table that substitutes the
    // checkerboard for anything undecodable.
    let mut images = Vec::new();
    let mut image_views = Vec::with_capacity(description.images.len());
    for (i, data) in description.images.iter().enumerate() {
        match data {
            Some(data) => {
                let name = format!("{}_image_{}", description.name, i);
                match upload_image(
                    device,
                    immediate,
                    &name,
                    &data.pixels,
                    vk::Extent3D {
                        width: data.width,
                        height: data.height,
                        depth: 1,
                    },
                    vk::Format::R8G8B8A8_UNORM,
                    true,
                ) {
                    Ok(image) => {
                        image_views.push(image.view());
                        images.push(image);
                    }
                    Err(e) => {
                        warn!("Upload of image {i} failed ({e}), using fallback");
                        image_views.push(defaults.checkerboard_image.view());
                    }
                }
            }
            None => image_views.push(defaults.checkerboard_image.view()),
        }
    }

    // All material constants share one buffer, addressed by offset.
    let constants_stride = std::mem::size_of::<MaterialConstants>() as vk::DeviceSize;
    let material_buffer = AllocatedBuffer::new(
        Arc::clone(device),
        &format!("{}_material_constants", description.name),
        constants_stride * description.materials.len().max(1) as vk::DeviceSize,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        MemoryLocation::CpuToGpu,
    )?;

    let resolve = |texture: Option<TextureRef>| -> (vk::ImageView, vk::Sampler) {
        match texture {
            Some(texture) => {
                let view = image_views
                    .get(texture.image)
                    .copied()
                    .unwrap_or_else(|| defaults.checkerboard_image.view());
                let sampler = texture
                    .sampler
                    .and_then(|s| samplers.get(s))
                    .unwrap_or(defaults.sampler_linear);
                (view, sampler)
            }
            None => (defaults.white_image.view(), defaults.sampler_linear),
        }
    };

    let mut materials = Vec::with_capacity(description.materials.len());
    for (i, desc) in description.materials.iter().enumerate() {
        let offset = constants_stride * i as vk::DeviceSize;
        let constants = MaterialConstants {
            color_factors: desc.color_factors,
            metal_rough_factors: glam::Vec4::new(desc.metallic, desc.roughness, 0.0, 0.0),
            ..Default::default()
        };
        material_buffer.write_slice(offset, &[constants])?;

        let (color_view, color_sampler) = resolve(desc.color_texture);
        let (mr_view, mr_sampler) = resolve(desc.metal_rough_texture);
        let pass = if desc.blended {
            MaterialPass::Transparent
        } else {
            MaterialPass::Opaque
        };

        let instance = material_system.write_material(
            pass,
            &MaterialResources {
                color_image_view: color_view,
                color_sampler,
                metal_rough_image_view: mr_view,
                metal_rough_sampler: mr_sampler,
                data_buffer: material_buffer.handle(),
                data_buffer_offset: offset,
            },
            &mut descriptors,
        )?;
        materials.push(Arc::new(instance));
    }

    let mut meshes = Vec::with_capacity(description.meshes.len());
    for data in description.meshes {
        let buffers = upload_mesh(device, immediate, &data.name, &data.vertices, &data.indices)?;

        let surfaces = data
            .surfaces
            .into_iter()
            .map(|s| GeoSurface {
                start_index: s.start_index,
                count: s.count,
                bounds: s.bounds,
                material: Some(
                    s.material_index
                        .and_then(|m| materials.get(m).cloned())
                        .unwrap_or_else(|| Arc::clone(default_material)),
                ),
            })
            .collect();

        meshes.push(Arc::new(MeshAsset {
            name: data.name,
            surfaces,
            buffers,
        }));
    }

    // Rebuild the hierarchy: nodes first, then child links, then one
    // transform pass from each root.
    let nodes: Vec<NodeHandle> = description
        .nodes
        .iter()
        .map(|desc| match desc.mesh.and_then(|m| meshes.get(m).cloned()) {
            Some(mesh) => Node::with_mesh(desc.transform, mesh),
            None => Node::new(desc.transform),
        })
        .collect();

    for (i, desc) in description.nodes.iter().enumerate() {
        for &child in &desc.children {
            if let Some(child_node) = nodes.get(child) {
                Node::add_child(&nodes[i], child_node.clone());
            }
        }
    }

    let top_nodes: Vec<NodeHandle> = description
        .top_nodes
        .iter()
        .filter_map(|&i| nodes.get(i).cloned())
        .collect();
    for top in &top_nodes {
        Node::refresh_transform(top, &Mat4::IDENTITY);
    }

    debug!(
        scene = %description.name,
        meshes = meshes.len(),
        materials = materials.len(),
        images = images.len(),
        "Scene resident on GPU"
    );

    Ok(LoadedScene {
        name: description.name,
        top_nodes,
        nodes,
        meshes,
        materials,
        _images: images,
        _samplers: samplers,
        _material_buffer: material_buffer,
        _descriptors: descriptors,
    })
}
