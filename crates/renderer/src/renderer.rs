//! The main renderer: owns the GPU stack and drives the frame loop.
//!
//! Each frame goes through the same sequence: wait for the frame slot's
//! fence and recycle its transient resources, acquire a swapchain image,
//! record the background compute pass and the geometry pass into an
//! offscreen draw image, blit that image to the swapchain, submit, and
//! present. Resizes are deferred: events only raise a flag, and the
//! swapchain is rebuilt at the top of the next frame, outside any
//! in-flight GPU work.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use tracing::{debug, error, info, warn};

use ember_platform::input::{InputState, KeyCode, MouseButton};
use ember_platform::window::{Surface, Window};
use ember_resources::scene::load_gltf_scene;
use ember_rhi::buffer::AllocatedBuffer;
use ember_rhi::deletion::{DeletionQueue, Release};
use ember_rhi::descriptor::{
    DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorWriter, PoolSizeRatio,
};
use ember_rhi::device::Device;
use ember_rhi::image::AllocatedImage;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use ember_rhi::swapchain::Swapchain;
use ember_rhi::sync::Semaphore;
use ember_rhi::upload::ImmediateSubmit;
use ember_rhi::vertex::DrawPushConstants;
use ember_rhi::{MemoryLocation, RhiError, RhiResult, vk};
use ember_scene::camera::Camera;
use ember_scene::draw::{DrawContext, SceneData};
use ember_scene::material::{MaterialConstants, MaterialInstance, MaterialPass};

use crate::background::BackgroundPass;
use crate::frame::FrameRing;
use crate::loader::{EngineDefaults, LoadedScene, upload_scene};
use crate::material::{MaterialResources, MaterialSystem};
use crate::stats::RenderStats;

/// Camera translation speed, units per second.
const CAMERA_SPEED: f32 = 5.0;

/// Internal render target format; HDR so the background effects can
/// exceed [0, 1] before the blit to the swapchain.
const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Render resolution as a fraction of the draw image, clamped so the
/// viewport never collapses.
const RENDER_SCALE_RANGE: std::ops::RangeInclusive<f32> = 0.3..=1.0;

/// The draw region: the scaled intersection of the fixed-size draw image
/// and the current swapchain extent.
fn scaled_extent(draw: vk::Extent2D, swapchain: vk::Extent2D, scale: f32) -> vk::Extent2D {
    vk::Extent2D {
        width: (draw.width.min(swapchain.width) as f32 * scale) as u32,
        height: (draw.height.min(swapchain.height) as f32 * scale) as u32,
    }
}

/// Deferred swapchain rebuild request.
///
/// Resize events and stale-surface results only record intent here; the
/// rebuild happens at the top of the next frame, outside in-flight GPU
/// work. A request stays latched until consumed, so a frame that bails
/// out early cannot lose it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ResizeLatch {
    width: u32,
    height: u32,
    pending: bool,
}

impl ResizeLatch {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pending: false,
        }
    }

    /// Records a new target size. Returns false for zero dimensions
    /// (minimized window), which keep the previous size.
    fn request(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pending = true;
        true
    }

    /// Requests a rebuild at the last known size, for a surface the
    /// driver reported stale.
    fn mark_stale(&mut self) {
        self.pending = true;
    }

    /// Consumes the pending request, if any.
    fn take(&mut self) -> Option<(u32, u32)> {
        if self.pending {
            self.pending = false;
            Some((self.width, self.height))
        } else {
            None
        }
    }
}

/// Ties the RHI, scene, and platform layers together.
///
/// Field order is drop order: frame slots and passes go before the
/// images and swapchain they reference, and the device outlives the
/// surface and instance it was created from.
pub struct Renderer {
    frames: FrameRing,
    render_semaphores: Vec<Semaphore>,

    background: BackgroundPass,
    material_system: MaterialSystem,

    scenes: Vec<LoadedScene>,
    default_material: Arc<MaterialInstance>,
    _material_constants: AllocatedBuffer,
    defaults: EngineDefaults,

    immediate: ImmediateSubmit,
    // Backs the long-lived descriptor sets handed out during setup.
    _global_descriptors: DescriptorAllocatorGrowable,
    scene_data_layout: vk::DescriptorSetLayout,
    main_deletion_queue: DeletionQueue<Release>,

    draw_image: AllocatedImage,
    depth_image: AllocatedImage,
    swapchain: Swapchain,

    draw_context: DrawContext,
    scene_data: SceneData,
    camera: Camera,
    stats: RenderStats,

    render_scale: f32,
    resize: ResizeLatch,

    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    pub fn new(window: &Window) -> RhiResult<Self> {
        let instance = Instance::new(cfg!(debug_assertions))?;
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SwapchainError(e.to_string()))?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &gpu)?;

        let (width, height) = (window.width(), window.height());
        let swapchain = Swapchain::new(&instance, Arc::clone(&device), surface.handle(), width, height)?;

        // The draw image keeps its creation size; resizes only change the
        // swapchain, and the blit region adapts each frame.
        let draw_image = AllocatedImage::new(
            Arc::clone(&device),
            "draw_image",
            vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            DRAW_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            false,
        )?;
        let depth_image = AllocatedImage::new(
            Arc::clone(&device),
            "depth_image",
            vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            false,
        )?;

        let mut main_deletion_queue = DeletionQueue::new();

        let ratios = [
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
            PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 2.0),
            PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
        ];
        let mut global_descriptors =
            DescriptorAllocatorGrowable::new(Arc::clone(&device), 16, &ratios)?;

        let scene_data_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(
                &device,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?;
        main_deletion_queue.push(Release::DescriptorSetLayout(scene_data_layout));

        let background =
            BackgroundPass::new(Arc::clone(&device), &mut global_descriptors, draw_image.view())?;

        let material_system = MaterialSystem::new(
            Arc::clone(&device),
            scene_data_layout,
            draw_image.format(),
            depth_image.format(),
        )?;

        let immediate = ImmediateSubmit::new(Arc::clone(&device))?;

        let defaults = EngineDefaults::new(&device, &immediate, &mut main_deletion_queue)?;

        let material_constants = AllocatedBuffer::new(
            Arc::clone(&device),
            "default_material_constants",
            std::mem::size_of::<MaterialConstants>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;
        material_constants.write_slice(0, &[MaterialConstants::default()])?;

        let default_resources = MaterialResources {
            color_image_view: defaults.white_image.view(),
            color_sampler: defaults.sampler_linear,
            metal_rough_image_view: defaults.white_image.view(),
            metal_rough_sampler: defaults.sampler_linear,
            data_buffer: material_constants.handle(),
            data_buffer_offset: 0,
        };
        let default_material = Arc::new(material_system.write_material(
            MaterialPass::Opaque,
            &default_resources,
            &mut global_descriptors,
        )?);

        let mut render_semaphores = Vec::with_capacity(swapchain.image_count() as usize);
        for _ in 0..swapchain.image_count() {
            render_semaphores.push(Semaphore::new(Arc::clone(&device))?);
        }

        let frames = FrameRing::new(Arc::clone(&device))?;

        let mut camera = Camera::new();
        camera.set_aspect(width as f32 / height as f32);
        camera.update();

        info!("Renderer initialized at {}x{}", width, height);

        Ok(Self {
            frames,
            render_semaphores,
            background,
            material_system,
            scenes: Vec::new(),
            default_material,
            _material_constants: material_constants,
            defaults,
            immediate,
            _global_descriptors: global_descriptors,
            scene_data_layout,
            main_deletion_queue,
            draw_image,
            depth_image,
            swapchain,
            draw_context: DrawContext::new(),
            scene_data: SceneData::default(),
            camera,
            stats: RenderStats::default(),
            render_scale: 1.0,
            resize: ResizeLatch::new(width, height),
            device,
            surface,
            instance,
        })
    }

    /// Loads a glTF file and makes it GPU-resident: textures, samplers,
    /// materials, mesh buffers, and the node hierarchy.
    ///
    /// A missing or unreadable file is skipped with a warning rather
    /// than failing startup.
    pub fn load_scene(&mut self, path: &Path) -> RhiResult<()> {
        let description = match load_gltf_scene(path) {
            Ok(description) => description,
            Err(e) => {
                warn!("Could not load {}: {e}", path.display());
                return Ok(());
            }
        };

        let scene = upload_scene(
            &self.device,
            &self.immediate,
            &self.material_system,
            &self.defaults,
            &self.default_material,
            description,
        )?;

        info!(
            "Scene '{}' loaded: {} meshes, {} materials",
            scene.name,
            scene.meshes.len(),
            scene.materials.len()
        );
        self.scenes.push(scene);
        Ok(())
    }

    /// Applies one frame of input: camera motion, background cycling, and
    /// render scale adjustment.
    pub fn update(&mut self, input: &InputState, delta: f32) {
        // Skip the press frame so the click that starts a drag does not
        // also rotate the view.
        if input.is_mouse_pressed(MouseButton::Right)
            && !input.is_mouse_just_pressed(MouseButton::Right)
        {
            let (dx, dy) = input.mouse_delta();
            self.camera
                .process_mouse(dx.clamp(-100.0, 100.0), dy.clamp(-100.0, 100.0));
        }

        let mut direction = Vec3::ZERO;
        if input.is_key_pressed(KeyCode::KeyW) {
            direction.z -= 1.0;
        }
        if input.is_key_pressed(KeyCode::KeyS) {
            direction.z += 1.0;
        }
        if input.is_key_pressed(KeyCode::KeyA) {
            direction.x -= 1.0;
        }
        if input.is_key_pressed(KeyCode::KeyD) {
            direction.x += 1.0;
        }
        if input.is_key_pressed(KeyCode::KeyQ) {
            direction.y -= 1.0;
        }
        if input.is_key_pressed(KeyCode::KeyE) {
            direction.y += 1.0;
        }
        self.camera.velocity = direction.normalize_or_zero() * CAMERA_SPEED * delta;

        if input.is_key_just_pressed(KeyCode::Tab) {
            self.background.next_effect();
        }
        if input.is_key_just_pressed(KeyCode::Minus) {
            self.set_render_scale(self.render_scale - 0.1);
        }
        if input.is_key_just_pressed(KeyCode::Equal) {
            self.set_render_scale(self.render_scale + 0.1);
        }
    }

    pub fn set_render_scale(&mut self, scale: f32) {
        self.render_scale = scale.clamp(*RENDER_SCALE_RANGE.start(), *RENDER_SCALE_RANGE.end());
        info!("Render scale: {:.1}", self.render_scale);
    }

    /// Marks the swapchain for recreation at the start of the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.resize.request(width, height) {
            self.camera.set_aspect(width as f32 / height as f32);
        }
    }

    #[inline]
    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Flattens the loaded scenes into the draw context and refreshes
    /// the per-frame scene constants.
    fn update_scene(&mut self) {
        let start = Instant::now();

        self.draw_context.clear();
        for scene in &self.scenes {
            scene.draw(&Mat4::IDENTITY, &mut self.draw_context);
        }
        self.draw_context.sort_opaque();

        self.camera.update();
        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix();
        self.scene_data.view = view;
        self.scene_data.proj = proj;
        self.scene_data.viewproj = proj * view;

        self.stats.scene_update_ms = start.elapsed().as_secs_f32() * 1000.0;
    }

    /// Records, submits, and presents one frame.
    pub fn draw(&mut self) -> RhiResult<()> {
        let frame_start = Instant::now();

        if let Some((width, height)) = self.resize.take() {
            self.recreate_swapchain(width, height)?;
        }

        self.stats.reset();
        self.update_scene();

        let frame = self.frames.current_mut();
        frame.wait_and_recycle()?;

        let (image_index, suboptimal) = match self
            .swapchain
            .acquire_next_image(frame.swapchain_semaphore().handle())
        {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.resize.mark_stale();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if suboptimal {
            self.resize.mark_stale();
        }

        // Only reset after a successful acquire, or the next wait would
        // deadlock on a fence that is never signaled.
        frame.render_fence().reset()?;

        // Per-frame scene constants live in a throwaway uniform buffer
        // retired through this frame's deletion queue.
        let scene_buffer = AllocatedBuffer::new(
            Arc::clone(&self.device),
            "scene_data",
            std::mem::size_of::<SceneData>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;
        scene_buffer.write_slice(0, &[self.scene_data])?;

        let scene_set = frame.descriptors().allocate(self.scene_data_layout)?;
        let mut writer = DescriptorWriter::new();
        writer.write_buffer(
            0,
            scene_buffer.handle(),
            0,
            std::mem::size_of::<SceneData>() as vk::DeviceSize,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        writer.update_set(&self.device, scene_set);

        let (raw_scene_buffer, scene_allocation) = scene_buffer.into_raw();
        frame
            .deletion_queue()
            .push(Release::Buffer(raw_scene_buffer, scene_allocation));

        let swap_extent = self.swapchain.extent();
        let draw_extent = scaled_extent(
            self.draw_image.extent_2d(),
            swap_extent,
            self.render_scale,
        );

        let cmd = frame.command_buffer();
        cmd.reset()?;
        cmd.begin()?;

        cmd.transition_image(
            self.draw_image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );
        self.background.record(cmd, draw_extent);

        cmd.transition_image(
            self.draw_image.handle(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        cmd.transition_image(
            self.depth_image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        let record_start = Instant::now();
        let bundle = RenderingConfig::new(draw_extent, ColorAttachment::load(self.draw_image.view()))
            .with_depth(DepthAttachment::clear(self.depth_image.view(), 1.0))
            .build();
        cmd.begin_rendering(&bundle.info());
        cmd.set_viewport_scissor(draw_extent);

        let mut last_pipeline = vk::Pipeline::null();
        let mut last_material_set = vk::DescriptorSet::null();
        let mut last_index_buffer = vk::Buffer::null();

        let objects = self
            .draw_context
            .opaque_surfaces
            .iter()
            .chain(self.draw_context.transparent_surfaces.iter());

        for object in objects {
            if object.material.pipeline.pipeline != last_pipeline {
                last_pipeline = object.material.pipeline.pipeline;
                cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, last_pipeline);
                cmd.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    object.material.pipeline.layout,
                    0,
                    &[scene_set],
                );
                cmd.set_viewport_scissor(draw_extent);
            }
            if object.material.descriptor_set != last_material_set {
                last_material_set = object.material.descriptor_set;
                cmd.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    object.material.pipeline.layout,
                    1,
                    &[last_material_set],
                );
            }
            if object.index_buffer != last_index_buffer {
                last_index_buffer = object.index_buffer;
                cmd.bind_index_buffer(object.index_buffer, 0);
            }

            let push = DrawPushConstants::new(object.transform, object.vertex_buffer_address);
            cmd.push_constants(
                object.material.pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                &push,
            );
            cmd.draw_indexed(object.index_count, 1, object.first_index, 0, 0);

            self.stats.drawcall_count += 1;
            self.stats.triangle_count += object.index_count / 3;
        }

        cmd.end_rendering();
        self.stats.draw_record_ms = record_start.elapsed().as_secs_f32() * 1000.0;

        let swapchain_image = self.swapchain.image(image_index as usize);
        cmd.transition_image(
            self.draw_image.handle(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        cmd.transition_image(
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        cmd.copy_image_to_image(
            self.draw_image.handle(),
            swapchain_image,
            draw_extent,
            swap_extent,
        );
        cmd.transition_image(
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        cmd.end()?;

        let render_semaphore = self.render_semaphores[image_index as usize].handle();
        self.device.submit_commands(
            self.device.graphics_queue(),
            cmd.handle(),
            Some((
                frame.swapchain_semaphore().handle(),
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            )),
            Some((render_semaphore, vk::PipelineStageFlags2::ALL_GRAPHICS)),
            frame.render_fence().handle(),
        )?;

        match self
            .swapchain
            .present(self.device.present_queue(), image_index, render_semaphore)
        {
            Ok(suboptimal) => {
                if suboptimal {
                    self.resize.mark_stale();
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.resize.mark_stale();
            }
            Err(e) => return Err(e.into()),
        }

        self.stats.frametime_ms = frame_start.elapsed().as_secs_f32() * 1000.0;
        if self.frames.frame_number() % 120 == 0 {
            debug!(
                frametime_ms = self.stats.frametime_ms,
                scene_update_ms = self.stats.scene_update_ms,
                draw_record_ms = self.stats.draw_record_ms,
                drawcalls = self.stats.drawcall_count,
                triangles = self.stats.triangle_count,
                "frame stats"
            );
        }

        self.frames.advance();
        Ok(())
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.swapchain
            .recreate(self.surface.handle(), width, height)?;

        // Present semaphores are indexed by swapchain image, so the set is
        // rebuilt whenever the image count can change.
        self.render_semaphores.clear();
        for _ in 0..self.swapchain.image_count() {
            self.render_semaphores
                .push(Semaphore::new(Arc::clone(&self.device))?);
        }

        info!("Swapchain recreated at {}x{}", width, height);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Device wait failed during renderer teardown: {e}");
        }
        self.main_deletion_queue.release_all(&self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_extent_takes_smaller_dimension() {
        let draw = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let swap = vk::Extent2D {
            width: 1920,
            height: 600,
        };
        let extent = scaled_extent(draw, swap, 1.0);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_scaled_extent_applies_render_scale() {
        let draw = vk::Extent2D {
            width: 1000,
            height: 800,
        };
        let extent = scaled_extent(draw, draw, 0.5);
        assert_eq!(extent.width, 500);
        assert_eq!(extent.height, 400);
    }

    #[test]
    fn test_render_scale_range_bounds() {
        assert!(RENDER_SCALE_RANGE.contains(&1.0));
        assert!(RENDER_SCALE_RANGE.contains(&0.3));
        assert!(!RENDER_SCALE_RANGE.contains(&0.2));
        assert!(!RENDER_SCALE_RANGE.contains(&1.1));
    }

    #[test]
    fn test_resize_latch_ignores_minimized_window() {
        let mut latch = ResizeLatch::new(800, 600);
        assert!(!latch.request(0, 600));
        assert!(!latch.request(800, 0));
        assert_eq!(latch.take(), None);
    }

    #[test]
    fn test_resize_latch_holds_request_until_consumed() {
        let mut latch = ResizeLatch::new(800, 600);
        assert!(latch.request(1920, 1080));
        assert_eq!(latch.take(), Some((1920, 1080)));
        // Consumed: the next frame must not rebuild again.
        assert_eq!(latch.take(), None);
    }

    #[test]
    fn test_resize_latch_keeps_latest_size() {
        let mut latch = ResizeLatch::new(800, 600);
        latch.request(1024, 768);
        latch.request(1920, 1080);
        assert_eq!(latch.take(), Some((1920, 1080)));
    }

    #[test]
    fn test_stale_surface_rebuilds_at_last_known_size() {
        let mut latch = ResizeLatch::new(800, 600);
        latch.mark_stale();
        assert_eq!(latch.take(), Some((800, 600)));

        // Stale after a consumed resize reuses that resize's dimensions.
        latch.request(1280, 720);
        latch.take();
        latch.mark_stale();
        assert_eq!(latch.take(), Some((1280, 720)));
    }
}
