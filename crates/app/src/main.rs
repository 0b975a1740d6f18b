//! Ember - Main Entry Point
//!
//! A Vulkan renderer built around compute-shader backgrounds, bindless
//! vertex pulling, and a scene graph flattened into sorted draw lists.

use anyhow::Result;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use ember_core::Timer;
use ember_platform::{InputState, Window};
use ember_renderer::Renderer;

const ASSET_DIR: &str = "assets/models";

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    input: InputState,
    timer: Timer,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            input: InputState::new(),
            timer: Timer::new(),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, 1280, 720, "Ember") {
                Ok(window) => {
                    // Create renderer after window is created
                    match Renderer::new(&window) {
                        Ok(mut renderer) => {
                            let scene_files = ember_resources::discover_gltf_files(ASSET_DIR);
                            if scene_files.is_empty() {
                                warn!("No glTF files under {}, starting empty", ASSET_DIR);
                            }
                            for path in &scene_files {
                                if let Err(e) = renderer.load_scene(path) {
                                    error!("Failed to upload scene: {:?}", e);
                                    event_loop.exit();
                                    return;
                                }
                            }
                            info!("Initialization complete, entering main loop");
                            self.renderer = Some(renderer);
                            self.window = Some(window);
                        }
                        Err(e) => {
                            error!("Failed to create renderer: {:?}", e);
                            event_loop.exit();
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let delta = self.timer.delta_secs();

                if let Some(ref mut renderer) = self.renderer {
                    renderer.update(&self.input, delta);
                    // Surface staleness is handled inside draw(); an error
                    // here means the GPU or driver failed. Don't spin on it.
                    if let Err(e) = renderer.draw() {
                        error!("Render error, shutting down: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_mouse_moved(position.x as f32, position.y as f32);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.begin_frame();
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    ember_core::init_logging();
    info!("Starting Ember");

    // Create event loop
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    // Create app and run
    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
