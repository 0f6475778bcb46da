//! Spinning textured quad
//!
//! Loads `renderer.toml` (falling back to defaults), opens a resizable GLFW
//! window and draws one quad per frame until ESC or the close button.

mod window;

use std::path::Path;

use forge_engine::config::{Config, ConfigError};
use forge_engine::core::RendererConfig;
use forge_engine::foundation::logging;
use forge_engine::render::{Engine, FrameOutcome, Vertex, VulkanError};
use nalgebra::{Matrix4, Perspective3, Point3, Vector3};
use thiserror::Error;

use crate::window::{Window, WindowError};

const CONFIG_PATH: &str = "quad_app/renderer.toml";
const TEXTURE_PATH: &str = "resources/textures/quad.png";
const CHECKER_SIZE: u32 = 64;

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Renderer(#[from] VulkanError),
}

type AppResult<T> = Result<T, AppError>;

fn load_config() -> RendererConfig {
    match RendererConfig::load_from_file(CONFIG_PATH) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) => {
            log::info!("No config at {CONFIG_PATH} ({e}), using defaults");
            RendererConfig::new("Forge Quad")
        }
        Err(e) => {
            log::warn!("Ignoring unreadable config {CONFIG_PATH}: {e}");
            RendererConfig::new("Forge Quad")
        }
    }
}

/// RGBA pixels of the quad texture, or a checkerboard when none is on disk
fn load_texture_pixels() -> (Vec<u8>, u32, u32) {
    if Path::new(TEXTURE_PATH).exists() {
        match image::open(TEXTURE_PATH) {
            Ok(image) => {
                let rgba = image.to_rgba8();
                let (width, height) = rgba.dimensions();
                log::info!("Loaded texture {TEXTURE_PATH} ({width}x{height})");
                return (rgba.into_raw(), width, height);
            }
            Err(e) => log::warn!("Failed to load {TEXTURE_PATH}: {e}"),
        }
    }

    let pixels = (0..CHECKER_SIZE * CHECKER_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % CHECKER_SIZE, i / CHECKER_SIZE);
            if (x / 8 + y / 8) % 2 == 0 {
                [235, 235, 235, 255]
            } else {
                [40, 40, 48, 255]
            }
        })
        .collect();
    (pixels, CHECKER_SIZE, CHECKER_SIZE)
}

fn quad() -> ([Vertex; 4], [u32; 6]) {
    (
        [
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.6, 0.6], [0.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.6, 1.0, 0.6], [1.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.6, 0.6, 1.0], [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0]),
        ],
        [0, 1, 2, 2, 3, 0],
    )
}

/// View and Vulkan-style projection (Y pointing down in clip space)
fn camera(width: u32, height: u32) -> ([[f32; 4]; 4], [[f32; 4]; 4]) {
    let view = Matrix4::look_at_rh(
        &Point3::new(0.0, 0.0, 2.0),
        &Point3::origin(),
        &Vector3::y(),
    );
    #[allow(clippy::cast_precision_loss)]
    let aspect = width as f32 / height.max(1) as f32;
    let mut projection =
        Perspective3::new(aspect, std::f32::consts::FRAC_PI_4, 0.1, 10.0).to_homogeneous();
    projection[(1, 1)] *= -1.0;
    (view.into(), projection.into())
}

fn run(config: &RendererConfig) -> AppResult<()> {
    let mut window = Window::new(&config.application_name, 800, 600)?;
    let mut engine = Engine::new(&window, config)?;

    let (vertices, indices) = quad();
    let mesh = engine.upload_mesh(&vertices, &indices)?;
    let (pixels, width, height) = load_texture_pixels();
    let texture = engine.upload_texture(&pixels, width, height)?;
    let material = engine.add_material(texture)?;

    log::info!("Entering main loop");
    while !window.should_close() {
        window.poll_events();
        for event in window.flush_events() {
            match event {
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    window.set_should_close(true);
                }
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    engine.notify_resize(
                        u32::try_from(width).unwrap_or(0),
                        u32::try_from(height).unwrap_or(0),
                    );
                }
                _ => {}
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let angle = window.time() as f32;
        let model: [[f32; 4]; 4] = Matrix4::from_euler_angles(0.0, 0.0, angle).into();

        let outcome = engine.draw_frame(|frame| {
            let (view, projection) = camera(frame.viewport_width(), frame.viewport_height());
            frame.set_camera(view, projection);
            frame.draw_mesh(mesh, model, material)
        })?;

        if let FrameOutcome::Skipped(reason) = outcome {
            log::trace!("Frame skipped: {reason:?}");
            let (width, height) = window.framebuffer_size();
            if width == 0 || height == 0 {
                // Minimized: sleep until the window changes
                window.wait_events();
            }
        }
    }

    let stats = engine.stats();
    log::info!(
        "Shutting down after {} frames ({} skipped, {} swapchain recreations)",
        stats.submitted,
        stats.skipped,
        stats.recreations
    );
    Ok(())
}

fn main() {
    let config = load_config();
    logging::init_with_level(&config.log_level);

    if let Err(e) = run(&config) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
