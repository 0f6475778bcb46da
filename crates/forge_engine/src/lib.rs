//! # Forge Engine
//!
//! Vulkan forward renderer core: physical device selection, swapchain
//! lifecycle, staged buffer and image uploads, bindless materials and
//! frame pacing with a fixed number of frames in flight.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forge_engine::core::RendererConfig;
//! use forge_engine::render::{Engine, Vertex, WindowSurface, IDENTITY};
//!
//! fn run(window: &dyn WindowSurface) -> forge_engine::render::VulkanResult<()> {
//!     let config = RendererConfig::new("demo");
//!     let mut engine = Engine::new(window, &config)?;
//!     let quad = engine.upload_mesh(
//!         &[
//!             Vertex::new([-0.5, -0.5, 0.0], [1.0; 3], [0.0, 0.0]),
//!             Vertex::new([0.5, -0.5, 0.0], [1.0; 3], [1.0, 0.0]),
//!             Vertex::new([0.5, 0.5, 0.0], [1.0; 3], [1.0, 1.0]),
//!             Vertex::new([-0.5, 0.5, 0.0], [1.0; 3], [0.0, 1.0]),
//!         ],
//!         &[0, 1, 2, 2, 3, 0],
//!     )?;
//!     let texture = engine.upload_texture(&[255, 255, 255, 255], 1, 1)?;
//!     let material = engine.add_material(texture)?;
//!     engine.draw_frame(|frame| frame.draw_mesh(quad, IDENTITY, material))?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
