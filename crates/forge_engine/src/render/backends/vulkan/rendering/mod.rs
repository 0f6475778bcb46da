//! Vulkan rendering components (commands, render pass, shaders, vertex layouts)

pub mod commands;
pub mod render_pass;
pub mod shader;
pub mod vertex_layout;

pub use commands::{Command, CommandPool, CommandRecorder, ImageBarrier};
pub use render_pass::{RenderPass, DEPTH_FORMAT};
pub use shader::{PipelineCache, ShaderCode};
pub use vertex_layout::{Vertex, VertexAttribute, VertexLayout, VertexType};
