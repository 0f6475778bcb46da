//! # Rendering System
//!
//! GPU resource lifecycle and frame execution on Vulkan.
//!
//! ## Architecture
//!
//! - **Engine**: [`Renderer`] on a real device plus the context that owns it
//! - **Renderer**: uploads, materials and the per-frame draw loop
//! - **Vulkan Backend**: device seam, managers, swapchain and frame state
//! - **API types**: handles and GPU payloads exchanged with applications

pub mod api;

/// Graphics backend implementations
pub mod backends;

pub mod engine;
pub mod renderer;

#[cfg(test)]
mod tests;

pub use api::{
    CameraUniform, MaterialIndex, MeshHandle, PipelineHandle, PushConstants, TextureHandle,
    IDENTITY,
};
pub use backends::vulkan::{
    RawWindow, ShaderCode, Vertex, VertexLayout, VertexType, VulkanError, VulkanResult,
    WindowSurface,
};
pub use engine::Engine;
pub use renderer::{FrameOutcome, FrameStats, Renderer, RenderingContext, SkipReason};
