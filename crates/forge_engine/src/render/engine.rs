//! Vulkan-backed renderer bundled with the context that owns its device

use std::ops::{Deref, DerefMut};

use crate::core::RendererConfig;
use crate::render::backends::vulkan::error::VulkanResult;
use crate::render::backends::vulkan::initialization::{
    LogicalDevice, VulkanContext, WindowSurface,
};
use crate::render::backends::vulkan::rendering::ShaderCode;
use crate::render::renderer::Renderer;

/// Renderer on a real GPU
///
/// Dereferences to [`Renderer`]. The renderer is dropped before the context,
/// so every device object is gone before the device, surface and instance.
pub struct Engine {
    renderer: Renderer<LogicalDevice>,
    context: VulkanContext,
}

impl Engine {
    /// Initialize Vulkan for `window` and build the renderer
    ///
    /// Shader blobs are read first; a missing blob fails before any Vulkan
    /// object exists.
    pub fn new(window: &dyn WindowSurface, config: &RendererConfig) -> VulkanResult<Self> {
        let shaders = ShaderCode::load(&config.shaders)?;
        let context = VulkanContext::new(window, config)?;
        let renderer = Renderer::new(
            context.device(),
            config,
            shaders,
            window.framebuffer_extent(),
        )?;
        Ok(Self { renderer, context })
    }

    /// Vulkan context
    pub const fn context(&self) -> &VulkanContext {
        &self.context
    }
}

impl Deref for Engine {
    type Target = Renderer<LogicalDevice>;

    fn deref(&self) -> &Self::Target {
        &self.renderer
    }
}

impl DerefMut for Engine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.renderer
    }
}
