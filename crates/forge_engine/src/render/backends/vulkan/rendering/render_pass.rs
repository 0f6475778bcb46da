//! Forward render pass

use std::rc::Rc;

use ash::vk;

use crate::render::backends::vulkan::device_api::DeviceApi;
use crate::render::backends::vulkan::error::VulkanResult;
use crate::render::backends::vulkan::resources::managed::Managed;

/// Depth attachment format
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Render pass wrapper with RAII cleanup
pub type RenderPass<D> = Managed<D, vk::RenderPass>;

impl<D: DeviceApi> RenderPass<D> {
    /// Single-subpass pass that clears color and depth and leaves the color
    /// attachment ready for presentation
    pub fn new_forward_pass(device: Rc<D>, color_format: vk::Format) -> VulkanResult<Self> {
        let render_pass = device.create_render_pass(color_format, DEPTH_FORMAT)?;
        Ok(Self::new(device, render_pass))
    }
}
