//! Vulkan context management
//!
//! [`VulkanContext`] runs the initialization sequence: instance (with the
//! optional diagnostic messenger), window surface, physical device
//! selection, logical device. Fields drop in reverse creation order.

use std::rc::Rc;

use super::instance::VulkanInstance;
use super::logical_device::LogicalDevice;
use super::physical_device::{AshSurfaceQuery, PhysicalDeviceSelector, PhysicalDeviceSurfaceInfo};
use super::surface::{Surface, WindowSurface};
use crate::core::RendererConfig;
use crate::render::backends::vulkan::error::VulkanResult;

/// Instance, surface and device of one window
pub struct VulkanContext {
    physical_device: PhysicalDeviceSurfaceInfo,
    device: Rc<LogicalDevice>,
    surface: Surface,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Initialize Vulkan for `window`
    ///
    /// Fails with `NoSuitableGpu` when no device offers graphics, present,
    /// the swapchain extension and an adequate surface.
    pub fn new(window: &dyn WindowSurface, config: &RendererConfig) -> VulkanResult<Self> {
        config.validate()?;
        let extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(config, &extensions)?;
        let surface = Surface::new(instance.entry(), instance.instance(), window)?;

        let physical_device = {
            let query = AshSurfaceQuery::new(instance.instance(), &surface);
            PhysicalDeviceSelector::select_best(&query)?
        };

        let device = Rc::new(LogicalDevice::new(&instance, &surface, &physical_device)?);
        Ok(Self {
            physical_device,
            device,
            surface,
            instance,
        })
    }

    /// Shared logical device
    pub fn device(&self) -> Rc<LogicalDevice> {
        Rc::clone(&self.device)
    }

    /// Selected physical device
    pub const fn physical_device(&self) -> &PhysicalDeviceSurfaceInfo {
        &self.physical_device
    }

    /// Presentation surface
    pub const fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Instance wrapper
    pub const fn instance(&self) -> &VulkanInstance {
        &self.instance
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        // The device must be gone before the surface and instance.
        if Rc::strong_count(&self.device) > 1 {
            log::error!("Logical device still shared at context teardown");
        }
    }
}
