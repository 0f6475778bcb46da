//! Vulkan surface management
//!
//! Handles window surface creation for presentation. The engine never talks
//! to a windowing library directly: anything implementing [`WindowSurface`]
//! can host the renderer. [`RawWindow`] covers every window type that
//! exposes `raw-window-handle` 0.5 handles.

use std::ffi::{CStr, CString};

use ash::extensions::khr;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::render::backends::vulkan::error::{VkCheck, VulkanError, VulkanResult};

/// Window-side collaborator of the renderer
pub trait WindowSurface {
    /// Instance extensions the platform surface needs
    fn required_instance_extensions(&self) -> VulkanResult<Vec<CString>>;

    /// Create the presentation surface
    fn create_surface(&self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;
}

/// [`WindowSurface`] over any window exposing raw handles
pub struct RawWindow<'a, W> {
    window: &'a W,
    extent: vk::Extent2D,
}

impl<'a, W> RawWindow<'a, W>
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    /// Wrap `window`, whose framebuffer is `width` x `height` pixels
    pub const fn new(window: &'a W, width: u32, height: u32) -> Self {
        Self {
            window,
            extent: vk::Extent2D { width, height },
        }
    }
}

impl<W> WindowSurface for RawWindow<'_, W>
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    fn required_instance_extensions(&self) -> VulkanResult<Vec<CString>> {
        let names = ash_window::enumerate_required_extensions(self.window.raw_display_handle())
            .check("enumerate_required_extensions")?;
        Ok(names
            .iter()
            // SAFETY: ash_window returns pointers to static, NUL-terminated names.
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_owned())
            .collect())
    }

    fn create_surface(&self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.window.raw_display_handle(),
                self.window.raw_window_handle(),
                None,
            )
        }
        .map_err(|code| VulkanError::with_context(code, "vkCreateSurfaceKHR", "ash_window"))
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Owned presentation surface
pub struct Surface {
    loader: khr::Surface,
    handle: vk::SurfaceKHR,
}

impl Surface {
    /// Create the surface of `window`
    pub fn new(entry: &Entry, instance: &Instance, window: &dyn WindowSurface) -> VulkanResult<Self> {
        let handle = window.create_surface(entry, instance)?;
        log::debug!("Window surface created");
        Ok(Self {
            loader: khr::Surface::new(entry, instance),
            handle,
        })
    }

    /// Get the underlying surface handle
    pub const fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get the surface loader
    pub const fn loader(&self) -> &khr::Surface {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
