//! Window management using GLFW
//!
//! Provides the window and event pump for the demo and hosts the renderer by
//! implementing [`WindowSurface`] through GLFW's own Vulkan helpers.

use std::ffi::CString;

use ash::{vk, Entry, Instance};
use forge_engine::render::{VulkanError, VulkanResult, WindowSurface};
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(#[from] glfw::InitError),

    #[error("Window creation failed")]
    CreationFailed,
}

pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window with its event queue
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)?;

        // No OpenGL context, Vulkan owns presentation
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Block until at least one event arrives
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Drain the events gathered by the last poll
    pub fn flush_events(&self) -> Vec<glfw::WindowEvent> {
        glfw::flush_messages(&self.events)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (
            u32::try_from(width).unwrap_or(0),
            u32::try_from(height).unwrap_or(0),
        )
    }

    /// Seconds since GLFW was initialized
    pub fn time(&self) -> f64 {
        self.glfw.get_time()
    }
}

impl WindowSurface for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<CString>> {
        let names = self
            .glfw
            .get_required_instance_extensions()
            .ok_or_else(|| VulkanError::Loader("GLFW reports no Vulkan support".to_string()))?;
        names
            .into_iter()
            .map(|name| {
                CString::new(name)
                    .map_err(|e| VulkanError::invalid(format!("bad extension name: {e}")))
            })
            .collect()
    }

    fn create_surface(&self, _entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result =
            self.window
                .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::with_context(
                result,
                "glfwCreateWindowSurface",
                "glfw",
            ))
        }
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.framebuffer_size();
        vk::Extent2D { width, height }
    }
}
