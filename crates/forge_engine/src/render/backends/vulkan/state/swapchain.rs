//! Swapchain lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Active --mark_stale / resize--> Stale
//!       Stale --recreate (non-zero extent)--> Active
//!       any --destroy--> Destroyed
//! ```
//!
//! A [`SwapChain`] is immutable: its extent and image count never change.
//! Any mismatch with the surface is handled by building a new one. Each
//! swapchain image owns a framebuffer, a depth attachment and the
//! render-finished semaphore presentation waits on.

use std::rc::Rc;

use ash::vk;

use super::sync::Semaphore;
use crate::render::backends::vulkan::device_api::{
    DeviceApi, ImageDesc, SwapchainDesc, SwapchainSupportDetails,
};
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::rendering::render_pass::DEPTH_FORMAT;
use crate::render::backends::vulkan::resources::managed::{ImageAllocation, ImageView, Managed};

/// Framebuffer wrapper with RAII cleanup
pub type Framebuffer<D> = Managed<D, vk::Framebuffer>;

/// Swapchain handle wrapper
pub type SwapchainHandle<D> = Managed<D, vk::SwapchainKHR>;

/// Lifecycle state of the managed swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    /// Settings chosen, no swapchain built yet
    Uninitialized,
    /// Matches the surface; frames may be drawn
    Active,
    /// Needs recreation before the next frame
    Stale,
    /// Released for good
    Destroyed,
}

/// Parameters picked from the surface support details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Minimum image count to request
    pub image_count: u32,
    /// Surface pre-transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    /// Whether the extent has no area (minimized window)
    pub const fn is_zero_sized(&self) -> bool {
        self.extent.width == 0 || self.extent.height == 0
    }

    fn desc(&self) -> SwapchainDesc {
        SwapchainDesc {
            surface_format: self.surface_format,
            present_mode: self.present_mode,
            extent: self.extent,
            image_count: self.image_count,
            pre_transform: self.pre_transform,
        }
    }
}

/// Pick format, present mode, extent and image count
///
/// - Format: `B8G8R8A8_SRGB` / `SRGB_NONLINEAR` when offered, else the first.
/// - Present mode: `MAILBOX` when preferred and offered, else `FIFO`.
/// - Extent: the surface's current extent, or `requested` clamped to the
///   surface limits when the surface leaves it to the swapchain.
/// - Image count: one more than the minimum, capped by the maximum.
pub fn choose_swapchain_settings(
    support: &SwapchainSupportDetails,
    requested: vk::Extent2D,
    prefer_mailbox: bool,
) -> VulkanResult<SwapchainSettings> {
    let surface_format = support
        .formats
        .iter()
        .copied()
        .find(|sf| {
            sf.format == vk::Format::B8G8R8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| support.formats.first().copied())
        .ok_or_else(|| VulkanError::invalid("surface reports no formats"))?;

    let present_mode = if prefer_mailbox && support.present_modes.contains(&vk::PresentModeKHR::MAILBOX)
    {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    };

    let caps = &support.capabilities;
    let extent = if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    };

    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        image_count = image_count.min(caps.max_image_count);
    }

    Ok(SwapchainSettings {
        surface_format,
        present_mode,
        extent,
        image_count,
        pre_transform: caps.current_transform,
    })
}

struct DepthAttachment<D: DeviceApi> {
    view: ImageView<D>,
    image: ImageAllocation<D>,
}

/// Presentable images with their per-image attachments
pub struct SwapChain<D: DeviceApi> {
    // Field order is destruction order: the reverse of creation.
    framebuffers: Vec<Framebuffer<D>>,
    render_finished: Vec<Semaphore<D>>,
    depth: Vec<DepthAttachment<D>>,
    views: Vec<ImageView<D>>,
    handle: SwapchainHandle<D>,
    images: Vec<vk::Image>,
    settings: SwapchainSettings,
}

impl<D: DeviceApi> SwapChain<D> {
    fn create(
        device: &Rc<D>,
        settings: SwapchainSettings,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<Self> {
        let (raw, images) = device.create_swapchain(&settings.desc())?;
        let handle = SwapchainHandle::new(device.clone(), raw);
        let format = settings.surface_format.format;

        let mut views = Vec::with_capacity(images.len());
        let mut depth = Vec::with_capacity(images.len());
        let mut render_finished = Vec::with_capacity(images.len());
        let mut framebuffers = Vec::with_capacity(images.len());
        for &image in &images {
            let view = ImageView::new(
                device.clone(),
                device.create_image_view(image, format, vk::ImageAspectFlags::COLOR)?,
            );
            let depth_image = ImageAllocation::new(
                device.clone(),
                device.create_image(&ImageDesc {
                    extent: settings.extent,
                    format: DEPTH_FORMAT,
                    usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                })?,
            );
            let depth_view = ImageView::new(
                device.clone(),
                device.create_image_view(
                    depth_image.get()?.handle,
                    DEPTH_FORMAT,
                    vk::ImageAspectFlags::DEPTH,
                )?,
            );
            let framebuffer = Framebuffer::new(
                device.clone(),
                device.create_framebuffer(
                    render_pass,
                    &[view.handle()?, depth_view.handle()?],
                    settings.extent,
                )?,
            );

            views.push(view);
            depth.push(DepthAttachment {
                view: depth_view,
                image: depth_image,
            });
            render_finished.push(Semaphore::create(device.clone())?);
            framebuffers.push(framebuffer);
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}",
            settings.extent.width,
            settings.extent.height,
            images.len(),
            settings.present_mode
        );
        Ok(Self {
            framebuffers,
            render_finished,
            depth,
            views,
            handle,
            images,
            settings,
        })
    }

    /// Image extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Color format of the images
    pub const fn format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    /// Raw swapchain handle
    pub fn handle(&self) -> VulkanResult<vk::SwapchainKHR> {
        self.handle.handle()
    }

    /// Framebuffer of image `index`
    pub fn framebuffer(&self, index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(index as usize)
            .ok_or_else(|| VulkanError::invalid(format!("no swapchain image {index}")))?
            .handle()
    }

    /// Semaphore signaled when rendering to image `index` finishes
    pub fn render_finished(&self, index: u32) -> VulkanResult<vk::Semaphore> {
        self.render_finished
            .get(index as usize)
            .ok_or_else(|| VulkanError::invalid(format!("no swapchain image {index}")))?
            .handle()
    }

    /// Release everything now, in reverse creation order
    pub fn destroy(&mut self) {
        self.framebuffers.iter_mut().for_each(Managed::destroy);
        self.render_finished.iter_mut().for_each(Managed::destroy);
        for attachment in &mut self.depth {
            attachment.view.destroy();
            attachment.image.destroy();
        }
        self.views.iter_mut().for_each(Managed::destroy);
        self.handle.destroy();
        self.framebuffers.clear();
        self.render_finished.clear();
        self.depth.clear();
        self.views.clear();
        self.images.clear();
    }
}

/// Owns the current swapchain and drives recreation
pub struct SwapchainManager<D: DeviceApi> {
    swapchain: Option<SwapChain<D>>,
    state: SwapchainState,
    settings: SwapchainSettings,
    requested_extent: vk::Extent2D,
    prefer_mailbox: bool,
    render_pass: vk::RenderPass,
    recreations: u64,
    device: Rc<D>,
}

impl<D: DeviceApi> SwapchainManager<D> {
    /// Query the surface and choose settings; nothing is built yet
    pub fn new(
        device: Rc<D>,
        requested_extent: vk::Extent2D,
        prefer_mailbox: bool,
    ) -> VulkanResult<Self> {
        let support = device.surface_support()?;
        let settings = choose_swapchain_settings(&support, requested_extent, prefer_mailbox)?;
        Ok(Self {
            swapchain: None,
            state: SwapchainState::Uninitialized,
            settings,
            requested_extent,
            prefer_mailbox,
            render_pass: vk::RenderPass::null(),
            recreations: 0,
            device,
        })
    }

    /// Color format the render pass must use
    pub const fn color_format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    /// Build the first swapchain against `render_pass`
    ///
    /// `render_pass` must outlive the manager. A zero-sized surface leaves
    /// the manager stale until a later [`SwapchainManager::recreate`].
    pub fn initialize(&mut self, render_pass: vk::RenderPass) -> VulkanResult<()> {
        if self.state != SwapchainState::Uninitialized {
            return Err(VulkanError::invalid(format!(
                "swapchain initialize in state {:?}",
                self.state
            )));
        }
        self.render_pass = render_pass;
        if self.settings.is_zero_sized() {
            self.state = SwapchainState::Stale;
            return Ok(());
        }
        self.swapchain = Some(SwapChain::create(&self.device, self.settings, render_pass)?);
        self.state = SwapchainState::Active;
        Ok(())
    }

    /// Flag the swapchain for recreation before the next frame
    pub fn mark_stale(&mut self) {
        if self.state == SwapchainState::Active {
            log::debug!("Swapchain marked stale");
            self.state = SwapchainState::Stale;
        }
    }

    /// Record a new window size and flag recreation
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.mark_stale();
    }

    /// Rebuild the swapchain for the current surface
    ///
    /// Waits for the device to go idle and releases the old swapchain
    /// before re-querying the surface. Returns `false` (staying stale) when
    /// the surface has no area.
    pub fn recreate(&mut self) -> VulkanResult<bool> {
        match self.state {
            SwapchainState::Destroyed | SwapchainState::Uninitialized => {
                return Err(VulkanError::invalid(format!(
                    "swapchain recreate in state {:?}",
                    self.state
                )));
            }
            SwapchainState::Active | SwapchainState::Stale => {}
        }

        if let Some(mut old) = self.swapchain.take() {
            self.device.wait_idle()?;
            old.destroy();
        }
        self.state = SwapchainState::Stale;

        let support = self.device.surface_support()?;
        let settings =
            choose_swapchain_settings(&support, self.requested_extent, self.prefer_mailbox)?;
        if settings.is_zero_sized() {
            log::debug!("Surface has zero extent; postponing swapchain recreation");
            return Ok(false);
        }
        if settings.surface_format.format != self.settings.surface_format.format {
            log::warn!(
                "Surface format changed from {:?} to {:?}; render pass kept",
                self.settings.surface_format.format,
                settings.surface_format.format
            );
        }

        self.swapchain = Some(SwapChain::create(&self.device, settings, self.render_pass)?);
        self.settings = settings;
        self.state = SwapchainState::Active;
        self.recreations += 1;
        Ok(true)
    }

    /// Release the swapchain for good
    pub fn destroy(&mut self) {
        if let Some(mut swapchain) = self.swapchain.take() {
            swapchain.destroy();
        }
        self.state = SwapchainState::Destroyed;
    }

    /// Current lifecycle state
    pub const fn state(&self) -> SwapchainState {
        self.state
    }

    /// Whether recreation is pending
    pub fn is_stale(&self) -> bool {
        self.state == SwapchainState::Stale
    }

    /// The active swapchain
    pub fn current(&self) -> VulkanResult<&SwapChain<D>> {
        match (&self.swapchain, self.state) {
            (Some(swapchain), SwapchainState::Active) => Ok(swapchain),
            (_, SwapchainState::Destroyed) => Err(VulkanError::AlreadyDestroyed {
                resource: "Swapchain",
            }),
            (_, state) => Err(VulkanError::invalid(format!(
                "no active swapchain (state {state:?})"
            ))),
        }
    }

    /// Extent of the active swapchain
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(SwapChain::extent)
    }

    /// Number of successful recreations
    pub const fn recreation_count(&self) -> u64 {
        self.recreations
    }
}
