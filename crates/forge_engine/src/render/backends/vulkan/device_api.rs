//! Device seam
//!
//! [`DeviceApi`] is the set of device-level operations the engine performs.
//! Every manager takes an `Rc<D: DeviceApi>` in its constructor instead of
//! reaching for a global device, so the same code drives the real
//! [`LogicalDevice`](super::initialization::LogicalDevice) and the in-memory
//! mock used by the tests.

use ash::vk;

use super::error::{AcquireOutcome, PresentOutcome, VulkanResult};
use super::rendering::commands::Command;
use super::rendering::vertex_layout::VertexLayout;
use crate::foundation::collections::RegistryIndex;

/// Buffer plus the allocator bookkeeping needed to free it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    /// Buffer handle
    pub handle: vk::Buffer,
    /// Allocator slot that backs the buffer
    pub allocation: RegistryIndex,
    /// Size in bytes
    pub size: vk::DeviceSize,
    /// Usage the buffer was created with
    pub usage: vk::BufferUsageFlags,
    /// Memory properties the allocation satisfies
    pub properties: vk::MemoryPropertyFlags,
}

impl RawBuffer {
    /// Whether the host can map this buffer directly
    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

/// Parameters of a 2D, single-mip device-local image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Pixel extent
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Intended usage
    pub usage: vk::ImageUsageFlags,
}

/// Image plus the allocator bookkeeping needed to free it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawImage {
    /// Image handle
    pub handle: vk::Image,
    /// Allocator slot that backs the image
    pub allocation: RegistryIndex,
    /// Pixel extent
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
}

/// Surface capabilities, formats and present modes for one device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (extent limits, image counts, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything needed to build a swapchain
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Minimum number of images requested
    pub image_count: u32,
    /// Surface pre-transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// One queue submission
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// Command buffer to execute
    pub command_buffer: vk::CommandBuffer,
    /// Semaphores waited before execution
    pub wait_semaphores: &'a [vk::Semaphore],
    /// Stage at which each wait semaphore is waited
    pub wait_stages: &'a [vk::PipelineStageFlags],
    /// Semaphores signaled on completion
    pub signal_semaphores: &'a [vk::Semaphore],
    /// Fence signaled on completion
    pub fence: vk::Fence,
}

/// Fixed-function and shader state of the forward pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    /// Render pass the pipeline is compatible with
    pub render_pass: vk::RenderPass,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Vertex shader module
    pub vertex_shader: vk::ShaderModule,
    /// Fragment shader module
    pub fragment_shader: vk::ShaderModule,
    /// Vertex input layout
    pub vertex_layout: &'a VertexLayout,
}

/// Resource referenced by a descriptor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Whole-range uniform buffer
    UniformBuffer {
        /// Buffer handle
        buffer: vk::Buffer,
        /// Bytes visible to the shader
        range: vk::DeviceSize,
    },
    /// Sampled image in `SHADER_READ_ONLY_OPTIMAL`
    CombinedImageSampler {
        /// Image view
        view: vk::ImageView,
        /// Sampler
        sampler: vk::Sampler,
    },
}

/// A single descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// Target set
    pub set: vk::DescriptorSet,
    /// Target binding
    pub binding: u32,
    /// Array element within the binding
    pub array_element: u32,
    /// Resource written
    pub resource: DescriptorResource,
}

/// Device objects released through [`DeviceApi::destroy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceObject {
    /// Image view
    ImageView(vk::ImageView),
    /// Sampler
    Sampler(vk::Sampler),
    /// Semaphore
    Semaphore(vk::Semaphore),
    /// Fence
    Fence(vk::Fence),
    /// Command pool (frees its command buffers)
    CommandPool(vk::CommandPool),
    /// Framebuffer
    Framebuffer(vk::Framebuffer),
    /// Render pass
    RenderPass(vk::RenderPass),
    /// Shader module
    ShaderModule(vk::ShaderModule),
    /// Pipeline layout
    PipelineLayout(vk::PipelineLayout),
    /// Pipeline
    Pipeline(vk::Pipeline),
    /// Descriptor set layout
    DescriptorSetLayout(vk::DescriptorSetLayout),
    /// Descriptor pool (frees its sets)
    DescriptorPool(vk::DescriptorPool),
    /// Swapchain
    Swapchain(vk::SwapchainKHR),
}

/// Device-level operations used by the engine
///
/// Blocking waits ([`DeviceApi::wait_for_fence`], [`DeviceApi::wait_idle`])
/// have no timeout. All methods take `&self`; the engine drives them from a
/// single thread.
pub trait DeviceApi {
    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> VulkanResult<()>;

    /// Allocate a buffer with memory satisfying `properties`
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<RawBuffer>;

    /// Release a buffer through the allocator that created it
    fn free_buffer(&self, buffer: RawBuffer);

    /// Copy `data` into a host-visible buffer at `offset`
    fn write_mapped(&self, buffer: &RawBuffer, offset: vk::DeviceSize, data: &[u8])
        -> VulkanResult<()>;

    /// Read `len` bytes from a host-visible buffer at `offset`
    fn read_mapped(&self, buffer: &RawBuffer, offset: vk::DeviceSize, len: usize)
        -> VulkanResult<Vec<u8>>;

    /// Allocate a device-local 2D image
    fn create_image(&self, desc: &ImageDesc) -> VulkanResult<RawImage>;

    /// Release an image through the allocator that created it
    fn free_image(&self, image: RawImage);

    /// Create a 2D view over `image`
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView>;

    /// Create the linear, repeating texture sampler
    fn create_sampler(&self) -> VulkanResult<vk::Sampler>;

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;

    /// Block until `fence` is signaled
    fn wait_for_fence(&self, fence: vk::Fence) -> VulkanResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;

    /// Create a resettable command pool on the graphics family
    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool>;

    /// Allocate primary command buffers
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>>;

    /// Return command buffers to their pool
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    /// Begin recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time: bool)
        -> VulkanResult<()>;

    /// End recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Reset a command buffer to the initial state
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Record one command
    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command);

    /// Submit to the graphics queue
    fn submit(&self, submission: &Submission<'_>) -> VulkanResult<()>;

    /// Query surface support for the selected device
    fn surface_support(&self) -> VulkanResult<SwapchainSupportDetails>;

    /// Create a swapchain and return it with its images
    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
    ) -> VulkanResult<(vk::SwapchainKHR, Vec<vk::Image>)>;

    /// Acquire the next presentable image, signaling `semaphore`
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome>;

    /// Queue `image_index` for presentation after `wait_semaphore`
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome>;

    /// Create the forward render pass (cleared color + depth)
    fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<vk::RenderPass>;

    /// Create a framebuffer over `attachments`
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer>;

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule>;

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout>;

    /// Create a graphics pipeline
    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline>;

    /// Create a descriptor set layout; `binding_flags` is parallel to `bindings`
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout>;

    /// Create a descriptor pool
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<vk::DescriptorPool>;

    /// Allocate one set; `variable_count` sizes a variable-count last binding
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> VulkanResult<vk::DescriptorSet>;

    /// Apply one descriptor write
    fn write_descriptor(&self, write: &DescriptorWrite);

    /// Destroy a device object
    fn destroy(&self, object: DeviceObject);
}
