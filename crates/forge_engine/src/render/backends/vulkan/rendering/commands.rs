//! Command buffer management
//!
//! Commands are described by the [`Command`] enum and recorded through a
//! [`CommandRecorder`] bound to one command buffer.

use ash::vk;

use crate::render::backends::vulkan::device_api::DeviceApi;
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::resources::managed::Managed;

/// Resettable command pool on the graphics queue family
pub type CommandPool<D> = Managed<D, vk::CommandPool>;

impl<D: DeviceApi> CommandPool<D> {
    /// Create a new command pool
    pub fn create(device: std::rc::Rc<D>) -> VulkanResult<Self> {
        let pool = device.create_command_pool()?;
        Ok(Self::new(device, pool))
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let pool = *self.get()?;
        self.device().allocate_command_buffers(pool, count)
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) -> VulkanResult<()> {
        let pool = *self.get()?;
        self.device().free_command_buffers(pool, buffers);
        Ok(())
    }
}

/// Layout transition expressed as a pipeline barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image being transitioned
    pub image: vk::Image,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Accesses made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
    /// Stages waited on
    pub src_stage: vk::PipelineStageFlags,
    /// Stages blocked
    pub dst_stage: vk::PipelineStageFlags,
    /// Aspect of the image covered
    pub aspect: vk::ImageAspectFlags,
}

impl ImageBarrier {
    /// Barrier for a color-image transition the upload path knows about
    ///
    /// Only `UNDEFINED -> TRANSFER_DST_OPTIMAL` and
    /// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL` are supported.
    pub fn for_transition(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<Self> {
        let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            (from, to) => return Err(VulkanError::UnsupportedTransition { from, to }),
        };

        Ok(Self {
            image,
            old_layout,
            new_layout,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
            aspect: vk::ImageAspectFlags::COLOR,
        })
    }
}

/// A recordable command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Copy `size` bytes from the start of `src` to the start of `dst`
    CopyBuffer {
        /// Source buffer
        src: vk::Buffer,
        /// Destination buffer
        dst: vk::Buffer,
        /// Bytes copied
        size: vk::DeviceSize,
    },
    /// Copy tightly packed texels into a `TRANSFER_DST_OPTIMAL` image
    CopyBufferToImage {
        /// Source buffer
        src: vk::Buffer,
        /// Destination image
        image: vk::Image,
        /// Image extent
        extent: vk::Extent2D,
    },
    /// Layout transition
    ImageBarrier(ImageBarrier),
    /// Begin the render pass, clearing color and depth
    BeginRenderPass {
        /// Render pass
        render_pass: vk::RenderPass,
        /// Target framebuffer
        framebuffer: vk::Framebuffer,
        /// Render area
        extent: vk::Extent2D,
        /// Color clear value
        clear_color: [f32; 4],
    },
    /// End the render pass
    EndRenderPass,
    /// Bind a graphics pipeline
    BindPipeline(vk::Pipeline),
    /// Set viewport and scissor to cover `extent`
    SetViewportScissor(vk::Extent2D),
    /// Bind descriptor sets starting at set 0
    BindDescriptorSets {
        /// Pipeline layout
        layout: vk::PipelineLayout,
        /// Sets, in set-index order
        sets: Vec<vk::DescriptorSet>,
    },
    /// Update push constants at offset 0
    PushConstants {
        /// Pipeline layout
        layout: vk::PipelineLayout,
        /// Stages the range is visible to
        stages: vk::ShaderStageFlags,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// Bind a vertex buffer to binding 0
    BindVertexBuffer(vk::Buffer),
    /// Bind a `u32` index buffer
    BindIndexBuffer(vk::Buffer),
    /// Indexed draw of one instance
    DrawIndexed {
        /// Number of indices
        index_count: u32,
    },
}

/// Records commands into one command buffer
pub struct CommandRecorder<'a, D: DeviceApi> {
    device: &'a D,
    command_buffer: vk::CommandBuffer,
}

impl<'a, D: DeviceApi> CommandRecorder<'a, D> {
    /// Bind a recorder to a command buffer in the recording state
    pub const fn new(device: &'a D, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
        }
    }

    /// Command buffer being recorded
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Record an arbitrary command
    pub fn record(&self, command: &Command) {
        self.device.record(self.command_buffer, command);
    }

    /// Copy between buffers
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        self.record(&Command::CopyBuffer { src, dst, size });
    }

    /// Copy a buffer into an image
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        self.record(&Command::CopyBufferToImage { src, image, extent });
    }

    /// Transition an image between layouts
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let barrier = ImageBarrier::for_transition(image, old_layout, new_layout)?;
        self.record(&Command::ImageBarrier(barrier));
        Ok(())
    }

    /// Begin a render pass
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        self.record(&Command::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
            clear_color,
        });
    }

    /// End the current render pass
    pub fn end_render_pass(&self) {
        self.record(&Command::EndRenderPass);
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(&Command::BindPipeline(pipeline));
    }

    /// Set dynamic viewport and scissor
    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        self.record(&Command::SetViewportScissor(extent));
    }

    /// Bind descriptor sets
    pub fn bind_descriptor_sets(&self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        self.record(&Command::BindDescriptorSets {
            layout,
            sets: sets.to_vec(),
        });
    }

    /// Push constants
    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.record(&Command::PushConstants {
            layout,
            stages,
            data: data.to_vec(),
        });
    }

    /// Bind vertex and index buffers
    pub fn bind_mesh_buffers(&self, vertex_buffer: vk::Buffer, index_buffer: vk::Buffer) {
        self.record(&Command::BindVertexBuffer(vertex_buffer));
        self.record(&Command::BindIndexBuffer(index_buffer));
    }

    /// Indexed draw
    pub fn draw_indexed(&self, index_count: u32) {
        self.record(&Command::DrawIndexed { index_count });
    }
}
