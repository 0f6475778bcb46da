//! In-memory device used by the unit and scenario tests
//!
//! [`MockDevice`] implements [`DeviceApi`] without a GPU. It hands out unique
//! handles, tracks which objects are alive (counting double destruction),
//! simulates host-visible and device-local buffer memory so copies can be
//! read back byte for byte, executes recorded copies and barriers at submit
//! time, signals fences, and lets a test change the surface extent or force
//! out-of-date acquires.

use std::cell::RefCell;
use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;

use crate::foundation::collections::Registry;
use crate::render::backends::vulkan::device_api::{
    DescriptorWrite, DeviceApi, DeviceObject, ImageDesc, PipelineDesc, RawBuffer, RawImage,
    Submission, SwapchainDesc, SwapchainSupportDetails,
};
use crate::render::backends::vulkan::error::{
    AcquireOutcome, PresentOutcome, VulkanError, VulkanResult,
};
use crate::render::backends::vulkan::rendering::commands::Command;

/// Observable device calls, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// `wait_for_fence` on a signaled fence
    FenceWait(vk::Fence),
    /// `reset_fence`
    FenceReset(vk::Fence),
    /// `acquire_next_image`; `None` when out of date
    Acquire(Option<u32>),
    /// `submit`
    Submit {
        /// Submitted command buffer
        command_buffer: vk::CommandBuffer,
        /// Fence signaled on completion
        fence: vk::Fence,
    },
    /// `present`
    Present(u32),
    /// `wait_idle`
    WaitIdle,
    /// `create_swapchain`
    SwapchainCreated {
        /// Extent requested
        extent: vk::Extent2D,
        /// Images returned
        image_count: u32,
    },
}

struct MockSwapchain {
    extent: vk::Extent2D,
    image_count: u32,
    next_image: u32,
}

struct MockState {
    next_handle: u64,
    live: HashMap<u64, &'static str>,
    double_destroys: usize,
    allocations: Registry<u64>,
    buffer_memory: HashMap<vk::Buffer, Vec<u8>>,
    image_memory: HashMap<vk::Image, Vec<u8>>,
    image_layouts: HashMap<vk::Image, vk::ImageLayout>,
    fences: HashMap<vk::Fence, bool>,
    recording: HashMap<vk::CommandBuffer, Vec<Command>>,
    submitted: Vec<Vec<Command>>,
    swapchains: HashMap<vk::SwapchainKHR, MockSwapchain>,
    surface_extent: vk::Extent2D,
    forced_out_of_date: u32,
    forced_suboptimal: u32,
    descriptor_writes: Vec<DescriptorWrite>,
    variable_counts: Vec<Option<u32>>,
    events: Vec<MockEvent>,
}

impl MockState {
    fn issue(&mut self, kind: &'static str) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.insert(raw, kind);
        raw
    }

    fn release(&mut self, raw: u64) {
        if self.live.remove(&raw).is_none() {
            self.double_destroys += 1;
        }
    }

    fn execute(&mut self, command: &Command) -> VulkanResult<()> {
        match command {
            Command::CopyBuffer { src, dst, size } => {
                let len = usize::try_from(*size).map_err(|_| VulkanError::invalid("copy size"))?;
                let bytes = self
                    .buffer_memory
                    .get(src)
                    .and_then(|memory| memory.get(..len))
                    .ok_or_else(|| VulkanError::invalid("copy source out of range"))?
                    .to_vec();
                self.buffer_memory
                    .get_mut(dst)
                    .and_then(|memory| memory.get_mut(..len))
                    .ok_or_else(|| VulkanError::invalid("copy destination out of range"))?
                    .copy_from_slice(&bytes);
            }
            Command::CopyBufferToImage { src, image, .. } => {
                if self.image_layouts.get(image) != Some(&vk::ImageLayout::TRANSFER_DST_OPTIMAL) {
                    return Err(VulkanError::invalid(
                        "image copied while not in TRANSFER_DST_OPTIMAL",
                    ));
                }
                let bytes = self
                    .buffer_memory
                    .get(src)
                    .cloned()
                    .ok_or_else(|| VulkanError::invalid("unknown copy source"))?;
                self.image_memory.insert(*image, bytes);
            }
            Command::ImageBarrier(barrier) => {
                let current = self
                    .image_layouts
                    .get(&barrier.image)
                    .copied()
                    .unwrap_or(vk::ImageLayout::UNDEFINED);
                if current != barrier.old_layout && barrier.old_layout != vk::ImageLayout::UNDEFINED
                {
                    return Err(VulkanError::invalid("barrier old layout mismatch"));
                }
                self.image_layouts.insert(barrier.image, barrier.new_layout);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Scriptable [`DeviceApi`] implementation
pub struct MockDevice {
    state: RefCell<MockState>,
}

impl MockDevice {
    /// Images every mock swapchain hands out
    pub const SWAPCHAIN_IMAGES: u32 = 3;

    /// Device with an 800x600 surface
    pub fn new() -> Self {
        Self::with_extent(800, 600)
    }

    /// Device with the given surface extent
    pub fn with_extent(width: u32, height: u32) -> Self {
        Self {
            state: RefCell::new(MockState {
                next_handle: 1,
                live: HashMap::new(),
                double_destroys: 0,
                allocations: Registry::new(),
                buffer_memory: HashMap::new(),
                image_memory: HashMap::new(),
                image_layouts: HashMap::new(),
                fences: HashMap::new(),
                recording: HashMap::new(),
                submitted: Vec::new(),
                swapchains: HashMap::new(),
                surface_extent: vk::Extent2D { width, height },
                forced_out_of_date: 0,
                forced_suboptimal: 0,
                descriptor_writes: Vec::new(),
                variable_counts: Vec::new(),
                events: Vec::new(),
            }),
        }
    }

    /// Simulate a window resize
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().surface_extent = vk::Extent2D { width, height };
    }

    /// Make the next `count` acquires report out-of-date
    pub fn force_out_of_date(&self, count: u32) {
        self.state.borrow_mut().forced_out_of_date = count;
    }

    /// Make the next `count` successful acquires report suboptimal
    pub fn force_suboptimal(&self, count: u32) {
        self.state.borrow_mut().forced_suboptimal = count;
    }

    /// Number of objects created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Number of live objects of one kind
    pub fn live_of_kind(&self, kind: &str) -> usize {
        self.state
            .borrow()
            .live
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    /// Destroy calls on objects that were not alive
    pub fn double_destroy_count(&self) -> usize {
        self.state.borrow().double_destroys
    }

    /// Event log
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.borrow().events.clone()
    }

    /// Clear the event log
    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Commands of every submission, in submit order
    pub fn submitted(&self) -> Vec<Vec<Command>> {
        self.state.borrow().submitted.clone()
    }

    /// Simulated contents of a buffer
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.state.borrow().buffer_memory.get(&buffer).cloned()
    }

    /// Texels copied into an image
    pub fn image_contents(&self, image: vk::Image) -> Option<Vec<u8>> {
        self.state.borrow().image_memory.get(&image).cloned()
    }

    /// Current layout of an image
    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.state.borrow().image_layouts.get(&image).copied()
    }

    /// Every descriptor write applied so far
    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.state.borrow().descriptor_writes.clone()
    }

    /// Variable descriptor counts passed to each set allocation
    pub fn variable_counts(&self) -> Vec<Option<u32>> {
        self.state.borrow().variable_counts.clone()
    }

    fn create<T: Handle>(&self, kind: &'static str) -> T {
        T::from_raw(self.state.borrow_mut().issue(kind))
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceApi for MockDevice {
    fn wait_idle(&self) -> VulkanResult<()> {
        self.state.borrow_mut().events.push(MockEvent::WaitIdle);
        Ok(())
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<RawBuffer> {
        let len = usize::try_from(size).map_err(|_| VulkanError::invalid("buffer too large"))?;
        let mut state = self.state.borrow_mut();
        let raw = state.issue("Buffer");
        let handle = vk::Buffer::from_raw(raw);
        let allocation = state.allocations.add(raw);
        state.buffer_memory.insert(handle, vec![0; len]);
        Ok(RawBuffer {
            handle,
            allocation,
            size,
            usage,
            properties,
        })
    }

    fn free_buffer(&self, buffer: RawBuffer) {
        let mut state = self.state.borrow_mut();
        state.buffer_memory.remove(&buffer.handle);
        state.allocations.remove(buffer.allocation);
        state.release(buffer.handle.as_raw());
    }

    fn write_mapped(
        &self,
        buffer: &RawBuffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> VulkanResult<()> {
        if !buffer.is_host_visible() {
            return Err(VulkanError::from_result(
                vk::Result::ERROR_MEMORY_MAP_FAILED,
                "vmaMapMemory",
            ));
        }
        let offset = usize::try_from(offset).map_err(|_| VulkanError::invalid("offset"))?;
        let mut state = self.state.borrow_mut();
        let memory = state
            .buffer_memory
            .get_mut(&buffer.handle)
            .ok_or_else(|| VulkanError::invalid("write to freed buffer"))?;
        memory
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| VulkanError::invalid("write out of range"))?
            .copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(
        &self,
        buffer: &RawBuffer,
        offset: vk::DeviceSize,
        len: usize,
    ) -> VulkanResult<Vec<u8>> {
        if !buffer.is_host_visible() {
            return Err(VulkanError::from_result(
                vk::Result::ERROR_MEMORY_MAP_FAILED,
                "vmaMapMemory",
            ));
        }
        let offset = usize::try_from(offset).map_err(|_| VulkanError::invalid("offset"))?;
        let state = self.state.borrow();
        state
            .buffer_memory
            .get(&buffer.handle)
            .and_then(|memory| memory.get(offset..offset + len))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| VulkanError::invalid("read out of range"))
    }

    fn create_image(&self, desc: &ImageDesc) -> VulkanResult<RawImage> {
        let mut state = self.state.borrow_mut();
        let raw = state.issue("Image");
        let allocation = state.allocations.add(raw);
        Ok(RawImage {
            handle: vk::Image::from_raw(raw),
            allocation,
            extent: desc.extent,
            format: desc.format,
        })
    }

    fn free_image(&self, image: RawImage) {
        let mut state = self.state.borrow_mut();
        state.image_memory.remove(&image.handle);
        state.image_layouts.remove(&image.handle);
        state.allocations.remove(image.allocation);
        state.release(image.handle.as_raw());
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        Ok(self.create("Image view"))
    }

    fn create_sampler(&self) -> VulkanResult<vk::Sampler> {
        Ok(self.create("Sampler"))
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        Ok(self.create("Semaphore"))
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let fence: vk::Fence = self.create("Fence");
        self.state.borrow_mut().fences.insert(fence, signaled);
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fences.get(&fence) != Some(&true) {
            return Err(VulkanError::with_context(
                vk::Result::TIMEOUT,
                "vkWaitForFences",
                "fence would never signal",
            ));
        }
        state.events.push(MockEvent::FenceWait(fence));
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        state.fences.insert(fence, false);
        state.events.push(MockEvent::FenceReset(fence));
        Ok(())
    }

    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        Ok(self.create("Command pool"))
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.borrow_mut();
        for buffer in buffers {
            state.recording.remove(buffer);
        }
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        _one_time: bool,
    ) -> VulkanResult<()> {
        self.state
            .borrow_mut()
            .recording
            .insert(command_buffer, Vec::new());
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        if self.state.borrow().recording.contains_key(&command_buffer) {
            Ok(())
        } else {
            Err(VulkanError::invalid("end on a command buffer never begun"))
        }
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.state.borrow_mut().recording.remove(&command_buffer);
        Ok(())
    }

    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command) {
        self.state
            .borrow_mut()
            .recording
            .entry(command_buffer)
            .or_default()
            .push(command.clone());
    }

    fn submit(&self, submission: &Submission<'_>) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        if submission.fence != vk::Fence::null() && state.fences.get(&submission.fence) != Some(&false)
        {
            return Err(VulkanError::with_context(
                vk::Result::ERROR_VALIDATION_FAILED_EXT,
                "vkQueueSubmit",
                "fence must be unsignaled",
            ));
        }
        let commands = state
            .recording
            .get(&submission.command_buffer)
            .cloned()
            .unwrap_or_default();
        for command in &commands {
            state.execute(command)?;
        }
        state.submitted.push(commands);
        if submission.fence != vk::Fence::null() {
            state.fences.insert(submission.fence, true);
        }
        state.events.push(MockEvent::Submit {
            command_buffer: submission.command_buffer,
            fence: submission.fence,
        });
        Ok(())
    }

    fn surface_support(&self) -> VulkanResult<SwapchainSupportDetails> {
        let extent = self.state.borrow().surface_extent;
        Ok(SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: Self::SWAPCHAIN_IMAGES - 1,
                max_image_count: Self::SWAPCHAIN_IMAGES,
                current_extent: extent,
                min_image_extent: vk::Extent2D {
                    width: 0,
                    height: 0,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
    ) -> VulkanResult<(vk::SwapchainKHR, Vec<vk::Image>)> {
        let mut state = self.state.borrow_mut();
        let swapchain = vk::SwapchainKHR::from_raw(state.issue("Swapchain"));
        let images = (0..desc.image_count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect();
        state.swapchains.insert(
            swapchain,
            MockSwapchain {
                extent: desc.extent,
                image_count: desc.image_count,
                next_image: 0,
            },
        );
        state.events.push(MockEvent::SwapchainCreated {
            extent: desc.extent,
            image_count: desc.image_count,
        });
        Ok((swapchain, images))
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let surface_extent = state.surface_extent;
        let forced = state.forced_out_of_date > 0;
        if forced {
            state.forced_out_of_date -= 1;
        }
        let chain = state.swapchains.get_mut(&swapchain).ok_or_else(|| {
            VulkanError::from_result(vk::Result::ERROR_SURFACE_LOST_KHR, "vkAcquireNextImageKHR")
        })?;
        if forced || chain.extent != surface_extent {
            state.events.push(MockEvent::Acquire(None));
            return Ok(AcquireOutcome::OutOfDate);
        }
        let index = chain.next_image % chain.image_count;
        chain.next_image += 1;
        state.events.push(MockEvent::Acquire(Some(index)));
        if state.forced_suboptimal > 0 {
            state.forced_suboptimal -= 1;
            return Ok(AcquireOutcome::Suboptimal(index));
        }
        Ok(AcquireOutcome::Acquired(index))
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let mut state = self.state.borrow_mut();
        let surface_extent = state.surface_extent;
        let extent = state
            .swapchains
            .get(&swapchain)
            .map(|chain| chain.extent)
            .ok_or_else(|| {
                VulkanError::from_result(vk::Result::ERROR_SURFACE_LOST_KHR, "vkQueuePresentKHR")
            })?;
        state.events.push(MockEvent::Present(image_index));
        if extent == surface_extent {
            Ok(PresentOutcome::Presented)
        } else {
            Ok(PresentOutcome::OutOfDate)
        }
    }

    fn create_render_pass(
        &self,
        _color_format: vk::Format,
        _depth_format: vk::Format,
    ) -> VulkanResult<vk::RenderPass> {
        Ok(self.create("Render pass"))
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer> {
        Ok(self.create("Framebuffer"))
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        if code.is_empty() {
            return Err(VulkanError::from_result(
                vk::Result::ERROR_INVALID_SHADER_NV,
                "vkCreateShaderModule",
            ));
        }
        Ok(self.create("Shader module"))
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout> {
        Ok(self.create("Pipeline layout"))
    }

    fn create_graphics_pipeline(&self, _desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        Ok(self.create("Pipeline"))
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding],
        _binding_flags: &[vk::DescriptorBindingFlags],
        _flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        Ok(self.create("Descriptor set layout"))
    }

    fn create_descriptor_pool(
        &self,
        _max_sets: u32,
        _pool_sizes: &[vk::DescriptorPoolSize],
        _flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<vk::DescriptorPool> {
        Ok(self.create("Descriptor pool"))
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> VulkanResult<vk::DescriptorSet> {
        let mut state = self.state.borrow_mut();
        state.variable_counts.push(variable_count);
        let raw = state.next_handle;
        state.next_handle += 1;
        Ok(vk::DescriptorSet::from_raw(raw))
    }

    fn write_descriptor(&self, write: &DescriptorWrite) {
        self.state.borrow_mut().descriptor_writes.push(*write);
    }

    fn destroy(&self, object: DeviceObject) {
        let raw = match object {
            DeviceObject::ImageView(h) => h.as_raw(),
            DeviceObject::Sampler(h) => h.as_raw(),
            DeviceObject::Semaphore(h) => h.as_raw(),
            DeviceObject::Fence(h) => {
                self.state.borrow_mut().fences.remove(&h);
                h.as_raw()
            }
            DeviceObject::CommandPool(h) => h.as_raw(),
            DeviceObject::Framebuffer(h) => h.as_raw(),
            DeviceObject::RenderPass(h) => h.as_raw(),
            DeviceObject::ShaderModule(h) => h.as_raw(),
            DeviceObject::PipelineLayout(h) => h.as_raw(),
            DeviceObject::Pipeline(h) => h.as_raw(),
            DeviceObject::DescriptorSetLayout(h) => h.as_raw(),
            DeviceObject::DescriptorPool(h) => h.as_raw(),
            DeviceObject::Swapchain(h) => {
                self.state.borrow_mut().swapchains.remove(&h);
                h.as_raw()
            }
        };
        self.state.borrow_mut().release(raw);
    }
}
