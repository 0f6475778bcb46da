//! Logical device
//!
//! [`LogicalDevice`] owns the Vulkan device, its graphics and present
//! queues, the swapchain loader and the memory allocator, and implements
//! [`DeviceApi`] on top of them. Descriptor indexing (Vulkan 1.2) is
//! required for the bindless texture array.

use std::ffi::CStr;
use std::mem::ManuallyDrop;

use ash::extensions::khr;
use ash::{vk, Device};

use super::allocator::GpuAllocator;
use super::instance::VulkanInstance;
use super::physical_device::{
    query_swapchain_support, required_device_extensions, supports_bindless, vulkan12_features,
    PhysicalDeviceSurfaceInfo,
};
use super::surface::Surface;
use crate::render::backends::vulkan::device_api::{
    DescriptorResource, DescriptorWrite, DeviceApi, DeviceObject, ImageDesc, PipelineDesc,
    RawBuffer, RawImage, Submission, SwapchainDesc, SwapchainSupportDetails,
};
use crate::render::backends::vulkan::error::{
    AcquireOutcome, PresentOutcome, VkCheck, VulkanError, VulkanResult,
};
use crate::render::backends::vulkan::rendering::commands::{Command, ImageBarrier};

const SHADER_ENTRY: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    allocator: ManuallyDrop<GpuAllocator>,
    swapchain_loader: khr::Swapchain,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
    max_anisotropy: Option<f32>,
    device: Device,
}

impl LogicalDevice {
    /// Create the device, its queues and the allocator
    ///
    /// `surface` must outlive the device.
    pub fn new(
        instance: &VulkanInstance,
        surface: &Surface,
        info: &PhysicalDeviceSurfaceInfo,
    ) -> VulkanResult<Self> {
        let raw_instance = instance.instance();

        // Also reached for devices picked outside the selector
        let (base_features, indexing) = vulkan12_features(raw_instance, info.device);
        if !supports_bindless(&indexing) {
            return Err(VulkanError::with_context(
                vk::Result::ERROR_FEATURE_NOT_PRESENT,
                "vkCreateDevice",
                format!("{} lacks descriptor indexing", info.name),
            ));
        }

        let mut families = vec![info.graphics_family];
        if !info.shares_queue_family() {
            families.push(info.present_family);
        }
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const std::ffi::c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let anisotropy = base_features.sampler_anisotropy == vk::TRUE;
        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(anisotropy);
        let mut enabled_indexing = vk::PhysicalDeviceVulkan12Features::builder()
            .descriptor_indexing(true)
            .shader_sampled_image_array_non_uniform_indexing(
                indexing.shader_sampled_image_array_non_uniform_indexing == vk::TRUE,
            )
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_variable_descriptor_count(true)
            .runtime_descriptor_array(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut enabled_indexing);
        let device = unsafe { raw_instance.create_device(info.device, &create_info, None) }
            .check("vkCreateDevice")?;

        let allocator = match GpuAllocator::new(raw_instance, &device, info.device) {
            Ok(allocator) => allocator,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(err);
            }
        };

        let max_anisotropy = anisotropy.then(|| {
            let properties = unsafe { raw_instance.get_physical_device_properties(info.device) };
            properties.limits.max_sampler_anisotropy
        });

        log::debug!(
            "Logical device created (graphics family {}, present family {})",
            info.graphics_family,
            info.present_family
        );
        Ok(Self {
            allocator: ManuallyDrop::new(allocator),
            swapchain_loader: khr::Swapchain::new(raw_instance, &device),
            surface_loader: surface.loader().clone(),
            surface: surface.handle(),
            physical_device: info.device,
            graphics_queue: unsafe { device.get_device_queue(info.graphics_family, 0) },
            present_queue: unsafe { device.get_device_queue(info.present_family, 0) },
            graphics_family: info.graphics_family,
            present_family: info.present_family,
            max_anisotropy,
            device,
        })
    }

    /// Raw device handle and function table
    pub const fn raw(&self) -> &Device {
        &self.device
    }

    /// Graphics queue family index
    pub const fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Number of live buffer and image allocations
    pub fn live_allocations(&self) -> usize {
        self.allocator.live_allocations()
    }

    fn record_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(barrier.src_access)
            .dst_access_mask(barrier.dst_access)
            .build();
        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
    }
}

impl DeviceApi for LogicalDevice {
    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<RawBuffer> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (handle, allocation) = self.allocator.create_buffer(&info, properties)?;
        Ok(RawBuffer {
            handle,
            allocation,
            size,
            usage,
            properties,
        })
    }

    fn free_buffer(&self, buffer: RawBuffer) {
        self.allocator.destroy_buffer(buffer.handle, buffer.allocation);
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
        if offset + data.len() as vk::DeviceSize > buffer.size {
            return Err(VulkanError::invalid("mapped write past the end of the buffer"));
        }
        let offset = usize::try_from(offset).map_err(|_| VulkanError::invalid("offset"))?;
        self.allocator.write(buffer.allocation, offset, data)
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
        if offset + len as vk::DeviceSize > buffer.size {
            return Err(VulkanError::invalid("mapped read past the end of the buffer"));
        }
        let offset = usize::try_from(offset).map_err(|_| VulkanError::invalid("offset"))?;
        self.allocator.read(buffer.allocation, offset, len)
    }

    fn create_image(&self, desc: &ImageDesc) -> VulkanResult<RawImage> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (handle, allocation) = self.allocator.create_image(&info)?;
        Ok(RawImage {
            handle,
            allocation,
            extent: desc.extent,
            format: desc.format,
        })
    }

    fn free_image(&self, image: RawImage) {
        self.allocator.destroy_image(image.handle, image.allocation);
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&info, None) }.check("vkCreateImageView")
    }

    fn create_sampler(&self) -> VulkanResult<vk::Sampler> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(self.max_anisotropy.is_some())
            .max_anisotropy(self.max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);
        unsafe { self.device.create_sampler(&info, None) }.check("vkCreateSampler")
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&info, None) }.check("vkCreateSemaphore")
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, None) }.check("vkCreateFence")
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }.check("vkWaitForFences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.check("vkResetFences")
    }

    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.graphics_family);
        unsafe { self.device.create_command_pool(&info, None) }.check("vkCreateCommandPool")
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info) }.check("vkAllocateCommandBuffers")
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) };
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        one_time: bool,
    ) -> VulkanResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(command_buffer, &info) }
            .check("vkBeginCommandBuffer")
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }.check("vkEndCommandBuffer")
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .check("vkResetCommandBuffer")
    }

    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command) {
        let cb = command_buffer;
        unsafe {
            match command {
                Command::CopyBuffer { src, dst, size } => {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: *size,
                    };
                    self.device.cmd_copy_buffer(cb, *src, *dst, &[region]);
                }
                Command::CopyBufferToImage { src, image, extent } => {
                    let region = vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                        image_extent: vk::Extent3D {
                            width: extent.width,
                            height: extent.height,
                            depth: 1,
                        },
                    };
                    self.device.cmd_copy_buffer_to_image(
                        cb,
                        *src,
                        *image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                Command::ImageBarrier(barrier) => self.record_barrier(cb, barrier),
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                    clear_color,
                } => {
                    let clear_values = [
                        vk::ClearValue {
                            color: vk::ClearColorValue {
                                float32: *clear_color,
                            },
                        },
                        vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: 1.0,
                                stencil: 0,
                            },
                        },
                    ];
                    let info = vk::RenderPassBeginInfo::builder()
                        .render_pass(*render_pass)
                        .framebuffer(*framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent: *extent,
                        })
                        .clear_values(&clear_values);
                    self.device
                        .cmd_begin_render_pass(cb, &info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => self.device.cmd_end_render_pass(cb),
                Command::BindPipeline(pipeline) => {
                    self.device
                        .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, *pipeline);
                }
                Command::SetViewportScissor(extent) => {
                    let viewport = vk::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: extent.width as f32,
                        height: extent.height as f32,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    };
                    let scissor = vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: *extent,
                    };
                    self.device.cmd_set_viewport(cb, 0, &[viewport]);
                    self.device.cmd_set_scissor(cb, 0, &[scissor]);
                }
                Command::BindDescriptorSets { layout, sets } => {
                    self.device.cmd_bind_descriptor_sets(
                        cb,
                        vk::PipelineBindPoint::GRAPHICS,
                        *layout,
                        0,
                        sets,
                        &[],
                    );
                }
                Command::PushConstants {
                    layout,
                    stages,
                    data,
                } => self.device.cmd_push_constants(cb, *layout, *stages, 0, data),
                Command::BindVertexBuffer(buffer) => {
                    self.device.cmd_bind_vertex_buffers(cb, 0, &[*buffer], &[0]);
                }
                Command::BindIndexBuffer(buffer) => {
                    self.device
                        .cmd_bind_index_buffer(cb, *buffer, 0, vk::IndexType::UINT32);
                }
                Command::DrawIndexed { index_count } => {
                    self.device.cmd_draw_indexed(cb, *index_count, 1, 0, 0, 0);
                }
            }
        }
    }

    fn submit(&self, submission: &Submission<'_>) -> VulkanResult<()> {
        let command_buffers = [submission.command_buffer];
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(submission.wait_semaphores)
            .wait_dst_stage_mask(submission.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(submission.signal_semaphores)
            .build();
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[info], submission.fence)
        }
        .check("vkQueueSubmit")
    }

    fn surface_support(&self) -> VulkanResult<SwapchainSupportDetails> {
        query_swapchain_support(&self.surface_loader, self.physical_device, self.surface)
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
    ) -> VulkanResult<(vk::SwapchainKHR, Vec<vk::Image>)> {
        let families = [self.graphics_family, self.present_family];
        let mut info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);
        info = if self.graphics_family == self.present_family {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        };

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&info, None) }
            .check("vkCreateSwapchainKHR")?;
        match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => Ok((swapchain, images)),
            Err(code) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                Err(VulkanError::from_result(code, "vkGetSwapchainImagesKHR"))
            }
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(code) => Err(VulkanError::from_result(code, "vkAcquireNextImageKHR")),
        }
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(code) => Err(VulkanError::from_result(code, "vkQueuePresentKHR")),
        }
    }

    fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<vk::RenderPass> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();
        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();
        let attachments = [color_attachment, depth_attachment];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build()];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.device.create_render_pass(&info, None) }.check("vkCreateRenderPass")
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&info, None) }.check("vkCreateFramebuffer")
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&info, None) }.check("vkCreateShaderModule")
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        unsafe { self.device.create_pipeline_layout(&info, None) }
            .check("vkCreatePipelineLayout")
    }

    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(desc.vertex_shader)
                .name(SHADER_ENTRY)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(desc.fragment_shader)
                .name(SHADER_ENTRY)
                .build(),
        ];

        let bindings = [desc.vertex_layout.binding_description()];
        let attributes = desc.vertex_layout.attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic so the pipeline survives resizes.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, code)| VulkanError::from_result(code, "vkCreateGraphicsPipelines"))?;
        pipelines
            .first()
            .copied()
            .ok_or_else(|| VulkanError::invalid("driver returned no pipeline"))
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(binding_flags);
        let mut info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(bindings)
            .flags(flags);
        if !binding_flags.is_empty() {
            info = info.push_next(&mut flags_info);
        }
        unsafe { self.device.create_descriptor_set_layout(&info, None) }
            .check("vkCreateDescriptorSetLayout")
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(flags);
        unsafe { self.device.create_descriptor_pool(&info, None) }
            .check("vkCreateDescriptorPool")
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let counts = [variable_count.unwrap_or(0)];
        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder().descriptor_counts(&counts);
        let mut info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        if variable_count.is_some() {
            info = info.push_next(&mut variable_info);
        }
        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }
            .check("vkAllocateDescriptorSets")?;
        sets.first()
            .copied()
            .ok_or_else(|| VulkanError::invalid("driver returned no descriptor set"))
    }

    fn write_descriptor(&self, write: &DescriptorWrite) {
        let builder = vk::WriteDescriptorSet::builder()
            .dst_set(write.set)
            .dst_binding(write.binding)
            .dst_array_element(write.array_element);
        match write.resource {
            DescriptorResource::UniformBuffer { buffer, range } => {
                let infos = [vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range,
                }];
                let update = builder
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&infos)
                    .build();
                unsafe { self.device.update_descriptor_sets(&[update], &[]) };
            }
            DescriptorResource::CombinedImageSampler { view, sampler } => {
                let infos = [vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }];
                let update = builder
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&infos)
                    .build();
                unsafe { self.device.update_descriptor_sets(&[update], &[]) };
            }
        }
    }

    fn destroy(&self, object: DeviceObject) {
        unsafe {
            match object {
                DeviceObject::ImageView(h) => self.device.destroy_image_view(h, None),
                DeviceObject::Sampler(h) => self.device.destroy_sampler(h, None),
                DeviceObject::Semaphore(h) => self.device.destroy_semaphore(h, None),
                DeviceObject::Fence(h) => self.device.destroy_fence(h, None),
                DeviceObject::CommandPool(h) => self.device.destroy_command_pool(h, None),
                DeviceObject::Framebuffer(h) => self.device.destroy_framebuffer(h, None),
                DeviceObject::RenderPass(h) => self.device.destroy_render_pass(h, None),
                DeviceObject::ShaderModule(h) => self.device.destroy_shader_module(h, None),
                DeviceObject::PipelineLayout(h) => self.device.destroy_pipeline_layout(h, None),
                DeviceObject::Pipeline(h) => self.device.destroy_pipeline(h, None),
                DeviceObject::DescriptorSetLayout(h) => {
                    self.device.destroy_descriptor_set_layout(h, None);
                }
                DeviceObject::DescriptorPool(h) => self.device.destroy_descriptor_pool(h, None),
                DeviceObject::Swapchain(h) => self.swapchain_loader.destroy_swapchain(h, None),
            }
        }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::error!("vkDeviceWaitIdle failed during shutdown: {err:?}");
            }
            // The allocator must go before the device it allocates from.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}
