//! One-shot transfer submissions
//!
//! Uploads are synchronous: the command buffer is recorded, submitted on the
//! graphics queue and waited on through a dedicated fence before the call
//! returns, so an uploaded resource is usable by the very next draw.

use std::rc::Rc;

use crate::render::backends::vulkan::device_api::{DeviceApi, Submission};
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::state::sync::Fence;

/// Command pool and fence reserved for staging copies
pub struct TransferContext<D: DeviceApi> {
    fence: Fence<D>,
    pool: CommandPool<D>,
}

impl<D: DeviceApi> TransferContext<D> {
    /// Create the transfer pool and its unsignaled fence
    pub fn new(device: Rc<D>) -> VulkanResult<Self> {
        Ok(Self {
            pool: CommandPool::create(device.clone())?,
            fence: Fence::create(device, false)?,
        })
    }

    /// Record `record` into a fresh command buffer, submit it and wait
    ///
    /// The command buffer is freed and the fence reset on every path after a
    /// successful allocation.
    pub fn submit_one_shot<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&CommandRecorder<'_, D>) -> VulkanResult<()>,
    {
        let command_buffers = self.pool.allocate_command_buffers(1)?;
        let result = self.run(&command_buffers, record);
        self.pool.free_command_buffers(&command_buffers)?;
        result
    }

    fn run<F>(&self, command_buffers: &[ash::vk::CommandBuffer], record: F) -> VulkanResult<()>
    where
        F: FnOnce(&CommandRecorder<'_, D>) -> VulkanResult<()>,
    {
        let device = self.pool.device();
        let command_buffer = command_buffers
            .first()
            .copied()
            .ok_or_else(|| VulkanError::invalid("command pool returned no command buffer"))?;

        device.begin_command_buffer(command_buffer, true)?;
        record(&CommandRecorder::new(device.as_ref(), command_buffer))?;
        device.end_command_buffer(command_buffer)?;

        device.submit(&Submission {
            command_buffer,
            wait_semaphores: &[],
            wait_stages: &[],
            signal_semaphores: &[],
            fence: self.fence.handle()?,
        })?;
        self.fence.wait()?;
        self.fence.reset()
    }
}
