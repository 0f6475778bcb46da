//! Buffer allocation and staged uploads
//!
//! Host-visible buffers are written through a mapping. Device-local buffers
//! are never written from the host: the payload goes into a temporary
//! host-visible staging buffer first and a one-shot copy moves it across.

use std::rc::Rc;

use ash::vk;

use super::managed::BufferAllocation;
use super::transfer::TransferContext;
use crate::render::backends::vulkan::device_api::DeviceApi;
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};

/// Memory properties of staging buffers
pub const STAGING_PROPERTIES: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Allocates buffers and moves host data into them
pub struct BufferManager<D: DeviceApi> {
    device: Rc<D>,
    transfer: Rc<TransferContext<D>>,
}

impl<D: DeviceApi> BufferManager<D> {
    /// Create a manager submitting copies through `transfer`
    pub const fn new(device: Rc<D>, transfer: Rc<TransferContext<D>>) -> Self {
        Self { device, transfer }
    }

    /// Allocate a buffer of `size` bytes
    ///
    /// Device-local buffers additionally get `TRANSFER_SRC | TRANSFER_DST`
    /// usage so they can be staged into and read back.
    pub fn allocate(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<BufferAllocation<D>> {
        if size == 0 {
            return Err(VulkanError::invalid("cannot allocate a zero-sized buffer"));
        }
        let usage = if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            usage
        } else {
            usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST
        };
        let raw = self.device.create_buffer(size, usage, properties)?;
        log::trace!("Allocated {size} byte buffer ({usage:?}, {properties:?})");
        Ok(BufferAllocation::new(self.device.clone(), raw))
    }

    /// Allocate a buffer sized for `data` and upload it
    pub fn create_with_data(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<BufferAllocation<D>> {
        let buffer = self.allocate(data.len() as vk::DeviceSize, usage, properties)?;
        self.upload_data(&buffer, data)?;
        Ok(buffer)
    }

    /// Write `data` to the start of `allocation`
    ///
    /// An empty payload is a no-op. A payload larger than the buffer is
    /// rejected before anything is written.
    pub fn upload_data(&self, allocation: &BufferAllocation<D>, data: &[u8]) -> VulkanResult<()> {
        let target = allocation.get()?;
        if data.is_empty() {
            return Ok(());
        }
        if data.len() as vk::DeviceSize > target.size {
            return Err(VulkanError::invalid(format!(
                "payload of {} bytes exceeds buffer capacity of {} bytes",
                data.len(),
                target.size
            )));
        }

        if target.is_host_visible() {
            return self.device.write_mapped(target, 0, data);
        }

        let staging = self.stage(data)?;
        self.transfer_buffer(&staging, allocation)?;
        log::trace!("Staged {} bytes into device-local buffer", data.len());
        Ok(())
    }

    /// Copy the whole of `src` into the start of `dst`
    pub fn transfer_buffer(
        &self,
        src: &BufferAllocation<D>,
        dst: &BufferAllocation<D>,
    ) -> VulkanResult<()> {
        let (src, dst) = (src.get()?, dst.get()?);
        if src.size > dst.size {
            return Err(VulkanError::invalid(format!(
                "transfer of {} bytes into a {} byte buffer",
                src.size, dst.size
            )));
        }
        let (src_handle, dst_handle, size) = (src.handle, dst.handle, src.size);
        self.transfer.submit_one_shot(|recorder| {
            recorder.copy_buffer(src_handle, dst_handle, size);
            Ok(())
        })
    }

    /// Read the first `len` bytes of any buffer back to the host
    ///
    /// Device-local buffers are copied into a staging buffer first. Meant
    /// for debugging and tests; it stalls the queue.
    pub fn read_back(&self, allocation: &BufferAllocation<D>, len: usize) -> VulkanResult<Vec<u8>> {
        let source = allocation.get()?;
        if len as vk::DeviceSize > source.size {
            return Err(VulkanError::invalid(format!(
                "read of {len} bytes from a {} byte buffer",
                source.size
            )));
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        if source.is_host_visible() {
            return self.device.read_mapped(source, 0, len);
        }

        let staging = self.allocate(
            len as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST,
            STAGING_PROPERTIES,
        )?;
        let (src_handle, dst_handle) = (source.handle, staging.get()?.handle);
        self.transfer.submit_one_shot(|recorder| {
            recorder.copy_buffer(src_handle, dst_handle, len as vk::DeviceSize);
            Ok(())
        })?;
        self.device.read_mapped(staging.get()?, 0, len)
    }

    /// Copy `data` into a fresh host-visible staging buffer
    ///
    /// The staging buffer is released when the returned allocation drops.
    pub fn stage(&self, data: &[u8]) -> VulkanResult<BufferAllocation<D>> {
        let staging = self.allocate(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            STAGING_PROPERTIES,
        )?;
        self.device.write_mapped(staging.get()?, 0, data)?;
        Ok(staging)
    }

    /// Transfer context shared with the texture path
    pub fn transfer(&self) -> &TransferContext<D> {
        &self.transfer
    }
}
