//! Device memory allocator
//!
//! Thin wrapper over the Vulkan Memory Allocator. Allocations live in a
//! [`Registry`] so buffers and images carry a plain [`RegistryIndex`] and are
//! always released through the allocator that created them.

use std::cell::RefCell;

use ash::{vk, Device, Instance};
use vk_mem::Alloc;

use crate::foundation::collections::{Registry, RegistryIndex};
use crate::render::backends::vulkan::error::{VkCheck, VulkanError, VulkanResult};

/// Allocator plus the live allocations it handed out
pub struct GpuAllocator {
    allocations: RefCell<Registry<vk_mem::Allocation>>,
    inner: vk_mem::Allocator,
}

impl GpuAllocator {
    /// Create the allocator for `device`
    pub fn new(
        instance: &Instance,
        device: &Device,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        let create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device);
        let inner = vk_mem::Allocator::new(create_info).check("vmaCreateAllocator")?;
        Ok(Self {
            allocations: RefCell::new(Registry::new()),
            inner,
        })
    }

    fn allocation_info(properties: vk::MemoryPropertyFlags) -> vk_mem::AllocationCreateInfo {
        let host_visible = properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE);
        vk_mem::AllocationCreateInfo {
            usage: if host_visible {
                vk_mem::MemoryUsage::AutoPreferHost
            } else {
                vk_mem::MemoryUsage::AutoPreferDevice
            },
            flags: if host_visible {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            required_flags: properties,
            ..Default::default()
        }
    }

    /// Create a buffer backed by memory satisfying `properties`
    pub fn create_buffer(
        &self,
        info: &vk::BufferCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::Buffer, RegistryIndex)> {
        let (buffer, allocation) =
            unsafe { self.inner.create_buffer(info, &Self::allocation_info(properties)) }
                .check("vmaCreateBuffer")?;
        Ok((buffer, self.allocations.borrow_mut().add(allocation)))
    }

    /// Create a device-local image
    pub fn create_image(
        &self,
        info: &vk::ImageCreateInfo,
    ) -> VulkanResult<(vk::Image, RegistryIndex)> {
        let alloc_info = Self::allocation_info(vk::MemoryPropertyFlags::DEVICE_LOCAL);
        let (image, allocation) =
            unsafe { self.inner.create_image(info, &alloc_info) }.check("vmaCreateImage")?;
        Ok((image, self.allocations.borrow_mut().add(allocation)))
    }

    /// Destroy `buffer` and free its memory
    pub fn destroy_buffer(&self, buffer: vk::Buffer, allocation: RegistryIndex) {
        match self.allocations.borrow_mut().remove(allocation) {
            Some(mut memory) => unsafe { self.inner.destroy_buffer(buffer, &mut memory) },
            None => log::warn!("Buffer allocation {allocation} freed twice, ignoring"),
        }
    }

    /// Destroy `image` and free its memory
    pub fn destroy_image(&self, image: vk::Image, allocation: RegistryIndex) {
        match self.allocations.borrow_mut().remove(allocation) {
            Some(mut memory) => unsafe { self.inner.destroy_image(image, &mut memory) },
            None => log::warn!("Image allocation {allocation} freed twice, ignoring"),
        }
    }

    /// Copy `data` into host-visible memory at `offset`
    pub fn write(&self, allocation: RegistryIndex, offset: usize, data: &[u8]) -> VulkanResult<()> {
        self.with_mapped(allocation, |ptr| unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset), data.len());
        })
    }

    /// Read `len` bytes of host-visible memory at `offset`
    pub fn read(&self, allocation: RegistryIndex, offset: usize, len: usize) -> VulkanResult<Vec<u8>> {
        let mut bytes = vec![0; len];
        self.with_mapped(allocation, |ptr| unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(offset), bytes.as_mut_ptr(), len);
        })?;
        Ok(bytes)
    }

    fn with_mapped(&self, allocation: RegistryIndex, access: impl FnOnce(*mut u8)) -> VulkanResult<()> {
        let mut allocations = self.allocations.borrow_mut();
        let memory = allocations
            .get_mut(allocation)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                kind: "allocation",
                handle: allocation.to_string(),
            })?;
        let ptr = unsafe { self.inner.map_memory(memory) }.check("vmaMapMemory")?;
        access(ptr);
        unsafe { self.inner.unmap_memory(memory) };
        Ok(())
    }

    /// Number of live allocations
    pub fn live_allocations(&self) -> usize {
        self.allocations.borrow().len()
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        let leaked = self.allocations.borrow().len();
        if leaked > 0 {
            log::warn!("{leaked} allocations still live when the allocator was dropped");
        }
    }
}
