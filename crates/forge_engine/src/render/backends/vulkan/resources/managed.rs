//! Device-owned resource wrapper
//!
//! [`Managed`] pairs a raw device object with the device that created it.
//! Destruction happens exactly once: either through an explicit
//! [`Managed::destroy`] or on drop. Using the wrapper after an explicit
//! destroy fails with [`VulkanError::AlreadyDestroyed`].

use std::fmt;
use std::rc::Rc;

use ash::vk;

use crate::render::backends::vulkan::device_api::{DeviceApi, DeviceObject, RawBuffer, RawImage};
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};

/// A raw object that knows how to release itself on a device
pub trait DeviceResource<D: DeviceApi>: Sized {
    /// Human-readable kind used in logs and errors
    const KIND: &'static str;

    /// Release the object; called at most once
    fn release(self, device: &D);
}

/// Owned device object with exactly-once destruction
pub struct Managed<D: DeviceApi, T: DeviceResource<D>> {
    device: Rc<D>,
    inner: Option<T>,
}

impl<D: DeviceApi, T: DeviceResource<D>> Managed<D, T> {
    /// Take ownership of `inner`
    pub const fn new(device: Rc<D>, inner: T) -> Self {
        Self {
            device,
            inner: Some(inner),
        }
    }

    /// Borrow the wrapped object
    pub fn get(&self) -> VulkanResult<&T> {
        self.inner
            .as_ref()
            .ok_or(VulkanError::AlreadyDestroyed { resource: T::KIND })
    }

    /// Whether [`Managed::destroy`] has not run yet
    pub const fn is_alive(&self) -> bool {
        self.inner.is_some()
    }

    /// Device the object belongs to
    pub const fn device(&self) -> &Rc<D> {
        &self.device
    }

    /// Release the object now; later calls are no-ops
    pub fn destroy(&mut self) {
        match self.inner.take() {
            Some(inner) => inner.release(&self.device),
            None => log::warn!("{} destroyed twice, ignoring", T::KIND),
        }
    }
}

impl<D: DeviceApi, T: DeviceResource<D> + Copy> Managed<D, T> {
    /// Copy of the raw handle
    pub fn handle(&self) -> VulkanResult<T> {
        self.get().copied()
    }
}

impl<D: DeviceApi, T: DeviceResource<D>> Drop for Managed<D, T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release(&self.device);
        }
    }
}

impl<D: DeviceApi, T: DeviceResource<D> + fmt::Debug> fmt::Debug for Managed<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("kind", &T::KIND)
            .field("inner", &self.inner)
            .finish()
    }
}

macro_rules! device_object {
    ($($ty:ty => $variant:ident, $kind:literal;)*) => {
        $(
            impl<D: DeviceApi> DeviceResource<D> for $ty {
                const KIND: &'static str = $kind;

                fn release(self, device: &D) {
                    device.destroy(DeviceObject::$variant(self));
                }
            }
        )*
    };
}

device_object! {
    vk::ImageView => ImageView, "Image view";
    vk::Sampler => Sampler, "Sampler";
    vk::Semaphore => Semaphore, "Semaphore";
    vk::Fence => Fence, "Fence";
    vk::CommandPool => CommandPool, "Command pool";
    vk::Framebuffer => Framebuffer, "Framebuffer";
    vk::RenderPass => RenderPass, "Render pass";
    vk::ShaderModule => ShaderModule, "Shader module";
    vk::PipelineLayout => PipelineLayout, "Pipeline layout";
    vk::Pipeline => Pipeline, "Pipeline";
    vk::DescriptorSetLayout => DescriptorSetLayout, "Descriptor set layout";
    vk::DescriptorPool => DescriptorPool, "Descriptor pool";
    vk::SwapchainKHR => Swapchain, "Swapchain";
}

impl<D: DeviceApi> DeviceResource<D> for RawBuffer {
    const KIND: &'static str = "Buffer";

    fn release(self, device: &D) {
        device.free_buffer(self);
    }
}

impl<D: DeviceApi> DeviceResource<D> for RawImage {
    const KIND: &'static str = "Image";

    fn release(self, device: &D) {
        device.free_image(self);
    }
}

/// Allocator-backed buffer
pub type BufferAllocation<D> = Managed<D, RawBuffer>;

/// Allocator-backed image
pub type ImageAllocation<D> = Managed<D, RawImage>;

/// Image view
pub type ImageView<D> = Managed<D, vk::ImageView>;

/// Sampler
pub type Sampler<D> = Managed<D, vk::Sampler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::MockDevice;
    use crate::render::backends::vulkan::state::sync::Fence;

    #[test]
    fn test_destroy_twice_is_idempotent() {
        let device = Rc::new(MockDevice::new());
        let mut fence = Fence::create(device.clone(), true).expect("fence");
        assert_eq!(device.live_count(), 1);

        fence.destroy();
        fence.destroy();

        assert_eq!(device.live_count(), 0);
        assert_eq!(device.double_destroy_count(), 0);
    }

    #[test]
    fn test_use_after_destroy_fails() {
        let device = Rc::new(MockDevice::new());
        let mut fence = Fence::create(device, true).expect("fence");
        fence.destroy();
        assert!(!fence.is_alive());
        assert!(matches!(
            fence.wait(),
            Err(VulkanError::AlreadyDestroyed { resource: "Fence" })
        ));
        assert!(matches!(
            fence.reset(),
            Err(VulkanError::AlreadyDestroyed { .. })
        ));
    }

    #[test]
    fn test_drop_after_destroy_releases_nothing() {
        let device = Rc::new(MockDevice::new());
        {
            let mut buffer = BufferAllocation::new(
                device.clone(),
                device
                    .create_buffer(
                        64,
                        vk::BufferUsageFlags::UNIFORM_BUFFER,
                        vk::MemoryPropertyFlags::HOST_VISIBLE,
                    )
                    .expect("buffer"),
            );
            buffer.destroy();
        }
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.double_destroy_count(), 0);
    }

    #[test]
    fn test_drop_releases_live_object() {
        let device = Rc::new(MockDevice::new());
        {
            let _semaphore = crate::render::backends::vulkan::state::sync::Semaphore::create(
                device.clone(),
            )
            .expect("semaphore");
            assert_eq!(device.live_count(), 1);
        }
        assert_eq!(device.live_count(), 0);
    }
}
