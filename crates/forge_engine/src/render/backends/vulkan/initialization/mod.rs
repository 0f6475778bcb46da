// Vulkan initialization components

pub mod allocator;
pub mod context;
pub mod instance;
pub mod logical_device;
pub mod physical_device;
pub mod surface;

pub use allocator::GpuAllocator;
pub use context::VulkanContext;
pub use instance::VulkanInstance;
pub use logical_device::LogicalDevice;
pub use physical_device::{PhysicalDeviceSelector, PhysicalDeviceSurfaceInfo, SurfaceQuery};
pub use surface::{RawWindow, Surface, WindowSurface};
