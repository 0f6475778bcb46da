//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules.
//! Everything above the device seam ([`DeviceApi`]) is generic over the
//! device so it runs unchanged against the in-memory mock.

/// Device seam shared by the real device and the mock
pub mod device_api;

/// Error taxonomy and status-code checking
pub mod error;

/// Vulkan initialization types (instance, surface, device selection, device)
pub mod initialization;

/// Vulkan resource management (buffers, meshes, textures, descriptors)
pub mod resources;

/// Vulkan rendering operations (commands, render pass, shaders, vertex layouts)
pub mod rendering;

/// Vulkan state management (swapchain, frames, synchronization)
pub mod state;

pub use device_api::DeviceApi;
pub use error::{AcquireOutcome, PresentOutcome, VkCheck, VulkanError, VulkanResult};
pub use initialization::{LogicalDevice, RawWindow, VulkanContext, WindowSurface};
pub use rendering::{ShaderCode, Vertex, VertexLayout, VertexType};
pub use resources::{BufferManager, DescriptorSetManager, MeshManager, TextureManager};
pub use state::{FrameRing, SwapchainManager, SwapchainState};
