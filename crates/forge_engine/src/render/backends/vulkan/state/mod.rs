// Vulkan state management

pub mod frame;
pub mod swapchain;
pub mod sync;

pub use frame::{Frame, FrameRing, FrameState};
pub use swapchain::{
    choose_swapchain_settings, SwapChain, SwapchainManager, SwapchainSettings, SwapchainState,
};
pub use sync::{Fence, Semaphore};
