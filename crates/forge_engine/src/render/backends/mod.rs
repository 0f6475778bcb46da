//! Backend implementations for the render module
//!
//! Vulkan is the only backend. The mock device stands in for it in tests.

/// Vulkan rendering backend implementation
pub mod vulkan;

/// In-memory device for tests
#[cfg(test)]
pub mod mock;
