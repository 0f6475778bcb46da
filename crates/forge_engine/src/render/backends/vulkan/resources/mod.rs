//! Vulkan resource management (buffers, meshes, textures, descriptors)

pub mod buffer;
pub mod descriptor_set;
pub mod managed;
pub mod mesh;
pub mod texture;
pub mod transfer;

pub use buffer::BufferManager;
pub use descriptor_set::{DescriptorSetLayoutBuilder, DescriptorSetManager};
pub use managed::{BufferAllocation, DeviceResource, ImageAllocation, Managed};
pub use mesh::{Mesh, MeshManager};
pub use texture::{Texture, TextureManager};
pub use transfer::TransferContext;
