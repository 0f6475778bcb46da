//! Device-resident meshes
//!
//! A mesh is an interleaved vertex buffer plus a `u32` index buffer, both
//! device-local and filled through the staging path, tagged with the
//! pipeline built for its vertex layout.

use ash::vk;

use super::buffer::BufferManager;
use super::managed::BufferAllocation;
use crate::foundation::collections::Registry;
use crate::render::api::{MeshHandle, PipelineHandle};
use crate::render::backends::vulkan::device_api::DeviceApi;
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};

/// Vertex and index buffers of one uploaded mesh
pub struct Mesh<D: DeviceApi> {
    vertex_buffer: BufferAllocation<D>,
    index_buffer: BufferAllocation<D>,
    index_count: u32,
    pipeline: PipelineHandle,
}

impl<D: DeviceApi> Mesh<D> {
    /// Raw vertex buffer
    pub fn vertex_buffer(&self) -> VulkanResult<vk::Buffer> {
        Ok(self.vertex_buffer.get()?.handle)
    }

    /// Raw index buffer
    pub fn index_buffer(&self) -> VulkanResult<vk::Buffer> {
        Ok(self.index_buffer.get()?.handle)
    }

    /// Number of indices drawn
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Pipeline matching the mesh's vertex layout
    pub const fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    /// Vertex buffer allocation, for read-back
    pub const fn vertex_allocation(&self) -> &BufferAllocation<D> {
        &self.vertex_buffer
    }

    /// Index buffer allocation, for read-back
    pub const fn index_allocation(&self) -> &BufferAllocation<D> {
        &self.index_buffer
    }
}

/// Registry of uploaded meshes
pub struct MeshManager<D: DeviceApi> {
    meshes: Registry<Mesh<D>>,
}

impl<D: DeviceApi> MeshManager<D> {
    /// Create an empty manager
    pub const fn new() -> Self {
        Self {
            meshes: Registry::new(),
        }
    }

    /// Upload raw vertex bytes and indices
    ///
    /// Every index must address one of the `vertex_count` vertices.
    pub fn upload(
        &mut self,
        buffers: &BufferManager<D>,
        vertex_bytes: &[u8],
        vertex_count: usize,
        indices: &[u32],
        pipeline: PipelineHandle,
    ) -> VulkanResult<MeshHandle> {
        if vertex_count == 0 || indices.is_empty() {
            return Err(VulkanError::invalid(format!(
                "mesh needs vertices and indices (got {vertex_count} vertices, {} indices)",
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(VulkanError::invalid(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }
        let index_count = u32::try_from(indices.len())
            .map_err(|_| VulkanError::invalid("too many indices"))?;

        let vertex_buffer = buffers.create_with_data(
            vertex_bytes,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let index_buffer = buffers.create_with_data(
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let handle = MeshHandle(self.meshes.add(Mesh {
            vertex_buffer,
            index_buffer,
            index_count,
            pipeline,
        }));
        log::debug!("Uploaded {handle}: {vertex_count} vertices, {index_count} indices");
        Ok(handle)
    }

    /// Look up a mesh
    pub fn get(&self, handle: MeshHandle) -> VulkanResult<&Mesh<D>> {
        self.meshes
            .get(handle.0)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                kind: "Mesh",
                handle: handle.to_string(),
            })
    }

    /// Remove a mesh, releasing its buffers
    ///
    /// The caller guarantees no in-flight command buffer references it.
    pub fn remove(&mut self, handle: MeshHandle) -> VulkanResult<()> {
        let mesh = self
            .meshes
            .remove(handle.0)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                kind: "Mesh",
                handle: handle.to_string(),
            })?;
        drop(mesh);
        log::debug!("Removed {handle}");
        Ok(())
    }

    /// Whether `handle` resolves to a live mesh
    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.meshes.contains(handle.0)
    }

    /// Number of live meshes
    pub const fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether no mesh is uploaded
    pub const fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Release every mesh now
    pub fn clear(&mut self) {
        self.meshes.drain();
    }
}

impl<D: DeviceApi> Default for MeshManager<D> {
    fn default() -> Self {
        Self::new()
    }
}
