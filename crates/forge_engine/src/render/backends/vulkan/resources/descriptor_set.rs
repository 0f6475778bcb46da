//! Descriptor sets and bindless textures
//!
//! Two set families share one pool:
//!
//! - **Frame sets** (set 0): one per frame in flight, a single uniform
//!   buffer visible to the vertex stage, rewritten every frame.
//! - **Texture set** (set 1): one set shared by every frame, a runtime-sized
//!   array of combined image samplers flagged partially bound,
//!   update-after-bind and variable-count.
//!
//! Materials are appended to the texture array and never overwritten, so a
//! slot referenced by an in-flight command buffer is never rewritten.

use std::rc::Rc;

use ash::vk;

use super::managed::{BufferAllocation, Managed};
use super::texture::Texture;
use crate::render::api::MaterialIndex;
use crate::render::backends::vulkan::device_api::{DescriptorResource, DescriptorWrite, DeviceApi};
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};

/// Descriptor set layout
pub type DescriptorSetLayout<D> = Managed<D, vk::DescriptorSetLayout>;

/// Descriptor pool; destroying it frees every set allocated from it
pub type DescriptorPool<D> = Managed<D, vk::DescriptorPool>;

/// Binding used by both set families
pub const BINDING: u32 = 0;

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    binding_flags: Vec<vk::DescriptorBindingFlags>,
    flags: vk::DescriptorSetLayoutCreateFlags,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self.binding_flags.push(vk::DescriptorBindingFlags::empty());
        self
    }

    /// Add a bindless combined image sampler array of up to `capacity` entries
    ///
    /// Must be the last binding because its count is variable.
    #[must_use]
    pub fn add_bindless_sampler_array(
        mut self,
        binding: u32,
        capacity: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(capacity)
                .stage_flags(stage_flags)
                .build(),
        );
        self.binding_flags.push(
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        );
        self.flags |= vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL;
        self
    }

    /// Build the descriptor set layout
    pub fn build<D: DeviceApi>(self, device: &Rc<D>) -> VulkanResult<DescriptorSetLayout<D>> {
        let layout =
            device.create_descriptor_set_layout(&self.bindings, &self.binding_flags, self.flags)?;
        Ok(DescriptorSetLayout::new(device.clone(), layout))
    }
}

/// Owns the descriptor pool, both layouts and every allocated set
pub struct DescriptorSetManager<D: DeviceApi> {
    frame_sets: Vec<vk::DescriptorSet>,
    texture_set: vk::DescriptorSet,
    material_count: u32,
    capacity: u32,
    // Pool goes before the layouts it allocated from.
    pool: DescriptorPool<D>,
    frame_layout: DescriptorSetLayout<D>,
    texture_layout: DescriptorSetLayout<D>,
}

impl<D: DeviceApi> DescriptorSetManager<D> {
    /// Create layouts, a pool of `frames + 1` sets, and allocate all sets
    pub fn new(device: &Rc<D>, frames: usize, capacity: u32) -> VulkanResult<Self> {
        if capacity == 0 {
            return Err(VulkanError::invalid("bindless capacity must be at least 1"));
        }
        let frame_count = u32::try_from(frames)
            .map_err(|_| VulkanError::invalid(format!("{frames} frames in flight")))?;

        let frame_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(BINDING, vk::ShaderStageFlags::VERTEX)
            .build(device)?;
        let texture_layout = DescriptorSetLayoutBuilder::new()
            .add_bindless_sampler_array(BINDING, capacity, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frame_count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: capacity,
            },
        ];
        let pool = DescriptorPool::new(
            device.clone(),
            device.create_descriptor_pool(
                frame_count + 1,
                &pool_sizes,
                vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
            )?,
        );

        let pool_handle = pool.handle()?;
        let frame_layout_handle = frame_layout.handle()?;
        let frame_sets = (0..frame_count)
            .map(|_| device.allocate_descriptor_set(pool_handle, frame_layout_handle, None))
            .collect::<VulkanResult<Vec<_>>>()?;
        let texture_set =
            device.allocate_descriptor_set(pool_handle, texture_layout.handle()?, Some(capacity))?;

        log::debug!(
            "Descriptor sets ready: {frame_count} frame sets, bindless capacity {capacity}"
        );
        Ok(Self {
            frame_sets,
            texture_set,
            material_count: 0,
            capacity,
            pool,
            frame_layout,
            texture_layout,
        })
    }

    /// Point the frame set of `slot` at its uniform buffer
    pub fn write_frame_uniform(
        &self,
        slot: usize,
        uniform: &BufferAllocation<D>,
    ) -> VulkanResult<()> {
        let set = self.frame_set(slot)?;
        let buffer = uniform.get()?;
        self.pool.device().write_descriptor(&DescriptorWrite {
            set,
            binding: BINDING,
            array_element: 0,
            resource: DescriptorResource::UniformBuffer {
                buffer: buffer.handle,
                range: buffer.size,
            },
        });
        Ok(())
    }

    /// Append `texture` to the bindless array
    ///
    /// Returns the array index to pass to shaders. Indices are handed out in
    /// increasing order and never reused.
    pub fn add_material(&mut self, texture: &Texture<D>) -> VulkanResult<MaterialIndex> {
        if self.material_count >= self.capacity {
            return Err(VulkanError::TooManyMaterials {
                capacity: self.capacity,
            });
        }
        let index = self.material_count;
        self.pool.device().write_descriptor(&DescriptorWrite {
            set: self.texture_set,
            binding: BINDING,
            array_element: index,
            resource: texture.descriptor()?,
        });
        self.material_count += 1;
        log::debug!("Material {index} added to bindless array");
        Ok(MaterialIndex(index))
    }

    /// Whether `material` was handed out by [`DescriptorSetManager::add_material`]
    pub const fn is_issued(&self, material: MaterialIndex) -> bool {
        material.0 < self.material_count
    }

    /// Sets 0 and 1 for frame `slot`
    pub fn sets_for_frame(&self, slot: usize) -> VulkanResult<[vk::DescriptorSet; 2]> {
        Ok([self.frame_set(slot)?, self.texture_set])
    }

    /// Frame and texture layouts, in set order
    pub fn layouts(&self) -> VulkanResult<[vk::DescriptorSetLayout; 2]> {
        Ok([self.frame_layout.handle()?, self.texture_layout.handle()?])
    }

    /// Number of materials added so far
    pub const fn material_count(&self) -> u32 {
        self.material_count
    }

    /// Declared bindless capacity
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    fn frame_set(&self, slot: usize) -> VulkanResult<vk::DescriptorSet> {
        self.frame_sets
            .get(slot)
            .copied()
            .ok_or_else(|| VulkanError::invalid(format!("no frame set for slot {slot}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::MockDevice;
    use crate::render::backends::vulkan::resources::buffer::BufferManager;
    use crate::render::backends::vulkan::resources::texture::TextureManager;
    use crate::render::backends::vulkan::resources::transfer::TransferContext;

    #[test]
    fn test_material_indices_increase_until_capacity() {
        let device = Rc::new(MockDevice::new());
        let transfer = Rc::new(TransferContext::new(device.clone()).expect("transfer"));
        let buffers = BufferManager::new(device.clone(), transfer);
        let mut textures = TextureManager::new(device.clone()).expect("textures");
        let mut descriptors = DescriptorSetManager::new(&device, 2, 4).expect("descriptors");

        let handle = textures
            .upload_texture(&buffers, &[255; 4], 1, 1)
            .expect("texture");
        let texture = textures.get(handle).expect("texture");

        let indices: Vec<u32> = (0..4)
            .map(|_| descriptors.add_material(texture).expect("within capacity").get())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));

        assert!(matches!(
            descriptors.add_material(texture),
            Err(VulkanError::TooManyMaterials { capacity: 4 })
        ));
        assert_eq!(descriptors.material_count(), 4);

        let elements: Vec<u32> = device
            .descriptor_writes()
            .iter()
            .map(|write| write.array_element)
            .collect();
        assert_eq!(elements, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_texture_set_allocated_with_variable_count() {
        let device = Rc::new(MockDevice::new());
        let descriptors = DescriptorSetManager::new(&device, 3, 64).expect("descriptors");
        assert_eq!(
            device.variable_counts(),
            vec![None, None, None, Some(64)]
        );
        let [frame, texture] = descriptors.sets_for_frame(2).expect("slot 2");
        assert_ne!(frame, texture);
        assert!(descriptors.sets_for_frame(3).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let device = Rc::new(MockDevice::new());
        assert!(DescriptorSetManager::new(&device, 2, 0).is_err());
    }
}
