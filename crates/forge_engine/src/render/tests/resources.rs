use std::rc::Rc;

use ash::vk;

use super::{config, quad, renderer};
use crate::foundation::collections::RegistryIndex;
use crate::render::api::{MaterialIndex, TextureHandle};
use crate::render::backends::mock::MockDevice;
use crate::render::backends::vulkan::device_api::DescriptorResource;
use crate::render::backends::vulkan::error::VulkanError;

#[test]
fn test_staged_payload_reads_back_exactly() {
    const CAPACITY: usize = 256;
    let device = Rc::new(MockDevice::new());
    let renderer = renderer(&device, &config(2));
    let buffers = renderer.buffers();
    let target = buffers
        .allocate(
            CAPACITY as vk::DeviceSize,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .expect("device-local buffer");

    for size in [0, 1, CAPACITY] {
        #[allow(clippy::cast_possible_truncation)]
        let payload: Vec<u8> = (0..size).map(|i| (i * 7 + 3) as u8).collect();
        buffers.upload_data(&target, &payload).expect("upload");
        assert_eq!(
            buffers.read_back(&target, size).expect("read back"),
            payload,
            "payload of {size} bytes"
        );
    }

    let too_big = vec![0u8; CAPACITY + 1];
    assert!(matches!(
        buffers.upload_data(&target, &too_big),
        Err(VulkanError::InvalidOperation { .. })
    ));
}

#[test]
fn test_material_indices_increase_until_capacity() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2).with_max_materials(3));
    let texture = renderer
        .upload_texture(&[1, 2, 3, 4], 1, 1)
        .expect("texture");

    let indices: Vec<_> = (0..3)
        .map(|_| renderer.add_material(texture).expect("material"))
        .collect();
    assert_eq!(indices, vec![MaterialIndex(0), MaterialIndex(1), MaterialIndex(2)]);

    assert!(matches!(
        renderer.add_material(texture),
        Err(VulkanError::TooManyMaterials { capacity: 3 })
    ));

    let texture_writes = device
        .descriptor_writes()
        .into_iter()
        .filter(|write| matches!(write.resource, DescriptorResource::CombinedImageSampler { .. }))
        .map(|write| write.array_element)
        .collect::<Vec<_>>();
    assert_eq!(texture_writes, vec![0, 1, 2]);
}

#[test]
fn test_unknown_texture_is_not_found() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let bogus = TextureHandle(RegistryIndex::new(4, 0));
    assert!(matches!(
        renderer.add_material(bogus),
        Err(VulkanError::ResourceNotFound {
            kind: "Texture",
            ..
        })
    ));
}

#[test]
fn test_rgb_texture_expanded_to_rgba() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let handle = renderer
        .upload_texture_with_channels(&[10, 20, 30, 40, 50, 60], 2, 1, 3)
        .expect("texture");
    let image = renderer
        .textures()
        .get(handle)
        .and_then(|texture| texture.image().ok())
        .expect("image");
    assert_eq!(
        device.image_contents(image),
        Some(vec![10, 20, 30, 255, 40, 50, 60, 255])
    );
    assert_eq!(
        device.image_layout(image),
        Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    );
}

#[test]
fn test_meshes_of_one_vertex_type_share_a_pipeline() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let (vertices, indices) = quad();
    let first = renderer.upload_mesh(&vertices, &indices).expect("first");
    let second = renderer.upload_mesh(&vertices[..3], &[0, 1, 2]).expect("second");

    let meshes = renderer.meshes();
    assert_eq!(
        meshes.get(first).expect("first").pipeline(),
        meshes.get(second).expect("second").pipeline()
    );
    assert_eq!(device.live_of_kind("Pipeline"), 1);
    assert_eq!(device.live_of_kind("Shader module"), 0);
}

#[test]
fn test_frame_sets_point_at_frame_uniforms() {
    let device = Rc::new(MockDevice::new());
    let renderer = renderer(&device, &config(3));
    let uniform_targets: Vec<_> = device
        .descriptor_writes()
        .into_iter()
        .filter_map(|write| match write.resource {
            DescriptorResource::UniformBuffer { buffer, range } => Some((buffer, range)),
            DescriptorResource::CombinedImageSampler { .. } => None,
        })
        .collect();
    assert_eq!(uniform_targets.len(), 3);
    for (slot, (buffer, range)) in uniform_targets.into_iter().enumerate() {
        let frame = renderer.frames().get(slot).expect("frame");
        assert_eq!(frame.uniform().get().expect("uniform").handle, buffer);
        assert_eq!(range, 128);
    }
    assert_eq!(device.variable_counts(), vec![None, None, None, Some(1024)]);
}
