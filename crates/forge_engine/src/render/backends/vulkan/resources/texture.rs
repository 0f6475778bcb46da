//! Sampled textures
//!
//! A texture is a device-local RGBA8 image uploaded through the staging
//! path, a view over it and a reference to the sampler shared by every
//! texture. The sampler is destroyed when the last texture (and the
//! manager) let go of it.

use std::rc::Rc;

use ash::vk;

use super::buffer::BufferManager;
use super::managed::{ImageAllocation, ImageView, Sampler};
use crate::foundation::collections::Registry;
use crate::render::api::TextureHandle;
use crate::render::backends::vulkan::device_api::{DescriptorResource, DeviceApi, ImageDesc};
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};

/// Format of every uploaded texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Device-resident texture
pub struct Texture<D: DeviceApi> {
    // Declared before `image` so the view is destroyed first.
    view: ImageView<D>,
    image: ImageAllocation<D>,
    sampler: Rc<Sampler<D>>,
    extent: vk::Extent2D,
}

impl<D: DeviceApi> Texture<D> {
    /// Pixel extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Raw image handle
    pub fn image(&self) -> VulkanResult<vk::Image> {
        Ok(self.image.get()?.handle)
    }

    /// Descriptor payload for a combined image sampler binding
    pub fn descriptor(&self) -> VulkanResult<DescriptorResource> {
        Ok(DescriptorResource::CombinedImageSampler {
            view: self.view.handle()?,
            sampler: self.sampler.handle()?,
        })
    }
}

/// Uploads textures and owns them for the renderer's lifetime
pub struct TextureManager<D: DeviceApi> {
    textures: Registry<Texture<D>>,
    sampler: Rc<Sampler<D>>,
    device: Rc<D>,
}

impl<D: DeviceApi> TextureManager<D> {
    /// Create the manager and its shared sampler
    pub fn new(device: Rc<D>) -> VulkanResult<Self> {
        let sampler = Rc::new(Sampler::new(device.clone(), device.create_sampler()?));
        Ok(Self {
            textures: Registry::new(),
            sampler,
            device,
        })
    }

    /// Upload tightly packed RGBA8 pixels
    ///
    /// Records `UNDEFINED -> TRANSFER_DST`, the copy, and
    /// `TRANSFER_DST -> SHADER_READ_ONLY` in one submission and waits for it.
    pub fn upload_texture(
        &mut self,
        buffers: &BufferManager<D>,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> VulkanResult<TextureHandle> {
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!(
                "texture extent {width}x{height} is empty"
            )));
        }
        let expected = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h))
            .and_then(|texels| texels.checked_mul(4));
        if expected != Some(pixels.len()) {
            return Err(VulkanError::invalid(format!(
                "expected {} bytes of RGBA8 pixels for {width}x{height}, got {}",
                expected.map_or_else(|| "more than usize::MAX".to_string(), |n| n.to_string()),
                pixels.len()
            )));
        }

        let extent = vk::Extent2D { width, height };
        let image = ImageAllocation::new(
            self.device.clone(),
            self.device.create_image(&ImageDesc {
                extent,
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            })?,
        );
        let image_handle = image.get()?.handle;

        let staging = buffers.stage(pixels)?;
        let staging_handle = staging.get()?.handle;
        buffers.transfer().submit_one_shot(|recorder| {
            recorder.transition_image_layout(
                image_handle,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            recorder.copy_buffer_to_image(staging_handle, image_handle, extent);
            recorder.transition_image_layout(
                image_handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;

        let view = ImageView::new(
            self.device.clone(),
            self.device
                .create_image_view(image_handle, TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?,
        );

        let handle = TextureHandle(self.textures.add(Texture {
            view,
            image,
            sampler: self.sampler.clone(),
            extent,
        }));
        log::debug!("Uploaded {width}x{height} texture as {handle}");
        Ok(handle)
    }

    /// Look up a texture
    pub fn get(&self, handle: TextureHandle) -> Option<&Texture<D>> {
        self.textures.get(handle.0)
    }

    /// Number of uploaded textures
    pub const fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether no texture has been uploaded
    pub const fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Sampler shared by all textures
    pub const fn sampler(&self) -> &Rc<Sampler<D>> {
        &self.sampler
    }
}

/// Expand 1, 2, 3 or 4 channel 8-bit pixels to RGBA8
///
/// Grayscale is replicated into RGB; missing alpha becomes opaque.
pub fn expand_to_rgba(pixels: &[u8], channels: u8) -> VulkanResult<Vec<u8>> {
    let channels_usize = usize::from(channels);
    if !(1..=4).contains(&channels) || pixels.len() % channels_usize != 0 {
        return Err(VulkanError::invalid(format!(
            "cannot expand {} bytes of {channels}-channel pixels",
            pixels.len()
        )));
    }
    let rgba = match channels {
        1 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        2 => pixels
            .chunks_exact(2)
            .flat_map(|t| [t[0], t[0], t[0], t[1]])
            .collect(),
        3 => pixels
            .chunks_exact(3)
            .flat_map(|t| [t[0], t[1], t[2], 255])
            .collect(),
        _ => pixels.to_vec(),
    };
    Ok(rgba)
}
