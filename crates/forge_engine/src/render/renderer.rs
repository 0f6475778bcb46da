//! Frame orchestration
//!
//! [`Renderer`] ties the managers together and runs one tick per
//! [`Renderer::draw_frame`] call:
//!
//! 1. recreate the swapchain if it was flagged stale (skip the tick if the
//!    surface has no area),
//! 2. wait on the current slot's in-flight fence,
//! 3. acquire an image; out-of-date or suboptimal flags the swapchain stale
//!    and skips the tick with the fence left signaled,
//! 4. reset the fence, record the render pass and let the caller's draw
//!    callback issue draws through a [`RenderingContext`],
//! 5. write the camera uniform, submit, present, advance the slot.

use std::rc::Rc;

use ash::vk;

use crate::core::RendererConfig;
use crate::render::api::{CameraUniform, MaterialIndex, MeshHandle, PushConstants, TextureHandle};
use crate::render::backends::vulkan::device_api::DeviceApi;
use crate::render::backends::vulkan::error::{AcquireOutcome, VulkanError, VulkanResult};
use crate::render::backends::vulkan::rendering::{
    CommandRecorder, PipelineCache, RenderPass, ShaderCode, VertexType,
};
use crate::render::backends::vulkan::rendering::shader::PUSH_CONSTANT_STAGES;
use crate::render::backends::vulkan::resources::texture::expand_to_rgba;
use crate::render::backends::vulkan::resources::{
    BufferManager, DescriptorSetManager, MeshManager, TextureManager, TransferContext,
};
use crate::render::backends::vulkan::state::{FrameRing, SwapchainManager};

/// Why a tick did not reach presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Acquire reported out-of-date or suboptimal; recreation is pending
    SwapchainOutOfDate,
    /// The surface has zero area (minimized window)
    ZeroExtent,
}

/// Result of one [`Renderer::draw_frame`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation
    Presented {
        /// Frame slot that recorded the frame
        slot: usize,
        /// Swapchain image rendered to
        image_index: u32,
    },
    /// Nothing was submitted this tick
    Skipped(SkipReason),
}

/// Counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted and presented
    pub submitted: u64,
    /// Ticks that submitted nothing
    pub skipped: u64,
    /// Successful swapchain recreations
    pub recreations: u64,
}

/// Draw-time view handed to the frame callback
pub struct RenderingContext<'a, D: DeviceApi> {
    recorder: &'a CommandRecorder<'a, D>,
    meshes: &'a MeshManager<D>,
    pipelines: &'a PipelineCache<D>,
    descriptors: &'a DescriptorSetManager<D>,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    camera: CameraUniform,
    bound_pipeline: Option<vk::Pipeline>,
    draws: u32,
}

impl<'a, D: DeviceApi> RenderingContext<'a, D> {
    /// Record one indexed draw of `mesh`
    ///
    /// Pushes the model transform and material index, binds the mesh's
    /// pipeline if it differs from the last one, then its buffers.
    pub fn draw_mesh(
        &mut self,
        mesh: MeshHandle,
        transform: [[f32; 4]; 4],
        material: MaterialIndex,
    ) -> VulkanResult<()> {
        let mesh = self.meshes.get(mesh)?;
        if !self.descriptors.is_issued(material) {
            return Err(VulkanError::ResourceNotFound {
                kind: "Material",
                handle: material.get().to_string(),
            });
        }

        let pipeline = self.pipelines.get(mesh.pipeline())?;
        if self.bound_pipeline != Some(pipeline) {
            self.recorder.bind_pipeline(pipeline);
            self.bound_pipeline = Some(pipeline);
        }

        let push = PushConstants::new(transform, material);
        self.recorder
            .push_constants(self.layout, PUSH_CONSTANT_STAGES, bytemuck::bytes_of(&push));
        self.recorder
            .bind_mesh_buffers(mesh.vertex_buffer()?, mesh.index_buffer()?);
        self.recorder.draw_indexed(mesh.index_count());
        self.draws += 1;
        Ok(())
    }

    /// Width of the target in pixels
    pub const fn viewport_width(&self) -> u32 {
        self.extent.width
    }

    /// Height of the target in pixels
    pub const fn viewport_height(&self) -> u32 {
        self.extent.height
    }

    /// Replace this frame's camera payload
    pub fn set_uniform(&mut self, camera: CameraUniform) {
        self.camera = camera;
    }

    /// Set view and projection for this frame
    pub fn set_camera(&mut self, view: [[f32; 4]; 4], projection: [[f32; 4]; 4]) {
        self.camera = CameraUniform { view, projection };
    }

    /// Camera payload that will be written for this frame
    pub const fn camera(&self) -> &CameraUniform {
        &self.camera
    }

    /// Draws recorded so far
    pub const fn draw_count(&self) -> u32 {
        self.draws
    }
}

/// Forward renderer over one window
///
/// Field order is drop order: frames, descriptors, meshes, textures,
/// pipelines, swapchain, render pass, then the staging path.
pub struct Renderer<D: DeviceApi> {
    frames: FrameRing<D>,
    descriptors: DescriptorSetManager<D>,
    meshes: MeshManager<D>,
    textures: TextureManager<D>,
    pipelines: PipelineCache<D>,
    swapchain: SwapchainManager<D>,
    render_pass: RenderPass<D>,
    buffers: BufferManager<D>,
    camera: CameraUniform,
    clear_color: [f32; 4],
    stats: FrameStats,
    device: Rc<D>,
}

impl<D: DeviceApi> Renderer<D> {
    /// Build every manager for a surface of `extent` pixels
    pub fn new(
        device: Rc<D>,
        config: &RendererConfig,
        shaders: ShaderCode,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        config.validate()?;
        let frame_count = config.max_frames_in_flight;

        let transfer = Rc::new(TransferContext::new(device.clone())?);
        let buffers = BufferManager::new(device.clone(), transfer);

        let mut swapchain = SwapchainManager::new(device.clone(), extent, config.prefer_mailbox)?;
        let render_pass = RenderPass::new_forward_pass(device.clone(), swapchain.color_format())?;
        swapchain.initialize(render_pass.handle()?)?;

        let descriptors = DescriptorSetManager::new(&device, frame_count, config.max_materials)?;
        let pipelines = PipelineCache::new(
            device.clone(),
            shaders,
            render_pass.handle()?,
            &descriptors.layouts()?,
        )?;
        let textures = TextureManager::new(device.clone())?;

        let frames = FrameRing::new(&device, &buffers, frame_count)?;
        for slot in 0..frames.len() {
            let frame = frames
                .get(slot)
                .ok_or_else(|| VulkanError::invalid(format!("missing frame slot {slot}")))?;
            descriptors.write_frame_uniform(slot, frame.uniform())?;
        }

        log::info!(
            "Renderer ready: {frame_count} frames in flight, {} materials max",
            config.max_materials
        );
        Ok(Self {
            frames,
            descriptors,
            meshes: MeshManager::new(),
            textures,
            pipelines,
            swapchain,
            render_pass,
            buffers,
            camera: CameraUniform::IDENTITY,
            clear_color: config.clear_color,
            stats: FrameStats::default(),
            device,
        })
    }

    /// Run one frame, letting `draw` record the scene
    ///
    /// Returns [`FrameOutcome::Skipped`] when the swapchain had to be
    /// recreated or the surface is minimized; nothing is submitted then.
    /// An error from `draw` is returned after the frame has still been
    /// submitted, so the slot's fence stays balanced.
    pub fn draw_frame<F>(&mut self, draw: F) -> VulkanResult<FrameOutcome>
    where
        F: FnOnce(&mut RenderingContext<'_, D>) -> VulkanResult<()>,
    {
        if self.swapchain.is_stale() {
            let recreated = self.swapchain.recreate()?;
            // Recreation idled the device, so abandoned semaphores are safe to swap.
            self.frames.refresh_semaphores()?;
            if !recreated {
                return Ok(self.skip(SkipReason::ZeroExtent));
            }
        }

        let slot = self.frames.current_index();
        let frame = self.frames.current_mut()?;
        frame.wait_in_flight()?;

        let swapchain = self.swapchain.current()?;
        let image_index = match frame.acquire(swapchain)? {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::Suboptimal(_) | AcquireOutcome::OutOfDate => {
                self.swapchain.mark_stale();
                return Ok(self.skip(SkipReason::SwapchainOutOfDate));
            }
        };

        let extent = swapchain.extent();
        let framebuffer = swapchain.framebuffer(image_index)?;
        let render_finished = swapchain.render_finished(image_index)?;
        let sets = self.descriptors.sets_for_frame(slot)?;
        let layout = self.pipelines.layout()?;
        let render_pass = self.render_pass.handle()?;

        let (camera, draw_result) = {
            let recorder = frame.begin()?;
            recorder.begin_render_pass(render_pass, framebuffer, extent, self.clear_color);
            recorder.set_viewport_scissor(extent);
            recorder.bind_descriptor_sets(layout, &sets);

            let mut context = RenderingContext {
                recorder: &recorder,
                meshes: &self.meshes,
                pipelines: &self.pipelines,
                descriptors: &self.descriptors,
                layout,
                extent,
                camera: self.camera,
                bound_pipeline: None,
                draws: 0,
            };
            let result = draw(&mut context);
            let camera = context.camera;
            recorder.end_render_pass();
            (camera, result)
        };

        self.camera = camera;
        frame.write_uniform(&camera)?;
        frame.submit(render_finished)?;
        let presented = frame.present(swapchain, render_finished)?;
        if presented.needs_recreation() {
            self.swapchain.mark_stale();
        }

        self.frames.advance();
        self.stats.submitted += 1;
        draw_result?;
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        self.stats.skipped += 1;
        log::debug!("Frame skipped: {reason:?}");
        FrameOutcome::Skipped(reason)
    }

    /// Upload a mesh, building a pipeline for its vertex type on first use
    pub fn upload_mesh<V: VertexType>(
        &mut self,
        vertices: &[V],
        indices: &[u32],
    ) -> VulkanResult<MeshHandle> {
        let pipeline = self.pipelines.get_or_create(&V::LAYOUT)?;
        self.meshes.upload(
            &self.buffers,
            bytemuck::cast_slice(vertices),
            vertices.len(),
            indices,
            pipeline,
        )
    }

    /// Release a mesh once the GPU has finished with it
    ///
    /// Waits for the device to go idle, so no in-flight frame can still
    /// reference the buffers.
    pub fn remove_mesh(&mut self, mesh: MeshHandle) -> VulkanResult<()> {
        if !self.meshes.contains(mesh) {
            return Err(VulkanError::ResourceNotFound {
                kind: "Mesh",
                handle: mesh.to_string(),
            });
        }
        self.device.wait_idle()?;
        self.meshes.remove(mesh)
    }

    /// Upload tightly packed RGBA8 pixels
    pub fn upload_texture(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> VulkanResult<TextureHandle> {
        self.textures.upload_texture(&self.buffers, pixels, width, height)
    }

    /// Upload 8-bit pixels with 1 to 4 channels
    pub fn upload_texture_with_channels(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        channels: u8,
    ) -> VulkanResult<TextureHandle> {
        let rgba = expand_to_rgba(pixels, channels)?;
        self.upload_texture(&rgba, width, height)
    }

    /// Append a texture to the bindless array
    pub fn add_material(&mut self, texture: TextureHandle) -> VulkanResult<MaterialIndex> {
        let texture = self
            .textures
            .get(texture)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                kind: "Texture",
                handle: texture.to_string(),
            })?;
        self.descriptors.add_material(texture)
    }

    /// Record a new window size; the swapchain is rebuilt next tick
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        log::debug!("Resize notified: {width}x{height}");
        self.swapchain.notify_resize(width, height);
    }

    /// Camera payload used when a frame callback does not set one
    pub fn set_camera(&mut self, camera: CameraUniform) {
        self.camera = camera;
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// Frame counters
    pub const fn stats(&self) -> FrameStats {
        FrameStats {
            recreations: self.swapchain.recreation_count(),
            ..self.stats
        }
    }

    /// Extent of the active swapchain
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.extent()
    }

    /// Frame slot the next tick will use
    pub const fn current_frame(&self) -> usize {
        self.frames.current_index()
    }

    /// Staging path, for uploads outside meshes and textures
    pub const fn buffers(&self) -> &BufferManager<D> {
        &self.buffers
    }

    /// Uploaded meshes
    pub const fn meshes(&self) -> &MeshManager<D> {
        &self.meshes
    }

    /// Swapchain lifecycle
    pub const fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    /// Frame slots
    pub const fn frames(&self) -> &FrameRing<D> {
        &self.frames
    }

    /// Uploaded textures
    pub const fn textures(&self) -> &TextureManager<D> {
        &self.textures
    }
}

impl<D: DeviceApi> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Device wait failed during renderer shutdown: {err}");
        }
        log::debug!("Releasing renderer resources");
    }
}
