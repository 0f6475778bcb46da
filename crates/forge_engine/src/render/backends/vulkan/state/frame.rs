//! Frames in flight
//!
//! Each [`Frame`] slot owns a command buffer, the semaphore the swapchain
//! signals when an image is acquired, the fence that tracks the slot's last
//! submission and a host-visible uniform buffer for per-frame data. The
//! render-finished semaphore belongs to the swapchain image instead, because
//! the number of images rarely equals the number of slots.
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//!             |
//!             +-- out of date / suboptimal --> Idle (fence untouched)
//! ```

use std::rc::Rc;

use ash::vk;

use super::swapchain::SwapChain;
use super::sync::{Fence, Semaphore};
use crate::render::api::CameraUniform;
use crate::render::backends::vulkan::device_api::{DeviceApi, Submission};
use crate::render::backends::vulkan::error::{AcquireOutcome, PresentOutcome, VulkanError, VulkanResult};
use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::resources::buffer::{BufferManager, STAGING_PROPERTIES};
use crate::render::backends::vulkan::resources::managed::BufferAllocation;

/// Where a frame slot is in its tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Waiting for the next tick
    Idle,
    /// Waiting for a swapchain image
    Acquiring,
    /// Command buffer open
    Recording,
    /// Work handed to the queue
    Submitted,
    /// Presentation queued
    Presenting,
}

/// One in-flight frame slot
pub struct Frame<D: DeviceApi> {
    uniform: BufferAllocation<D>,
    image_available: Semaphore<D>,
    in_flight: Fence<D>,
    command_buffer: vk::CommandBuffer,
    pool: CommandPool<D>,
    stale_semaphore: bool,
    image_index: Option<u32>,
    state: FrameState,
    slot: usize,
}

impl<D: DeviceApi> Frame<D> {
    /// Create slot `slot` with its command buffer and sync objects
    ///
    /// The fence starts signaled so the first wait returns immediately.
    pub fn new(device: &Rc<D>, buffers: &BufferManager<D>, slot: usize) -> VulkanResult<Self> {
        let pool = CommandPool::create(device.clone())?;
        let command_buffer = pool
            .allocate_command_buffers(1)?
            .first()
            .copied()
            .ok_or_else(|| VulkanError::invalid("command pool returned no command buffer"))?;
        let uniform = buffers.allocate(
            std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            STAGING_PROPERTIES,
        )?;
        Ok(Self {
            uniform,
            image_available: Semaphore::create(device.clone())?,
            in_flight: Fence::create(device.clone(), true)?,
            command_buffer,
            pool,
            stale_semaphore: false,
            image_index: None,
            state: FrameState::Idle,
            slot,
        })
    }

    /// Slot index
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Current state
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Per-frame uniform buffer
    pub const fn uniform(&self) -> &BufferAllocation<D> {
        &self.uniform
    }

    /// Raw in-flight fence
    pub fn fence(&self) -> VulkanResult<vk::Fence> {
        self.in_flight.handle()
    }

    /// Block until the slot's previous submission has finished
    pub fn wait_in_flight(&self) -> VulkanResult<()> {
        self.in_flight.wait()
    }

    /// Acquire the next swapchain image for this slot
    ///
    /// Out-of-date and suboptimal results leave the slot idle with its fence
    /// still signaled. A suboptimal acquire has already signaled the
    /// image-available semaphore, so it is swapped out by
    /// [`Frame::refresh_semaphore`] once the device is idle.
    pub fn acquire(&mut self, swapchain: &SwapChain<D>) -> VulkanResult<AcquireOutcome> {
        self.state = FrameState::Acquiring;
        let device = self.pool.device();
        let outcome =
            device.acquire_next_image(swapchain.handle()?, self.image_available.handle()?);
        match outcome {
            Ok(AcquireOutcome::Acquired(index)) => self.image_index = Some(index),
            Ok(AcquireOutcome::Suboptimal(_)) => {
                self.stale_semaphore = true;
                self.state = FrameState::Idle;
            }
            Ok(AcquireOutcome::OutOfDate) | Err(_) => self.state = FrameState::Idle,
        }
        outcome
    }

    /// Replace a semaphore left signaled by an abandoned acquire
    ///
    /// Must only run while the device is idle.
    pub fn refresh_semaphore(&mut self) -> VulkanResult<()> {
        if self.stale_semaphore {
            self.image_available = Semaphore::create(self.pool.device().clone())?;
            self.stale_semaphore = false;
            log::trace!("Frame {} image-available semaphore replaced", self.slot);
        }
        Ok(())
    }

    /// Write this frame's camera payload
    pub fn write_uniform(&self, camera: &CameraUniform) -> VulkanResult<()> {
        self.pool
            .device()
            .write_mapped(self.uniform.get()?, 0, bytemuck::bytes_of(camera))
    }

    /// Reset the fence and open the command buffer
    ///
    /// Only called once the slot is certain to submit.
    pub fn begin(&mut self) -> VulkanResult<CommandRecorder<'_, D>> {
        if self.state != FrameState::Acquiring || self.image_index.is_none() {
            return Err(VulkanError::invalid(format!(
                "frame {} begin without an acquired image",
                self.slot
            )));
        }
        self.in_flight.reset()?;
        let device = self.pool.device();
        device.reset_command_buffer(self.command_buffer)?;
        device.begin_command_buffer(self.command_buffer, true)?;
        self.state = FrameState::Recording;
        Ok(CommandRecorder::new(device.as_ref(), self.command_buffer))
    }

    /// Close the command buffer and submit it
    ///
    /// Waits on image-available at color output, signals `render_finished`
    /// and the slot's fence.
    pub fn submit(&mut self, render_finished: vk::Semaphore) -> VulkanResult<()> {
        if self.state != FrameState::Recording {
            return Err(VulkanError::invalid(format!(
                "frame {} submitted while {:?}",
                self.slot, self.state
            )));
        }
        let device = self.pool.device();
        device.end_command_buffer(self.command_buffer)?;
        device.submit(&Submission {
            command_buffer: self.command_buffer,
            wait_semaphores: &[self.image_available.handle()?],
            wait_stages: &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            signal_semaphores: &[render_finished],
            fence: self.in_flight.handle()?,
        })?;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Queue presentation of the acquired image
    pub fn present(
        &mut self,
        swapchain: &SwapChain<D>,
        render_finished: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let image_index = self
            .image_index
            .take()
            .filter(|_| self.state == FrameState::Submitted)
            .ok_or_else(|| VulkanError::invalid(format!("frame {} has nothing to present", self.slot)))?;
        self.state = FrameState::Presenting;
        let outcome = self
            .pool
            .device()
            .present(swapchain.handle()?, image_index, render_finished);
        self.state = FrameState::Idle;
        outcome
    }

    /// Image acquired for the tick in progress
    pub const fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// Release the slot's objects now
    pub fn destroy(&mut self) {
        if !self.pool.is_alive() {
            return;
        }
        self.uniform.destroy();
        self.image_available.destroy();
        self.in_flight.destroy();
        if let Err(err) = self.pool.free_command_buffers(&[self.command_buffer]) {
            log::debug!("Frame {} command buffer already released: {err}", self.slot);
        }
        self.pool.destroy();
    }
}

/// Fixed ring of frame slots advanced round-robin
pub struct FrameRing<D: DeviceApi> {
    frames: Vec<Frame<D>>,
    current: usize,
}

impl<D: DeviceApi> FrameRing<D> {
    /// Create `count` frame slots
    pub fn new(device: &Rc<D>, buffers: &BufferManager<D>, count: usize) -> VulkanResult<Self> {
        if count == 0 {
            return Err(VulkanError::invalid("at least one frame in flight is required"));
        }
        let frames = (0..count)
            .map(|slot| Frame::new(device, buffers, slot))
            .collect::<VulkanResult<Vec<_>>>()?;
        log::debug!("Created {count} frames in flight");
        Ok(Self { frames, current: 0 })
    }

    /// Slot used by the next tick
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Frame used by the next tick
    pub fn current_mut(&mut self) -> VulkanResult<&mut Frame<D>> {
        let current = self.current;
        self.frames
            .get_mut(current)
            .ok_or_else(|| VulkanError::invalid(format!("no frame slot {current}")))
    }

    /// Frame of slot `slot`
    pub fn get(&self, slot: usize) -> Option<&Frame<D>> {
        self.frames.get(slot)
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the ring has no slots
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Swap out semaphores left signaled by abandoned acquires
    pub fn refresh_semaphores(&mut self) -> VulkanResult<()> {
        self.frames.iter_mut().try_for_each(Frame::refresh_semaphore)
    }

    /// Release every slot
    pub fn destroy(&mut self) {
        self.frames.iter_mut().for_each(Frame::destroy);
        self.frames.clear();
    }
}

impl<D: DeviceApi> std::fmt::Debug for FrameRing<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRing")
            .field("frames", &self.frames.len())
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::{MockDevice, MockEvent};
    use crate::render::backends::vulkan::resources::transfer::TransferContext;
    use crate::render::backends::vulkan::state::swapchain::SwapchainManager;
    use ash::vk::Handle;

    struct Fixture {
        device: Rc<MockDevice>,
        buffers: BufferManager<MockDevice>,
        swapchain: SwapchainManager<MockDevice>,
    }

    fn fixture() -> Fixture {
        let device = Rc::new(MockDevice::new());
        let transfer = Rc::new(TransferContext::new(device.clone()).expect("transfer"));
        let buffers = BufferManager::new(device.clone(), transfer);
        let mut swapchain = SwapchainManager::new(
            device.clone(),
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            false,
        )
        .expect("swapchain manager");
        swapchain
            .initialize(vk::RenderPass::from_raw(99))
            .expect("initialize");
        Fixture {
            device,
            buffers,
            swapchain,
        }
    }

    #[test]
    fn test_frame_tick_walks_states() {
        let fx = fixture();
        let mut frame = Frame::new(&fx.device, &fx.buffers, 0).expect("frame");
        let swapchain = fx.swapchain.current().expect("active");
        assert_eq!(frame.state(), FrameState::Idle);

        frame.wait_in_flight().expect("first wait returns");
        let outcome = frame.acquire(swapchain).expect("acquire");
        assert_eq!(outcome, AcquireOutcome::Acquired(0));
        frame.write_uniform(&CameraUniform::IDENTITY).expect("uniform");

        let recorder = frame.begin().expect("begin");
        recorder.draw_indexed(6);
        assert_eq!(frame.state(), FrameState::Recording);

        let render_finished = swapchain.render_finished(0).expect("semaphore");
        frame.submit(render_finished).expect("submit");
        assert_eq!(frame.state(), FrameState::Submitted);
        assert_eq!(
            frame.present(swapchain, render_finished).expect("present"),
            PresentOutcome::Presented
        );
        assert_eq!(frame.state(), FrameState::Idle);
        frame.wait_in_flight().expect("submission signaled the fence");
    }

    #[test]
    fn test_out_of_date_acquire_keeps_fence_signaled() {
        let fx = fixture();
        let mut frame = Frame::new(&fx.device, &fx.buffers, 1).expect("frame");
        let swapchain = fx.swapchain.current().expect("active");
        fx.device.force_out_of_date(1);
        fx.device.clear_events();

        assert_eq!(
            frame.acquire(swapchain).expect("acquire"),
            AcquireOutcome::OutOfDate
        );
        assert_eq!(frame.state(), FrameState::Idle);
        assert!(frame.begin().is_err());
        frame.wait_in_flight().expect("fence untouched");
        assert!(!fx
            .device
            .events()
            .iter()
            .any(|event| matches!(event, MockEvent::FenceReset(_))));
    }

    #[test]
    fn test_suboptimal_acquire_replaces_semaphore() {
        let fx = fixture();
        let mut frame = Frame::new(&fx.device, &fx.buffers, 0).expect("frame");
        let swapchain = fx.swapchain.current().expect("active");
        let before = frame.image_available.handle().expect("alive");
        fx.device.force_suboptimal(1);

        assert!(matches!(
            frame.acquire(swapchain).expect("acquire"),
            AcquireOutcome::Suboptimal(_)
        ));
        frame.refresh_semaphore().expect("refresh");
        assert_ne!(frame.image_available.handle().expect("alive"), before);
        assert_eq!(fx.device.double_destroy_count(), 0);
    }

    #[test]
    fn test_ring_advances_round_robin() {
        let fx = fixture();
        let mut ring = FrameRing::new(&fx.device, &fx.buffers, 2).expect("ring");
        let order: Vec<usize> = (0..5)
            .map(|_| {
                let slot = ring.current_index();
                ring.advance();
                slot
            })
            .collect();
        assert_eq!(order, vec![0, 1, 0, 1, 0]);
        assert!(FrameRing::new(&fx.device, &fx.buffers, 0).is_err());
    }

    #[test]
    fn test_ring_destroy_releases_slots() {
        let fx = fixture();
        let baseline = fx.device.live_count();
        let mut ring = FrameRing::new(&fx.device, &fx.buffers, 3).expect("ring");
        assert_eq!(fx.device.live_of_kind("Fence"), 4);
        ring.destroy();
        assert_eq!(fx.device.live_count(), baseline);
        drop(ring);
        assert_eq!(fx.device.double_destroy_count(), 0);
    }
}
