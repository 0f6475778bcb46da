use std::rc::Rc;

use ash::vk;

use super::{config, quad, renderer};
use crate::render::api::{CameraUniform, MaterialIndex, IDENTITY};
use crate::render::backends::mock::{MockDevice, MockEvent};
use crate::render::backends::vulkan::error::VulkanError;
use crate::render::backends::vulkan::rendering::Command;
use crate::render::renderer::{FrameOutcome, SkipReason};

fn frame_fences(renderer: &crate::render::Renderer<MockDevice>) -> Vec<vk::Fence> {
    (0..renderer.frames().len())
        .map(|slot| {
            renderer
                .frames()
                .get(slot)
                .and_then(|frame| frame.fence().ok())
                .expect("frame fence")
        })
        .collect()
}

fn submits(events: &[MockEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, MockEvent::Submit { .. }))
        .count()
}

#[test]
fn test_five_frames_rotate_slots_and_wait_fences() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let (vertices, indices) = quad();
    let mesh = renderer.upload_mesh(&vertices, &indices).expect("mesh");
    let texture = renderer
        .upload_texture(&[255, 128, 0, 255], 1, 1)
        .expect("texture");
    let material = renderer.add_material(texture).expect("material");
    let fences = frame_fences(&renderer);
    device.clear_events();

    let mut slots = Vec::new();
    for _ in 0..5 {
        let outcome = renderer
            .draw_frame(|frame| frame.draw_mesh(mesh, IDENTITY, material))
            .expect("draw");
        match outcome {
            FrameOutcome::Presented { slot, .. } => slots.push(slot),
            FrameOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }
    assert_eq!(slots, vec![0, 1, 0, 1, 0]);

    // Each submission's fence was waited on since that slot's last use.
    let mut last_wait = None;
    let mut submitted_fences = Vec::new();
    for event in device.events() {
        match event {
            MockEvent::FenceWait(fence) => last_wait = Some(fence),
            MockEvent::Submit { fence, .. } => {
                assert_eq!(last_wait.take(), Some(fence));
                submitted_fences.push(fence);
            }
            _ => {}
        }
    }
    let expected: Vec<_> = (0..5).map(|tick| fences[tick % 2]).collect();
    assert_eq!(submitted_fences, expected);

    for commands in device.submitted().iter().rev().take(5) {
        let draws: Vec<_> = commands
            .iter()
            .filter(|command| matches!(command, Command::DrawIndexed { .. }))
            .collect();
        assert_eq!(draws, vec![&Command::DrawIndexed { index_count: 6 }]);
        assert!(matches!(commands.first(), Some(Command::BeginRenderPass { .. })));
        assert_eq!(commands.last(), Some(&Command::EndRenderPass));
    }
    assert_eq!(renderer.stats().submitted, 5);
    assert_eq!(renderer.stats().skipped, 0);
}

#[test]
fn test_resize_skips_one_frame_then_matches_extent() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    renderer.draw_frame(|_| Ok(())).expect("first frame");

    device.set_surface_extent(1024, 768);
    device.clear_events();
    let outcome = renderer.draw_frame(|_| Ok(())).expect("stale frame");
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::SwapchainOutOfDate));
    let events = device.events();
    assert_eq!(submits(&events), 0);
    assert!(!events.iter().any(|e| matches!(e, MockEvent::FenceReset(_))));

    let outcome = renderer.draw_frame(|_| Ok(())).expect("recreated frame");
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(
        renderer.extent(),
        Some(vk::Extent2D {
            width: 1024,
            height: 768
        })
    );
    let stats = renderer.stats();
    assert_eq!(stats.recreations, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.submitted, 2);
}

#[test]
fn test_minimized_window_skips_until_restored() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));

    device.set_surface_extent(0, 0);
    renderer.notify_resize(0, 0);
    for _ in 0..3 {
        assert_eq!(
            renderer.draw_frame(|_| Ok(())).expect("minimized"),
            FrameOutcome::Skipped(SkipReason::ZeroExtent)
        );
    }

    device.set_surface_extent(640, 480);
    renderer.notify_resize(640, 480);
    let outcome = renderer.draw_frame(|_| Ok(())).expect("restored");
    assert!(matches!(outcome, FrameOutcome::Presented { slot: 0, .. }));
    assert_eq!(
        renderer.extent(),
        Some(vk::Extent2D {
            width: 640,
            height: 480
        })
    );
}

#[test]
fn test_suboptimal_acquire_recovers_without_leaking_semaphores() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let semaphores = device.live_of_kind("Semaphore");

    device.force_suboptimal(1);
    assert_eq!(
        renderer.draw_frame(|_| Ok(())).expect("suboptimal"),
        FrameOutcome::Skipped(SkipReason::SwapchainOutOfDate)
    );
    assert!(matches!(
        renderer.draw_frame(|_| Ok(())).expect("next"),
        FrameOutcome::Presented { .. }
    ));
    assert_eq!(device.live_of_kind("Semaphore"), semaphores);
    assert_eq!(device.double_destroy_count(), 0);
}

#[test]
fn test_camera_set_in_callback_reaches_uniform() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let mut view = IDENTITY;
    view[3] = [0.0, 0.0, -3.0, 1.0];
    let camera = CameraUniform {
        view,
        projection: IDENTITY,
    };

    renderer
        .draw_frame(|frame| {
            assert_eq!(frame.viewport_width(), 800);
            assert_eq!(frame.viewport_height(), 600);
            frame.set_uniform(camera);
            Ok(())
        })
        .expect("draw");

    let uniform = renderer
        .frames()
        .get(0)
        .and_then(|frame| frame.uniform().get().ok().map(|raw| raw.handle))
        .expect("uniform");
    assert_eq!(
        device.buffer_contents(uniform),
        Some(bytemuck::bytes_of(&camera).to_vec())
    );
}

#[test]
fn test_failed_draw_still_submits_and_next_frame_runs() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let (vertices, indices) = quad();
    let mesh = renderer.upload_mesh(&vertices, &indices).expect("mesh");
    device.clear_events();

    let err = renderer
        .draw_frame(|frame| frame.draw_mesh(mesh, IDENTITY, MaterialIndex(0)))
        .expect_err("no material issued");
    assert!(matches!(
        err,
        VulkanError::ResourceNotFound {
            kind: "Material",
            ..
        }
    ));
    assert_eq!(submits(&device.events()), 1);

    for _ in 0..3 {
        renderer.draw_frame(|_| Ok(())).expect("recovered");
    }
}

#[test]
fn test_removed_mesh_cannot_be_drawn() {
    let device = Rc::new(MockDevice::new());
    let mut renderer = renderer(&device, &config(2));
    let (vertices, indices) = quad();
    let mesh = renderer.upload_mesh(&vertices, &indices).expect("mesh");
    let texture = renderer.upload_texture(&[0; 4], 1, 1).expect("texture");
    let material = renderer.add_material(texture).expect("material");
    device.clear_events();

    renderer.remove_mesh(mesh).expect("remove");
    assert!(device.events().contains(&MockEvent::WaitIdle));
    assert!(renderer.remove_mesh(mesh).is_err());

    let err = renderer
        .draw_frame(|frame| frame.draw_mesh(mesh, IDENTITY, material))
        .expect_err("stale mesh");
    assert!(matches!(
        err,
        VulkanError::ResourceNotFound { kind: "Mesh", .. }
    ));
}

#[test]
fn test_shutdown_releases_every_object_once() {
    let device = Rc::new(MockDevice::new());
    {
        let mut renderer = renderer(&device, &config(3));
        let (vertices, indices) = quad();
        let mesh = renderer.upload_mesh(&vertices, &indices).expect("mesh");
        let texture = renderer.upload_texture(&[9; 4], 1, 1).expect("texture");
        let material = renderer.add_material(texture).expect("material");
        for _ in 0..4 {
            renderer
                .draw_frame(|frame| frame.draw_mesh(mesh, IDENTITY, material))
                .expect("draw");
        }
        device.set_surface_extent(300, 200);
        renderer.draw_frame(|_| Ok(())).expect("stale");
        renderer.draw_frame(|_| Ok(())).expect("recreated");
    }
    assert_eq!(device.live_count(), 0);
    assert_eq!(device.double_destroy_count(), 0);
}
