//! Cross-module scenarios driven against the mock device

mod frame_loop;
mod resources;

use std::rc::Rc;

use crate::core::RendererConfig;
use crate::render::backends::mock::MockDevice;
use crate::render::backends::vulkan::rendering::{ShaderCode, Vertex};
use crate::render::renderer::Renderer;
use ash::vk;

const SPIRV_MAGIC: u32 = 0x0723_0203;

fn config(frames: usize) -> RendererConfig {
    RendererConfig::new("scenario")
        .with_max_frames_in_flight(frames)
        .with_validation(false)
}

fn renderer(device: &Rc<MockDevice>, config: &RendererConfig) -> Renderer<MockDevice> {
    Renderer::new(
        device.clone(),
        config,
        ShaderCode::from_words(vec![SPIRV_MAGIC, 1], vec![SPIRV_MAGIC, 2]),
        vk::Extent2D {
            width: 800,
            height: 600,
        },
    )
    .expect("renderer")
}

fn quad() -> ([Vertex; 4], [u32; 6]) {
    (
        [
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0]),
        ],
        [0, 1, 2, 2, 3, 0],
    )
}
