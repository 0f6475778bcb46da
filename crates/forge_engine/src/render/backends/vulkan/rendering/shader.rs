//! Shader loading and graphics pipeline creation
//!
//! SPIR-V is read once at startup into [`ShaderCode`]. Pipelines are built
//! lazily, one per distinct [`VertexLayout`], and cached for the renderer's
//! lifetime. All pipelines share one layout: set 0 (frame uniform), set 1
//! (bindless textures) and an 80-byte push constant range.

use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::rc::Rc;

use ash::vk;

use super::vertex_layout::VertexLayout;
use crate::core::config::ShaderConfig;
use crate::foundation::collections::Registry;
use crate::render::api::{PipelineHandle, PushConstants};
use crate::render::backends::vulkan::device_api::{DeviceApi, PipelineDesc};
use crate::render::backends::vulkan::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::resources::managed::Managed;

/// Shader module
pub type ShaderModule<D> = Managed<D, vk::ShaderModule>;

/// Graphics pipeline
pub type Pipeline<D> = Managed<D, vk::Pipeline>;

/// Pipeline layout
pub type PipelineLayout<D> = Managed<D, vk::PipelineLayout>;

/// Stages that read the push constant block
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// SPIR-V words of the vertex and fragment stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderCode {
    /// Vertex stage
    pub vertex: Vec<u32>,
    /// Fragment stage
    pub fragment: Vec<u32>,
}

impl ShaderCode {
    /// Read both blobs named by `config`
    ///
    /// A missing or malformed file is a [`VulkanError::ShaderLoad`].
    pub fn load(config: &ShaderConfig) -> VulkanResult<Self> {
        Ok(Self {
            vertex: Self::read_file(&config.vertex_shader_path)?,
            fragment: Self::read_file(&config.fragment_shader_path)?,
        })
    }

    /// Wrap already loaded words
    pub const fn from_words(vertex: Vec<u32>, fragment: Vec<u32>) -> Self {
        Self { vertex, fragment }
    }

    /// Decode SPIR-V bytes (little-endian words with the magic number)
    pub fn words_from_bytes(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
        ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| VulkanError::ShaderLoad {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })
    }

    fn read_file(path: &Path) -> VulkanResult<Vec<u32>> {
        let shader_error = |reason: String| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason,
        };
        log::debug!("Loading shader from {}", path.display());
        let mut file = File::open(path).map_err(|e| shader_error(e.to_string()))?;
        ash::util::read_spv(&mut file).map_err(|e| shader_error(e.to_string()))
    }
}

/// One pipeline per vertex layout, sharing a pipeline layout
pub struct PipelineCache<D: DeviceApi> {
    pipelines: Registry<Pipeline<D>>,
    by_layout: HashMap<VertexLayout, PipelineHandle>,
    layout: PipelineLayout<D>,
    shaders: ShaderCode,
    render_pass: vk::RenderPass,
    device: Rc<D>,
}

impl<D: DeviceApi> PipelineCache<D> {
    /// Create the shared pipeline layout
    ///
    /// `render_pass` must outlive the cache.
    pub fn new(
        device: Rc<D>,
        shaders: ShaderCode,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        let push_constant_range = vk::PushConstantRange {
            stage_flags: PUSH_CONSTANT_STAGES,
            offset: 0,
            size: std::mem::size_of::<PushConstants>() as u32,
        };
        let layout = PipelineLayout::new(
            device.clone(),
            device.create_pipeline_layout(set_layouts, &[push_constant_range])?,
        );
        Ok(Self {
            pipelines: Registry::new(),
            by_layout: HashMap::new(),
            layout,
            shaders,
            render_pass,
            device,
        })
    }

    /// Pipeline for `vertex_layout`, building it on first use
    pub fn get_or_create(&mut self, vertex_layout: &VertexLayout) -> VulkanResult<PipelineHandle> {
        if let Some(handle) = self.by_layout.get(vertex_layout) {
            return Ok(*handle);
        }

        // Modules are only needed while the pipeline is built.
        let vertex_shader = ShaderModule::new(
            self.device.clone(),
            self.device.create_shader_module(&self.shaders.vertex)?,
        );
        let fragment_shader = ShaderModule::new(
            self.device.clone(),
            self.device.create_shader_module(&self.shaders.fragment)?,
        );

        let pipeline = self.device.create_graphics_pipeline(&PipelineDesc {
            render_pass: self.render_pass,
            layout: self.layout.handle()?,
            vertex_shader: vertex_shader.handle()?,
            fragment_shader: fragment_shader.handle()?,
            vertex_layout,
        })?;

        let handle = PipelineHandle(
            self.pipelines
                .add(Pipeline::new(self.device.clone(), pipeline)),
        );
        self.by_layout.insert(*vertex_layout, handle);
        log::debug!(
            "Built graphics pipeline {handle} for {}-byte vertices",
            vertex_layout.stride
        );
        Ok(handle)
    }

    /// Raw pipeline behind `handle`
    pub fn get(&self, handle: PipelineHandle) -> VulkanResult<vk::Pipeline> {
        self.pipelines
            .get(handle.0)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                kind: "Pipeline",
                handle: handle.to_string(),
            })?
            .handle()
    }

    /// Shared pipeline layout
    pub fn layout(&self) -> VulkanResult<vk::PipelineLayout> {
        self.layout.handle()
    }

    /// Number of pipelines built
    pub const fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether no pipeline has been built yet
    pub const fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
