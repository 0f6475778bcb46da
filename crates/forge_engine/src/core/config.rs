//! # Renderer Configuration
//!
//! Serializable settings consumed by [`crate::render::Engine`] at startup.
//! Files are loaded through the [`Config`] trait (TOML or RON by extension).
//!
//! ```toml
//! application_name = "Quad"
//! max_frames_in_flight = 2
//! max_materials = 1024
//! diagnostic_severities = "WARNING | ERROR"
//! ```

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Upper bound on frames in flight; more only adds latency
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

bitflags! {
    /// Diagnostic-layer message severities the engine subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DiagnosticSeverity: u32 {
        /// Driver and loader chatter
        const VERBOSE = 1 << 0;
        /// Informational messages (resource creation and similar)
        const INFO = 1 << 1;
        /// Likely misuse that is not yet undefined behavior
        const WARNING = 1 << 2;
        /// API misuse
        const ERROR = 1 << 3;
    }
}

impl Default for DiagnosticSeverity {
    fn default() -> Self {
        Self::WARNING | Self::ERROR
    }
}

/// # Shader Configuration
///
/// Paths to the two precompiled SPIR-V blobs of the forward pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: PathBuf,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: PathBuf,
}

impl ShaderConfig {
    /// Directories searched by [`ShaderConfig::with_path_resolution`], in order
    pub const SEARCH_DIRS: [&'static str; 5] = [
        "target/shaders/",
        "shaders/",
        "resources/shaders/",
        "../shaders/",
        "./",
    ];

    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<PathBuf>, fragment_path: impl Into<PathBuf>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Each file resolves to the first search directory that contains it,
    /// falling back to `shaders/<name>` so the eventual load error names a
    /// sensible location.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        Self {
            vertex_shader_path: Self::resolve(base_vertex),
            fragment_shader_path: Self::resolve(base_fragment),
        }
    }

    fn resolve(file_name: &str) -> PathBuf {
        Self::SEARCH_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(file_name))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| Path::new("shaders").join(file_name))
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (stage, path) in [
            ("Vertex", &self.vertex_shader_path),
            ("Fragment", &self.fragment_shader_path),
        ] {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!(
                    "{stage} shader not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("forward_vert.spv", "forward_frag.spv")
    }
}

/// # Renderer Configuration
///
/// Application metadata, frame pacing and diagnostics for the Vulkan renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Number of frame slots recorded ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Capacity of the bindless texture array
    pub max_materials: u32,
    /// Whether to enable Vulkan validation layers
    pub enable_validation: bool,
    /// Validation message severities routed to the log
    pub diagnostic_severities: DiagnosticSeverity,
    /// Color the render pass clears to
    pub clear_color: [f32; 4],
    /// Use MAILBOX presentation when the surface offers it
    pub prefer_mailbox: bool,
    /// Default `env_logger` filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 2,
            max_materials: 1024,
            enable_validation: cfg!(debug_assertions),
            diagnostic_severities: DiagnosticSeverity::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            prefer_mailbox: true,
            log_level: "info".to_string(),
        }
    }

    /// Set application version
    #[must_use]
    pub const fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    #[must_use]
    pub const fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Set the bindless texture array capacity
    #[must_use]
    pub const fn with_max_materials(mut self, capacity: u32) -> Self {
        self.max_materials = capacity;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set the subscribed validation severities
    #[must_use]
    pub const fn with_diagnostic_severities(mut self, severities: DiagnosticSeverity) -> Self {
        self.diagnostic_severities = severities;
        self
    }

    /// Set the clear color
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid(
                "Application name cannot be empty".to_string(),
            ));
        }

        if self.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "Max frames in flight must be at least 1".to_string(),
            ));
        }

        if self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "Max frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT_LIMIT}"
            )));
        }

        if self.max_materials == 0 {
            return Err(ConfigError::Invalid(
                "Material capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Forge Engine Application")
    }
}

impl Config for RendererConfig {}
