//! Vulkan error taxonomy and status-code checking
//!
//! Every `vk::Result` returned by the driver is classified by origin
//! (memory, device, initialization, validation, unknown) and carries the
//! name of the call that produced it.

use std::fmt;

use ash::vk;

use crate::config::ConfigError;

/// A failed API call: raw status, the call name and optional context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// Raw status code returned by the driver
    pub code: vk::Result,
    /// Name of the API entry point that failed
    pub operation: &'static str,
    /// Additional caller-supplied context
    pub context: Option<String>,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned {:?} ({})", self.operation, self.code, self.code.as_raw())?;
        if let Some(context) = &self.context {
            write!(f, ": {context}")?;
        }
        Ok(())
    }
}

/// Vulkan-specific errors
#[derive(thiserror::Error, Debug)]
pub enum VulkanError {
    /// Host or device memory exhausted, or a pool ran dry
    #[error("Memory error: {0}")]
    Memory(ApiFailure),

    /// Device lost, or a required feature/extension/format is missing
    #[error("Device error: {0}")]
    Device(ApiFailure),

    /// Driver or layer initialization failed
    #[error("Initialization error: {0}")]
    Initialization(ApiFailure),

    /// Misuse reported by the validation layers
    #[error("Validation error: {0}")]
    Validation(ApiFailure),

    /// Status code outside the known taxonomy
    #[error("Unknown Vulkan error: {0}")]
    Unknown(ApiFailure),

    /// The Vulkan loader could not be found or opened
    #[error("Failed to load Vulkan: {0}")]
    Loader(String),

    /// No physical device satisfies the suitability predicates
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Operation attempted on a resource after it was destroyed
    #[error("{resource} used after it was destroyed")]
    AlreadyDestroyed {
        /// Kind of resource that was used
        resource: &'static str,
    },

    /// Image layout transition the engine does not know how to barrier
    #[error("Unsupported layout transition: {from:?} -> {to:?}")]
    UnsupportedTransition {
        /// Current layout
        from: vk::ImageLayout,
        /// Requested layout
        to: vk::ImageLayout,
    },

    /// Bindless texture array is full
    #[error("Too many materials: capacity is {capacity}")]
    TooManyMaterials {
        /// Declared array capacity
        capacity: u32,
    },

    /// Handle does not resolve to a live resource
    #[error("{kind} not found: {handle}")]
    ResourceNotFound {
        /// Kind of resource looked up
        kind: &'static str,
        /// Printable form of the handle
        handle: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Shader blob missing or malformed
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Path that was read
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Renderer configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl VulkanError {
    /// Classify a non-success status code returned by `operation`
    pub fn from_result(code: vk::Result, operation: &'static str) -> Self {
        Self::classify(ApiFailure {
            code,
            operation,
            context: None,
        })
    }

    /// Classify a status code and attach a context message
    pub fn with_context(
        code: vk::Result,
        operation: &'static str,
        context: impl Into<String>,
    ) -> Self {
        Self::classify(ApiFailure {
            code,
            operation,
            context: Some(context.into()),
        })
    }

    fn classify(failure: ApiFailure) -> Self {
        match failure.code {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_MEMORY_MAP_FAILED
            | vk::Result::ERROR_TOO_MANY_OBJECTS
            | vk::Result::ERROR_FRAGMENTED_POOL
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::Memory(failure),
            vk::Result::ERROR_DEVICE_LOST
            | vk::Result::ERROR_INCOMPATIBLE_DRIVER
            | vk::Result::ERROR_FEATURE_NOT_PRESENT
            | vk::Result::ERROR_EXTENSION_NOT_PRESENT
            | vk::Result::ERROR_FORMAT_NOT_SUPPORTED
            | vk::Result::ERROR_SURFACE_LOST_KHR => Self::Device(failure),
            vk::Result::ERROR_INITIALIZATION_FAILED | vk::Result::ERROR_LAYER_NOT_PRESENT => {
                Self::Initialization(failure)
            }
            vk::Result::ERROR_VALIDATION_FAILED_EXT => Self::Validation(failure),
            _ => Self::Unknown(failure),
        }
    }

    /// Raw status code, when the error came from an API call
    pub const fn code(&self) -> Option<vk::Result> {
        match self {
            Self::Memory(f)
            | Self::Device(f)
            | Self::Initialization(f)
            | Self::Validation(f)
            | Self::Unknown(f) => Some(f.code),
            _ => None,
        }
    }

    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Converts raw `VkResult`s into classified [`VulkanError`]s
pub trait VkCheck<T> {
    /// Tag a failure with the name of the API call
    fn check(self, operation: &'static str) -> VulkanResult<T>;
}

impl<T> VkCheck<T> for Result<T, vk::Result> {
    fn check(self, operation: &'static str) -> VulkanResult<T> {
        self.map_err(|code| VulkanError::from_result(code, operation))
    }
}

impl VkCheck<()> for vk::Result {
    fn check(self, operation: &'static str) -> VulkanResult<()> {
        match self {
            Self::SUCCESS => Ok(()),
            code => Err(VulkanError::from_result(code, operation)),
        }
    }
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired and the swapchain still matches the surface
    Acquired(u32),
    /// Image acquired but the swapchain should be recreated
    Suboptimal(u32),
    /// Swapchain no longer matches the surface; nothing was acquired
    OutOfDate,
}

/// Result of queueing a presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented and still optimal
    Presented,
    /// Presented but the swapchain should be recreated
    Suboptimal,
    /// Swapchain is out of date and must be recreated
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain must be recreated before the next frame
    pub const fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}
