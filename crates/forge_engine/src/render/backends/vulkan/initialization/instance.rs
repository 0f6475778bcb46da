//! Vulkan instance and diagnostic messenger
//!
//! The diagnostic messenger is registered only when validation is enabled
//! in the renderer config. Its messages go to the `log` facade at the level
//! matching the reported severity and never change control flow.

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};

use crate::core::config::{DiagnosticSeverity, RendererConfig};
use crate::render::backends::vulkan::error::{VkCheck, VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"Forge Engine\0") };

/// Message severities the messenger subscribes to
pub fn severity_mask(severities: DiagnosticSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let mut mask = vk::DebugUtilsMessageSeverityFlagsEXT::empty();
    if severities.contains(DiagnosticSeverity::VERBOSE) {
        mask |= vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE;
    }
    if severities.contains(DiagnosticSeverity::INFO) {
        mask |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
    }
    if severities.contains(DiagnosticSeverity::WARNING) {
        mask |= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
    }
    if severities.contains(DiagnosticSeverity::ERROR) {
        mask |= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    }
    mask
}

/// Log level a diagnostic message of `severity` is emitted at
pub fn log_level_for(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy()
    };
    log::log!(
        target: "vulkan",
        log_level_for(message_severity),
        "[{:?}] {}",
        message_type,
        message
    );
    vk::FALSE
}

struct DebugMessenger {
    loader: DebugUtils,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    debug: Option<DebugMessenger>,
    instance: Instance,
    entry: Entry,
}

impl VulkanInstance {
    /// Load the Vulkan library and create an instance
    ///
    /// `window_extensions` are the surface extensions the window needs.
    /// A missing validation layer is logged and skipped.
    pub fn new(config: &RendererConfig, window_extensions: &[CString]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|err| VulkanError::Loader(format!("failed to load Vulkan: {err}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::invalid("application name contains a NUL byte"))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let validation = config.enable_validation && Self::has_validation_layer(&entry)?;
        if config.enable_validation && !validation {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let mut extensions: Vec<*const c_char> =
            window_extensions.iter().map(|name| name.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .check("vkCreateInstance")?;

        let debug = if validation {
            match Self::create_messenger(&entry, &instance, config.diagnostic_severities) {
                Ok(messenger) => Some(messenger),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        log::info!(
            "Vulkan instance created for '{}' (validation {})",
            config.application_name,
            if validation { "on" } else { "off" }
        );
        Ok(Self {
            debug,
            instance,
            entry,
        })
    }

    fn has_validation_layer(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .check("vkEnumerateInstanceLayerProperties")?;
        Ok(layers.iter().any(|layer| {
            // SAFETY: layer_name is a NUL-terminated fixed-size array.
            (unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }) == VALIDATION_LAYER
        }))
    }

    fn create_messenger(
        entry: &Entry,
        instance: &Instance,
        severities: DiagnosticSeverity,
    ) -> VulkanResult<DebugMessenger> {
        let loader = DebugUtils::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(severity_mask(severities))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));
        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .check("vkCreateDebugUtilsMessengerEXT")?;
        Ok(DebugMessenger { loader, handle })
    }

    /// Vulkan entry points
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance handle and function table
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Whether the diagnostic messenger is registered
    pub const fn has_messenger(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.handle, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
