//! Physical device selection
//!
//! [`PhysicalDeviceSelector::select_best`] walks the devices in enumeration
//! order and returns the first one that passes every suitability check:
//!
//! 1. a queue family with graphics support
//! 2. a queue family that can present to the surface
//! 3. the swapchain device extension
//! 4. at least one surface format and one present mode
//! 5. the descriptor indexing features the bindless texture array needs
//!
//! Checks short-circuit: a device failing (1) is never queried for (2).
//! Surface and instance queries go through [`SurfaceQuery`] so the policy
//! can be exercised without a GPU.

use std::ffi::{CStr, CString};

use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::{vk, Instance};

use super::surface::Surface;
use crate::render::backends::vulkan::device_api::SwapchainSupportDetails;
use crate::render::backends::vulkan::error::{VkCheck, VulkanError, VulkanResult};

/// Device extensions every candidate must support
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Whether `features` cover the bindless texture array
pub const fn supports_bindless(features: &vk::PhysicalDeviceVulkan12Features) -> bool {
    features.descriptor_indexing == vk::TRUE
        && features.descriptor_binding_partially_bound == vk::TRUE
        && features.descriptor_binding_sampled_image_update_after_bind == vk::TRUE
        && features.descriptor_binding_variable_descriptor_count == vk::TRUE
        && features.runtime_descriptor_array == vk::TRUE
}

/// Vulkan 1.2 features reported by `device`
pub fn vulkan12_features(
    instance: &Instance,
    device: vk::PhysicalDevice,
) -> (vk::PhysicalDeviceFeatures, vk::PhysicalDeviceVulkan12Features) {
    let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut vulkan12);
    unsafe { instance.get_physical_device_features2(device, &mut features) };
    let base = features.features;
    (base, vulkan12)
}

/// Run a Vulkan "query count, then query data" call to completion
///
/// `query` is called with a null pointer to read the count, then with a
/// buffer of that size. `INCOMPLETE` (the count grew in between) restarts
/// the pair.
pub fn enumerate_two_call<T, F>(mut query: F) -> VkResult<Vec<T>>
where
    T: Default + Clone,
    F: FnMut(&mut u32, *mut T) -> vk::Result,
{
    loop {
        let mut count = 0_u32;
        query(&mut count, std::ptr::null_mut()).result()?;
        let mut data = vec![T::default(); count as usize];
        match query(&mut count, data.as_mut_ptr()) {
            vk::Result::SUCCESS => {
                data.truncate(count as usize);
                return Ok(data);
            }
            vk::Result::INCOMPLETE => continue,
            err => return Err(err),
        }
    }
}

/// Instance and surface queries used during selection
pub trait SurfaceQuery {
    /// Physical devices in enumeration order
    fn physical_devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>>;

    /// Human-readable device name
    fn device_name(&self, device: vk::PhysicalDevice) -> String;

    /// Queue family properties of `device`
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;

    /// Whether `family` of `device` can present to the surface
    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool>;

    /// Names of the device extensions `device` supports
    fn device_extensions(&self, device: vk::PhysicalDevice) -> VulkanResult<Vec<CString>>;

    /// Surface capabilities, formats and present modes for `device`
    fn swapchain_support(&self, device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupportDetails>;

    /// Whether `device` offers the descriptor indexing features of the
    /// bindless texture array
    fn descriptor_indexing_supported(&self, device: vk::PhysicalDevice) -> bool;
}

/// [`SurfaceQuery`] backed by a live instance and surface
pub struct AshSurfaceQuery<'a> {
    instance: &'a Instance,
    surface: &'a Surface,
}

impl<'a> AshSurfaceQuery<'a> {
    /// Query through `instance` against `surface`
    pub const fn new(instance: &'a Instance, surface: &'a Surface) -> Self {
        Self { instance, surface }
    }
}

impl SurfaceQuery for AshSurfaceQuery<'_> {
    fn physical_devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>> {
        let fp = self.instance.fp_v1_0();
        let handle = self.instance.handle();
        enumerate_two_call(|count, data| unsafe {
            (fp.enumerate_physical_devices)(handle, count, data)
        })
        .check("vkEnumeratePhysicalDevices")
    }

    fn device_name(&self, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        // SAFETY: device_name is a NUL-terminated fixed-size array.
        unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(device)
        }
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface.loader().get_physical_device_surface_support(
                device,
                family,
                self.surface.handle(),
            )
        }
        .check("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    fn device_extensions(&self, device: vk::PhysicalDevice) -> VulkanResult<Vec<CString>> {
        let fp = self.instance.fp_v1_0();
        let properties = enumerate_two_call(|count, data| unsafe {
            (fp.enumerate_device_extension_properties)(device, std::ptr::null(), count, data)
        })
        .check("vkEnumerateDeviceExtensionProperties")?;
        Ok(properties
            .iter()
            // SAFETY: extension_name is a NUL-terminated fixed-size array.
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn swapchain_support(&self, device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupportDetails> {
        query_swapchain_support(self.surface.loader(), device, self.surface.handle())
    }

    fn descriptor_indexing_supported(&self, device: vk::PhysicalDevice) -> bool {
        supports_bindless(&vulkan12_features(self.instance, device).1)
    }
}

/// Query surface capabilities, formats and present modes
pub fn query_swapchain_support(
    loader: &khr::Surface,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VulkanResult<SwapchainSupportDetails> {
    let fp = loader.fp();
    let capabilities = unsafe { loader.get_physical_device_surface_capabilities(device, surface) }
        .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
    let formats = enumerate_two_call(|count, data| unsafe {
        (fp.get_physical_device_surface_formats_khr)(device, surface, count, data)
    })
    .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
    let present_modes = enumerate_two_call(|count, data| unsafe {
        (fp.get_physical_device_surface_present_modes_khr)(device, surface, count, data)
    })
    .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
    Ok(SwapchainSupportDetails {
        capabilities,
        formats,
        present_modes,
    })
}

/// Selected device with its queue families and cached surface support
#[derive(Debug, Clone)]
pub struct PhysicalDeviceSurfaceInfo {
    /// Physical device handle
    pub device: vk::PhysicalDevice,
    /// Device name as reported by the driver
    pub name: String,
    /// Queue family used for graphics and transfer
    pub graphics_family: u32,
    /// Queue family used for presentation
    pub present_family: u32,
    /// Swapchain support at selection time (or the last refresh)
    pub support: SwapchainSupportDetails,
}

impl PhysicalDeviceSurfaceInfo {
    /// Re-query swapchain support, e.g. after a resize
    pub fn refresh_support(&mut self, query: &dyn SurfaceQuery) -> VulkanResult<()> {
        self.support = query.swapchain_support(self.device)?;
        Ok(())
    }

    /// Whether graphics and presentation share a queue family
    pub const fn shares_queue_family(&self) -> bool {
        self.graphics_family == self.present_family
    }
}

/// First-fit physical device selection
pub struct PhysicalDeviceSelector;

impl PhysicalDeviceSelector {
    /// First device in enumeration order that satisfies every check
    pub fn select_best(query: &dyn SurfaceQuery) -> VulkanResult<PhysicalDeviceSurfaceInfo> {
        for device in query.physical_devices()? {
            let name = query.device_name(device);
            match Self::evaluate(query, device, &name) {
                Ok(Some(info)) => {
                    log::info!("Selected GPU: {name}");
                    return Ok(info);
                }
                Ok(None) => {}
                Err(err) => log::warn!("Skipping GPU {name}: {err}"),
            }
        }
        Err(VulkanError::NoSuitableGpu)
    }

    fn evaluate(
        query: &dyn SurfaceQuery,
        device: vk::PhysicalDevice,
        name: &str,
    ) -> VulkanResult<Option<PhysicalDeviceSurfaceInfo>> {
        let families = query.queue_families(device);

        let Some(graphics_family) = families
            .iter()
            .position(|family| {
                family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .and_then(|index| u32::try_from(index).ok())
        else {
            log::debug!("{name}: no graphics queue family");
            return Ok(None);
        };

        // Prefer presenting from the graphics family itself.
        let present_family = if query.supports_present(device, graphics_family)? {
            Some(graphics_family)
        } else {
            let mut found = None;
            for index in (0..families.len()).filter_map(|i| u32::try_from(i).ok()) {
                if index != graphics_family && query.supports_present(device, index)? {
                    found = Some(index);
                    break;
                }
            }
            found
        };
        let Some(present_family) = present_family else {
            log::debug!("{name}: no queue family can present to the surface");
            return Ok(None);
        };

        let available = query.device_extensions(device)?;
        let missing: Vec<&CStr> = required_device_extensions()
            .into_iter()
            .filter(|required| !available.iter().any(|ext| ext.as_c_str() == *required))
            .collect();
        if !missing.is_empty() {
            log::debug!("{name}: missing device extensions {missing:?}");
            return Ok(None);
        }

        let support = query.swapchain_support(device)?;
        if !support.is_adequate() {
            log::debug!("{name}: surface offers no formats or present modes");
            return Ok(None);
        }

        if !query.descriptor_indexing_supported(device) {
            log::debug!("{name}: descriptor indexing features missing");
            return Ok(None);
        }

        Ok(Some(PhysicalDeviceSurfaceInfo {
            device,
            name: name.to_owned(),
            graphics_family,
            present_family,
            support,
        }))
    }
}
