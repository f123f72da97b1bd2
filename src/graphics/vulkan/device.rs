// Vulkan instance and device selection
//
// Responsibilities:
// - Instance creation with the window system's required extensions
//   (plus validation layers in debug builds)
// - Queue family and swapchain capability queries (pure, no side effects)
// - First-fit physical device selection
// - Logical device + queue creation

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr;
use ash::vk;

use crate::error::GraphicsError;

/// Queue family indices a device must provide before it is eligible.
///
/// Graphics and presentation may live on the same family or on two
/// different ones; both cases are handled downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }
}

/// Everything the surface reports about swapchain support. Empty format or
/// present-mode lists mean the device cannot present here.
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Scan the device's queue families once, recording the first family with
/// graphics support and the first with presentation support to `surface`.
pub fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &khr::Surface,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilyIndices, GraphicsError> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(index);
        }

        let present_support = unsafe {
            surface_loader.get_physical_device_surface_support(device, index, surface)
        }
        .map_err(|e| GraphicsError::surface(format!("querying presentation support: {e}")))?;

        if indices.present_family.is_none() && present_support {
            indices.present_family = Some(index);
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Read surface capabilities, formats, and present modes for a device.
pub fn query_swapchain_support(
    surface_loader: &khr::Surface,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SwapchainSupport, GraphicsError> {
    unsafe {
        let capabilities = surface_loader
            .get_physical_device_surface_capabilities(device, surface)
            .map_err(|e| GraphicsError::surface(format!("querying surface capabilities: {e}")))?;
        let formats = surface_loader
            .get_physical_device_surface_formats(device, surface)
            .map_err(|e| GraphicsError::surface(format!("querying surface formats: {e}")))?;
        let present_modes = surface_loader
            .get_physical_device_surface_present_modes(device, surface)
            .map_err(|e| GraphicsError::surface(format!("querying present modes: {e}")))?;

        Ok(SwapchainSupport {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Eligibility predicate: complete queue families, the swapchain extension,
/// and at least one format and one present mode.
pub(crate) fn device_suitable(
    indices: &QueueFamilyIndices,
    has_swapchain_extension: bool,
    support: &SwapchainSupport,
) -> bool {
    indices.is_complete()
        && has_swapchain_extension
        && !support.formats.is_empty()
        && !support.present_modes.is_empty()
}

fn supports_swapchain_extension(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Result<bool, GraphicsError> {
    let available = unsafe { instance.enumerate_device_extension_properties(device) }
        .map_err(|e| GraphicsError::surface(format!("enumerating device extensions: {e}")))?;

    Ok(available.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == khr::Swapchain::name()
    }))
}

/// Select the first physical device (in enumeration order) that can render
/// and present to `surface`. No scoring between eligible devices.
pub fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices), GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| GraphicsError::no_suitable_device(format!("enumerating GPUs: {e}")))?;

    if devices.is_empty() {
        return Err(GraphicsError::no_suitable_device(
            "no Vulkan-capable GPU found",
        ));
    }

    for device in devices {
        let indices = find_queue_families(instance, surface_loader, device, surface)?;

        if !supports_swapchain_extension(instance, device)? {
            continue;
        }

        let support = query_swapchain_support(surface_loader, device, surface)?;
        if device_suitable(&indices, true, &support) {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
            log::info!("Selected GPU: {}", name.to_string_lossy());
            return Ok((device, indices));
        }
    }

    Err(GraphicsError::no_suitable_device(
        "no GPU supports both presentation and an adequate swapchain",
    ))
}

/// Create the logical device requesting the unique queue families at
/// priority 1.0, plus the swapchain extension, and fetch both queues.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    indices: &QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue), GraphicsError> {
    let graphics_family = indices
        .graphics_family
        .ok_or_else(|| GraphicsError::no_suitable_device("graphics queue family unresolved"))?;
    let present_family = indices
        .present_family
        .ok_or_else(|| GraphicsError::no_suitable_device("present queue family unresolved"))?;

    let mut unique_families = vec![graphics_family];
    if present_family != graphics_family {
        unique_families.push(present_family);
    }

    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&priorities)
                .build()
        })
        .collect();

    let extension_names = [khr::Swapchain::name().as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(|e| GraphicsError::no_suitable_device(format!("creating logical device: {e}")))?;

    let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
    let present_queue = unsafe { device.get_device_queue(present_family, 0) };

    Ok((device, graphics_queue, present_queue))
}

/// Create the Vulkan instance with the window system's required extensions.
pub fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    extensions: &[*const c_char],
    enable_validation: bool,
) -> Result<ash::Instance, GraphicsError> {
    let app_name = CString::new(app_name)
        .map_err(|_| GraphicsError::init("application name contains an interior NUL"))?;

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"lumen")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let layer_names = if enable_validation {
        vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| GraphicsError::init(format!("creating Vulkan instance: {e}")))?;

    if let Ok(Some(version)) = entry.try_enumerate_instance_version() {
        log::info!(
            "Vulkan instance created (API {}.{}.{})",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version)
        );
    }

    Ok(instance)
}

/// Route validation-layer messages into the log.
pub fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT), GraphicsError> {
    let debug_utils = DebugUtils::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| GraphicsError::init(format!("creating debug messenger: {e}")))?;

    Ok((debug_utils, messenger))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(formats: usize, present_modes: usize) -> SwapchainSupport {
        SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default(); formats],
            present_modes: vec![vk::PresentModeKHR::FIFO; present_modes],
        }
    }

    #[test]
    fn indices_complete_only_when_both_families_found() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        indices.graphics_family = Some(0);
        assert!(!indices.is_complete());

        indices.present_family = Some(2);
        assert!(indices.is_complete());
    }

    #[test]
    fn graphics_and_present_may_be_different_families() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert!(indices.is_complete());
    }

    #[test]
    fn suitability_requires_every_condition() {
        let complete = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let incomplete = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };

        assert!(device_suitable(&complete, true, &support(1, 1)));

        assert!(!device_suitable(&incomplete, true, &support(1, 1)));
        assert!(!device_suitable(&complete, false, &support(1, 1)));
        assert!(!device_suitable(&complete, true, &support(0, 1)));
        assert!(!device_suitable(&complete, true, &support(1, 0)));
    }
}
