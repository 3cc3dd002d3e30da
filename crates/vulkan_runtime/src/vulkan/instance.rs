//! Vulkan instance creation and validation-layer logging

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, CStr, CString};
use crate::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Platform collaborator that owns the window a swapchain presents to
pub trait PresentTarget {
    /// Instance extensions the platform needs to create a surface
    fn required_instance_extensions(&self) -> VulkanResult<Vec<CString>>;

    /// Create a presentable surface for `instance`
    fn create_surface(&self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);
}

/// Check that every name in `required` appears in `available`
///
/// Returns the first missing extension as [`VulkanError::MissingExtension`].
pub fn require_extensions(
    available: &[vk::ExtensionProperties],
    required: &[&CStr],
) -> VulkanResult<()> {
    for name in required {
        let found = available.iter().any(|ext| extension_name(ext) == *name);
        if !found {
            return Err(VulkanError::MissingExtension {
                name: name.to_string_lossy().into_owned(),
            });
        }
    }
    Ok(())
}

/// Whether `name` appears in `available`
pub fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available.iter().any(|ext| extension_name(ext) == name)
}

fn extension_name(ext: &vk::ExtensionProperties) -> &CStr {
    unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance exposing the surface extensions `target` needs
    pub fn new(target: &impl PresentTarget, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("application name contains a NUL byte".to_string()))?;
        let engine_name = CStr::from_bytes_with_nul(b"vulkan_runtime\0")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let available = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?;

        let mut required = target.required_instance_extensions()?;
        if !required.iter().any(|ext| ext.as_c_str() == Surface::name()) {
            required.insert(0, Surface::name().to_owned());
        }
        let required_refs: Vec<&CStr> = required.iter().map(CString::as_c_str).collect();
        require_extensions(&available, &required_refs)?;

        let mut extensions: Vec<*const c_char> = required.iter().map(|ext| ext.as_ptr()).collect();

        let mut layers: Vec<*const c_char> = Vec::new();
        let mut debug_enabled = false;
        if enable_validation {
            let layer_available = entry
                .enumerate_instance_layer_properties()
                .map_err(VulkanError::Api)?
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
            if layer_available {
                layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }

            if has_extension(&available, DebugUtils::name()) {
                extensions.push(DebugUtils::name().as_ptr());
                debug_enabled = true;
            } else {
                log::warn!("Validation requested but {:?} is not available", DebugUtils::name());
            }
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry.create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug_utils = if debug_enabled {
            let loader = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for '{}' with {} extension(s), validation {}",
            app_name,
            extensions.len(),
            if layers.is_empty() { "off" } else { "on" }
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug_utils {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Route validation messages into the `log` facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
