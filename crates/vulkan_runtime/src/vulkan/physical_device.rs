//! Physical device capability snapshot and queue family selection
//!
//! The snapshot is captured once at bring-up. Every later decision (memory
//! types, surface format, present mode, image count) reads from it instead of
//! querying the driver again.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Instance};
use std::ffi::CStr;
use crate::vulkan::instance::require_extensions;
use crate::vulkan::{VulkanError, VulkanResult};

/// Physical device selection and capabilities
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Presentation support of each queue family for the target surface
    pub present_support: Vec<bool>,
    /// Memory types and heaps
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Formats supported by the target surface
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// Present modes supported by the target surface
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Capabilities of the target surface
    pub surface_capabilities: vk::SurfaceCapabilitiesKHR,
    /// Device-level extensions
    pub extensions: Vec<vk::ExtensionProperties>,
}

impl PhysicalDeviceInfo {
    /// Enumerate physical devices and snapshot the one at `preferred_index`
    ///
    /// Falls back to the first device when the index is out of range.
    pub fn select(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        preferred_index: usize,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance.enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };
        if devices.is_empty() {
            return Err(VulkanError::NoPhysicalDevice);
        }

        let index = if preferred_index < devices.len() {
            preferred_index
        } else {
            log::warn!(
                "Physical device index {} out of range ({} available), using 0",
                preferred_index, devices.len()
            );
            0
        };

        let info = Self::query(instance, devices[index], surface, surface_loader)?;
        log::info!("Selected GPU: {}", info.device_name());
        Ok(info)
    }

    fn query(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let queue_families = unsafe {
            instance.get_physical_device_queue_family_properties(device)
        };

        let present_support = (0..queue_families.len() as u32)
            .map(|index| unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        let (surface_formats, present_modes, surface_capabilities) = unsafe {
            (
                surface_loader.get_physical_device_surface_formats(device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader.get_physical_device_surface_present_modes(device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader.get_physical_device_surface_capabilities(device, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        let extensions = unsafe {
            instance.enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            properties,
            queue_families,
            present_support,
            memory_properties,
            surface_formats,
            present_modes,
            surface_capabilities,
            extensions,
        })
    }

    /// Pick the queue family used for both graphics and presentation
    ///
    /// The first scan only establishes that some graphics family exists. The
    /// second scan returns the first family that also supports presentation.
    pub fn select_graphics_present_family(&self) -> VulkanResult<u32> {
        let any_graphics = self
            .queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS));

        let Some(graphics_only) = any_graphics else {
            return Err(VulkanError::NoGraphicsPresentQueue);
        };

        let chosen = self
            .queue_families
            .iter()
            .enumerate()
            .find(|(index, family)| {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && self.present_support.get(*index).copied().unwrap_or(false)
            })
            .map(|(index, _)| index as u32);

        match chosen {
            Some(index) => {
                if index as usize != graphics_only {
                    log::debug!(
                        "Graphics family {} cannot present, using family {}",
                        graphics_only, index
                    );
                }
                Ok(index)
            }
            None => Err(VulkanError::NoGraphicsPresentQueue),
        }
    }

    /// Fail unless the swapchain extension is supported
    pub fn require_swapchain_support(&self) -> VulkanResult<()> {
        require_extensions(&self.extensions, &[SwapchainLoader::name()])
    }

    /// Human-readable device name
    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vulkan::instance::tests::extension;

    pub(crate) fn stub_device(families: &[(vk::QueueFlags, bool)]) -> PhysicalDeviceInfo {
        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties::default(),
            queue_families: families
                .iter()
                .map(|(flags, _)| vk::QueueFamilyProperties {
                    queue_flags: *flags,
                    queue_count: 1,
                    ..Default::default()
                })
                .collect(),
            present_support: families.iter().map(|(_, present)| *present).collect(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            surface_capabilities: vk::SurfaceCapabilitiesKHR::default(),
            extensions: vec![extension("VK_KHR_swapchain")],
        }
    }

    #[test]
    fn test_single_graphics_present_family() {
        let device = stub_device(&[(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)]);
        assert_eq!(device.select_graphics_present_family().unwrap(), 0);
    }

    #[test]
    fn test_compute_only_device_fails() {
        let device = stub_device(&[(vk::QueueFlags::COMPUTE, true)]);
        assert!(matches!(
            device.select_graphics_present_family(),
            Err(VulkanError::NoGraphicsPresentQueue)
        ));
    }

    #[test]
    fn test_graphics_without_present_fails() {
        let device = stub_device(&[
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::COMPUTE, true),
        ]);
        assert!(matches!(
            device.select_graphics_present_family(),
            Err(VulkanError::NoGraphicsPresentQueue)
        ));
    }

    #[test]
    fn test_prefers_family_with_both_capabilities() {
        let device = stub_device(&[
            (vk::QueueFlags::TRANSFER, true),
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            (vk::QueueFlags::GRAPHICS, true),
        ]);
        assert_eq!(device.select_graphics_present_family().unwrap(), 2);
    }

    #[test]
    fn test_swapchain_extension_check() {
        let mut device = stub_device(&[(vk::QueueFlags::GRAPHICS, true)]);
        assert!(device.require_swapchain_support().is_ok());

        device.extensions = vec![extension("VK_KHR_maintenance1")];
        assert!(matches!(
            device.require_swapchain_support(),
            Err(VulkanError::MissingExtension { .. })
        ));
    }
}
