//! Device bring-up
//!
//! [`DeviceContext`] owns everything between the Vulkan loader and the first
//! queue submission: instance, presentation surface, physical device
//! snapshot, logical device, queue and the upload command pool. Fields are
//! declared in reverse creation order so that teardown happens on drop
//! without further bookkeeping.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use crate::config::RuntimeConfig;
use crate::vulkan::instance::{PresentTarget, VulkanInstance};
use crate::vulkan::physical_device::PhysicalDeviceInfo;
use crate::vulkan::queue::Queue;
use crate::vulkan::staging::StagingUploader;
use crate::vulkan::{VulkanError, VulkanResult};

/// Presentation surface with RAII cleanup
pub struct PresentSurface {
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
}

impl PresentSurface {
    fn new(instance: &VulkanInstance, target: &impl PresentTarget) -> VulkanResult<Self> {
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = target.create_surface(&instance.entry, &instance.instance)?;
        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn loader(&self) -> &Surface {
        &self.surface_loader
    }
}

impl Drop for PresentSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
}

impl LogicalDevice {
    /// Create a device with one queue from `queue_family_index` and the
    /// swapchain extension enabled
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDeviceInfo,
        queue_family_index: u32,
    ) -> VulkanResult<Self> {
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)
            .build()];

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance.create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::warn!("Failed to wait for device idle before destroying it: {:?}", e);
            }
            self.device.destroy_device(None);
        }
    }
}

/// Instance, device, queue and upload pool of one presentation target
pub struct DeviceContext {
    uploader: StagingUploader,
    queue: Queue,
    device: LogicalDevice,
    physical: PhysicalDeviceInfo,
    surface: PresentSurface,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Bring up Vulkan for `target`
    pub fn new(target: &impl PresentTarget, config: &RuntimeConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(target, &config.app_name, config.enable_validation)?;
        let surface = PresentSurface::new(&instance, target)?;

        let physical = PhysicalDeviceInfo::select(
            &instance.instance,
            surface.handle(),
            surface.loader(),
            config.physical_device_index,
        )?;
        let family_index = physical.select_graphics_present_family()?;
        physical.require_swapchain_support()?;
        log::info!("Using queue family {} for graphics and presentation", family_index);

        let device = LogicalDevice::new(&instance.instance, &physical, family_index)?;
        let queue = Queue::new(device.device.clone(), family_index)?;
        let uploader = StagingUploader::new(device.device.clone(), family_index)?;

        Ok(Self {
            uploader,
            queue,
            device,
            physical,
            surface,
            instance,
        })
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Capability snapshot of the selected physical device
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Memory types of the selected physical device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical.memory_properties
    }

    /// The graphics and present queue
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Staged transfer helper
    pub fn uploader(&self) -> &StagingUploader {
        &self.uploader
    }

    /// Presentation surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    /// Whether `format` can be used as an optimally tiled depth-stencil attachment
    pub fn supports_depth_attachment(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.instance.instance
                .get_physical_device_format_properties(self.physical.device, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    }

    /// Block until the device has finished all work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device.device.device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Headless device bring-up for tests that need a real GPU

    use super::*;
    use std::ffi::CString;

    /// Present target backed by `VK_EXT_headless_surface`
    pub(crate) struct HeadlessTarget;

    impl PresentTarget for HeadlessTarget {
        fn required_instance_extensions(&self) -> VulkanResult<Vec<CString>> {
            Ok(vec![vk::ExtHeadlessSurfaceFn::name().to_owned()])
        }

        fn create_surface(&self, entry: &ash::Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
            let fp = vk::ExtHeadlessSurfaceFn::load(|name| unsafe {
                std::mem::transmute(entry.get_instance_proc_addr(instance.handle(), name.as_ptr()))
            });
            let create_info = vk::HeadlessSurfaceCreateInfoEXT::builder();
            let mut surface = vk::SurfaceKHR::null();
            unsafe {
                (fp.create_headless_surface_ext)(instance.handle(), &*create_info, std::ptr::null(), &mut surface)
                    .result()
                    .map_err(VulkanError::Api)?;
            }
            Ok(surface)
        }

        fn framebuffer_size(&self) -> (u32, u32) {
            (64, 64)
        }
    }

    pub(crate) fn gpu_context() -> DeviceContext {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = RuntimeConfig::default().with_validation(false);
        DeviceContext::new(&HeadlessTarget, &config).expect("headless device bring-up")
    }
}
