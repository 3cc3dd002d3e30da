//! Vulkan swapchain management
//!
//! Owns the presentation images, one framebuffer per image and the semaphore
//! signaled when the next image has been acquired.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::framebuffer::Framebuffer;
use crate::vulkan::image::{ImageSettings, ImageView};
use crate::vulkan::render_pass::RenderPass;
use crate::vulkan::sync::Semaphore;
use crate::vulkan::{VulkanError, VulkanResult};

/// Surface format requested when the caller has no preference
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the lowest-latency present mode: MAILBOX, then IMMEDIATE, then FIFO
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Pick the surface format
///
/// A single `UNDEFINED` entry means the surface has no preference.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> VulkanResult<vk::SurfaceFormatKHR> {
    match available {
        [] => Err(VulkanError::invalid("surface reports no formats")),
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        formats => Ok(formats
            .iter()
            .copied()
            .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
            .unwrap_or(formats[0])),
    }
}

/// Check the requested size against the surface capabilities
///
/// The surface either lets the swapchain decide (`u32::MAX`) or dictates an
/// extent that must equal the requested one.
pub fn resolve_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> VulkanResult<vk::Extent2D> {
    let current = capabilities.current_extent;
    if current.width == u32::MAX || (current.width == width && current.height == height) {
        Ok(vk::Extent2D { width, height })
    } else {
        Err(VulkanError::invalid(format!(
            "requested swapchain size {}x{} does not match surface size {}x{}",
            width, height, current.width, current.height
        )))
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    framebuffers: Vec<Framebuffer>,
    acquire_semaphore: Semaphore,
    color_views: Vec<ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    current_buffer: u32,
}

impl Swapchain {
    /// Create a swapchain and one framebuffer `[color_i, depth]` per image
    pub fn new(
        ctx: &DeviceContext,
        render_pass: &RenderPass,
        depth_view: &ImageView,
        width: u32,
        height: u32,
        preferred_format: vk::SurfaceFormatKHR,
    ) -> VulkanResult<Self> {
        let physical = ctx.physical();
        let present_mode = choose_present_mode(&physical.present_modes);
        let format = choose_surface_format(&physical.surface_formats, preferred_format)?;
        let caps = physical.surface_capabilities;
        let extent = resolve_extent(&caps, width, height)?;

        let device = ctx.device().clone();
        let swapchain_loader = SwapchainLoader::new(ctx.instance(), &device);
        let acquire_semaphore = Semaphore::new(device.clone())?;

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(ctx.surface())
            .min_image_count(caps.min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(false);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        // From here on a partially built swapchain cleans itself up on error
        let mut this = Self {
            swapchain_loader,
            swapchain,
            framebuffers: Vec::new(),
            acquire_semaphore,
            color_views: Vec::new(),
            format,
            extent,
            current_buffer: 0,
        };

        let images = unsafe {
            this.swapchain_loader.get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let view_settings = ImageSettings::color_target(extent.width, extent.height, format.format)
            .with_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);
        for image in images {
            this.color_views.push(ImageView::borrowed(device.clone(), image, &view_settings)?);
        }

        for color in &this.color_views {
            let framebuffer = Framebuffer::new(
                device.clone(),
                render_pass,
                &[color, depth_view],
                extent.width,
                extent.height,
            )?;
            this.framebuffers.push(framebuffer);
        }

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width, extent.height, this.color_views.len(), format.format, present_mode
        );

        Ok(this)
    }

    /// Acquire the next presentable image and make it current
    ///
    /// Blocks without timeout. [`Swapchain::acquire_semaphore`] is signaled
    /// once the image is ready to be rendered to.
    pub fn acquire_next_image(&mut self) -> VulkanResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(
                    self.swapchain,
                    u64::MAX,
                    self.acquire_semaphore.handle(),
                    vk::Fence::null(),
                )
                .map_err(VulkanError::Api)?
        };
        if suboptimal {
            log::debug!("Acquired image {} from a suboptimal swapchain", index);
        }
        self.current_buffer = index;
        Ok(index)
    }

    /// Index of the most recently acquired image
    pub fn current_buffer(&self) -> u32 {
        self.current_buffer
    }

    /// Framebuffer of the most recently acquired image
    pub fn current_framebuffer(&self) -> &Framebuffer {
        &self.framebuffers[self.current_buffer as usize]
    }

    /// One framebuffer per swapchain image
    pub fn framebuffers(&self) -> &[Framebuffer] {
        &self.framebuffers
    }

    /// Swapchain color images
    pub fn color_views(&self) -> &[ImageView] {
        &self.color_views
    }

    /// Semaphore signaled by [`Swapchain::acquire_next_image`]
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_semaphore.handle()
    }

    /// Chosen surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Swapchain extension loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.framebuffers.clear();
        self.color_views.clear();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_present_mode_preference() {
        use vk::PresentModeKHR as Mode;
        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE, Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE]), Mode::IMMEDIATE);
        assert_eq!(choose_present_mode(&[Mode::FIFO_RELAXED, Mode::FIFO]), Mode::FIFO);
        assert_eq!(choose_present_mode(&[]), Mode::FIFO);
    }

    #[test]
    fn test_preferred_format_found() {
        let available = [format(vk::Format::R8G8B8A8_SRGB), PREFERRED_SURFACE_FORMAT];
        let chosen = choose_surface_format(&available, PREFERRED_SURFACE_FORMAT).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_undefined_format_means_any() {
        let available = [format(vk::Format::UNDEFINED)];
        let chosen = choose_surface_format(&available, PREFERRED_SURFACE_FORMAT).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let available = [format(vk::Format::R8G8B8A8_UNORM), format(vk::Format::R8G8B8A8_SRGB)];
        let chosen = choose_surface_format(&available, PREFERRED_SURFACE_FORMAT).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[], PREFERRED_SURFACE_FORMAT).is_err());
    }

    #[test]
    fn test_extent_resolution() {
        let mut caps = vk::SurfaceCapabilitiesKHR::default();
        caps.current_extent = vk::Extent2D { width: u32::MAX, height: u32::MAX };
        let extent = resolve_extent(&caps, 800, 600).unwrap();
        assert_eq!((extent.width, extent.height), (800, 600));

        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        assert!(resolve_extent(&caps, 800, 600).is_ok());
        assert!(matches!(
            resolve_extent(&caps, 1024, 768),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_one_framebuffer_per_image() {
        use crate::vulkan::context::{choose_depth_format, depth_aspect, DEPTH_FORMAT_CANDIDATES};
        use crate::vulkan::device::testing::gpu_context;
        use crate::vulkan::render_pass::{AttachmentDesc, RenderPassSettings};

        let ctx = gpu_context();
        let surface_format = choose_surface_format(&ctx.physical().surface_formats, PREFERRED_SURFACE_FORMAT).unwrap();
        let depth_format =
            choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| ctx.supports_depth_attachment(format)).unwrap();
        let depth_settings =
            ImageSettings::depth_target(64, 64, depth_format).with_aspect(depth_aspect(depth_format));
        let depth_view = ImageView::new(&ctx, &depth_settings, None).unwrap();
        let render_pass = RenderPass::new(
            ctx.device().clone(),
            &RenderPassSettings::new()
                .attachment(AttachmentDesc::color(surface_format.format))
                .attachment(AttachmentDesc::depth(depth_format)),
        )
        .unwrap();

        let swapchain = Swapchain::new(&ctx, &render_pass, &depth_view, 64, 64, surface_format).unwrap();
        assert!(!swapchain.color_views().is_empty());
        assert_eq!(swapchain.framebuffers().len(), swapchain.color_views().len());
        for view in swapchain.color_views() {
            assert!(!view.owns_memory());
        }
    }
}
