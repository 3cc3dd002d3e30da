//! Render context
//!
//! [`RenderContext`] is what an application brings up once: the device, a
//! depth-stencil target, the main render pass, the swapchain and the shared
//! pools every renderer allocates from. It is passed around by reference.

use ash::vk;
use crate::config::RuntimeConfig;
use crate::vulkan::commands::CommandPool;
use crate::vulkan::descriptor::{DescriptorPool, DescriptorSetLayouts};
use crate::vulkan::device::DeviceContext;
use crate::vulkan::image::{ImageSettings, ImageView};
use crate::vulkan::instance::PresentTarget;
use crate::vulkan::pipeline::PipelineCache;
use crate::vulkan::render_pass::{AttachmentDesc, RenderPass, RenderPassSettings};
use crate::vulkan::swapchain::{choose_surface_format, Swapchain, PREFERRED_SURFACE_FORMAT};
use crate::vulkan::{VulkanError, VulkanResult};

/// Depth-stencil formats tried for the main depth target, in order
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
];

/// First candidate accepted by `supported`
pub fn choose_depth_format(
    candidates: &[vk::Format],
    supported: impl Fn(vk::Format) -> bool,
) -> VulkanResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|format| supported(*format))
        .ok_or_else(|| VulkanError::InitializationFailed("no supported depth-stencil format".to_string()))
}

/// Image aspects present in a depth format
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Device, presentation and shared pools of one window
pub struct RenderContext {
    layouts: DescriptorSetLayouts,
    descriptor_pool: DescriptorPool,
    pipeline_cache: PipelineCache,
    command_pool: CommandPool,
    swapchain: Swapchain,
    render_pass: RenderPass,
    depth_view: ImageView,
    device: DeviceContext,
    config: RuntimeConfig,
}

impl RenderContext {
    /// Bring up the device and everything needed to render into `target`
    pub fn new(target: &impl PresentTarget, config: &RuntimeConfig) -> VulkanResult<Self> {
        let device = DeviceContext::new(target, config)?;
        let (width, height) = target.framebuffer_size();

        let surface_format = choose_surface_format(&device.physical().surface_formats, PREFERRED_SURFACE_FORMAT)?;
        let depth_format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            device.supports_depth_attachment(format)
        })?;

        let depth_settings = ImageSettings::depth_target(width, height, depth_format)
            .with_aspect(depth_aspect(depth_format));
        let depth_view = ImageView::new(&device, &depth_settings, None)?;

        // Both attachments are cleared every frame, so their previous contents are discarded
        let render_pass = RenderPass::new(
            device.device().clone(),
            &RenderPassSettings::new()
                .attachment(
                    AttachmentDesc::color(surface_format.format)
                        .with_initial_layout(vk::ImageLayout::UNDEFINED),
                )
                .attachment(
                    AttachmentDesc::depth(depth_format)
                        .with_initial_layout(vk::ImageLayout::UNDEFINED),
                ),
        )?;

        let swapchain = Swapchain::new(&device, &render_pass, &depth_view, width, height, surface_format)?;

        let command_pool = CommandPool::new(device.device().clone(), device.queue().family_index())?;
        let pipeline_cache = PipelineCache::new(device.device().clone())?;
        let descriptor_pool = DescriptorPool::new(device.device().clone(), &config.descriptor_pool)?;
        let layouts = DescriptorSetLayouts::new(device.device())?;

        let context = Self {
            layouts,
            descriptor_pool,
            pipeline_cache,
            command_pool,
            swapchain,
            render_pass,
            depth_view,
            device,
            config: config.clone(),
        };
        context.transition_initial_layouts()?;

        log::info!(
            "Render context ready: {}x{}, color {:?}, depth {:?}",
            width, height, surface_format.format, depth_format
        );
        Ok(context)
    }

    /// Move the swapchain images and the depth target out of `UNDEFINED`
    fn transition_initial_layouts(&self) -> VulkanResult<()> {
        let depth_image = self.depth_view.image();
        let depth_range = self.depth_view.settings().subresource_range();
        let color_targets: Vec<(vk::Image, vk::ImageSubresourceRange)> = self
            .swapchain
            .color_views()
            .iter()
            .map(|view| (view.image(), view.settings().subresource_range()))
            .collect();

        self.device.uploader().submit_once(self.device.queue(), |cb| {
            for (image, range) in &color_targets {
                cb.transfer_image_layout(
                    *image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    *range,
                );
            }
            cb.transfer_image_layout(
                depth_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                depth_range,
            );
        })
    }

    /// Device, queue and upload pool
    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    /// Logical device handle
    pub fn raw_device(&self) -> &ash::Device {
        self.device.device()
    }

    /// Configuration the context was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Swapchain, for acquiring images
    pub fn swapchain_mut(&mut self) -> &mut Swapchain {
        &mut self.swapchain
    }

    /// Pass rendering into the swapchain framebuffers
    pub fn main_render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Depth-stencil target shared by every swapchain framebuffer
    pub fn depth_view(&self) -> &ImageView {
        &self.depth_view
    }

    /// Pool for per-frame command buffers
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Pipeline cache shared by all pipelines
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    /// Pool every descriptor set is allocated from
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// Fixed descriptor set layouts
    pub fn layouts(&self) -> &DescriptorSetLayouts {
        &self.layouts
    }

    /// Size of the swapchain images
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Rectangle covering the whole swapchain image
    pub fn full_rect(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent(),
        }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Failed to wait for device idle during teardown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format_follows_candidate_order() {
        let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| true).unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);

        let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| f != vk::Format::D24_UNORM_S8_UINT).unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn test_no_depth_format() {
        assert!(matches!(
            choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| false),
            Err(VulkanError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    }
}
