//! Offscreen geometry buffer for deferred shading

use ash::vk;
use crate::vulkan::context::RenderContext;
use crate::vulkan::framebuffer::Framebuffer;
use crate::vulkan::image::{ImageSettings, ImageView};
use crate::vulkan::render_pass::{AttachmentDesc, RenderPass, RenderPassSettings};
use crate::vulkan::{VulkanError, VulkanResult};

/// Format of both color layers
pub const GBUFFER_COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Format of the depth layer
pub const GBUFFER_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Layout the color layers are left in for the lighting pass
pub const GBUFFER_COLOR_READ_LAYOUT: vk::ImageLayout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;

/// Layout the depth layer is left in for the lighting pass
pub const GBUFFER_DEPTH_READ_LAYOUT: vk::ImageLayout = vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;

/// Render pass writing two color layers and depth, leaving all three ready for sampling
pub fn gbuffer_render_pass_settings() -> RenderPassSettings {
    let color = AttachmentDesc::color(GBUFFER_COLOR_FORMAT)
        .with_initial_layout(vk::ImageLayout::UNDEFINED)
        .with_final_layout(GBUFFER_COLOR_READ_LAYOUT);

    RenderPassSettings::new()
        .attachment(color)
        .attachment(color)
        .attachment(
            AttachmentDesc::depth(GBUFFER_DEPTH_FORMAT)
                .with_initial_layout(vk::ImageLayout::UNDEFINED)
                .with_final_layout(GBUFFER_DEPTH_READ_LAYOUT),
        )
        // the lighting pass samples the layers
        .dependency(
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
}

/// Color layers, depth, render pass and framebuffer of the geometry pass
pub struct GBuffer {
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    depth: ImageView,
    layer1: ImageView,
    layer0: ImageView,
}

impl GBuffer {
    /// Create a G-buffer matching the swapchain size
    pub fn new(ctx: &RenderContext) -> VulkanResult<Self> {
        let extent = ctx.extent();
        let device = ctx.device();

        if !device.supports_depth_attachment(GBUFFER_DEPTH_FORMAT) {
            return Err(VulkanError::InitializationFailed(format!(
                "{:?} is not supported as a depth attachment",
                GBUFFER_DEPTH_FORMAT
            )));
        }

        let color_settings = ImageSettings::color_target(extent.width, extent.height, GBUFFER_COLOR_FORMAT);
        let layer0 = ImageView::new(device, &color_settings, None)?;
        let layer1 = ImageView::new(device, &color_settings, None)?;

        let depth_settings = ImageSettings::depth_target(extent.width, extent.height, GBUFFER_DEPTH_FORMAT)
            .with_usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED);
        let depth = ImageView::new(device, &depth_settings, None)?;

        let render_pass = RenderPass::new(device.device().clone(), &gbuffer_render_pass_settings())?;
        let framebuffer = Framebuffer::new(
            device.device().clone(),
            &render_pass,
            &[&layer0, &layer1, &depth],
            extent.width,
            extent.height,
        )?;

        log::info!("Created {}x{} G-buffer", extent.width, extent.height);

        Ok(Self {
            framebuffer,
            render_pass,
            depth,
            layer1,
            layer0,
        })
    }

    /// Framebuffer of the geometry pass
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Render pass of the geometry pass
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Color layers in attachment order
    pub fn color_layers(&self) -> [&ImageView; 2] {
        [&self.layer0, &self.layer1]
    }

    /// Depth layer
    pub fn depth(&self) -> &ImageView {
        &self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::render_pass::{AttachmentKind, RenderPassLayout};

    #[test]
    fn test_gbuffer_pass_layout() {
        let layout = RenderPassLayout::new(&gbuffer_render_pass_settings()).unwrap();
        assert_eq!(
            layout.kinds(),
            &[AttachmentKind::Color, AttachmentKind::Color, AttachmentKind::DepthStencil]
        );
        assert_eq!(layout.color_refs().len(), 2);
        assert_eq!(layout.depth_ref().map(|r| r.attachment), Some(2));
    }

    #[test]
    fn test_gbuffer_layers_end_readable() {
        let layout = RenderPassLayout::new(&gbuffer_render_pass_settings()).unwrap();
        let attachments = layout.attachments();
        assert!(attachments.iter().all(|a| a.initial_layout == vk::ImageLayout::UNDEFINED));
        assert_eq!(attachments[0].final_layout, GBUFFER_COLOR_READ_LAYOUT);
        assert_eq!(attachments[1].final_layout, GBUFFER_COLOR_READ_LAYOUT);
        assert_eq!(attachments[2].final_layout, GBUFFER_DEPTH_READ_LAYOUT);
        assert_eq!(attachments[2].format, GBUFFER_DEPTH_FORMAT);
    }

    #[test]
    fn test_gbuffer_dependency_pair() {
        let layout = RenderPassLayout::new(&gbuffer_render_pass_settings()).unwrap();
        let dependencies = layout.dependencies();
        assert_eq!(dependencies.len(), 2);
        assert_eq!(dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependencies[0].src_access_mask, vk::AccessFlags::SHADER_READ);

        // color writes become visible to fragment shader sampling after the pass
        let leaving = dependencies[1];
        assert_eq!(leaving.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(leaving.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(leaving.src_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(leaving.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(leaving.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }
}
