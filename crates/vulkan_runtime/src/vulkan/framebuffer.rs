//! Framebuffer management
//!
//! A framebuffer binds a render pass to image views of a fixed size.

use ash::{vk, Device};
use crate::vulkan::image::ImageView;
use crate::vulkan::render_pass::{AttachmentKind, RenderPass};
use crate::vulkan::{VulkanError, VulkanResult};

/// Check that the attachment formats of a set of views match a render pass
pub fn validate_attachments(pass_formats: &[vk::Format], view_formats: &[vk::Format]) -> VulkanResult<()> {
    if pass_formats.len() != view_formats.len() {
        return Err(VulkanError::AttachmentMismatch {
            reason: format!(
                "render pass declares {} attachment(s), {} view(s) given",
                pass_formats.len(),
                view_formats.len()
            ),
        });
    }

    for (index, (expected, actual)) in pass_formats.iter().zip(view_formats).enumerate() {
        if expected != actual {
            return Err(VulkanError::AttachmentMismatch {
                reason: format!(
                    "attachment {} has format {:?}, render pass expects {:?}",
                    index, actual, expected
                ),
            });
        }
    }
    Ok(())
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
    render_pass: vk::RenderPass,
    attachment_kinds: Vec<AttachmentKind>,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a framebuffer for `render_pass` from `views` in attachment order
    pub fn new(
        device: Device,
        render_pass: &RenderPass,
        views: &[&ImageView],
        width: u32,
        height: u32,
    ) -> VulkanResult<Self> {
        let view_formats: Vec<vk::Format> = views.iter().map(|v| v.format()).collect();
        validate_attachments(render_pass.attachment_formats(), &view_formats)?;
        if width == 0 || height == 0 {
            return Err(VulkanError::AttachmentMismatch {
                reason: format!("framebuffer size {}x{} is empty", width, height),
            });
        }

        let attachments: Vec<vk::ImageView> = views.iter().map(|v| v.handle()).collect();
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(width)
            .height(height)
            .layers(1);

        let framebuffer = unsafe {
            device.create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
            render_pass: render_pass.handle(),
            attachment_kinds: render_pass.attachment_kinds().to_vec(),
            extent: vk::Extent2D { width, height },
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Render pass this framebuffer was created for
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Attachment kinds of the render pass, in attachment order
    pub fn attachment_kinds(&self) -> &[AttachmentKind] {
        &self.attachment_kinds
    }

    /// Framebuffer size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Full framebuffer area, suitable for viewport and scissor
    pub fn rect(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_attachments() {
        let formats = [vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT];
        assert!(validate_attachments(&formats, &formats).is_ok());
    }

    #[test]
    fn test_count_mismatch() {
        let result = validate_attachments(
            &[vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT],
            &[vk::Format::B8G8R8A8_UNORM],
        );
        assert!(matches!(result, Err(VulkanError::AttachmentMismatch { .. })));
    }

    #[test]
    fn test_format_mismatch_names_attachment() {
        let result = validate_attachments(
            &[vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT],
            &[vk::Format::B8G8R8A8_UNORM, vk::Format::D24_UNORM_S8_UINT],
        );
        match result {
            Err(VulkanError::AttachmentMismatch { reason }) => assert!(reason.contains("attachment 1")),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }
}
