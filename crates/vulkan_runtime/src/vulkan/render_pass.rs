//! Render pass management
//!
//! A render pass is described by an ordered attachment list and a list of
//! external dependencies. [`RenderPassLayout`] turns that description into
//! the native structures without touching the device, [`RenderPass`] owns the
//! resulting handle.

use ash::{vk, Device};
use crate::vulkan::{VulkanError, VulkanResult};

/// Maximum number of attachments a single render pass may declare
pub const MAX_ATTACHMENTS: usize = 4;

/// Role of an attachment inside the single subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Color output
    Color,
    /// Depth-stencil target
    DepthStencil,
}

/// One attachment of a render pass
#[derive(Debug, Clone, Copy)]
pub struct AttachmentDesc {
    /// Attachment format
    pub format: vk::Format,
    /// Layout used inside the subpass
    pub layout: vk::ImageLayout,
    /// Layout the image is in when the pass begins, defaults to `layout`
    pub initial_layout: Option<vk::ImageLayout>,
    /// Layout the image is left in, defaults to `layout` for depth and
    /// `PRESENT_SRC_KHR` for color
    pub final_layout: Option<vk::ImageLayout>,
    /// Load operation for color and depth
    pub load_op: vk::AttachmentLoadOp,
}

impl AttachmentDesc {
    /// Color attachment in `COLOR_ATTACHMENT_OPTIMAL`
    pub fn color(format: vk::Format) -> Self {
        Self {
            format,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            initial_layout: None,
            final_layout: None,
            load_op: vk::AttachmentLoadOp::CLEAR,
        }
    }

    /// Depth-stencil attachment in `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`
    pub fn depth(format: vk::Format) -> Self {
        Self {
            format,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            initial_layout: None,
            final_layout: None,
            load_op: vk::AttachmentLoadOp::CLEAR,
        }
    }

    /// Override the layout the image is expected in when the pass begins
    pub fn with_initial_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.initial_layout = Some(layout);
        self
    }

    /// Override the layout the image is left in
    pub fn with_final_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.final_layout = Some(layout);
        self
    }

    /// Override the load operation
    pub fn with_load_op(mut self, load_op: vk::AttachmentLoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    /// Whether this is a color or depth-stencil attachment
    pub fn kind(&self) -> AttachmentKind {
        match self.layout {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => AttachmentKind::DepthStencil,
            _ => AttachmentKind::Color,
        }
    }

    fn description(&self) -> vk::AttachmentDescription {
        let final_layout = self.final_layout.unwrap_or(match self.kind() {
            AttachmentKind::DepthStencil => self.layout,
            AttachmentKind::Color => vk::ImageLayout::PRESENT_SRC_KHR,
        });

        vk::AttachmentDescription::builder()
            .format(self.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(self.load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(self.initial_layout.unwrap_or(self.layout))
            .final_layout(final_layout)
            .build()
    }
}

/// External dependency of the subpass
///
/// Each declared dependency produces a pair of native dependencies: one
/// entering the subpass with these masks and one leaving it with the masks
/// swapped.
#[derive(Debug, Clone, Copy)]
pub struct DependencyDesc {
    /// Access performed by earlier work
    pub src_access: vk::AccessFlags,
    /// Access performed by this subpass
    pub dst_access: vk::AccessFlags,
}

/// Attachments and dependencies of a single-subpass render pass
#[derive(Debug, Clone, Default)]
pub struct RenderPassSettings {
    /// Attachments in framebuffer order
    pub attachments: Vec<AttachmentDesc>,
    /// External dependencies
    pub dependencies: Vec<DependencyDesc>,
}

impl RenderPassSettings {
    /// Empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attachment
    pub fn attachment(mut self, attachment: AttachmentDesc) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Append an external dependency
    pub fn dependency(mut self, src_access: vk::AccessFlags, dst_access: vk::AccessFlags) -> Self {
        self.dependencies.push(DependencyDesc { src_access, dst_access });
        self
    }
}

/// Native render pass structures derived from [`RenderPassSettings`]
#[derive(Debug, Clone)]
pub struct RenderPassLayout {
    attachments: Vec<vk::AttachmentDescription>,
    kinds: Vec<AttachmentKind>,
    color_refs: Vec<vk::AttachmentReference>,
    depth_ref: Option<vk::AttachmentReference>,
    dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassLayout {
    /// Validate `settings` and build descriptions, references and dependencies
    pub fn new(settings: &RenderPassSettings) -> VulkanResult<Self> {
        let count = settings.attachments.len();
        if count == 0 || count > MAX_ATTACHMENTS {
            return Err(VulkanError::invalid(format!(
                "render pass needs 1 to {} attachments, got {}",
                MAX_ATTACHMENTS, count
            )));
        }

        let depth_count = settings
            .attachments
            .iter()
            .filter(|a| a.kind() == AttachmentKind::DepthStencil)
            .count();
        if depth_count > 1 {
            return Err(VulkanError::MultipleDepthStencilAttachments { count: depth_count });
        }

        let mut color_refs = Vec::with_capacity(count);
        let mut depth_ref = None;
        for (index, attachment) in settings.attachments.iter().enumerate() {
            let reference = vk::AttachmentReference {
                attachment: index as u32,
                layout: attachment.layout,
            };
            match attachment.kind() {
                AttachmentKind::Color => color_refs.push(reference),
                AttachmentKind::DepthStencil => depth_ref = Some(reference),
            }
        }

        let dependencies = settings
            .dependencies
            .iter()
            .flat_map(|dep| {
                [
                    vk::SubpassDependency {
                        src_subpass: vk::SUBPASS_EXTERNAL,
                        dst_subpass: 0,
                        src_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                        src_access_mask: dep.src_access,
                        dst_access_mask: dep.dst_access,
                        dependency_flags: vk::DependencyFlags::BY_REGION,
                    },
                    vk::SubpassDependency {
                        src_subpass: 0,
                        dst_subpass: vk::SUBPASS_EXTERNAL,
                        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                        dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                        src_access_mask: dep.dst_access,
                        dst_access_mask: dep.src_access,
                        dependency_flags: vk::DependencyFlags::BY_REGION,
                    },
                ]
            })
            .collect();

        Ok(Self {
            attachments: settings.attachments.iter().map(AttachmentDesc::description).collect(),
            kinds: settings.attachments.iter().map(AttachmentDesc::kind).collect(),
            color_refs,
            depth_ref,
            dependencies,
        })
    }

    /// Native attachment descriptions in declaration order
    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.attachments
    }

    /// Kind of each attachment in declaration order
    pub fn kinds(&self) -> &[AttachmentKind] {
        &self.kinds
    }

    /// Color references in declaration order
    pub fn color_refs(&self) -> &[vk::AttachmentReference] {
        &self.color_refs
    }

    /// Depth-stencil reference, if any
    pub fn depth_ref(&self) -> Option<&vk::AttachmentReference> {
        self.depth_ref.as_ref()
    }

    /// Entering/leaving dependency pairs
    pub fn dependencies(&self) -> &[vk::SubpassDependency] {
        &self.dependencies
    }
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    kinds: Vec<AttachmentKind>,
    formats: Vec<vk::Format>,
}

impl RenderPass {
    /// Create a single-subpass render pass
    pub fn new(device: Device, settings: &RenderPassSettings) -> VulkanResult<Self> {
        let layout = RenderPassLayout::new(settings)?;

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(layout.color_refs());
        if let Some(depth_ref) = layout.depth_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass.build()];

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(layout.attachments())
            .subpasses(&subpasses)
            .dependencies(layout.dependencies());

        let render_pass = unsafe {
            device.create_render_pass(&render_pass_create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!(
            "Created render pass with {} color and {} depth attachment(s)",
            layout.color_refs().len(),
            usize::from(layout.depth_ref().is_some())
        );

        Ok(Self {
            device,
            render_pass,
            kinds: layout.kinds().to_vec(),
            formats: settings.attachments.iter().map(|a| a.format).collect(),
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Attachment kinds in declaration order
    pub fn attachment_kinds(&self) -> &[AttachmentKind] {
        &self.kinds
    }

    /// Attachment formats in declaration order
    pub fn attachment_formats(&self) -> &[vk::Format] {
        &self.formats
    }

    /// Number of color attachments, which is also the blend-state count
    pub fn color_attachment_count(&self) -> usize {
        self.kinds.iter().filter(|k| **k == AttachmentKind::Color).count()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_settings() -> RenderPassSettings {
        RenderPassSettings::new()
            .attachment(AttachmentDesc::color(vk::Format::B8G8R8A8_UNORM))
            .attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
    }

    #[test]
    fn test_color_and_depth_references() {
        let settings = RenderPassSettings::new()
            .attachment(AttachmentDesc::color(vk::Format::R16G16B16A16_SFLOAT))
            .attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
            .attachment(AttachmentDesc::color(vk::Format::R16G16B16A16_SFLOAT))
            .attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM));
        let layout = RenderPassLayout::new(&settings).unwrap();

        let color: Vec<u32> = layout.color_refs().iter().map(|r| r.attachment).collect();
        assert_eq!(color, vec![0, 2, 3]);
        assert!(layout
            .color_refs()
            .iter()
            .all(|r| r.layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));

        let depth = layout.depth_ref().unwrap();
        assert_eq!(depth.attachment, 1);
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_color_only_pass_has_no_depth_ref() {
        let settings = RenderPassSettings::new()
            .attachment(AttachmentDesc::color(vk::Format::B8G8R8A8_UNORM));
        let layout = RenderPassLayout::new(&settings).unwrap();
        assert_eq!(layout.color_refs().len(), 1);
        assert!(layout.depth_ref().is_none());
    }

    #[test]
    fn test_two_depth_attachments_rejected() {
        let settings = RenderPassSettings::new()
            .attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
            .attachment(AttachmentDesc::color(vk::Format::B8G8R8A8_UNORM))
            .attachment(AttachmentDesc::depth(vk::Format::D24_UNORM_S8_UINT));
        assert!(matches!(
            RenderPassLayout::new(&settings),
            Err(VulkanError::MultipleDepthStencilAttachments { count: 2 })
        ));
    }

    #[test]
    fn test_attachment_count_bounds() {
        assert!(matches!(
            RenderPassLayout::new(&RenderPassSettings::new()),
            Err(VulkanError::InvalidOperation { .. })
        ));

        let mut settings = RenderPassSettings::new();
        for _ in 0..=MAX_ATTACHMENTS {
            settings = settings.attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM));
        }
        assert!(matches!(
            RenderPassLayout::new(&settings),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_default_final_layouts() {
        let layout = RenderPassLayout::new(&forward_settings()).unwrap();
        let [color, depth] = layout.attachments() else {
            panic!("expected two attachments");
        };
        assert_eq!(color.initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.initial_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_layout_overrides() {
        let settings = RenderPassSettings::new().attachment(
            AttachmentDesc::color(vk::Format::R16G16B16A16_SFLOAT)
                .with_initial_layout(vk::ImageLayout::UNDEFINED)
                .with_final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .with_load_op(vk::AttachmentLoadOp::DONT_CARE),
        );
        let layout = RenderPassLayout::new(&settings).unwrap();
        let attachment = layout.attachments()[0];
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_each_dependency_yields_entering_and_leaving_pair() {
        let settings = forward_settings()
            .dependency(
                vk::AccessFlags::MEMORY_READ,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
            .dependency(vk::AccessFlags::SHADER_READ, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        let layout = RenderPassLayout::new(&settings).unwrap();
        let deps = layout.dependencies();
        assert_eq!(deps.len(), 4);

        for (pair, declared) in deps.chunks(2).zip(&settings.dependencies) {
            let (entering, leaving) = (pair[0], pair[1]);

            assert_eq!(entering.src_subpass, vk::SUBPASS_EXTERNAL);
            assert_eq!(entering.dst_subpass, 0);
            assert_eq!(entering.src_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
            assert_eq!(entering.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
            assert_eq!(entering.src_access_mask, declared.src_access);
            assert_eq!(entering.dst_access_mask, declared.dst_access);

            assert_eq!(leaving.src_subpass, 0);
            assert_eq!(leaving.dst_subpass, vk::SUBPASS_EXTERNAL);
            assert_eq!(leaving.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
            assert_eq!(leaving.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
            assert_eq!(leaving.src_access_mask, declared.dst_access);
            assert_eq!(leaving.dst_access_mask, declared.src_access);

            for dep in pair {
                assert_eq!(dep.dependency_flags, vk::DependencyFlags::BY_REGION);
            }
        }
    }
}
