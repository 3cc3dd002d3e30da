//! Command pool and command buffer recording
//!
//! Command buffers are allocated and freed in batches through the pool that
//! owns them. Recording uses chained `&mut Self` calls between `begin()` and
//! `end()`; nothing reaches the GPU until the buffer is submitted through
//! [`crate::vulkan::Queue::submit`].

use ash::{vk, Device};
use bitflags::bitflags;
use crate::scene::Mesh;
use crate::vulkan::framebuffer::Framebuffer;
use crate::vulkan::render_pass::AttachmentKind;
use crate::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers may be individually re-recorded
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        Self::with_flags(device, queue_family_index, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    /// Create a pool with explicit creation flags
    pub fn with_flags(
        device: Device,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device.create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate `count` primary command buffers in one call
    pub fn create_command_buffers(&self, count: u32) -> VulkanResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let handles = unsafe {
            self.device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer {
                device: self.device.clone(),
                pool: self.command_pool,
                command_buffer: handle,
                state: CommandBufferState::Initial,
            })
            .collect())
    }

    /// Free command buffers allocated from this pool in one call
    pub fn destroy_command_buffers(&self, buffers: Vec<CommandBuffer>) -> VulkanResult<()> {
        if let Some(foreign) = buffers.iter().find(|cb| cb.pool != self.command_pool) {
            return Err(VulkanError::invalid(format!(
                "command buffer {:?} was not allocated from pool {:?}",
                foreign.command_buffer, self.command_pool
            )));
        }
        if buffers.is_empty() {
            return Ok(());
        }

        let handles: Vec<vk::CommandBuffer> = buffers.iter().map(CommandBuffer::handle).collect();
        unsafe {
            self.device.free_command_buffers(self.command_pool, &handles);
        }
        Ok(())
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Device the pool was created on
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees every buffer still allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Recording state of a [`CommandBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Allocated or reset, nothing recorded
    Initial,
    /// Between `begin()` and `end()`
    Recording,
    /// Recorded and ready for submission
    Executable,
}

bitflags! {
    /// Which aspects of a render pass's attachments take caller-supplied clear values
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        /// Clear color attachments to the given color
        const COLOR = 1 << 0;
        /// Clear the depth aspect to the given depth
        const DEPTH = 1 << 1;
        /// Clear the stencil aspect to the given value
        const STENCIL = 1 << 2;
    }
}

/// Clear values used when beginning a render pass
#[derive(Debug, Clone, Copy)]
pub struct ClearValues {
    /// RGBA clear color
    pub color: [f32; 4],
    /// Depth clear value
    pub depth: f32,
    /// Stencil clear value
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Build one clear value per attachment of a render pass
///
/// Aspects not selected by `flags` fall back to transparent black, depth 1.0
/// and stencil 0.
pub fn attachment_clear_values(
    attachments: &[AttachmentKind],
    values: &ClearValues,
    flags: ClearFlags,
) -> Vec<vk::ClearValue> {
    let color = if flags.contains(ClearFlags::COLOR) { values.color } else { [0.0; 4] };
    let depth = if flags.contains(ClearFlags::DEPTH) { values.depth } else { 1.0 };
    let stencil = if flags.contains(ClearFlags::STENCIL) { values.stencil } else { 0 };

    attachments
        .iter()
        .map(|kind| match kind {
            AttachmentKind::Color => vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            AttachmentKind::DepthStencil => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        })
        .collect()
}

/// A primary command buffer allocated from a [`CommandPool`]
///
/// Freed through [`CommandPool::destroy_command_buffers`] or together with
/// the pool.
pub struct CommandBuffer {
    device: Device,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    /// Start recording, discarding anything previously recorded
    pub fn begin(&mut self) -> VulkanResult<&mut Self> {
        self.begin_with_flags(vk::CommandBufferUsageFlags::empty())
    }

    /// Start recording with explicit usage flags
    pub fn begin_with_flags(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.state == CommandBufferState::Recording {
            return Err(VulkanError::invalid("command buffer already recording"));
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);

        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.state = CommandBufferState::Recording;
        Ok(self)
    }

    /// Finish recording
    pub fn end(&mut self) -> VulkanResult<&mut Self> {
        if self.state != CommandBufferState::Recording {
            return Err(VulkanError::invalid("command buffer not recording"));
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        self.state = CommandBufferState::Executable;
        Ok(self)
    }

    /// Begin `framebuffer`'s render pass over the whole framebuffer area
    pub fn begin_render_pass(
        &mut self,
        framebuffer: &Framebuffer,
        values: &ClearValues,
        flags: ClearFlags,
    ) -> &mut Self {
        self.debug_assert_recording();
        let clear_values = attachment_clear_values(framebuffer.attachment_kinds(), values, flags);

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(framebuffer.render_pass())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: framebuffer.extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }
        self
    }

    /// End the current render pass
    pub fn end_render_pass(&mut self) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
        self
    }

    /// Set viewport 0 to `rect` with depth range 0..1
    pub fn set_viewport(&mut self, rect: vk::Rect2D) -> &mut Self {
        self.debug_assert_recording();
        let viewport = vk::Viewport {
            x: rect.offset.x as f32,
            y: rect.offset.y as f32,
            width: rect.extent.width as f32,
            height: rect.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
        }
        self
    }

    /// Set scissor 0 to `rect`
    pub fn set_scissor(&mut self, rect: vk::Rect2D) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_set_scissor(self.command_buffer, 0, &[rect]);
        }
        self
    }

    /// Bind a pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline, bind_point: vk::PipelineBindPoint) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, bind_point, pipeline);
        }
        self
    }

    /// Bind descriptor sets starting at set index `first_set`
    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        first_set: u32,
    ) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                bind_point,
                layout,
                first_set,
                sets,
                &[],
            );
        }
        self
    }

    /// Bind the mesh buffers and issue an indexed draw for one part
    pub fn draw_mesh_part(&mut self, mesh: &Mesh, part_index: usize) -> &mut Self {
        self.debug_assert_recording();
        debug_assert!(part_index < mesh.parts().len(), "mesh part {} out of range", part_index);
        let Some(part) = mesh.parts().get(part_index) else {
            log::error!("Mesh part {} out of range ({} parts)", part_index, mesh.parts().len());
            return self;
        };

        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[mesh.vertex_buffer().handle()], &[0]);
            self.device.cmd_bind_index_buffer(
                self.command_buffer,
                mesh.index_buffer().handle(),
                0,
                Mesh::INDEX_TYPE,
            );
            self.device.cmd_draw_indexed(
                self.command_buffer,
                part.indices_count,
                1,
                part.ibuffer_offset,
                part.vbuffer_offset,
                0,
            );
        }
        self
    }

    /// Copy whole regions between two buffers
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, regions);
        }
        self
    }

    /// Copy regions between two images in the given layouts
    pub fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_copy_image(self.command_buffer, src, src_layout, dst, dst_layout, regions);
        }
        self
    }

    /// Transition `range` of `image` between layouts
    ///
    /// Stages and access masks on both sides come from [`layout_scope`], so
    /// the barrier waits for the work that last used `old_layout` and holds
    /// back the work that uses `new_layout`.
    pub fn transfer_image_layout(
        &mut self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        range: vk::ImageSubresourceRange,
    ) -> &mut Self {
        let (src_stage, src_access) = layout_scope(old_layout);
        let (dst_stage, dst_access) = layout_scope(new_layout);
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();
        self.pipeline_barrier(src_stage, dst_stage, &[], &[barrier])
    }

    /// Insert a generic pipeline barrier
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) -> &mut Self {
        self.debug_assert_recording();
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                memory_barriers,
                &[],
                image_barriers,
            );
        }
        self
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Current recording state
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Whether the buffer has been recorded and can be submitted
    pub fn is_executable(&self) -> bool {
        self.state == CommandBufferState::Executable
    }

    fn debug_assert_recording(&self) {
        debug_assert_eq!(
            self.state,
            CommandBufferState::Recording,
            "command recorded outside begin()/end()"
        );
    }
}

/// Subresource range covering the first mip level and layer
pub fn single_level_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Pipeline stages and accesses that use an image in `layout`
pub fn layout_scope(layout: vk::ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    use vk::{AccessFlags as Access, ImageLayout as Layout, PipelineStageFlags as Stage};

    match layout {
        Layout::UNDEFINED => (Stage::TOP_OF_PIPE, Access::empty()),
        Layout::PREINITIALIZED => (Stage::HOST, Access::HOST_WRITE),
        Layout::TRANSFER_SRC_OPTIMAL => (Stage::TRANSFER, Access::TRANSFER_READ),
        Layout::TRANSFER_DST_OPTIMAL => (Stage::TRANSFER, Access::TRANSFER_WRITE),
        Layout::COLOR_ATTACHMENT_OPTIMAL => (
            Stage::COLOR_ATTACHMENT_OUTPUT,
            Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE,
        ),
        Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            Stage::EARLY_FRAGMENT_TESTS | Stage::LATE_FRAGMENT_TESTS,
            Access::DEPTH_STENCIL_ATTACHMENT_READ | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        Layout::SHADER_READ_ONLY_OPTIMAL | Layout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => {
            (Stage::FRAGMENT_SHADER, Access::SHADER_READ)
        }
        Layout::PRESENT_SRC_KHR => (Stage::BOTTOM_OF_PIPE, Access::empty()),
        _ => (Stage::ALL_COMMANDS, Access::MEMORY_READ | Access::MEMORY_WRITE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_values_follow_attachment_order() {
        let kinds = [AttachmentKind::Color, AttachmentKind::Color, AttachmentKind::DepthStencil];
        let values = ClearValues {
            color: [0.1, 0.2, 0.3, 1.0],
            depth: 0.5,
            stencil: 7,
        };
        let clear = attachment_clear_values(&kinds, &values, ClearFlags::all());
        assert_eq!(clear.len(), 3);
        unsafe {
            assert_eq!(clear[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(clear[1].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(clear[2].depth_stencil.depth, 0.5);
            assert_eq!(clear[2].depth_stencil.stencil, 7);
        }
    }

    #[test]
    fn test_unselected_aspects_use_defaults() {
        let kinds = [AttachmentKind::DepthStencil, AttachmentKind::Color];
        let values = ClearValues {
            color: [1.0, 1.0, 1.0, 1.0],
            depth: 0.25,
            stencil: 3,
        };
        let clear = attachment_clear_values(&kinds, &values, ClearFlags::DEPTH);
        unsafe {
            assert_eq!(clear[0].depth_stencil.depth, 0.25);
            assert_eq!(clear[0].depth_stencil.stencil, 0);
            assert_eq!(clear[1].color.float32, [0.0; 4]);
        }
    }

    #[test]
    fn test_upload_transitions_chain_through_transfer() {
        use vk::{AccessFlags as Access, ImageLayout as Layout, PipelineStageFlags as Stage};

        // UNDEFINED -> TRANSFER_DST: nothing to wait for, copies wait on the barrier
        assert_eq!(layout_scope(Layout::UNDEFINED), (Stage::TOP_OF_PIPE, Access::empty()));
        assert_eq!(
            layout_scope(Layout::TRANSFER_DST_OPTIMAL),
            (Stage::TRANSFER, Access::TRANSFER_WRITE)
        );
        // TRANSFER_DST -> SHADER_READ_ONLY: sampling waits for the copy
        assert_eq!(
            layout_scope(Layout::SHADER_READ_ONLY_OPTIMAL),
            (Stage::FRAGMENT_SHADER, Access::SHADER_READ)
        );
        assert_eq!(layout_scope(Layout::PREINITIALIZED), (Stage::HOST, Access::HOST_WRITE));
        assert_eq!(
            layout_scope(Layout::TRANSFER_SRC_OPTIMAL),
            (Stage::TRANSFER, Access::TRANSFER_READ)
        );
    }

    #[test]
    fn test_attachment_layouts_use_attachment_stages() {
        use vk::{AccessFlags as Access, ImageLayout as Layout, PipelineStageFlags as Stage};

        let (stage, access) = layout_scope(Layout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(stage, Stage::COLOR_ATTACHMENT_OUTPUT);
        assert!(access.contains(Access::COLOR_ATTACHMENT_WRITE));

        let (stage, access) = layout_scope(Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(stage, Stage::EARLY_FRAGMENT_TESTS | Stage::LATE_FRAGMENT_TESTS);
        assert!(access.contains(Access::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_accesses_are_never_paired_with_top_of_pipe() {
        use vk::ImageLayout as Layout;

        let layouts = [
            Layout::UNDEFINED,
            Layout::PREINITIALIZED,
            Layout::GENERAL,
            Layout::TRANSFER_SRC_OPTIMAL,
            Layout::TRANSFER_DST_OPTIMAL,
            Layout::COLOR_ATTACHMENT_OPTIMAL,
            Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Layout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Layout::SHADER_READ_ONLY_OPTIMAL,
            Layout::PRESENT_SRC_KHR,
        ];
        for layout in layouts {
            let (stage, access) = layout_scope(layout);
            if stage == vk::PipelineStageFlags::TOP_OF_PIPE || stage == vk::PipelineStageFlags::BOTTOM_OF_PIPE {
                assert!(access.is_empty(), "{:?} pairs {:?} with {:?}", layout, stage, access);
            }
        }
    }

    #[test]
    fn test_single_level_range() {
        let range = single_level_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!((range.base_mip_level, range.level_count), (0, 1));
        assert_eq!((range.base_array_layer, range.layer_count), (0, 1));
    }
}
