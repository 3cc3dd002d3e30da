//! Full-screen lighting pass reading the G-buffer

use ash::vk;
use crate::renderers::gbuffer::{GBuffer, GBUFFER_COLOR_READ_LAYOUT, GBUFFER_DEPTH_READ_LAYOUT};
use crate::renderers::{FrameBindings, PassTarget};
use crate::scene::{FullscreenVertex, Mesh, VertexLayout};
use crate::vulkan::commands::CommandBuffer;
use crate::vulkan::context::RenderContext;
use crate::vulkan::descriptor::DescriptorSet;
use crate::vulkan::image::{Sampler, SamplerSettings};
use crate::vulkan::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder, ShaderModule};
use crate::vulkan::VulkanResult;

const VERTEX_SHADER: &str = "deferred.vert.spv";
const FRAGMENT_SHADER: &str = "deferred.frag.spv";

/// Resolves the G-buffer into the swapchain with one full-screen triangle
///
/// The G-buffer is referenced through the descriptor set and must outlive
/// the renderer.
pub struct GBufferRenderer {
    triangle: Mesh,
    descriptor_set: DescriptorSet,
    // referenced by the descriptor set
    _sampler: Sampler,
    pipeline: GraphicsPipeline,
}

impl GBufferRenderer {
    /// Build the lighting pipeline for the main render pass and bind `gbuffer`
    pub fn new(ctx: &RenderContext, gbuffer: &GBuffer) -> VulkanResult<Self> {
        let device = ctx.raw_device();
        let vert = ShaderModule::from_file(device, ctx.config().shader_path(VERTEX_SHADER))?;
        let frag = ShaderModule::from_file(device, ctx.config().shader_path(FRAGMENT_SHADER))?;

        let layouts = ctx.layouts();
        let pipeline = GraphicsPipelineBuilder::new(&vert, &frag)
            .vertex_input(
                FullscreenVertex::binding_description(),
                &FullscreenVertex::attribute_descriptions(),
            )
            .set_layouts(&[layouts.camera.handle(), layouts.gbuffer.handle()])
            .cull_mode(vk::CullModeFlags::NONE)
            .depth_test(false)
            .build(device, ctx.main_render_pass(), ctx.pipeline_cache())?;

        let sampler = Sampler::new(device.clone(), &SamplerSettings::nearest_clamped())?;
        let [layer0, layer1] = gbuffer.color_layers();

        let descriptor_set = ctx.descriptor_pool().allocate(&layouts.gbuffer)?;
        descriptor_set
            .writer()
            .image(0, sampler.descriptor_image_info_in(layer0, GBUFFER_COLOR_READ_LAYOUT))
            .image(1, sampler.descriptor_image_info_in(layer1, GBUFFER_COLOR_READ_LAYOUT))
            .image(2, sampler.descriptor_image_info_in(gbuffer.depth(), GBUFFER_DEPTH_READ_LAYOUT))
            .update(device);

        let triangle = Mesh::fullscreen_triangle(ctx.device())?;

        log::info!("Created G-buffer renderer");
        Ok(Self {
            triangle,
            descriptor_set,
            _sampler: sampler,
            pipeline,
        })
    }

    /// Pass this renderer records into
    pub fn target(&self) -> PassTarget {
        PassTarget::Swapchain
    }

    /// Record the lighting draw
    pub fn render(&self, command_buffer: &mut CommandBuffer, bindings: &FrameBindings) {
        let bind_point = vk::PipelineBindPoint::GRAPHICS;
        let layout = self.pipeline.layout();

        command_buffer
            .bind_pipeline(self.pipeline.handle(), bind_point)
            .bind_descriptor_sets(
                bind_point,
                layout,
                &[bindings.camera_set(), self.descriptor_set.handle()],
                0,
            )
            .draw_mesh_part(&self.triangle, 0);
    }
}
