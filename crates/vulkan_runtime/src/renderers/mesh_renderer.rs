//! Mesh renderer drawing every part of every scene mesh

use ash::vk;
use crate::renderers::{FrameBindings, PassTarget};
use crate::scene::{GeometryVertex, Scene, VertexLayout};
use crate::vulkan::commands::CommandBuffer;
use crate::vulkan::context::RenderContext;
use crate::vulkan::descriptor::DescriptorSetLayouts;
use crate::vulkan::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder, ShaderModule};
use crate::vulkan::render_pass::RenderPass;
use crate::vulkan::VulkanResult;

/// Which pass a [`MeshRenderer`] records into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshPass {
    /// Lit shading straight into the swapchain
    Forward,
    /// Surface attributes written to the G-buffer layers
    Fill,
}

impl MeshPass {
    /// Compiled vertex and fragment shader file names
    pub fn shader_names(self) -> (&'static str, &'static str) {
        match self {
            MeshPass::Forward => ("cube.vert.spv", "cube.frag.spv"),
            MeshPass::Fill => ("fill.vert.spv", "fill.frag.spv"),
        }
    }

    /// Pass the pipeline is compatible with
    pub fn target(self) -> PassTarget {
        match self {
            MeshPass::Forward => PassTarget::Swapchain,
            MeshPass::Fill => PassTarget::GBuffer,
        }
    }

    /// Whether the light set is bound at index 3
    pub fn uses_light(self) -> bool {
        self == MeshPass::Forward
    }

    fn set_layouts(self, layouts: &DescriptorSetLayouts) -> Vec<vk::DescriptorSetLayout> {
        let mut handles = vec![
            layouts.camera.handle(),
            layouts.mesh.handle(),
            layouts.material.handle(),
        ];
        if self.uses_light() {
            handles.push(layouts.light.handle());
        }
        handles
    }
}

/// Draws scene meshes with one graphics pipeline
pub struct MeshRenderer {
    pipeline: GraphicsPipeline,
    pass: MeshPass,
}

impl MeshRenderer {
    /// Build the pipeline of `pass` against `render_pass`
    pub fn new(ctx: &RenderContext, pass: MeshPass, render_pass: &RenderPass) -> VulkanResult<Self> {
        let (vert_name, frag_name) = pass.shader_names();
        let device = ctx.raw_device();
        let vert = ShaderModule::from_file(device, ctx.config().shader_path(vert_name))?;
        let frag = ShaderModule::from_file(device, ctx.config().shader_path(frag_name))?;

        let pipeline = GraphicsPipelineBuilder::new(&vert, &frag)
            .vertex_input(
                GeometryVertex::binding_description(),
                &GeometryVertex::attribute_descriptions(),
            )
            .set_layouts(&pass.set_layouts(ctx.layouts()))
            .cull_mode(vk::CullModeFlags::NONE)
            .depth_test(true)
            .build(device, render_pass, ctx.pipeline_cache())?;

        log::info!("Created {:?} mesh renderer", pass);
        Ok(Self { pipeline, pass })
    }

    /// Pass this renderer records into
    pub fn pass(&self) -> MeshPass {
        self.pass
    }

    /// Record draws for every mesh part that has a material
    pub fn render(&self, command_buffer: &mut CommandBuffer, bindings: &FrameBindings, scene: &Scene) {
        let bind_point = vk::PipelineBindPoint::GRAPHICS;
        let layout = self.pipeline.layout();

        command_buffer
            .bind_pipeline(self.pipeline.handle(), bind_point)
            .bind_descriptor_sets(bind_point, layout, &[bindings.camera_set()], 0);
        if self.pass.uses_light() {
            command_buffer.bind_descriptor_sets(bind_point, layout, &[bindings.light_set()], 3);
        }

        for (mesh_index, mesh) in scene.meshes.iter().enumerate() {
            let Some(mesh_set) = mesh.descriptor_set() else {
                log::warn!("Mesh {} has no descriptor set, skipped", mesh_index);
                continue;
            };
            command_buffer.bind_descriptor_sets(bind_point, layout, &[mesh_set], 1);

            for (part_index, part) in mesh.parts().iter().enumerate() {
                let Some(material) = part.material else {
                    log::trace!("Mesh {} part {} has no material", mesh_index, part_index);
                    continue;
                };
                command_buffer
                    .bind_descriptor_sets(bind_point, layout, &[material], 2)
                    .draw_mesh_part(mesh, part_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_shaders() {
        assert_eq!(MeshPass::Forward.shader_names(), ("cube.vert.spv", "cube.frag.spv"));
        assert_eq!(MeshPass::Fill.shader_names(), ("fill.vert.spv", "fill.frag.spv"));
    }

    #[test]
    fn test_pass_targets() {
        assert_eq!(MeshPass::Forward.target(), PassTarget::Swapchain);
        assert_eq!(MeshPass::Fill.target(), PassTarget::GBuffer);
        assert!(MeshPass::Forward.uses_light());
        assert!(!MeshPass::Fill.uses_light());
    }
}
