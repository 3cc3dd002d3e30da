//! Renderers recording scene draws into command buffers
//!
//! Every renderer belongs to one [`PassTarget`]. The frame loop begins the
//! matching render pass and asks [`Renderers`] to record everything that
//! targets it. Camera and light uniforms are shared by all renderers through
//! [`FrameBindings`].

pub mod gbuffer;
pub mod gbuffer_renderer;
pub mod mesh_renderer;

pub use gbuffer::GBuffer;
pub use gbuffer_renderer::GBufferRenderer;
pub use mesh_renderer::{MeshPass, MeshRenderer};

use ash::vk;
use crate::scene::{Camera, LightUniform, Scene};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::commands::CommandBuffer;
use crate::vulkan::context::RenderContext;
use crate::vulkan::descriptor::DescriptorSet;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::VulkanResult;

/// Render pass a renderer records into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassTarget {
    /// Main pass over the current swapchain framebuffer
    Swapchain,
    /// Geometry pass over the G-buffer framebuffer
    GBuffer,
}

/// Camera and light descriptor sets bound by every renderer
pub struct FrameBindings {
    camera_set: DescriptorSet,
    camera_uniform: Buffer,
    light_set: DescriptorSet,
    light_uniform: Buffer,
}

impl FrameBindings {
    /// Allocate the camera and light sets with their initial uniforms
    pub fn new(ctx: &RenderContext, camera: &Camera, light: &LightUniform) -> VulkanResult<Self> {
        let camera_uniform = Buffer::uniform(ctx.device(), &camera.uniform())?;
        let camera_set = ctx.descriptor_pool().allocate(&ctx.layouts().camera)?;
        camera_set.writer().buffer(0, &camera_uniform).update(ctx.raw_device());

        let light_uniform = Buffer::uniform(ctx.device(), light)?;
        let light_set = ctx.descriptor_pool().allocate(&ctx.layouts().light)?;
        light_set.writer().buffer(0, &light_uniform).update(ctx.raw_device());

        Ok(Self {
            camera_set,
            camera_uniform,
            light_set,
            light_uniform,
        })
    }

    /// Camera set, bound at index 0
    pub fn camera_set(&self) -> vk::DescriptorSet {
        self.camera_set.handle()
    }

    /// Light set, bound at index 3 by forward shading
    pub fn light_set(&self) -> vk::DescriptorSet {
        self.light_set.handle()
    }
}

/// Closed set of renderers
pub enum Renderer {
    /// Scene meshes, forward or G-buffer fill
    Mesh(MeshRenderer),
    /// Deferred lighting over the G-buffer
    GBuffer(GBufferRenderer),
}

impl Renderer {
    /// Pass this renderer records into
    pub fn target(&self) -> PassTarget {
        match self {
            Renderer::Mesh(renderer) => renderer.pass().target(),
            Renderer::GBuffer(renderer) => renderer.target(),
        }
    }

    /// Record draw commands inside an already begun render pass
    pub fn render(&self, command_buffer: &mut CommandBuffer, bindings: &FrameBindings, scene: &Scene) {
        match self {
            Renderer::Mesh(renderer) => renderer.render(command_buffer, bindings, scene),
            Renderer::GBuffer(renderer) => renderer.render(command_buffer, bindings),
        }
    }
}

impl From<MeshRenderer> for Renderer {
    fn from(renderer: MeshRenderer) -> Self {
        Renderer::Mesh(renderer)
    }
}

impl From<GBufferRenderer> for Renderer {
    fn from(renderer: GBufferRenderer) -> Self {
        Renderer::GBuffer(renderer)
    }
}

/// All renderers of an application plus the bindings they share
pub struct Renderers {
    renderers: Vec<Renderer>,
    bindings: FrameBindings,
}

impl Renderers {
    /// Create an empty set with camera and light uniforms initialized
    pub fn new(ctx: &RenderContext, camera: &Camera, light: &LightUniform) -> VulkanResult<Self> {
        Ok(Self {
            renderers: Vec::new(),
            bindings: FrameBindings::new(ctx, camera, light)?,
        })
    }

    /// Append a renderer, recorded after the ones already added
    pub fn add(&mut self, renderer: impl Into<Renderer>) -> &mut Self {
        self.renderers.push(renderer.into());
        self
    }

    /// Number of renderers
    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    /// Whether no renderer has been added
    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }

    /// Shared camera and light bindings
    pub fn bindings(&self) -> &FrameBindings {
        &self.bindings
    }

    /// Upload new camera matrices
    pub fn update_camera(&self, ctx: &DeviceContext, camera: &Camera) -> VulkanResult<()> {
        self.bindings.camera_uniform.update_pod(ctx, &camera.uniform())
    }

    /// Upload new light parameters
    pub fn update_light(&self, ctx: &DeviceContext, light: &LightUniform) -> VulkanResult<()> {
        self.bindings.light_uniform.update_pod(ctx, light)
    }

    /// Record every renderer targeting `target`, in insertion order
    ///
    /// Returns how many renderers recorded.
    pub fn render_target(&self, command_buffer: &mut CommandBuffer, target: PassTarget, scene: &Scene) -> usize {
        let mut recorded = 0;
        for renderer in self.renderers.iter().filter(|r| r.target() == target) {
            renderer.render(command_buffer, &self.bindings, scene);
            recorded += 1;
        }
        if recorded == 0 {
            log::warn!("No renderer targets {:?}", target);
        }
        recorded
    }
}
