//! Surface materials
//!
//! A material is a descriptor set matching the `material` layout: a uniform
//! with the diffuse color at binding 0 and the albedo texture at binding 1.

use ash::{vk, Device};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::context::RenderContext;
use crate::vulkan::descriptor::DescriptorSet;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::image::Texture;
use crate::vulkan::VulkanResult;

/// Material uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialUniform {
    /// Diffuse color multiplied with the albedo texture
    pub diffuse: [f32; 4],
}

unsafe impl bytemuck::Pod for MaterialUniform {}
unsafe impl bytemuck::Zeroable for MaterialUniform {}

impl Default for MaterialUniform {
    fn default() -> Self {
        Self { diffuse: [1.0; 4] }
    }
}

/// Material parameters and textures bound as one descriptor set
///
/// The albedo texture is referenced, not owned: it must outlive every frame
/// recorded with this material.
pub struct Material {
    descriptor_set: DescriptorSet,
    uniform: Buffer,
    device: Device,
    albedo: Option<vk::ImageView>,
}

impl Material {
    /// Create a material with `diffuse` color and no albedo texture yet
    pub fn new(ctx: &RenderContext, diffuse: [f32; 4]) -> VulkanResult<Self> {
        let uniform = Buffer::uniform(ctx.device(), &MaterialUniform { diffuse })?;
        let descriptor_set = ctx.descriptor_pool().allocate(&ctx.layouts().material)?;
        descriptor_set.writer().buffer(0, &uniform).update(ctx.raw_device());

        Ok(Self {
            descriptor_set,
            uniform,
            device: ctx.raw_device().clone(),
            albedo: None,
        })
    }

    /// Bind `texture` as the albedo map
    pub fn set_albedo(&mut self, texture: &Texture) {
        self.descriptor_set
            .writer()
            .image(1, texture.descriptor_image_info())
            .update(&self.device);
        self.albedo = Some(texture.view().handle());
    }

    /// Replace the diffuse color
    pub fn set_diffuse(&self, ctx: &DeviceContext, diffuse: [f32; 4]) -> VulkanResult<()> {
        self.uniform.update_pod(ctx, &MaterialUniform { diffuse })
    }

    /// Whether every binding of the set has been written
    pub fn is_complete(&self) -> bool {
        self.albedo.is_some()
    }

    /// Descriptor set for the `material` slot
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uniform_is_white() {
        let uniform = MaterialUniform::default();
        assert_eq!(uniform.diffuse, [1.0; 4]);
        assert_eq!(bytemuck::bytes_of(&uniform).len(), 16);
    }
}
