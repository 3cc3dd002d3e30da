//! Vertex formats and their pipeline input descriptions

use ash::vk;
use std::mem::{offset_of, size_of};

/// A vertex type that can feed binding 0 of a graphics pipeline
pub trait VertexLayout: bytemuck::Pod {
    /// Per-vertex binding 0 with this type's stride
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions, one per shader input location
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    }
}

/// Lit, textured geometry vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeometryVertex {
    /// Object-space position
    pub pos: [f32; 3],
    /// Normal
    pub nrm: [f32; 3],
    /// Tangent
    pub tng: [f32; 3],
    /// Texture coordinate
    pub tex: [f32; 2],
}

unsafe impl bytemuck::Pod for GeometryVertex {}
unsafe impl bytemuck::Zeroable for GeometryVertex {}

impl GeometryVertex {
    /// Vertex from its four attributes
    pub const fn new(pos: [f32; 3], nrm: [f32; 3], tng: [f32; 3], tex: [f32; 2]) -> Self {
        Self { pos, nrm, tng, tex }
    }
}

impl VertexLayout for GeometryVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(GeometryVertex, pos)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(GeometryVertex, nrm)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(GeometryVertex, tng)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(GeometryVertex, tex)),
        ]
    }
}

/// Clip-space vertex for full-screen passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FullscreenVertex {
    /// Clip-space position
    pub pos: [f32; 4],
    /// Texture coordinate
    pub tex: [f32; 2],
}

unsafe impl bytemuck::Pod for FullscreenVertex {}
unsafe impl bytemuck::Zeroable for FullscreenVertex {}

impl VertexLayout for FullscreenVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32A32_SFLOAT, offset_of!(FullscreenVertex, pos)),
            attribute(1, vk::Format::R32G32_SFLOAT, offset_of!(FullscreenVertex, tex)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_layout() {
        assert_eq!(size_of::<GeometryVertex>(), 44);
        assert_eq!(GeometryVertex::binding_description().stride, 44);

        let offsets: Vec<u32> = GeometryVertex::attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
    }

    #[test]
    fn test_fullscreen_layout() {
        assert_eq!(size_of::<FullscreenVertex>(), 24);

        let attributes = FullscreenVertex::attribute_descriptions();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attributes[1].offset, 16);
        assert_eq!(attributes[1].location, 1);
    }

    #[test]
    fn test_vertices_cast_to_bytes() {
        let vertices = [GeometryVertex::new([1.0, 2.0, 3.0], [0.0; 3], [0.0; 3], [0.5, 0.5]); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[..4], &1.0f32.to_ne_bytes());
    }
}
