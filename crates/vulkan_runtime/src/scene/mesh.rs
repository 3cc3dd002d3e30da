//! Indexed meshes split into material parts

use ash::vk;
use nalgebra::Matrix4;
use crate::scene::material::Material;
use crate::scene::vertex_layout::{FullscreenVertex, GeometryVertex, VertexLayout};
use crate::vulkan::buffer::{Buffer, BufferSettings};
use crate::vulkan::context::RenderContext;
use crate::vulkan::descriptor::DescriptorSet;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Per-mesh uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshUniform {
    /// Object to world transform, column-major
    pub world: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for MeshUniform {}
unsafe impl bytemuck::Zeroable for MeshUniform {}

impl Default for MeshUniform {
    fn default() -> Self {
        Self {
            world: Matrix4::identity().into(),
        }
    }
}

/// A range of the index buffer drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPart {
    /// First index
    pub ibuffer_offset: u32,
    /// Value added to every index
    pub vbuffer_offset: i32,
    /// Number of indices
    pub indices_count: u32,
    /// Material descriptor set, if one has been assigned
    pub material: Option<vk::DescriptorSet>,
}

impl MeshPart {
    /// Part covering `indices_count` indices from the start of both buffers
    pub fn whole(indices_count: u32) -> Self {
        Self {
            ibuffer_offset: 0,
            vbuffer_offset: 0,
            indices_count,
            material: None,
        }
    }
}

/// Unit cube centered at the origin: 4 vertices and 2 triangles per face
#[rustfmt::skip]
pub fn cube_geometry() -> (Vec<GeometryVertex>, Vec<u16>) {
    const TANGENT: [f32; 3] = [0.0, 0.0, 1.0];
    let v = |pos, nrm, tex| GeometryVertex::new(pos, nrm, TANGENT, tex);

    let vertices = vec![
        // front
        v([-0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 0.0]),
        v([-0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 1.0]),
        v([ 0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 1.0]),
        v([ 0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 0.0]),
        // back
        v([-0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 0.0]),
        v([-0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 1.0]),
        v([ 0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 1.0]),
        v([ 0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 0.0]),
        // left
        v([-0.5, -0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 0.0]),
        v([-0.5,  0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 1.0]),
        v([-0.5,  0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 1.0]),
        v([-0.5, -0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 0.0]),
        // right
        v([ 0.5, -0.5, -0.5], [ 1.0,  0.0,  0.0], [0.0, 0.0]),
        v([ 0.5,  0.5, -0.5], [ 1.0,  0.0,  0.0], [0.0, 1.0]),
        v([ 0.5,  0.5,  0.5], [ 1.0,  0.0,  0.0], [1.0, 1.0]),
        v([ 0.5, -0.5,  0.5], [ 1.0,  0.0,  0.0], [1.0, 0.0]),
        // top
        v([-0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [0.0, 0.0]),
        v([-0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [0.0, 1.0]),
        v([ 0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [1.0, 1.0]),
        v([ 0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [1.0, 0.0]),
        // bottom
        v([-0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [0.0, 0.0]),
        v([-0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [0.0, 1.0]),
        v([ 0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [1.0, 1.0]),
        v([ 0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [1.0, 0.0]),
    ];

    let indices = vec![
        0, 2, 1,    0, 3, 2,
        7, 4, 6,    4, 5, 6,
        8, 10, 9,   11, 10, 8,
        12, 13, 14, 12, 14, 15,
        16, 18, 17, 16, 19, 18,
        20, 21, 22, 20, 22, 23,
    ];

    (vertices, indices)
}

/// One triangle covering the whole viewport, texture coordinates 0..1 on screen
pub fn fullscreen_triangle_geometry() -> (Vec<FullscreenVertex>, Vec<u16>) {
    let vertices = vec![
        FullscreenVertex { pos: [-1.0, -1.0, 1.0, 1.0], tex: [0.0, 0.0] },
        FullscreenVertex { pos: [-1.0, 3.0, 1.0, 1.0], tex: [0.0, 2.0] },
        FullscreenVertex { pos: [3.0, -1.0, 1.0, 1.0], tex: [2.0, 0.0] },
    ];
    (vertices, vec![0, 1, 2])
}

/// Device-local vertex and index buffers with 16-bit indices
pub struct Mesh {
    descriptor_set: Option<DescriptorSet>,
    uniform: Option<Buffer>,
    index_buffer: Buffer,
    vertex_buffer: Buffer,
    parts: Vec<MeshPart>,
}

impl Mesh {
    /// Index type of every mesh index buffer
    pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;

    /// Upload `vertices` and `indices` and split them into `parts`
    ///
    /// Indices are 16-bit, so one mesh addresses at most 65536 vertices
    /// through its part offsets. Larger geometry has to be split into several
    /// meshes.
    pub fn from_data<V: VertexLayout>(
        ctx: &DeviceContext,
        vertices: &[V],
        indices: &[u16],
        parts: Vec<MeshPart>,
    ) -> VulkanResult<Self> {
        if let Some(part) = parts
            .iter()
            .find(|p| p.ibuffer_offset as usize + p.indices_count as usize > indices.len())
        {
            return Err(VulkanError::invalid(format!(
                "mesh part {:?} exceeds {} indices",
                part,
                indices.len()
            )));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let vertex_buffer = Buffer::new(
            ctx,
            &BufferSettings::device_local(vk::BufferUsageFlags::VERTEX_BUFFER),
            vertex_bytes.len() as vk::DeviceSize,
            Some(vertex_bytes),
        )?;
        let index_buffer = Buffer::new(
            ctx,
            &BufferSettings::device_local(vk::BufferUsageFlags::INDEX_BUFFER),
            index_bytes.len() as vk::DeviceSize,
            Some(index_bytes),
        )?;

        log::debug!(
            "Created mesh: {} vertices, {} indices, {} part(s)",
            vertices.len(), indices.len(), parts.len()
        );

        Ok(Self {
            descriptor_set: None,
            uniform: None,
            index_buffer,
            vertex_buffer,
            parts,
        })
    }

    /// Unit cube with a per-mesh uniform holding the identity transform
    pub fn cube(ctx: &RenderContext) -> VulkanResult<Self> {
        let (vertices, indices) = cube_geometry();
        let mut mesh = Self::from_data(ctx.device(), &vertices, &indices, vec![MeshPart::whole(indices.len() as u32)])?;

        let uniform = Buffer::uniform(ctx.device(), &MeshUniform::default())?;
        let descriptor_set = ctx.descriptor_pool().allocate(&ctx.layouts().mesh)?;
        descriptor_set.writer().buffer(0, &uniform).update(ctx.raw_device());

        mesh.uniform = Some(uniform);
        mesh.descriptor_set = Some(descriptor_set);
        Ok(mesh)
    }

    /// Single triangle for full-screen passes, without a mesh uniform
    pub fn fullscreen_triangle(ctx: &DeviceContext) -> VulkanResult<Self> {
        let (vertices, indices) = fullscreen_triangle_geometry();
        Self::from_data(ctx, &vertices, &indices, vec![MeshPart::whole(indices.len() as u32)])
    }

    /// Assign `material` to part `index`
    ///
    /// The material must have all of its textures bound and must outlive
    /// every frame that draws this mesh.
    pub fn set_material(&mut self, index: usize, material: &Material) -> VulkanResult<()> {
        if !material.is_complete() {
            return Err(VulkanError::invalid("material has no albedo texture"));
        }
        let part_count = self.parts.len();
        let part = self
            .parts
            .get_mut(index)
            .ok_or_else(|| VulkanError::invalid(format!("mesh part {} out of range ({} parts)", index, part_count)))?;
        part.material = Some(material.descriptor_set());
        Ok(())
    }

    /// Replace the object to world transform
    pub fn set_world(&self, ctx: &DeviceContext, world: &Matrix4<f32>) -> VulkanResult<()> {
        let uniform = self
            .uniform
            .as_ref()
            .ok_or_else(|| VulkanError::invalid("mesh has no per-mesh uniform"))?;
        uniform.update_pod(ctx, &MeshUniform { world: (*world).into() })
    }

    /// Parts in draw order
    pub fn parts(&self) -> &[MeshPart] {
        &self.parts
    }

    /// Vertex buffer
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    /// Index buffer with `u16` indices
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    /// Descriptor set for the `mesh` slot, if the mesh has a uniform
    pub fn descriptor_set(&self) -> Option<vk::DescriptorSet> {
        self.descriptor_set.as_ref().map(DescriptorSet::handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_cube_geometry() {
        let (vertices, indices) = cube_geometry();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));

        for v in &vertices {
            assert_relative_eq!(Vector3::from(v.nrm).norm(), 1.0);
            assert!(v.pos.iter().all(|c| c.abs() == 0.5));
        }
    }

    #[test]
    fn test_cube_faces_use_own_vertices() {
        let (_, indices) = cube_geometry();
        for (face, triangles) in indices.chunks(6).enumerate() {
            let first = face as u16 * 4;
            assert!(triangles.iter().all(|&i| (first..first + 4).contains(&i)), "face {}", face);
        }
    }

    #[test]
    fn test_fullscreen_triangle_covers_clip_square() {
        let (vertices, indices) = fullscreen_triangle_geometry();
        assert_eq!(indices, vec![0, 1, 2]);
        let max_x = vertices.iter().map(|v| v.pos[0]).fold(f32::MIN, f32::max);
        let max_y = vertices.iter().map(|v| v.pos[1]).fold(f32::MIN, f32::max);
        assert!(max_x >= 3.0 && max_y >= 3.0);
        assert!(vertices.iter().all(|v| v.pos[3] == 1.0));
    }

    #[test]
    fn test_index_type_matches_index_data() {
        assert_eq!(Mesh::INDEX_TYPE, vk::IndexType::UINT16);
        let (_, indices) = cube_geometry();
        let bytes: &[u8] = bytemuck::cast_slice(&indices);
        assert_eq!(bytes.len(), indices.len() * std::mem::size_of::<u16>());
    }

    #[test]
    fn test_whole_part() {
        let part = MeshPart::whole(36);
        assert_eq!((part.ibuffer_offset, part.vbuffer_offset, part.indices_count), (0, 0, 36));
        assert!(part.material.is_none());
    }

    #[test]
    fn test_identity_mesh_uniform() {
        let uniform = MeshUniform::default();
        assert_eq!(uniform.world[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(uniform.world[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
