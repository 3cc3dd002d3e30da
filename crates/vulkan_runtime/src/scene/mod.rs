//! Client-side scene objects: meshes, materials, camera and light

pub mod camera;
pub mod material;
pub mod mesh;
pub mod vertex_layout;

pub use camera::{Camera, CameraUniform, LightUniform};
pub use material::{Material, MaterialUniform};
pub use mesh::{Mesh, MeshPart, MeshUniform};
pub use vertex_layout::{FullscreenVertex, GeometryVertex, VertexLayout};

/// Meshes drawn by the mesh renderers
#[derive(Default)]
pub struct Scene {
    /// Meshes in draw order
    pub meshes: Vec<Mesh>,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mesh and return its index
    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }
}
