//! Camera and light uniforms

use nalgebra::{Matrix4, Perspective3, Point3, Vector3, Vector4};

/// Maps OpenGL clip space (y up, depth -1..1) to Vulkan clip space
/// (y down, depth 0..1)
#[rustfmt::skip]
fn vulkan_clip_correction() -> Matrix4<f32> {
    Matrix4::new(
        1.0,  0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0,  0.0, 0.5, 0.5,
        0.0,  0.0, 0.0, 1.0,
    )
}

/// Perspective camera looking at a target point
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye position
    pub position: Point3<f32>,
    /// Point the camera looks at
    pub target: Point3<f32>,
    /// World up direction
    pub up: Vector3<f32>,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width over height
    pub aspect: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
}

impl Camera {
    /// Camera at `position` looking at `target` with a Y-up world
    pub fn perspective(
        position: Point3<f32>,
        target: Point3<f32>,
        fov_y_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            target,
            up: Vector3::y(),
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Update the aspect ratio from a framebuffer size
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// World to view transform
    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// View to Vulkan clip space transform
    pub fn projection(&self) -> Matrix4<f32> {
        let projection = Perspective3::new(self.aspect, self.fov_y, self.near, self.far);
        vulkan_clip_correction() * projection.to_homogeneous()
    }

    /// World to clip space transform
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection() * self.view()
    }

    /// Uniform block consumed by the camera descriptor set
    pub fn uniform(&self) -> CameraUniform {
        let view_projection = self.view_projection();
        let inverse = view_projection.try_inverse().unwrap_or_else(|| {
            log::warn!("Camera view-projection is not invertible");
            Matrix4::identity()
        });
        CameraUniform {
            view_projection: view_projection.into(),
            inverse_view_projection: inverse.into(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(
            Point3::new(-2.0, 4.0, 10.0),
            Point3::origin(),
            60.0,
            1.0,
            0.1,
            20.0,
        )
    }
}

/// Camera uniform data, column-major matrices
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraUniform {
    /// World to clip space
    pub view_projection: [[f32; 4]; 4],
    /// Clip to world space, used to reconstruct positions from depth
    pub inverse_view_projection: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for CameraUniform {}
unsafe impl bytemuck::Zeroable for CameraUniform {}

/// Light uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightUniform {
    /// Light color, alpha is intensity
    pub diffuse: [f32; 4],
    /// World position, w = 1 for positional lights
    pub position: [f32; 4],
    /// Direction the light travels in, w = 0
    pub direction: [f32; 4],
}

unsafe impl bytemuck::Pod for LightUniform {}
unsafe impl bytemuck::Zeroable for LightUniform {}

impl LightUniform {
    /// Directional light travelling along `direction`
    pub fn directional(direction: Vector3<f32>, color: [f32; 4]) -> Self {
        let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vector3::y());
        Self {
            diffuse: color,
            position: [0.0; 4],
            direction: Vector4::new(direction.x, direction.y, direction.z, 0.0).into(),
        }
    }
}

impl Default for LightUniform {
    fn default() -> Self {
        Self::directional(Vector3::new(-1.0, -1.0, -1.0), [1.0, 1.0, 1.0, 1.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn project(m: &Matrix4<f32>, p: Point3<f32>) -> Vector3<f32> {
        let clip = m * p.to_homogeneous();
        clip.xyz() / clip.w
    }

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::default();
        let ndc = project(&camera.view_projection(), camera.target);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_depth_range_is_zero_to_one() {
        let camera = Camera::perspective(Point3::origin(), Point3::new(0.0, 0.0, -1.0), 90.0, 1.0, 1.0, 10.0);
        let near = project(&camera.view_projection(), Point3::new(0.0, 0.0, -1.0));
        let far = project(&camera.view_projection(), Point3::new(0.0, 0.0, -10.0));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_up_maps_to_negative_y() {
        let camera = Camera::perspective(Point3::origin(), Point3::new(0.0, 0.0, -1.0), 90.0, 1.0, 1.0, 10.0);
        let above = project(&camera.view_projection(), Point3::new(0.0, 1.0, -2.0));
        assert!(above.y < 0.0);
    }

    #[test]
    fn test_uniform_inverse() {
        let uniform = Camera::default().uniform();
        let vp = Matrix4::from(uniform.view_projection);
        let inv = Matrix4::from(uniform.inverse_view_projection);
        assert_relative_eq!(vp * inv, Matrix4::identity(), epsilon = 1e-4);
    }

    #[test]
    fn test_viewport_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport_size(1280, 720);
        assert_relative_eq!(camera.aspect, 16.0 / 9.0);
        camera.set_viewport_size(100, 0);
        assert_relative_eq!(camera.aspect, 16.0 / 9.0);
    }

    #[test]
    fn test_directional_light_normalized() {
        let light = LightUniform::directional(Vector3::new(0.0, -2.0, 0.0), [1.0; 4]);
        assert_eq!(light.direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(std::mem::size_of::<LightUniform>(), 48);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
    }
}
