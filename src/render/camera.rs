use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::orientation::OrientationState;

/// Perspective camera that always looks at the origin.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            eye: Vec3::new(5.0, 0.0, 0.0),
            up: Vec3::Y,
            fov_y_degrees,
            aspect,
            near: 0.1,
            far: 1000.0,
        }
    }

    pub fn follow(&mut self, state: &OrientationState) {
        self.eye = state.position.as_vec3();
        self.up = state.up.as_vec3();
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn build_view_proj(&self) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, Vec3::ZERO, self.up);
        let proj = Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far);
        proj * view
    }

    /// World position of an NDC point at `depth` (0 = near plane, 1 = far plane).
    pub fn unproject(&self, ndc: Vec2, depth: f32) -> Vec3 {
        let p = self.build_view_proj().inverse() * Vec4::new(ndc.x, ndc.y, depth, 1.0);
        p.truncate() / p.w
    }

    /// NDC coordinates of a world position, or `None` behind the camera.
    pub fn project(&self, world_pos: Vec3) -> Option<Vec2> {
        let clip = self.build_view_proj() * world_pos.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        Some(Vec2::new(clip.x / clip.w, clip.y / clip.w))
    }
}
