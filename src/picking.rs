use glam::{Vec2, Vec3};

use crate::geometry::TorusMesh;
use crate::render::camera::Camera;

/// Reject triangles nearly parallel to the ray.
const PARALLEL_EPS: f32 = 1e-7;
/// Ignore hits this close to the ray origin.
const MIN_T: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Ray from the camera eye through an NDC point on the near plane.
    pub fn from_camera(camera: &Camera, ndc: Vec2) -> Self {
        let near = camera.unproject(ndc, 0.0);
        Self {
            origin: camera.eye,
            direction: (near - camera.eye).normalize(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// The face struck by a picking ray. `face` doubles as the board cell index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceHit {
    pub face: usize,
    pub grid: (u32, u32),
    pub t: f32,
    pub point: Vec3,
}

/// Surface pixels to normalized device coordinates (y up).
pub fn pointer_to_ndc(x: f64, y: f64, width: u32, height: u32) -> Vec2 {
    let w = f64::from(width.max(1));
    let h = f64::from(height.max(1));
    Vec2::new((x * 2.0 / w - 1.0) as f32, (1.0 - y * 2.0 / h) as f32)
}

/// Möller–Trumbore. Returns the ray parameter of the hit, double-sided.
pub fn ray_triangle_intersect(ray: &Ray, [v0, v1, v2]: &[Vec3; 3]) -> Option<f32> {
    let e1 = *v1 - *v0;
    let e2 = *v2 - *v0;
    let h = ray.direction.cross(e2);
    let a = e1.dot(h);
    if a.abs() < PARALLEL_EPS {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - *v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * e2.dot(q);
    (t > MIN_T).then_some(t)
}

/// Nearest face under `pointer_ndc`, if the ray touches the torus at all.
pub fn pick(pointer_ndc: Vec2, camera: &Camera, mesh: &TorusMesh) -> Option<FaceHit> {
    let ray = Ray::from_camera(camera, pointer_ndc);
    let (face, t) = mesh
        .triangles()
        .filter_map(|(face, tri)| ray_triangle_intersect(&ray, &tri).map(|t| (face, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    Some(FaceHit {
        face,
        grid: mesh.quads()[face].grid,
        t,
        point: ray.at(t),
    })
}
