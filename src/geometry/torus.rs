use std::f32::consts::TAU;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Shape parameters for a torus. `thickness` is the tube radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TorusParams {
    pub radius: f32,
    pub thickness: f32,
    pub x_segments: u32,
    pub y_segments: u32,
}

impl Default for TorusParams {
    fn default() -> Self {
        Self {
            radius: 2.0,
            thickness: 1.5,
            x_segments: 19,
            y_segments: 19,
        }
    }
}

impl TorusParams {
    pub fn face_count(&self) -> usize {
        self.x_segments as usize * self.y_segments as usize
    }
}

/// Neighbor slots in `Quad::neighbors`.
pub const NEIGHBOR_PREV_U: usize = 0;
pub const NEIGHBOR_NEXT_U: usize = 1;
pub const NEIGHBOR_PREV_V: usize = 2;
pub const NEIGHBOR_NEXT_V: usize = 3;

/// One grid cell of the torus surface.
#[derive(Clone, Debug)]
pub struct Quad {
    /// Indices into the shared vertex grid, counter-clockwise seen from outside.
    pub corners: [u32; 4],
    /// Average of the four corners. Board markers sit here.
    pub center: Vec3,
    /// Outward unit normal.
    pub normal: Vec3,
    pub color: [f32; 3],
    /// `(i, j)`: `i` along the major sweep, `j` around the tube.
    pub grid: (u32, u32),
    /// Face indices of the four edge-adjacent quads, wrapping in both directions.
    pub neighbors: [usize; 4],
}

/// Parametric torus surface under a live twist deformation.
///
/// Faces are stored row-major with `i` outer: face `i * y_segments + j`.
/// The vertex grid duplicates the seam rows (`x_segments + 1` by
/// `y_segments + 1`) so that a non-integer twist never stretches a face
/// across the seam.
pub struct TorusMesh {
    params: TorusParams,
    twist: f32,
    vertices: Vec<Vec3>,
    quads: Vec<Quad>,
    colors_dirty: bool,
    geometry_dirty: bool,
}

impl TorusMesh {
    pub fn build(params: TorusParams) -> Self {
        let xs = params.x_segments.max(1);
        let ys = params.y_segments.max(1);
        let params = TorusParams {
            x_segments: xs,
            y_segments: ys,
            ..params
        };

        let stride = ys + 1;
        let mut quads = Vec::with_capacity(params.face_count());
        for i in 0..xs {
            for j in 0..ys {
                let a = i * stride + j;
                let b = (i + 1) * stride + j;
                let wrap = |i: u32, j: u32| (i % xs * ys + j % ys) as usize;
                quads.push(Quad {
                    corners: [a, b, b + 1, a + 1],
                    center: Vec3::ZERO,
                    normal: Vec3::ZERO,
                    color: [1.0, 1.0, 1.0],
                    grid: (i, j),
                    neighbors: [
                        wrap(i + xs - 1, j),
                        wrap(i + 1, j),
                        wrap(i, j + ys - 1),
                        wrap(i, j + 1),
                    ],
                });
            }
        }

        let mut mesh = Self {
            params,
            twist: 0.0,
            vertices: vec![Vec3::ZERO; ((xs + 1) * stride) as usize],
            quads,
            colors_dirty: true,
            geometry_dirty: true,
        };
        mesh.update_geometry();
        mesh
    }

    pub fn params(&self) -> &TorusParams {
        &self.params
    }

    pub fn twist(&self) -> f32 {
        self.twist
    }

    pub fn set_twist(&mut self, twist: f32) {
        self.twist = twist;
    }

    pub fn add_twist(&mut self, amount: f32) {
        self.twist += amount;
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn face_count(&self) -> usize {
        self.quads.len()
    }

    pub fn face_index(&self, i: u32, j: u32) -> Option<usize> {
        (i < self.params.x_segments && j < self.params.y_segments)
            .then(|| (i * self.params.y_segments + j) as usize)
    }

    pub fn grid(&self, face: usize) -> Option<(u32, u32)> {
        self.quads.get(face).map(|q| q.grid)
    }

    pub fn neighbors(&self, face: usize) -> Option<[usize; 4]> {
        self.quads.get(face).map(|q| q.neighbors)
    }

    /// Surface point at angles `u` (major sweep) and `v` (around the tube)
    /// for the current twist.
    pub fn surface_point(&self, u: f32, v: f32) -> Vec3 {
        let w = v + self.twist * u;
        let ring = self.params.radius + self.params.thickness * w.cos();
        Vec3::new(ring * u.cos(), ring * u.sin(), self.params.thickness * w.sin())
    }

    /// Recompute every vertex, quad center and face normal for the current
    /// twist. Colors, grid coordinates and adjacency are untouched.
    pub fn update_geometry(&mut self) {
        let xs = self.params.x_segments;
        let ys = self.params.y_segments;
        let stride = ys + 1;
        for a in 0..=xs {
            let u = a as f32 / xs as f32 * TAU;
            for b in 0..=ys {
                let v = b as f32 / ys as f32 * TAU;
                self.vertices[(a * stride + b) as usize] = self.surface_point(u, v);
            }
        }

        for quad in &mut self.quads {
            let [p0, p1, p2, p3] = quad.corners.map(|c| self.vertices[c as usize]);
            quad.center = (p0 + p1 + p2 + p3) * 0.25;
            quad.normal = (p2 - p0).cross(p3 - p1).normalize_or_zero();
        }
        self.geometry_dirty = true;
    }

    pub fn set_color(&mut self, face: usize, r: f32, g: f32, b: f32) -> Result<(), GeometryError> {
        let count = self.quads.len();
        let quad = self
            .quads
            .get_mut(face)
            .ok_or(GeometryError::FaceOutOfRange { index: face, count })?;
        quad.color = [r, g, b];
        self.colors_dirty = true;
        Ok(())
    }

    /// Returns whether colors changed since the last call, clearing the flag.
    pub fn take_colors_dirty(&mut self) -> bool {
        std::mem::take(&mut self.colors_dirty)
    }

    /// Returns whether positions changed since the last call, clearing the flag.
    pub fn take_geometry_dirty(&mut self) -> bool {
        std::mem::take(&mut self.geometry_dirty)
    }

    /// Two triangles per quad, in face order: `(face, [p0, p1, p2])`.
    pub fn triangles(&self) -> impl Iterator<Item = (usize, [Vec3; 3])> + '_ {
        self.quads.iter().enumerate().flat_map(move |(face, quad)| {
            let [p0, p1, p2, p3] = quad.corners.map(|c| self.vertices[c as usize]);
            [(face, [p0, p1, p2]), (face, [p0, p2, p3])]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const EPS: f32 = 1e-5;

    fn vec_approx_eq(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < EPS
    }

    #[test]
    fn test_face_count_and_grid_coverage() {
        let mesh = TorusMesh::build(TorusParams {
            x_segments: 7,
            y_segments: 5,
            ..Default::default()
        });
        assert_eq!(mesh.face_count(), 35);
        let grids: HashSet<(u32, u32)> = mesh.quads().iter().map(|q| q.grid).collect();
        assert_eq!(grids.len(), 35);
        for (face, quad) in mesh.quads().iter().enumerate() {
            let (i, j) = quad.grid;
            assert!(i < 7 && j < 5);
            assert_eq!(mesh.face_index(i, j), Some(face));
            assert_eq!(mesh.grid(face), Some((i, j)));
        }
        assert_eq!(mesh.face_index(7, 0), None);
        assert_eq!(mesh.grid(35), None);
    }

    #[test]
    fn test_untwisted_matches_standard_torus() {
        let params = TorusParams::default();
        let mesh = TorusMesh::build(params);
        for v in mesh.vertices() {
            // Distance from the tube's center circle equals the tube radius.
            let rho = (v.x * v.x + v.y * v.y).sqrt();
            let d = ((rho - params.radius).powi(2) + v.z * v.z).sqrt();
            assert!((d - params.thickness).abs() < EPS);
        }
        let q = &mesh.quads()[0];
        let expected = mesh.vertices()[q.corners[0] as usize];
        assert!(vec_approx_eq(expected, Vec3::new(3.5, 0.0, 0.0)));
    }

    #[test]
    fn test_twist_zero_restores_initial_build() {
        let params = TorusParams::default();
        let fresh = TorusMesh::build(params);
        let mut mesh = TorusMesh::build(params);
        mesh.set_twist(1.3);
        mesh.update_geometry();
        assert!(!vec_approx_eq(mesh.quads()[10].center, fresh.quads()[10].center));
        mesh.set_twist(0.0);
        mesh.update_geometry();
        for (a, b) in mesh.vertices().iter().zip(fresh.vertices()) {
            assert!(vec_approx_eq(*a, *b));
        }
        for (a, b) in mesh.quads().iter().zip(fresh.quads()) {
            assert!(vec_approx_eq(a.normal, b.normal));
        }
    }

    #[test]
    fn test_regeneration_preserves_colors() {
        let mut mesh = TorusMesh::build(TorusParams::default());
        let k = 42;
        mesh.set_color(k, 0.2, 0.4, 0.6).unwrap();
        let before = mesh.quads()[k].center;
        mesh.add_twist(0.5);
        mesh.update_geometry();
        assert_eq!(mesh.quads()[k].color, [0.2, 0.4, 0.6]);
        assert!(!vec_approx_eq(mesh.quads()[k].center, before));
        assert_eq!(mesh.quads()[k].grid, (2, 4));
    }

    #[test]
    fn test_set_color_out_of_range() {
        let mut mesh = TorusMesh::build(TorusParams::default());
        assert_eq!(
            mesh.set_color(361, 0.0, 0.0, 0.0),
            Err(GeometryError::FaceOutOfRange { index: 361, count: 361 })
        );
    }

    #[test]
    fn test_dirty_flags() {
        let mut mesh = TorusMesh::build(TorusParams::default());
        assert!(mesh.take_colors_dirty());
        assert!(mesh.take_geometry_dirty());
        assert!(!mesh.take_colors_dirty());
        mesh.set_color(0, 1.0, 0.0, 0.0).unwrap();
        assert!(mesh.take_colors_dirty());
        mesh.update_geometry();
        assert!(mesh.take_geometry_dirty());
    }

    #[test]
    fn test_adjacency_wraps_and_is_symmetric() {
        let mesh = TorusMesh::build(TorusParams {
            x_segments: 4,
            y_segments: 3,
            ..Default::default()
        });
        let n = mesh.neighbors(0).unwrap();
        assert_eq!(n[NEIGHBOR_PREV_U], mesh.face_index(3, 0).unwrap());
        assert_eq!(n[NEIGHBOR_NEXT_U], mesh.face_index(1, 0).unwrap());
        assert_eq!(n[NEIGHBOR_PREV_V], mesh.face_index(0, 2).unwrap());
        assert_eq!(n[NEIGHBOR_NEXT_V], mesh.face_index(0, 1).unwrap());
        for face in 0..mesh.face_count() {
            let n = mesh.neighbors(face).unwrap();
            assert_eq!(mesh.neighbors(n[NEIGHBOR_NEXT_U]).unwrap()[NEIGHBOR_PREV_U], face);
            assert_eq!(mesh.neighbors(n[NEIGHBOR_NEXT_V]).unwrap()[NEIGHBOR_PREV_V], face);
        }
    }

    #[test]
    fn test_normals_point_outward() {
        let mut mesh = TorusMesh::build(TorusParams::default());
        mesh.set_twist(0.7);
        mesh.update_geometry();
        let params = *mesh.params();
        for quad in mesh.quads() {
            let c = quad.center;
            let ring = Vec3::new(c.x, c.y, 0.0).normalize() * params.radius;
            let outward = (c - ring).normalize();
            assert!(quad.normal.dot(outward) > 0.5);
            assert!((quad.normal.length() - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_triangles_cover_every_face_twice() {
        let mesh = TorusMesh::build(TorusParams::default());
        let tris: Vec<_> = mesh.triangles().collect();
        assert_eq!(tris.len(), mesh.face_count() * 2);
        assert_eq!(tris[0].0, 0);
        assert_eq!(tris[1].0, 0);
        assert_eq!(tris[2].0, 1);
    }
}
