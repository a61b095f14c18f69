use crate::geometry::TorusMesh;

/// 36-byte vertex: position (12), normal (12), color (12).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // normal
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // color
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// CPU-side triangle list ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Flat-shaded torus: four unshared vertices per quad carrying the face
/// normal and face color, two triangles each.
pub fn build_torus_mesh(mesh: &TorusMesh) -> MeshData {
    let mut vertices = Vec::with_capacity(mesh.face_count() * 4);
    let mut indices = Vec::with_capacity(mesh.face_count() * 6);
    let grid = mesh.vertices();

    for quad in mesh.quads() {
        let base = vertices.len() as u32;
        for corner in quad.corners {
            vertices.push(Vertex {
                position: grid[corner as usize].to_array(),
                normal: quad.normal.to_array(),
                color: quad.color,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData { vertices, indices }
}

/// Axis-aligned cube of edge `size` centered at the origin, white vertex
/// colors so the material tint decides the final color.
pub fn build_box_mesh(size: f32) -> MeshData {
    let h = size * 0.5;
    // (normal, tangent u, tangent v) per face; u x v == normal keeps CCW winding
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = [0, 1, 2].map(|k| (n[k] + u[k] * su + v[k] * sv) * h);
            vertices.push(Vertex {
                position,
                normal: n,
                color: [1.0, 1.0, 1.0],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TorusParams;
    use glam::Vec3;

    #[test]
    fn test_torus_mesh_layout() {
        let mut torus = TorusMesh::build(TorusParams::default());
        torus.set_color(3, 0.5, 0.25, 0.125).unwrap();
        let data = build_torus_mesh(&torus);
        assert_eq!(data.vertices.len(), 361 * 4);
        assert_eq!(data.index_count(), 361 * 6);
        assert_eq!(data.vertices[12].color, [0.5, 0.25, 0.125]);
        assert_eq!(data.vertices[12].normal, torus.quads()[3].normal.to_array());
        assert_eq!(data.vertex_bytes().len(), 361 * 4 * 36);
    }

    #[test]
    fn test_box_mesh_winding_matches_normals() {
        let data = build_box_mesh(0.1);
        assert_eq!(data.vertices.len(), 24);
        assert_eq!(data.indices.len(), 36);
        for tri in data.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(data.vertices[i as usize].position));
            let n = Vec3::from(data.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(n) > 0.0);
        }
        for v in &data.vertices {
            assert!(v.position.iter().all(|p| (p.abs() - 0.05).abs() < 1e-6));
        }
    }
}
