//! Arena-owned scene graph.
//!
//! Nodes, geometries and materials live in slot maps owned by [`Scene`].
//! Geometries and materials are shared between nodes; every mesh node also
//! owns one uniform buffer for its transform. GPU handles are created lazily
//! in [`Scene::prepare`] and handed back through a release callback, never
//! dropped silently.

use glam::{Mat4, Vec3};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::error::RenderError;
use crate::render::backend::{DrawCall, GpuResource, Lighting, NodeUniforms, RenderBackend, ResourceKind};
use crate::render::mesh::MeshData;

slotmap::new_key_type! {
    pub struct NodeId;
    pub struct GeometryId;
    pub struct MaterialId;
}

/// `0xRRGGBB` to linear-ish floats.
pub fn hex_color(rgb: u32) -> [f32; 3] {
    [(rgb >> 16) & 0xff, (rgb >> 8) & 0xff, rgb & 0xff].map(|c| c as f32 / 255.0)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub label: String,
    /// Multiplied into vertex colors.
    pub color: [f32; 3],
}

impl Material {
    pub fn new(label: impl Into<String>, color: [f32; 3]) -> Self {
        Self { label: label.into(), color }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Light {
    Ambient { color: [f32; 3] },
    /// Shines from the node's position towards the origin.
    Directional { color: [f32; 3] },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh { geometry: GeometryId, material: MaterialId },
    Light(Light),
    Camera,
}

pub struct Node {
    pub kind: NodeKind,
    /// Translation relative to the parent.
    pub position: Vec3,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    uniforms: Option<GpuResource>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

struct GeometrySlot {
    data: MeshData,
    /// Uploaded handle and its byte capacity.
    vertices: Option<(GpuResource, usize)>,
    indices: Option<(GpuResource, usize)>,
    dirty: bool,
}

impl GeometrySlot {
    fn upload(&mut self, backend: &mut dyn RenderBackend) -> Result<(GpuResource, GpuResource, u32), RenderError> {
        let vertices = upload_buffer(
            backend,
            &mut self.vertices,
            ResourceKind::VertexBuffer,
            self.data.vertex_bytes(),
            self.dirty,
        )?;
        let indices = upload_buffer(
            backend,
            &mut self.indices,
            ResourceKind::IndexBuffer,
            self.data.index_bytes(),
            self.dirty,
        )?;
        self.dirty = false;
        Ok((vertices, indices, self.data.index_count()))
    }

    fn release(&mut self, release: &mut dyn FnMut(GpuResource)) {
        for (resource, _) in [self.vertices.take(), self.indices.take()].into_iter().flatten() {
            release(resource);
        }
        self.dirty = true;
    }
}

fn upload_buffer(
    backend: &mut dyn RenderBackend,
    slot: &mut Option<(GpuResource, usize)>,
    kind: ResourceKind,
    bytes: &[u8],
    dirty: bool,
) -> Result<GpuResource, RenderError> {
    match *slot {
        Some((resource, _)) if !dirty => Ok(resource),
        Some((resource, capacity)) if bytes.len() <= capacity => {
            backend.write_buffer(resource, bytes)?;
            Ok(resource)
        }
        stale => {
            if let Some((resource, _)) = stale {
                backend.release(resource);
            }
            let label = match kind {
                ResourceKind::IndexBuffer => "index buffer",
                _ => "vertex buffer",
            };
            let resource = backend.create_buffer(kind, label, bytes)?;
            *slot = Some((resource, bytes.len()));
            Ok(resource)
        }
    }
}

struct MaterialSlot {
    material: Material,
    program: Option<GpuResource>,
}

pub struct Scene {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    geometries: SlotMap<GeometryId, GeometrySlot>,
    materials: SlotMap<MaterialId, MaterialSlot>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            kind: NodeKind::Group,
            position: Vec3::ZERO,
            parent: None,
            children: SmallVec::new(),
            uniforms: None,
        });
        Self {
            nodes,
            root,
            geometries: SlotMap::with_key(),
            materials: SlotMap::with_key(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes below the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn add_geometry(&mut self, data: MeshData) -> GeometryId {
        self.geometries.insert(GeometrySlot {
            data,
            vertices: None,
            indices: None,
            dirty: true,
        })
    }

    /// Replace a geometry's data; buffers are rewritten on the next prepare.
    pub fn set_geometry_data(&mut self, id: GeometryId, data: MeshData) -> bool {
        let Some(slot) = self.geometries.get_mut(id) else {
            return false;
        };
        slot.data = data;
        slot.dirty = true;
        true
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(MaterialSlot { material, program: None })
    }

    pub fn add(&mut self, parent: NodeId, kind: NodeKind, position: Vec3) -> NodeId {
        let parent = if self.nodes.contains_key(parent) {
            parent
        } else {
            log::warn!("parent node is gone, attaching to the scene root");
            self.root
        };
        let id = self.nodes.insert(Node {
            kind,
            position,
            parent: Some(parent),
            children: SmallVec::new(),
            uniforms: None,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.position = position;
        }
    }

    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        let mut node = self.nodes.get(id)?;
        let mut position = node.position;
        while let Some(parent) = node.parent.and_then(|p| self.nodes.get(p)) {
            position += parent.position;
            node = parent;
        }
        Some(position)
    }

    /// Handles currently held by nodes, geometries and materials.
    pub fn retained_resources(&self) -> usize {
        let nodes = self.nodes.values().filter(|n| n.uniforms.is_some()).count();
        let geometries: usize = self
            .geometries
            .values()
            .map(|g| usize::from(g.vertices.is_some()) + usize::from(g.indices.is_some()))
            .sum();
        let materials = self.materials.values().filter(|m| m.program.is_some()).count();
        nodes + geometries + materials
    }

    /// Remove a subtree, leaves first. Per-node uniforms are released; shared
    /// geometries and materials stay resident.
    pub fn remove(&mut self, id: NodeId, release: &mut dyn FnMut(GpuResource)) {
        if id == self.root {
            return;
        }
        let Some(children) = self.nodes.get(id).map(|n| n.children.clone()) else {
            return;
        };
        for child in children.into_iter().rev() {
            self.remove(child, release);
        }
        if let Some(uniforms) = self.nodes.get_mut(id).and_then(|n| n.uniforms.take()) {
            release(uniforms);
        }
        self.detach(id);
    }

    /// Tear the whole graph down. Each node's resources, including the shared
    /// geometry and material it draws with, are released before the node is
    /// detached from its parent.
    pub fn dispose_all(&mut self, release: &mut dyn FnMut(GpuResource)) {
        while let Some(child) = self.nodes.get(self.root).and_then(|r| r.children.last().copied()) {
            self.dispose_hierarchy(child, release);
        }
        for (_, geometry) in self.geometries.iter_mut() {
            geometry.release(release);
        }
        for (_, material) in self.materials.iter_mut() {
            if let Some(program) = material.program.take() {
                release(program);
            }
        }
        self.geometries.clear();
        self.materials.clear();
    }

    /// Give every handle back without touching the graph. Used when the
    /// backend goes away; the next prepare uploads everything again.
    pub fn release_resources(&mut self, release: &mut dyn FnMut(GpuResource)) {
        for node in self.nodes.values_mut() {
            if let Some(uniforms) = node.uniforms.take() {
                release(uniforms);
            }
        }
        for geometry in self.geometries.values_mut() {
            geometry.release(release);
        }
        for material in self.materials.values_mut() {
            if let Some(program) = material.program.take() {
                release(program);
            }
        }
    }

    fn dispose_hierarchy(&mut self, id: NodeId, release: &mut dyn FnMut(GpuResource)) {
        let children = self.nodes.get(id).map(|n| n.children.clone()).unwrap_or_default();
        for child in children.into_iter().rev() {
            self.dispose_hierarchy(child, release);
        }
        self.dispose_node(id, release);
        self.detach(id);
    }

    fn dispose_node(&mut self, id: NodeId, release: &mut dyn FnMut(GpuResource)) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if let Some(uniforms) = node.uniforms.take() {
            release(uniforms);
        }
        if let NodeKind::Mesh { geometry, material } = node.kind {
            if let Some(slot) = self.geometries.get_mut(geometry) {
                slot.release(release);
            }
            if let Some(program) = self.materials.get_mut(material).and_then(|m| m.program.take()) {
                release(program);
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
    }

    /// Upload whatever is missing or stale and return one draw per mesh node,
    /// depth-first.
    pub fn prepare(&mut self, backend: &mut dyn RenderBackend) -> Result<Vec<DrawCall>, RenderError> {
        let mut draws = Vec::new();
        let mut stack = vec![(self.root, Vec3::ZERO)];

        while let Some((id, parent_position)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let world = parent_position + node.position;
            stack.extend(node.children.iter().rev().map(|&c| (c, world)));

            let NodeKind::Mesh { geometry, material } = node.kind else {
                continue;
            };
            let Some(geometry) = self.geometries.get_mut(geometry) else {
                log::warn!("mesh node references a missing geometry, skipping");
                continue;
            };
            let (vertices, indices, index_count) = geometry.upload(backend)?;
            let Some(material) = self.materials.get_mut(material) else {
                log::warn!("mesh node references a missing material, skipping");
                continue;
            };
            let program = match material.program {
                Some(program) => program,
                None => {
                    let program = backend.create_program(&material.material)?;
                    material.program = Some(program);
                    program
                }
            };

            let data = NodeUniforms::new(Mat4::from_translation(world), material.material.color);
            let bytes = bytemuck::bytes_of(&data);
            let node = &mut self.nodes[id];
            let uniforms = match node.uniforms {
                Some(uniforms) => {
                    backend.write_buffer(uniforms, bytes)?;
                    uniforms
                }
                None => {
                    let uniforms = backend.create_buffer(ResourceKind::Uniform, "node uniforms", bytes)?;
                    node.uniforms = Some(uniforms);
                    uniforms
                }
            };

            draws.push(DrawCall {
                vertices,
                indices,
                index_count,
                program,
                uniforms,
            });
        }

        Ok(draws)
    }

    pub fn lighting(&self) -> Lighting {
        let mut lighting = Lighting::default();
        for node in self.nodes.values() {
            match node.kind {
                NodeKind::Light(Light::Ambient { color }) => {
                    for (acc, c) in lighting.ambient.iter_mut().zip(color) {
                        *acc += c;
                    }
                }
                NodeKind::Light(Light::Directional { color }) => {
                    lighting.directional = color;
                    lighting.direction = node.position.try_normalize().unwrap_or(Vec3::X);
                }
                _ => {}
            }
        }
        lighting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;
    use crate::render::mesh::build_box_mesh;

    fn cube_scene() -> (Scene, NodeId, NodeId, NodeId) {
        let mut scene = Scene::new();
        let geometry = scene.add_geometry(build_box_mesh(1.0));
        let material = scene.add_material(Material::new("grey", hex_color(0x808080)));
        let group = scene.add(scene.root(), NodeKind::Group, Vec3::new(1.0, 0.0, 0.0));
        let a = scene.add(group, NodeKind::Mesh { geometry, material }, Vec3::new(0.0, 2.0, 0.0));
        let b = scene.add(group, NodeKind::Mesh { geometry, material }, Vec3::new(0.0, 0.0, 3.0));
        (scene, group, a, b)
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(hex_color(0xff0000), [1.0, 0.0, 0.0]);
        assert_eq!(hex_color(0x333333)[1], 0x33 as f32 / 255.0);
    }

    #[test]
    fn test_world_position_accumulates_parents() {
        let (scene, group, a, _) = cube_scene();
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.world_position(a), Some(Vec3::new(1.0, 2.0, 0.0)));
        assert_eq!(scene.node(a).unwrap().parent(), Some(group));
        assert_eq!(scene.node(group).unwrap().children().len(), 2);
    }

    #[test]
    fn test_prepare_shares_geometry_and_program() {
        let (mut scene, _, _, _) = cube_scene();
        let mut backend = HeadlessBackend::new(8, 8);
        let draws = scene.prepare(&mut backend).unwrap();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertices, draws[1].vertices);
        assert_eq!(draws[0].program, draws[1].program);
        assert_ne!(draws[0].uniforms, draws[1].uniforms);
        assert_eq!(draws[0].index_count, 36);
        // vertex + index + program + 2 node uniforms
        assert_eq!(backend.stats().live_resources, 5);
        assert_eq!(scene.retained_resources(), 5);

        // A second prepare reuses everything
        let again = scene.prepare(&mut backend).unwrap();
        assert_eq!(again, draws);
        assert_eq!(backend.stats().live_resources, 5);
    }

    #[test]
    fn test_growing_geometry_reallocates() {
        let mut scene = Scene::new();
        let geometry = scene.add_geometry(build_box_mesh(1.0));
        let material = scene.add_material(Material::new("m", [1.0; 3]));
        scene.add(scene.root(), NodeKind::Mesh { geometry, material }, Vec3::ZERO);
        let mut backend = HeadlessBackend::new(8, 8);
        let first = scene.prepare(&mut backend).unwrap()[0];

        let mut bigger = build_box_mesh(1.0);
        bigger.vertices.extend(build_box_mesh(2.0).vertices);
        assert!(scene.set_geometry_data(geometry, bigger));
        let second = scene.prepare(&mut backend).unwrap()[0];
        assert_ne!(first.vertices, second.vertices);
        assert_eq!(first.indices, second.indices);
        assert_eq!(backend.stats().live_resources, 4);
    }

    #[test]
    fn test_remove_releases_only_node_uniforms() {
        let (mut scene, group, _, _) = cube_scene();
        let mut backend = HeadlessBackend::new(8, 8);
        scene.prepare(&mut backend).unwrap();

        let mut released = Vec::new();
        scene.remove(group, &mut |r| released.push(r));
        assert_eq!(released.len(), 2);
        assert!(released.iter().all(|r| r.kind == ResourceKind::Uniform));
        assert!(scene.is_empty());
        assert!(!scene.contains(group));
        // shared geometry and program are still held
        assert_eq!(scene.retained_resources(), 3);
    }

    #[test]
    fn test_dispose_all_releases_leaves_before_parents() {
        let (mut scene, _, a, b) = cube_scene();
        let mut backend = HeadlessBackend::new(8, 8);
        scene.prepare(&mut backend).unwrap();

        let mut released = Vec::new();
        scene.dispose_all(&mut |r| {
            released.push(r.kind);
            backend.release(r);
        });
        // b is the last child, so it goes first: its uniform, then the shared buffers
        assert_eq!(
            released[..4],
            [
                ResourceKind::Uniform,
                ResourceKind::VertexBuffer,
                ResourceKind::IndexBuffer,
                ResourceKind::Program,
            ]
        );
        assert_eq!(released[4], ResourceKind::Uniform);
        assert_eq!(released.len(), 5);
        assert!(scene.is_empty());
        assert!(!scene.contains(a) && !scene.contains(b));
        assert_eq!(scene.retained_resources(), 0);
        assert_eq!(backend.stats().live_resources, 0);
    }

    #[test]
    fn test_release_resources_keeps_graph() {
        let (mut scene, _, _, _) = cube_scene();
        let mut backend = HeadlessBackend::new(8, 8);
        scene.prepare(&mut backend).unwrap();
        scene.release_resources(&mut |r| backend.release(r));
        assert_eq!(scene.len(), 3);
        assert_eq!(backend.stats().live_resources, 0);
        assert_eq!(scene.prepare(&mut backend).unwrap().len(), 2);
        assert_eq!(backend.stats().live_resources, 5);
    }

    #[test]
    fn test_lighting_collects_light_nodes() {
        let mut scene = Scene::new();
        let root = scene.root();
        scene.add(root, NodeKind::Light(Light::Ambient { color: [0.2; 3] }), Vec3::ZERO);
        scene.add(root, NodeKind::Light(Light::Directional { color: [0.5; 3] }), Vec3::new(0.0, 0.0, 4.0));
        let lighting = scene.lighting();
        assert_eq!(lighting.ambient, [0.2; 3]);
        assert_eq!(lighting.directional, [0.5; 3]);
        assert_eq!(lighting.direction, Vec3::Z);
    }
}
