use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::geometry::TorusMesh;
use crate::render::backend::GpuResource;
use crate::render::mesh::build_box_mesh;
use crate::render::scene::{hex_color, GeometryId, Material, MaterialId, NodeId, NodeKind, Scene};

pub const BLACK_STONE_COLOR: u32 = 0x333333;
pub const WHITE_STONE_COLOR: u32 = 0xcccccc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Empty,
    Black,
    White,
}

impl CellState {
    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }
}

/// Checks a board snapshot against the mesh it will be drawn on.
pub fn check_dimensions(board: &[CellState], face_count: usize) -> Result<(), BoardError> {
    if board.len() != face_count {
        return Err(BoardError::DimensionMismatch {
            expected: face_count,
            actual: board.len(),
        });
    }
    Ok(())
}

/// Owns the marker nodes of the current frame. Every sync throws the old
/// set away and builds a new one; the set is bounded by the face count.
pub struct BoardOverlay {
    parent: NodeId,
    stone: GeometryId,
    black: MaterialId,
    white: MaterialId,
    markers: Vec<NodeId>,
}

impl BoardOverlay {
    pub fn new(scene: &mut Scene, parent: NodeId, stone_size: f32) -> Self {
        Self {
            parent,
            stone: scene.add_geometry(build_box_mesh(stone_size)),
            black: scene.add_material(Material::new("black", hex_color(BLACK_STONE_COLOR))),
            white: scene.add_material(Material::new("white", hex_color(WHITE_STONE_COLOR))),
            markers: Vec::new(),
        }
    }

    pub fn markers(&self) -> &[NodeId] {
        &self.markers
    }

    pub fn marker_positions(&self, scene: &Scene) -> Vec<Vec3> {
        self.markers
            .iter()
            .filter_map(|&id| scene.world_position(id))
            .collect()
    }

    /// Rebuild the markers for `board`. On a length mismatch nothing is
    /// touched and the previous markers stay in place.
    pub fn sync(
        &mut self,
        board: &[CellState],
        mesh: &TorusMesh,
        scene: &mut Scene,
        release: &mut dyn FnMut(GpuResource),
    ) -> Result<usize, BoardError> {
        check_dimensions(board, mesh.face_count())?;

        self.retire(scene, release);

        for (quad, cell) in mesh.quads().iter().zip(board) {
            let material = match cell {
                CellState::Empty => continue,
                CellState::Black => self.black,
                CellState::White => self.white,
            };
            let kind = NodeKind::Mesh {
                geometry: self.stone,
                material,
            };
            self.markers.push(scene.add(self.parent, kind, quad.center));
        }

        log::trace!("board overlay: {} markers", self.markers.len());
        Ok(self.markers.len())
    }

    /// Detach every marker and release its per-node resources.
    pub fn retire(&mut self, scene: &mut Scene, release: &mut dyn FnMut(GpuResource)) {
        for id in self.markers.drain(..) {
            scene.remove(id, release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TorusParams;
    use crate::render::headless::HeadlessBackend;
    use crate::render::backend::RenderBackend;

    fn setup() -> (Scene, BoardOverlay, TorusMesh) {
        let mut scene = Scene::new();
        let root = scene.root();
        let overlay = BoardOverlay::new(&mut scene, root, 0.1);
        (scene, overlay, TorusMesh::build(TorusParams::default()))
    }

    #[test]
    fn test_empty_board_has_no_markers() {
        let (mut scene, mut overlay, mesh) = setup();
        let board = vec![CellState::Empty; mesh.face_count()];
        assert_eq!(overlay.sync(&board, &mesh, &mut scene, &mut |_| {}), Ok(0));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_one_black_one_white() {
        let (mut scene, mut overlay, mesh) = setup();
        let mut board = vec![CellState::Empty; mesh.face_count()];
        board[5] = CellState::Black;
        board[200] = CellState::White;
        assert_eq!(overlay.sync(&board, &mesh, &mut scene, &mut |_| {}), Ok(2));

        let positions = overlay.marker_positions(&scene);
        assert_eq!(positions, vec![mesh.quads()[5].center, mesh.quads()[200].center]);

        let kinds: Vec<_> = overlay
            .markers()
            .iter()
            .map(|&id| scene.node(id).unwrap().kind)
            .collect();
        assert_ne!(kinds[0], kinds[1]);
    }

    #[test]
    fn test_sync_replaces_previous_markers() {
        let (mut scene, mut overlay, mesh) = setup();
        let mut backend = HeadlessBackend::new(8, 8);
        let mut board = vec![CellState::Black; mesh.face_count()];
        overlay.sync(&board, &mesh, &mut scene, &mut |_| {}).unwrap();
        let first = overlay.markers().to_vec();
        scene.prepare(&mut backend).unwrap();
        // stone vertex + index, black program, one uniform per marker
        assert_eq!(backend.stats().live_resources, 3 + mesh.face_count());

        board.iter_mut().skip(1).for_each(|c| *c = CellState::Empty);
        overlay
            .sync(&board, &mesh, &mut scene, &mut |r| backend.release(r))
            .unwrap();
        assert_eq!(overlay.markers().len(), 1);
        assert!(first.iter().all(|&id| !scene.contains(id)));
        assert_eq!(scene.len(), 1);
        assert_eq!(backend.stats().live_resources, 3);
    }

    #[test]
    fn test_dimension_mismatch_keeps_markers() {
        let (mut scene, mut overlay, mesh) = setup();
        let mut board = vec![CellState::Empty; mesh.face_count()];
        board[0] = CellState::White;
        overlay.sync(&board, &mesh, &mut scene, &mut |_| {}).unwrap();
        let before = overlay.markers().to_vec();

        let short = vec![CellState::Black; 10];
        assert_eq!(
            overlay.sync(&short, &mesh, &mut scene, &mut |_| {}),
            Err(BoardError::DimensionMismatch { expected: 361, actual: 10 })
        );
        assert_eq!(overlay.markers(), &before[..]);
        assert_eq!(scene.len(), 1);
    }
}
