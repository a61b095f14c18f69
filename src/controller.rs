//! The frame loop: owns the torus, the camera orbit, the scene graph and the
//! board markers, and drives them one scheduled frame at a time.
//!
//! Each frame runs in a fixed order: orientation, twist, board sync,
//! picking, submission, reschedule. Setters called between frames only
//! replace values; they are read at the start of the next frame.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::board::{check_dimensions, BoardOverlay, CellState};
use crate::config::Settings;
use crate::error::{BoardError, SurfaceError};
use crate::geometry::{TorusMesh, TorusParams};
use crate::orientation::{InputDelta, OrbitLimits, OrientationIntegrator, OrientationRates};
use crate::picking::{pick, pointer_to_ndc, FaceHit};
use crate::render::backend::{BackendStats, FrameDraw, GpuResource, RenderBackend, RenderSurface};
use crate::render::camera::Camera;
use crate::render::mesh::build_torus_mesh;
use crate::render::scene::{hex_color, GeometryId, Light, Material, NodeId, NodeKind, Scene};
use crate::render::schedule::{FrameHandle, FrameScheduler};

const AMBIENT_COLOR: u32 = 0x333333;
const DIRECTIONAL_COLOR: u32 = 0x555555;

/// Everything the controller reads from settings, flattened.
#[derive(Clone, Debug)]
pub struct ControllerOptions {
    pub geometry: TorusParams,
    pub fov_y_degrees: f32,
    pub orbit: OrbitLimits,
    pub rates: OrientationRates,
    pub k_twist: f32,
    pub stone_size: f32,
    pub log_picks: bool,
    /// Fixed seed for the hover colors; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ControllerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            geometry: settings.geometry,
            fov_y_degrees: settings.camera.fov_y_degrees,
            orbit: settings.camera.orbit,
            rates: settings.rates.orientation,
            k_twist: settings.rates.k_twist,
            stone_size: settings.board.stone_size,
            log_picks: settings.debug.log_picks,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Nodes the controller moves or rebuilds by hand.
struct SceneHandles {
    torus_geometry: GeometryId,
    directional: NodeId,
    camera: NodeId,
}

fn build_scene(scene: &mut Scene, mesh: &TorusMesh, camera: &Camera, stone_size: f32) -> (SceneHandles, BoardOverlay) {
    let root = scene.root();

    let group = scene.add(root, NodeKind::Group, Vec3::ZERO);
    let torus_geometry = scene.add_geometry(build_torus_mesh(mesh));
    // Face colors come from the vertices
    let torus_material = scene.add_material(Material::new("torus", [1.0; 3]));
    scene.add(
        group,
        NodeKind::Mesh {
            geometry: torus_geometry,
            material: torus_material,
        },
        Vec3::ZERO,
    );
    let overlay = BoardOverlay::new(scene, group, stone_size);

    scene.add(
        root,
        NodeKind::Light(Light::Ambient {
            color: hex_color(AMBIENT_COLOR),
        }),
        Vec3::ZERO,
    );
    let directional = scene.add(
        root,
        NodeKind::Light(Light::Directional {
            color: hex_color(DIRECTIONAL_COLOR),
        }),
        camera.eye,
    );
    let camera = scene.add(root, NodeKind::Camera, camera.eye);

    let handles = SceneHandles {
        torus_geometry,
        directional,
        camera,
    };
    (handles, overlay)
}

/// Route released handles to the backend, if one is bound.
fn release_into(backend: &mut Option<Box<dyn RenderBackend>>) -> impl FnMut(GpuResource) + '_ {
    move |resource| {
        if let Some(backend) = backend.as_mut() {
            backend.release(resource);
        }
    }
}

pub struct Controller<S: FrameScheduler> {
    scheduler: S,
    state: LoopState,
    pending_frame: Option<FrameHandle>,
    backend: Option<Box<dyn RenderBackend>>,
    /// Backend counters captured by the last `stop`, after the scene gave
    /// its handles back and before the backend was disposed.
    final_stats: Option<BackendStats>,
    size: (u32, u32),
    options: ControllerOptions,

    mesh: TorusMesh,
    orientation: OrientationIntegrator,
    camera: Camera,
    scene: Scene,
    handles: SceneHandles,
    overlay: BoardOverlay,
    torn_down: bool,

    board: Option<Vec<CellState>>,
    delta: Option<InputDelta>,
    pointer_px: Option<(f64, f64)>,
    last_hit: Option<FaceHit>,
    rng: StdRng,
    frames: u64,
}

impl<S: FrameScheduler> Controller<S> {
    pub fn new(scheduler: S, options: ControllerOptions) -> Self {
        let mesh = TorusMesh::build(options.geometry);
        let orientation = OrientationIntegrator::new(options.orbit, options.rates);
        let mut camera = Camera::new(options.fov_y_degrees, 1.0);
        camera.follow(&orientation.state());
        let mut scene = Scene::new();
        let (handles, overlay) = build_scene(&mut scene, &mesh, &camera, options.stone_size);
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        log::info!(
            "torus {}x{} ({} faces), radius {}, thickness {}",
            mesh.params().x_segments,
            mesh.params().y_segments,
            mesh.face_count(),
            mesh.params().radius,
            mesh.params().thickness
        );

        Self {
            scheduler,
            state: LoopState::Stopped,
            pending_frame: None,
            backend: None,
            final_stats: None,
            size: (0, 0),
            options,
            mesh,
            orientation,
            camera,
            scene,
            handles,
            overlay,
            torn_down: false,
            board: None,
            delta: None,
            pointer_px: None,
            last_hit: None,
            rng,
            frames: 0,
        }
    }

    /// Bind a drawable surface. A previously bound backend gives its handles
    /// back and is disposed; the scene is uploaded again on the next frame.
    /// On failure the old backend, if any, stays bound.
    pub fn configure(&mut self, surface: impl RenderSurface, width: u32, height: u32) -> Result<(), SurfaceError> {
        let backend = surface.connect(width, height)?;

        if let Some(mut old) = self.backend.take() {
            self.scene.release_resources(&mut |r| old.release(r));
            old.dispose();
        }
        self.size = backend.size();
        self.backend = Some(backend);
        self.camera.set_aspect(self.size.0, self.size.1);
        log::info!("surface configured at {}x{}", self.size.0, self.size.1);
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        let backend = self.backend.as_mut().ok_or(SurfaceError::NotConfigured)?;
        if width == 0 || height == 0 {
            // Minimized; keep the last usable size
            return Ok(());
        }
        backend.resize(width, height);
        // The backend may clamp to what the device supports
        self.size = backend.size();
        self.camera.set_aspect(self.size.0, self.size.1);
        Ok(())
    }

    pub fn start(&mut self) {
        if self.state == LoopState::Running {
            return;
        }
        if self.torn_down {
            self.rebuild_scene();
        }
        self.state = LoopState::Running;
        self.pending_frame = Some(self.scheduler.schedule_next_frame());
        log::info!("render loop started");
    }

    /// Cancel the pending frame and release every resource the scene holds,
    /// leaves before parents, then the backend itself.
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending_frame.take() {
            self.scheduler.cancel(handle);
        }
        if self.state == LoopState::Stopped && self.torn_down {
            return;
        }
        self.state = LoopState::Stopped;

        let mut backend = self.backend.take();
        self.overlay.retire(&mut self.scene, &mut release_into(&mut backend));
        self.scene.dispose_all(&mut release_into(&mut backend));
        self.torn_down = true;

        if let Some(mut backend) = backend {
            let stats = backend.stats();
            if stats.live_resources > 0 {
                log::warn!("{} GPU resources outlived the scene", stats.live_resources);
            }
            self.final_stats = Some(stats);
            backend.dispose();
        }
        log::info!("render loop stopped after {} frames", self.frames);
    }

    /// Back to the initial view with no twist. The loop keeps running.
    pub fn reset(&mut self) {
        self.orientation.reset();
        self.mesh.set_twist(0.0);
        self.mesh.update_geometry();
        self.follow_camera();
        log::debug!("view reset");
    }

    pub fn set_input_delta(&mut self, delta: InputDelta) {
        self.delta = Some(delta);
    }

    /// Pointer position in surface pixels. It is mapped to NDC against the
    /// surface size current at the frame that picks.
    pub fn set_pointer(&mut self, x: f64, y: f64) {
        self.pointer_px = Some((x, y));
    }

    pub fn clear_pointer(&mut self) {
        self.pointer_px = None;
        self.last_hit = None;
    }

    /// Replace the board snapshot. A board of the wrong size is rejected and
    /// the previous one stays on screen.
    pub fn set_board_state(&mut self, board: Vec<CellState>) -> Result<(), BoardError> {
        check_dimensions(&board, self.mesh.face_count())?;
        self.board = Some(board);
        Ok(())
    }

    /// Run one frame. Handles other than the pending one are ignored, as is
    /// everything while stopped.
    pub fn frame(&mut self, handle: FrameHandle) {
        if self.state != LoopState::Running || self.pending_frame != Some(handle) {
            log::debug!("ignoring stale frame {handle:?}");
            return;
        }
        self.pending_frame = None;

        if let Some(delta) = self.delta.take() {
            self.orientation.step(&delta);
            self.follow_camera();
            if delta.twist != 0.0 {
                self.mesh.add_twist(delta.twist as f32 * self.options.k_twist);
                self.mesh.update_geometry();
            }
        }

        self.sync_board();
        self.pick_face();
        self.submit();

        self.frames += 1;
        self.pending_frame = Some(self.scheduler.schedule_next_frame());
    }

    fn follow_camera(&mut self) {
        let state = self.orientation.state();
        self.camera.follow(&state);
        self.scene.set_position(self.handles.directional, state.light.as_vec3());
        self.scene.set_position(self.handles.camera, state.position.as_vec3());
    }

    /// Markers are rebuilt from scratch every frame; the previous set is
    /// retired first.
    fn sync_board(&mut self) {
        let Some(board) = &self.board else {
            return;
        };
        let mut release = release_into(&mut self.backend);
        match self.overlay.sync(board, &self.mesh, &mut self.scene, &mut release) {
            Ok(count) => log::trace!("board synced, {count} stones"),
            Err(e) => log::warn!("skipping board sync: {e}"),
        }
    }

    fn pick_face(&mut self) {
        let Some((x, y)) = self.pointer_px else {
            return;
        };
        let ndc = pointer_to_ndc(x, y, self.size.0, self.size.1);
        self.last_hit = pick(ndc, &self.camera, &self.mesh);
        let Some(hit) = self.last_hit else {
            return;
        };
        if self.options.log_picks {
            log::info!("pointer over face {} at {:?}", hit.face, hit.grid);
        }
        let [r, g, b]: [f32; 3] = self.rng.random();
        if let Err(e) = self.mesh.set_color(hit.face, r, g, b) {
            log::warn!("skipping hover color: {e}");
        }
    }

    fn submit(&mut self) {
        // Both flags must be cleared, so no short-circuit
        let colors = self.mesh.take_colors_dirty();
        let geometry = self.mesh.take_geometry_dirty();
        if colors | geometry {
            self.scene
                .set_geometry_data(self.handles.torus_geometry, build_torus_mesh(&self.mesh));
        }

        let Some(backend) = self.backend.as_deref_mut() else {
            log::trace!("no surface bound, frame not drawn");
            return;
        };
        let draws = match self.scene.prepare(backend) {
            Ok(draws) => draws,
            Err(e) => {
                log::error!("scene upload failed: {e}");
                return;
            }
        };
        let frame = FrameDraw {
            view_proj: self.camera.build_view_proj(),
            lighting: self.scene.lighting(),
            draws: &draws,
        };
        if let Err(e) = backend.draw(&frame) {
            log::error!("render failed: {e}");
        }
    }

    fn rebuild_scene(&mut self) {
        self.scene = Scene::new();
        let (handles, overlay) = build_scene(&mut self.scene, &self.mesh, &self.camera, self.options.stone_size);
        self.handles = handles;
        self.overlay = overlay;
        self.follow_camera();
        self.torn_down = false;
        log::debug!("scene rebuilt");
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn last_hit(&self) -> Option<FaceHit> {
        self.last_hit
    }

    pub fn mesh(&self) -> &TorusMesh {
        &self.mesh
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn board(&self) -> Option<&[CellState]> {
        self.board.as_deref()
    }

    pub fn marker_count(&self) -> usize {
        self.overlay.markers().len()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    /// Counters of the bound backend, or the snapshot taken by the last stop.
    pub fn backend_stats(&self) -> Option<BackendStats> {
        self.backend.as_ref().map(|b| b.stats()).or(self.final_stats)
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}
