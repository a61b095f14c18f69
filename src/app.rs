use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow},
    keyboard::PhysicalKey,
    window::{Window, WindowId},
};

use crate::board::CellState;
use crate::config::Settings;
use crate::controller::{Controller, ControllerOptions};
use crate::input::{Action, InputState};
use crate::render::gpu::WindowSurface;
use crate::render::schedule::{FrameClock, WindowScheduler};

/// Stand-in for a game server: clicking an empty face places the next
/// stone, colors alternating; clicking a stone lifts it.
pub struct DemoBoard {
    cells: Vec<CellState>,
    next: CellState,
}

impl DemoBoard {
    pub fn new(face_count: usize) -> Self {
        Self {
            cells: vec![CellState::Empty; face_count],
            next: CellState::Black,
        }
    }

    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    /// Returns false for faces outside the board.
    pub fn toggle(&mut self, face: usize) -> bool {
        let Some(cell) = self.cells.get_mut(face) else {
            return false;
        };
        if cell.is_empty() {
            *cell = self.next;
            self.next = match self.next {
                CellState::Black => CellState::White,
                _ => CellState::Black,
            };
        } else {
            *cell = CellState::Empty;
        }
        true
    }
}

struct RunningState {
    window: Arc<Window>,
    controller: Controller<WindowScheduler>,
}

pub struct App {
    settings: Settings,
    options: ControllerOptions,
    input: InputState,
    clock: FrameClock,
    cursor_pos: Option<PhysicalPosition<f64>>,
    demo: DemoBoard,
    running: Option<RunningState>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let options = ControllerOptions::from(&settings);
        let input = InputState::new(settings.key_bindings.clone());
        let demo = DemoBoard::new(settings.geometry.face_count());
        Self {
            settings,
            options,
            input,
            clock: FrameClock::new(),
            cursor_pos: None,
            demo,
            running: None,
        }
    }

    fn handle_commands(&mut self, event_loop: &ActiveEventLoop) {
        if self.input.just_pressed(Action::Quit) {
            event_loop.exit();
        }
        let Some(running) = &mut self.running else {
            return;
        };
        if self.input.just_pressed(Action::Reset) {
            running.controller.reset();
        }
        if self.input.just_pressed(Action::ToggleRunning) {
            if running.controller.is_running() {
                running.controller.stop();
                log::info!("paused at {:.0} fps", self.clock.fps);
            } else {
                // stop() gave the surface back, so bind a fresh one
                let size = running.window.inner_size();
                let surface = WindowSurface {
                    window: running.window.clone(),
                };
                match running.controller.configure(surface, size.width, size.height) {
                    Ok(()) => running.controller.start(),
                    Err(e) => log::error!("cannot resume: {e}"),
                }
            }
        }
    }

    fn handle_click(&mut self) {
        let Some(running) = &mut self.running else {
            return;
        };
        let Some(hit) = running.controller.last_hit() else {
            return;
        };
        if self.demo.toggle(hit.face) {
            if self.settings.debug.log_picks {
                log::info!("toggled face {} at {:?}", hit.face, hit.grid);
            }
            if let Err(e) = running.controller.set_board_state(self.demo.cells().to_vec()) {
                log::warn!("board rejected: {e}");
            }
        }
    }

    fn run_frame(&mut self) {
        let Some(running) = &mut self.running else {
            return;
        };
        let now = Instant::now();
        if self
            .clock
            .next_deadline(self.settings.graphics.frame_rate_cap)
            .is_some_and(|deadline| now < deadline)
        {
            // Too early; about_to_wait asks again at the deadline
            return;
        }
        let Some(handle) = running.controller.scheduler_mut().take_due() else {
            return;
        };
        self.clock.tick(now);
        running.controller.set_input_delta(self.input.delta());
        running.controller.frame(handle);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title("torusgo")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 800));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("create window"),
        );

        let scheduler = WindowScheduler::new(window.clone());
        let mut controller = Controller::new(scheduler, self.options.clone());
        let size = window.inner_size();
        let surface = WindowSurface {
            window: window.clone(),
        };
        if let Err(e) = controller.configure(surface, size.width, size.height) {
            log::error!("failed to set up rendering: {e}");
            event_loop.exit();
            return;
        }
        if let Err(e) = controller.set_board_state(self.demo.cells().to_vec()) {
            log::warn!("board rejected: {e}");
        }
        controller.start();

        self.running = Some(RunningState { window, controller });
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(running) = &mut self.running {
                    running.controller.stop();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(running) = &mut self.running {
                    if let Err(e) = running.controller.resize(new_size.width, new_size.height) {
                        log::debug!("resize ignored: {e}");
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } if !event.repeat => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.input.on_key_event(code, event.state.is_pressed());
                    self.handle_commands(event_loop);
                    self.input.end_frame();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_pos = Some(position);
                if let Some(running) = &mut self.running {
                    running.controller.set_pointer(position.x, position.y);
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor_pos = None;
                if let Some(running) = &mut self.running {
                    running.controller.clear_pointer();
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state == ElementState::Pressed && button == MouseButton::Left && self.cursor_pos.is_some() {
                    self.handle_click();
                }
            }
            WindowEvent::RedrawRequested => self.run_frame(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = &self.running else {
            return;
        };
        if running.controller.scheduler().pending().is_none() {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        match self.clock.next_deadline(self.settings.graphics.frame_rate_cap) {
            Some(deadline) if deadline > Instant::now() => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            _ => {
                event_loop.set_control_flow(ControlFlow::Wait);
                running.controller.scheduler().request_redraw();
            }
        }
    }
}
