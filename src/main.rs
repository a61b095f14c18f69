mod app;
mod board;
mod config;
mod controller;
mod error;
mod geometry;
mod input;
mod orientation;
mod picking;
mod render;

use app::App;
use board::CellState;
use clap::Parser;
use config::Settings;
use controller::{Controller, ControllerOptions};
use orientation::InputDelta;
use render::headless::HeadlessSurface;
use render::schedule::ManualScheduler;
use winit::event_loop::EventLoop;

#[derive(Parser, Debug)]
#[command(name = "torusgo", about = "Go board on a twisted torus")]
struct Cli {
    /// Faces around the ring
    #[arg(value_parser = segment_count, requires = "y_segments")]
    x_segments: Option<u32>,

    /// Faces around the tube
    #[arg(value_parser = segment_count)]
    y_segments: Option<u32>,

    /// Run this many frames without a window, then exit
    #[arg(long, value_name = "FRAMES")]
    headless: Option<u64>,
}

fn segment_count(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n >= 3 => Ok(n),
        _ => Err(format!("expected an integer of at least 3, got {s:?}")),
    }
}

/// Drive the controller without a window: orbit and twist for a number of
/// frames over a diagonal of stones, then tear down and report.
fn run_headless(options: ControllerOptions, frames: u64) {
    let (width, height) = (1280, 800);
    let mut controller = Controller::new(ManualScheduler::new(), options);
    if let Err(e) = controller.configure(HeadlessSurface, width, height) {
        log::error!("headless surface: {e}");
        return;
    }

    let params = *controller.mesh().params();
    let mut board = vec![CellState::Empty; params.face_count()];
    for i in 0..params.x_segments.min(params.y_segments) {
        if let Some(face) = controller.mesh().face_index(i, i) {
            board[face] = if i % 2 == 0 { CellState::Black } else { CellState::White };
        }
    }
    if let Err(e) = controller.set_board_state(board) {
        log::warn!("board rejected: {e}");
    }
    controller.set_pointer(f64::from(width) / 2.0, f64::from(height) / 2.0);
    controller.start();

    let delta = InputDelta {
        x: 1.0,
        twist: 1.0,
        ..Default::default()
    };
    for _ in 0..frames {
        let Some(handle) = controller.scheduler_mut().take_due() else {
            break;
        };
        controller.set_input_delta(delta);
        controller.frame(handle);
    }

    if let Some(stats) = controller.backend_stats() {
        log::info!(
            "{} frames, {} draw calls in the last, {} live resources",
            stats.frames,
            stats.last_draw_calls,
            stats.live_resources
        );
    }
    log::info!(
        "twist {:.2}, {} stones, pointer over {:?}",
        controller.mesh().twist(),
        controller.marker_count(),
        controller.last_hit().map(|hit| hit.grid)
    );
    controller.stop();
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let (Some(x), Some(y)) = (cli.x_segments, cli.y_segments) {
        settings.geometry.x_segments = x;
        settings.geometry.y_segments = y;
    }

    if let Some(frames) = cli.headless {
        run_headless(ControllerOptions::from(&settings), frames);
        return;
    }

    let event_loop = EventLoop::new().expect("failed to create event loop");
    let mut app = App::new(settings);
    event_loop.run_app(&mut app).expect("event loop error");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("torusgo").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.x_segments, None);
        assert_eq!(cli.y_segments, None);
        assert_eq!(cli.headless, None);
    }

    #[test]
    fn test_parse_segments_and_headless() {
        let cli = parse(&["12", "24", "--headless", "30"]).unwrap();
        assert_eq!((cli.x_segments, cli.y_segments), (Some(12), Some(24)));
        assert_eq!(cli.headless, Some(30));

        let cli = parse(&["--headless", "5"]).unwrap();
        assert_eq!(cli.x_segments, None);
        assert_eq!(cli.headless, Some(5));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse(&["12"]).is_err());
        assert!(parse(&["2", "19"]).is_err());
        assert!(parse(&["x", "19"]).is_err());
        assert!(parse(&["12", "19", "7"]).is_err());
        assert!(parse(&["--headless"]).is_err());
        assert!(parse(&["--headless", "-1"]).is_err());
    }
}
