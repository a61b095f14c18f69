use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::window::Window;

/// Samples kept for the FPS average.
const FPS_WINDOW: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

pub trait FrameScheduler {
    fn schedule_next_frame(&mut self) -> FrameHandle;

    /// Cancelling an unknown or already-fired handle is a no-op.
    fn cancel(&mut self, handle: FrameHandle);
}

/// Single-slot queue: at most one frame is ever pending.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Option<FrameHandle>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Hand out the pending frame, if any, for the host to run.
    pub fn take_due(&mut self) -> Option<FrameHandle> {
        self.pending.take()
    }
}

impl FrameScheduler for ManualScheduler {
    fn schedule_next_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        self.pending = Some(handle);
        handle
    }

    fn cancel(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }
}

/// Frames paced by the window's redraw requests (display refresh under
/// `PresentMode::Fifo`).
pub struct WindowScheduler {
    window: Arc<Window>,
    queue: ManualScheduler,
}

impl WindowScheduler {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            queue: ManualScheduler::new(),
        }
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.queue.pending()
    }

    pub fn take_due(&mut self) -> Option<FrameHandle> {
        self.queue.take_due()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl FrameScheduler for WindowScheduler {
    fn schedule_next_frame(&mut self) -> FrameHandle {
        let handle = self.queue.schedule_next_frame();
        self.window.request_redraw();
        handle
    }

    fn cancel(&mut self, handle: FrameHandle) {
        self.queue.cancel(handle);
    }
}

/// Frame pacing and FPS tracking for the window host.
pub struct FrameClock {
    last_frame: Option<Instant>,
    samples: Vec<f64>,
    pub fps: f64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            samples: Vec::with_capacity(FPS_WINDOW),
            fps: 0.0,
        }
    }

    /// Call when a frame runs. Returns the time since the previous one.
    pub fn tick(&mut self, now: Instant) -> Option<Duration> {
        let dt = self.last_frame.map(|last| now.duration_since(last));
        self.last_frame = Some(now);

        if let Some(dt) = dt.map(|d| d.as_secs_f64()).filter(|&d| d > 0.0) {
            if self.samples.len() == FPS_WINDOW {
                self.samples.remove(0);
            }
            self.samples.push(dt);
            let avg = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
            self.fps = 1.0 / avg;
        }
        dt
    }

    /// Earliest instant the next frame may run under `cap` frames per second.
    /// `None` when uncapped or before the first frame.
    pub fn next_deadline(&self, cap: u32) -> Option<Instant> {
        if cap == 0 {
            return None;
        }
        let min_dt = Duration::from_secs_f64(1.0 / f64::from(cap));
        self.last_frame.map(|last| last + min_dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_single_slot() {
        let mut sched = ManualScheduler::new();
        assert_eq!(sched.take_due(), None);
        let a = sched.schedule_next_frame();
        let b = sched.schedule_next_frame();
        assert_ne!(a, b);
        assert_eq!(sched.pending(), Some(b));
        assert_eq!(sched.take_due(), Some(b));
        assert_eq!(sched.take_due(), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut sched = ManualScheduler::new();
        let a = sched.schedule_next_frame();
        sched.cancel(a);
        sched.cancel(a);
        assert_eq!(sched.pending(), None);

        // A stale handle does not cancel a newer frame
        let b = sched.schedule_next_frame();
        sched.cancel(a);
        assert_eq!(sched.pending(), Some(b));
    }

    #[test]
    fn test_frame_clock_fps_and_deadline() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.next_deadline(60), None);
        let start = Instant::now();
        assert_eq!(clock.tick(start), None);
        for i in 1..=10 {
            clock.tick(start + Duration::from_millis(20 * i));
        }
        assert!((clock.fps - 50.0).abs() < 1e-6);

        let last = start + Duration::from_millis(200);
        assert_eq!(clock.next_deadline(0), None);
        let deadline = clock.next_deadline(50).unwrap();
        let expected = last + Duration::from_millis(20);
        assert!(deadline.max(expected) - deadline.min(expected) < Duration::from_micros(1));
    }
}
