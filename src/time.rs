use std::time::{Duration, Instant};

/// Longest step handed to simulation, so a stall or breakpoint does not teleport
/// the camera.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds of active time since the clock started.
    pub total: f64,
    /// Seconds since the previous active frame.
    pub delta: f32,
}

/// Frame timing that stops while the window is inactive.
#[derive(Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    total: Duration,
    active: bool,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: None,
            total: Duration::ZERO,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Pausing forgets the last tick, so the first frame after resuming has a zero delta.
    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            log::debug!("frame clock {}", if active { "resumed" } else { "paused" });
        }
        self.active = active;
        if !active {
            self.last = None;
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        if !self.active {
            return self.time(Duration::ZERO);
        }
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last).min(MAX_FRAME_DELTA))
            .unwrap_or(Duration::ZERO);
        self.last = Some(now);
        self.total += delta;
        self.time(delta)
    }

    fn time(&self, delta: Duration) -> FrameTime {
        FrameTime {
            total: self.total.as_secs_f64(),
            delta: delta.as_secs_f32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_has_zero_delta() {
        let mut clock = FrameClock::new();
        let t = clock.tick_at(Instant::now());
        assert_eq!(t.delta, 0.0);
        assert_eq!(t.total, 0.0);
    }

    #[test]
    fn accumulates_active_time() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.tick_at(start);
        clock.tick_at(start + Duration::from_millis(16));
        let t = clock.tick_at(start + Duration::from_millis(32));
        assert!((t.delta - 0.016).abs() < 1e-6);
        assert!((t.total - 0.032).abs() < 1e-9);
    }

    #[test]
    fn inactive_time_is_excluded() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.tick_at(start);
        clock.tick_at(start + Duration::from_millis(10));
        clock.set_active(false);
        let paused = clock.tick_at(start + Duration::from_secs(5));
        assert_eq!(paused.delta, 0.0);
        clock.set_active(true);
        clock.tick_at(start + Duration::from_secs(10));
        let t = clock.tick_at(start + Duration::from_millis(10_020));
        assert!((t.total - 0.030).abs() < 1e-9);
    }

    #[test]
    fn long_stalls_are_clamped() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.tick_at(start);
        let t = clock.tick_at(start + Duration::from_secs(3));
        assert_eq!(t.delta, MAX_FRAME_DELTA.as_secs_f32());
    }
}
