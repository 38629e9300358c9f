use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds accumulated over all ticks.
    pub elapsed: f32,
    /// Seconds between the last two ticks.
    pub delta: f32,
}

#[derive(Clone, Copy, Default)]
struct ClockState {
    last_tick: Option<Instant>,
    time: FrameTime,
}

/// Shared frame clock. Clones observe the same time.
///
/// Time only moves when the host calls [`tick`](Self::tick) (once per rendered
/// frame). Skipping a tick freezes time uniforms; ticking twice in a frame
/// advances them twice.
#[derive(Clone, Default)]
pub struct FrameClock {
    state: Rc<Cell<ClockState>>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by the wall time since the previous tick. The first tick only
    /// starts the clock and yields a zero delta.
    pub fn tick(&self) -> FrameTime {
        let now = Instant::now();
        let mut state = self.state.get();
        let delta = state
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        state.last_tick = Some(now);
        self.state.set(state);
        self.advance(delta)
    }

    /// Advance by a fixed step, for hosts running a fixed timestep.
    pub fn tick_by(&self, delta: Duration) -> FrameTime {
        self.advance(delta)
    }

    fn advance(&self, delta: Duration) -> FrameTime {
        let mut state = self.state.get();
        state.time.delta = delta.as_secs_f32();
        state.time.elapsed += state.time.delta;
        self.state.set(state);
        state.time
    }

    pub fn time(&self) -> FrameTime {
        self.state.get().time
    }

    pub fn elapsed(&self) -> f32 {
        self.time().elapsed
    }

    pub fn delta(&self) -> f32 {
        self.time().delta
    }
}
