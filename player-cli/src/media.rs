use parking_lot::Mutex;
use segment_loader::{MediaElement, TimeRange};
use tokio::time::Instant;

/// Media element stand-in: a playhead advancing in wall-clock time over a
/// single contiguous buffered range. Playback stalls at the end of the buffer.
#[derive(Debug)]
pub struct SimulatedMedia {
    rate: f64,
    state: Mutex<PlaybackState>,
}

#[derive(Debug)]
struct PlaybackState {
    position: f64,
    buffered_end: f64,
    playing: bool,
    last_tick: Instant,
}

impl SimulatedMedia {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: if rate.is_finite() && rate > 0.0 { rate } else { 1.0 },
            state: Mutex::new(PlaybackState {
                position: 0.0,
                buffered_end: 0.0,
                playing: false,
                last_tick: Instant::now(),
            }),
        }
    }

    fn tick(&self, state: &mut PlaybackState) {
        let now = Instant::now();
        if state.playing {
            let elapsed = now.saturating_duration_since(state.last_tick).as_secs_f64();
            state.position = (state.position + elapsed * self.rate).min(state.buffered_end);
        }
        state.last_tick = now;
    }

    pub fn play(&self) {
        let mut state = self.state.lock();
        self.tick(&mut state);
        state.playing = true;
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        self.tick(&mut state);
        state.playing = false;
    }

    /// Extend the buffered range by one segment's duration.
    pub fn append(&self, duration: f64) {
        let mut state = self.state.lock();
        self.tick(&mut state);
        if duration.is_finite() && duration > 0.0 {
            state.buffered_end += duration;
        }
    }

    pub fn seek(&self, position: f64) {
        let mut state = self.state.lock();
        self.tick(&mut state);
        state.position = position.clamp(0.0, state.buffered_end);
    }

    pub fn buffered_end(&self) -> f64 {
        self.state.lock().buffered_end
    }
}

impl MediaElement for SimulatedMedia {
    fn current_time(&self) -> f64 {
        let mut state = self.state.lock();
        self.tick(&mut state);
        state.position
    }

    fn buffered(&self) -> Vec<TimeRange> {
        let end = self.state.lock().buffered_end;
        if end > 0.0 {
            vec![TimeRange::new(0.0, end)]
        } else {
            Vec::new()
        }
    }
}
