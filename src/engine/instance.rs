use crate::emit::{EmitQueue, NoteEvent, NoteSink};
use crate::led::{DisplaySurface, LedProjection};

use super::Store;

/// Playback lifecycle of one held pad. `Stopped` is terminal; a re-press
/// creates a fresh instance rather than reviving this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstanceState {
    Starting,
    Looping,
    Stopped,
}

/// One playing occurrence of a pattern, bound to a single grid cell. The
/// instance holds only its row/column handles; pattern content, scale and
/// tempo are re-fetched from the store at every step so concurrent edits
/// land on the next step boundary.
#[derive(Debug)]
pub struct PatternInstance {
    row: usize,
    column: usize,
    velocity: f32,
    step: usize,
    state: InstanceState,
    leds: LedProjection,
    /// Identifies this instance against stale scheduler wakeups after the
    /// cell has been released and re-pressed.
    pub generation: u64,
}

impl PatternInstance {
    pub fn new(row: usize, column: usize, velocity: f32, generation: u64) -> Self {
        PatternInstance {
            row,
            column,
            velocity: velocity.clamp(0.0, 1.0),
            step: 0,
            state: InstanceState::Starting,
            leds: LedProjection::new(),
            generation,
        }
    }

    /// Continuous-pressure update; no lifecycle change.
    pub fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity.clamp(0.0, 1.0);
    }

    /// First step, run synchronously at creation so a press has no
    /// perceptual latency: step 0 emits immediately (unbatched, zero
    /// delay) if set, then the first wait is shortened by the latency
    /// lead so the deferred step-1 note lands exactly one step later.
    /// Returns the wait in microseconds; a latency longer than one step
    /// clamps to zero rather than going negative.
    pub fn start(
        &mut self,
        store: &Store,
        surface: &mut dyn DisplaySurface,
        sink: &mut dyn NoteSink,
    ) -> u64 {
        debug_assert_eq!(self.state, InstanceState::Starting);
        let pattern = &store.patterns[self.row];

        // Step 1 would be out of range for a one-step pattern, which
        // instead replays step 0 every iteration.
        self.step = if pattern.length() == 1 { 0 } else { 1 };

        if pattern.step(0) {
            sink.emit(&[self.note(store)]);
        }
        self.leds.set_leds(pattern, self.row, self.column, 0, surface);
        self.state = InstanceState::Looping;

        store.step_duration_us().saturating_sub(store.latency_us())
    }

    /// One loop iteration at scheduled time `now_us`. Pattern length and
    /// steps are re-read here, never cached across the wait, so editor
    /// changes take effect on this boundary; a cursor left beyond a
    /// shrunken length wraps by modulo instead of restarting. Returns the
    /// next wait, derived from the tempo sampled at this wake.
    pub fn advance(
        &mut self,
        now_us: u64,
        store: &Store,
        surface: &mut dyn DisplaySurface,
        sink: &mut dyn NoteSink,
        queue: &mut EmitQueue,
    ) -> u64 {
        debug_assert_eq!(self.state, InstanceState::Looping);
        let pattern = &store.patterns[self.row];
        let step = self.step % pattern.length();

        if pattern.step(step) {
            let event = self.note(store);
            let latency_us = store.latency_us();
            if latency_us > 0 {
                // Batched send: everything due at the same instant goes
                // out as one transmission.
                queue.push(now_us + latency_us, event);
            } else {
                sink.emit(&[event]);
            }
        }

        self.leds.clear_leds(surface);
        self.leds.set_leds(pattern, self.row, self.column, step, surface);

        self.step = (step + 1) % pattern.length();
        store.step_duration_us()
    }

    /// Cooperative stop: retract every LED this instance lit, emit nothing
    /// further. Idempotent; notes already handed to the emit queue are not
    /// recalled.
    pub fn stop(&mut self, surface: &mut dyn DisplaySurface) {
        if self.state == InstanceState::Stopped {
            return;
        }
        self.state = InstanceState::Stopped;
        self.leds.clear_leds(surface);
    }

    fn note(&self, store: &Store) -> NoteEvent {
        NoteEvent {
            pitch: store.scale.pitch(self.column),
            column: self.column,
            velocity: self.velocity,
        }
    }
}
