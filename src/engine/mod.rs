pub mod instance;
pub mod registry;

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::emit::{EmitQueue, NoteSink};
use crate::led::{FrameBuffer, GRID_ROWS};
use crate::pattern::Pattern;
use crate::scale::ScaleMap;

use self::instance::PatternInstance;
use self::registry::{CellAction, InstanceRegistry, cell_id};

/// One step is a sixteenth note: a quarter of a beat.
pub const STEP_BEATS: f64 = 0.25;

pub const MIN_BPM: f64 = 40.0;
pub const MAX_BPM: f64 = 300.0;

/// Single arbitration point for everything the editor and tempo controls
/// mutate while instances play. Instances never copy any of this; they
/// hold row/column handles and read through the engine at each step.
pub struct Store {
    pub patterns: [Pattern; GRID_ROWS],
    pub scale: ScaleMap,
    beat_duration: f64,
    /// Scheduling lead for note emission, in seconds. Zero means emit
    /// inline with no batching.
    pub latency: f64,
    pub toggle_mode: bool,
}

impl Store {
    pub fn new(bpm: f64, latency: f64, toggle_mode: bool) -> Self {
        let mut store = Store {
            patterns: std::array::from_fn(|_| Pattern::default()),
            scale: ScaleMap::default(),
            beat_duration: 0.5,
            latency: latency.max(0.0),
            toggle_mode,
        };
        store.set_bpm(bpm);
        store
    }

    pub fn bpm(&self) -> f64 {
        60.0 / self.beat_duration
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.beat_duration = 60.0 / bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Step duration at the current tempo. Sampled fresh at every wait so
    /// tempo slides take effect mid-pattern.
    pub fn step_duration_us(&self) -> u64 {
        (STEP_BEATS * self.beat_duration * 1e6).round().max(1.0) as u64
    }

    pub fn latency_us(&self) -> u64 {
        (self.latency * 1e6).round() as u64
    }
}

/// A pending step wakeup for one instance. `generation` invalidates
/// wakeups whose instance has been torn down; `seq` keeps same-instant
/// wakeups FIFO.
struct Wakeup {
    due_us: u64,
    seq: u64,
    cell: usize,
    generation: u64,
}

impl PartialEq for Wakeup {
    fn eq(&self, other: &Self) -> bool {
        self.due_us == other.due_us && self.seq == other.seq
    }
}

impl Eq for Wakeup {}

impl PartialOrd for Wakeup {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Wakeup {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due_us, self.seq).cmp(&(other.due_us, other.seq))
    }
}

/// The sequencer core: a cooperative scheduler over per-cell pattern
/// instances. Everything runs on the caller's thread; instances interleave
/// only at their timed waits, so shared state needs no locking. Time is a
/// logical microsecond clock supplied by the caller (wall time in the app,
/// hand-stepped in tests).
pub struct Engine {
    store: Store,
    registry: InstanceRegistry,
    wakeups: BinaryHeap<Reverse<Wakeup>>,
    emit_queue: EmitQueue,
    frame: FrameBuffer,
    sink: Box<dyn NoteSink>,
    next_seq: u64,
    next_generation: u64,
}

impl Engine {
    pub fn new(store: Store, sink: Box<dyn NoteSink>) -> Self {
        Engine {
            store,
            registry: InstanceRegistry::new(),
            wakeups: BinaryHeap::new(),
            emit_queue: EmitQueue::new(),
            frame: FrameBuffer::new(),
            sink,
            next_seq: 0,
            next_generation: 0,
        }
    }

    /// Discrete press/release edge from the input surface. `value` is
    /// normalized pressure; 0 is a release.
    pub fn on_cell_edge(&mut self, now_us: u64, row: usize, col: usize, value: f32) {
        let cell = cell_id(row, col);
        let occupied = self.registry.occupied(cell);

        match registry::decide(occupied, value > 0.0, self.store.toggle_mode) {
            CellAction::Create => {
                let generation = self.next_generation;
                self.next_generation += 1;

                let mut inst = PatternInstance::new(row, col, value, generation);
                let wait = inst.start(&self.store, &mut self.frame, &mut *self.sink);
                self.registry.insert(cell, inst);
                self.schedule(now_us + wait, cell, generation);
                log::debug!("cell {cell}: instance {generation} started (row {row}, col {col})");
            }
            CellAction::Destroy => self.stop_cell(cell),
            CellAction::Noop => {
                if occupied && value > 0.0 {
                    log::debug!("cell {cell}: already active, press ignored");
                }
            }
        }
    }

    /// Continuous pressure update on an already-held cell. Rewrites the
    /// instance's velocity in place; never creates or destroys.
    pub fn on_cell_value(&mut self, row: usize, col: usize, value: f32) {
        if let Some(inst) = self.registry.get_mut(cell_id(row, col)) {
            inst.set_velocity(value);
        }
    }

    /// Advance logical time to `now_us`, running every step wakeup and
    /// deferred emission that has come due, in timestamp order. Batches
    /// and wakeups due at the same instant drain batch-first.
    pub fn run_until(&mut self, now_us: u64) {
        self.sink.tick(now_us);
        loop {
            let wake_due = self.wakeups.peek().map(|Reverse(w)| w.due_us);
            let emit_due = self.emit_queue.next_due();

            let emit_next = match (wake_due, emit_due) {
                (None, None) => break,
                (Some(w), None) if w <= now_us => false,
                (None, Some(e)) if e <= now_us => true,
                (Some(w), Some(e)) if w.min(e) <= now_us => e <= w,
                _ => break,
            };

            if emit_next {
                if let Some((_, batch)) = self.emit_queue.pop_due(now_us) {
                    self.sink.emit(&batch);
                }
                continue;
            }

            let Some(Reverse(wake)) = self.wakeups.pop() else {
                break;
            };
            match self.registry.get_mut(wake.cell) {
                Some(inst) if inst.generation == wake.generation => {
                    let wait = inst.advance(
                        wake.due_us,
                        &self.store,
                        &mut self.frame,
                        &mut *self.sink,
                        &mut self.emit_queue,
                    );
                    self.schedule(wake.due_us + wait, wake.cell, wake.generation);
                }
                // Instance released (or replaced) since this was queued.
                _ => {}
            }
        }
    }

    /// Stop and remove the instance on `cell`, if any. Stale stops are
    /// no-ops. The pending wakeup dies by generation mismatch; a note
    /// already in the emit queue is not recalled.
    pub fn stop_cell(&mut self, cell: usize) {
        if let Some(mut inst) = self.registry.take(cell) {
            inst.stop(&mut self.frame);
            log::debug!("cell {cell}: instance {} stopped", inst.generation);
        }
    }

    /// Tear down every playing instance (quit path).
    pub fn stop_all(&mut self) {
        for mut inst in self.registry.drain() {
            inst.stop(&mut self.frame);
        }
    }

    pub fn pattern(&self, row: usize) -> &Pattern {
        &self.store.patterns[row]
    }

    pub fn pattern_mut(&mut self, row: usize) -> &mut Pattern {
        &mut self.store.patterns[row]
    }

    pub fn scale_mut(&mut self) -> &mut ScaleMap {
        &mut self.store.scale
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn nudge_bpm(&mut self, delta: f64) {
        let bpm = self.store.bpm() + delta;
        self.store.set_bpm(bpm);
        log::info!("tempo: {:.0} BPM", self.store.bpm());
    }

    pub fn flip_toggle_mode(&mut self) {
        self.store.toggle_mode = !self.store.toggle_mode;
        log::info!(
            "mode: {}",
            if self.store.toggle_mode { "toggle" } else { "hold" }
        );
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    fn schedule(&mut self, due_us: u64, cell: usize, generation: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.wakeups.push(Reverse(Wakeup {
            due_us,
            seq,
            cell,
            generation,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::NoteEvent;
    use crate::pattern::MAX_STEPS;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// 120 BPM -> 0.5 s/beat -> 125 ms per sixteenth step.
    const STEP_US: u64 = 125_000;

    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Vec<Vec<NoteEvent>>>>);

    impl NoteSink for RecordingSink {
        fn emit(&mut self, batch: &[NoteEvent]) {
            self.0.borrow_mut().push(batch.to_vec());
        }
    }

    fn engine_with(latency: f64, toggle: bool) -> (Engine, RecordingSink) {
        let sink = RecordingSink::default();
        let engine = Engine::new(Store::new(120.0, latency, toggle), Box::new(sink.clone()));
        (engine, sink)
    }

    fn set_pattern(engine: &mut Engine, row: usize, length: usize, on: &[usize]) {
        let mut steps = [false; MAX_STEPS];
        for &i in on {
            steps[i] = true;
        }
        *engine.pattern_mut(row) = Pattern::new(length, steps);
    }

    #[test]
    fn length_one_fires_immediately_and_every_step() {
        let (mut engine, sink) = engine_with(0.0, false);
        set_pattern(&mut engine, 0, 1, &[0]);

        engine.on_cell_edge(0, 0, 2, 1.0);
        // Default scale: prefix sum 0+2+2 over columns 0..=2, offset 48.
        assert_eq!(sink.0.borrow().len(), 1);
        assert_eq!(sink.0.borrow()[0], vec![NoteEvent {
            pitch: 52,
            column: 2,
            velocity: 1.0,
        }]);

        engine.run_until(STEP_US - 1);
        assert_eq!(sink.0.borrow().len(), 1);
        engine.run_until(STEP_US);
        assert_eq!(sink.0.borrow().len(), 2);
        engine.run_until(3 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 4);

        engine.on_cell_edge(3 * STEP_US + 1, 0, 2, 0.0);
        engine.run_until(20 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 4);
        assert!(engine.frame().is_dark());
    }

    #[test]
    fn latency_defers_to_exact_step_instants() {
        // {length:4, steps:[1,1,0,1]} at fixed tempo with 50 ms latency:
        // notes land at t0, t0+d, t0+3d, then t0+4d as the cycle repeats.
        let (mut engine, sink) = engine_with(0.05, false);
        set_pattern(&mut engine, 1, 4, &[0, 1, 3]);

        engine.on_cell_edge(0, 1, 0, 0.8);
        assert_eq!(sink.0.borrow().len(), 1); // step 0, immediate

        engine.run_until(STEP_US - 1);
        assert_eq!(sink.0.borrow().len(), 1);
        engine.run_until(STEP_US);
        assert_eq!(sink.0.borrow().len(), 2);

        // Step 2 is silent.
        engine.run_until(2 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 2);

        engine.run_until(3 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 3);

        // Cycle wraps: step 0 again, this time through the latency queue.
        engine.run_until(4 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 4);
    }

    #[test]
    fn same_instant_notes_coalesce_into_one_batch() {
        let (mut engine, sink) = engine_with(0.05, false);
        set_pattern(&mut engine, 0, 4, &[0, 1]);
        set_pattern(&mut engine, 1, 4, &[0, 1]);

        engine.on_cell_edge(0, 0, 0, 1.0);
        engine.on_cell_edge(0, 1, 4, 1.0);
        // Two immediate step-0 notes, unbatched by design.
        assert_eq!(sink.0.borrow().len(), 2);

        // Both step-1 notes are due at exactly t0 + d; one transmission.
        engine.run_until(STEP_US);
        let emissions = sink.0.borrow();
        assert_eq!(emissions.len(), 3);
        assert_eq!(emissions[2].len(), 2);
    }

    #[test]
    fn length_shrink_wraps_cursor_without_restart() {
        let (mut engine, sink) = engine_with(0.0, false);
        // Steps 2 and 5 are on. After four advances the cursor sits at 5.
        set_pattern(&mut engine, 0, 8, &[2, 5]);

        engine.on_cell_edge(0, 0, 0, 1.0);
        engine.run_until(4 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 1); // step 2 fired

        // Editor shrinks the pattern mid-cycle; the cursor (5) is now out
        // of range and must wrap to 5 % 3 == 2 on the next boundary.
        engine.pattern_mut(0).set_length(3);
        engine.run_until(5 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 2);

        // Loop continues over [0, 3): silent, silent, step 2 again.
        engine.run_until(8 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 3);
    }

    #[test]
    fn toggle_mode_destroys_on_second_press() {
        let (mut engine, _sink) = engine_with(0.0, true);
        set_pattern(&mut engine, 2, 4, &[0]);

        engine.on_cell_edge(0, 2, 3, 1.0);
        assert_eq!(engine.active_count(), 1);

        // No release event in between.
        engine.on_cell_edge(1000, 2, 3, 1.0);
        assert_eq!(engine.active_count(), 0);
        assert!(engine.frame().is_dark());
    }

    #[test]
    fn at_most_one_instance_per_cell() {
        let (mut engine, sink) = engine_with(0.0, false);
        set_pattern(&mut engine, 0, 1, &[0]);

        engine.on_cell_edge(0, 0, 0, 1.0);
        engine.on_cell_edge(10, 0, 0, 1.0);
        engine.on_cell_edge(20, 0, 0, 0.5);
        assert_eq!(engine.active_count(), 1);
        // Repeat presses emitted nothing extra.
        assert_eq!(sink.0.borrow().len(), 1);

        engine.on_cell_edge(30, 0, 0, 0.0);
        assert_eq!(engine.active_count(), 0);
        // Stale release is ignored.
        engine.on_cell_edge(40, 0, 0, 0.0);
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut engine, sink) = engine_with(0.0, false);
        set_pattern(&mut engine, 0, 1, &[0]);

        engine.on_cell_edge(0, 0, 0, 1.0);
        let cell = cell_id(0, 0);
        engine.stop_cell(cell);
        engine.stop_cell(cell);
        assert!(engine.frame().is_dark());

        // The orphaned wakeup must not fire for a dead generation.
        engine.run_until(10 * STEP_US);
        assert_eq!(sink.0.borrow().len(), 1);
    }

    #[test]
    fn pressure_updates_velocity_in_place() {
        let (mut engine, sink) = engine_with(0.0, false);
        set_pattern(&mut engine, 0, 1, &[0]);

        engine.on_cell_edge(0, 0, 0, 0.5);
        engine.on_cell_value(0, 0, 0.9);
        engine.run_until(STEP_US);

        let emissions = sink.0.borrow();
        assert_eq!(emissions[0][0].velocity, 0.5);
        assert_eq!(emissions[1][0].velocity, 0.9);
        assert_eq!(engine.active_count(), 1);
    }

    #[test]
    fn release_retracts_exactly_this_instances_leds() {
        let (mut engine, _sink) = engine_with(0.0, false);
        set_pattern(&mut engine, 0, 8, &[0, 1, 2, 3, 4, 5, 6, 7]);
        set_pattern(&mut engine, 3, 8, &[0, 1, 2, 3, 4, 5, 6, 7]);

        engine.on_cell_edge(0, 0, 1, 1.0);
        engine.on_cell_edge(0, 3, 1, 1.0);
        engine.run_until(3 * STEP_US);
        assert!(!engine.frame().is_dark());

        // Releasing one instance must leave the other's LEDs lit.
        engine.on_cell_edge(3 * STEP_US + 1, 0, 1, 0.0);
        assert!(!engine.frame().is_dark());

        engine.on_cell_edge(3 * STEP_US + 2, 3, 1, 0.0);
        assert!(engine.frame().is_dark());
    }

    #[test]
    fn scale_edits_land_on_next_step() {
        let (mut engine, sink) = engine_with(0.0, false);
        set_pattern(&mut engine, 0, 1, &[0]);

        engine.on_cell_edge(0, 0, 0, 1.0);
        engine.scale_mut().offset += 12;
        engine.run_until(STEP_US);

        let emissions = sink.0.borrow();
        assert_eq!(emissions[0][0].pitch, 48);
        assert_eq!(emissions[1][0].pitch, 60);
    }

    #[test]
    fn first_wait_clamps_when_latency_exceeds_step() {
        // 2 s of latency dwarfs a 125 ms step: the first wait clamps to
        // zero instead of going negative.
        let (mut engine, sink) = engine_with(2.0, false);
        set_pattern(&mut engine, 0, 4, &[0, 1]);

        engine.on_cell_edge(0, 0, 0, 1.0);
        engine.run_until(0);
        // Step 1 ran immediately; its note is queued 2 s out, not lost.
        assert_eq!(sink.0.borrow().len(), 1);
        engine.run_until(2_000_000);
        assert_eq!(sink.0.borrow().len(), 2);
    }
}
