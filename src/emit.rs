use std::collections::BTreeMap;

/// One note leaving the sequencer. `column` identifies the grid column the
/// note came from, so sinks can route per-column (e.g. onto MIDI channels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub pitch: i32,
    pub column: usize,
    pub velocity: f32,
}

/// Receives note batches. A batch holds every note due at the same
/// instant; zero-latency notes arrive as single-element batches.
pub trait NoteSink {
    fn emit(&mut self, batch: &[NoteEvent]);

    /// Periodic time update from the scheduler, for sinks that keep their
    /// own deadlines (gated note-offs).
    fn tick(&mut self, _now_us: u64) {}
}

/// Deferred emission queue for latency-compensated notes. Keyed by
/// absolute due time in microseconds: notes scheduled by different
/// instances for the same instant coalesce into one batch, and batches
/// drain strictly in due-time order.
#[derive(Debug, Default)]
pub struct EmitQueue {
    pending: BTreeMap<u64, Vec<NoteEvent>>,
}

impl EmitQueue {
    pub fn new() -> Self {
        EmitQueue::default()
    }

    pub fn push(&mut self, due_us: u64, event: NoteEvent) {
        self.pending.entry(due_us).or_default().push(event);
    }

    /// Earliest due time, if anything is pending.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.keys().next().copied()
    }

    /// Remove and return the earliest batch if it is due at or before
    /// `now_us`.
    pub fn pop_due(&mut self, now_us: u64) -> Option<(u64, Vec<NoteEvent>)> {
        let due = self.next_due()?;
        if due > now_us {
            return None;
        }
        self.pending.remove(&due).map(|batch| (due, batch))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
