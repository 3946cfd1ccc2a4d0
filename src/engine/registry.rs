use crate::led::{GRID_COLS, GRID_ROWS};

use super::instance::PatternInstance;

pub const CELLS: usize = GRID_ROWS * GRID_COLS;

pub fn cell_id(row: usize, col: usize) -> usize {
    row * GRID_COLS + col
}

/// What a cell edge event should do to the registry slot. Decided up
/// front from the slot state so the event handler branches exhaustively
/// instead of dispatching on runtime tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellAction {
    Create,
    Destroy,
    Noop,
}

/// Hold mode: press creates, release destroys. Toggle mode: press
/// creates, next press destroys, releases are ignored. A press on an
/// occupied slot in hold mode and a release on a vacant slot are both
/// ignored, never errors.
pub fn decide(occupied: bool, pressed: bool, toggle_mode: bool) -> CellAction {
    match (occupied, pressed, toggle_mode) {
        (false, true, _) => CellAction::Create,
        (true, false, false) => CellAction::Destroy,
        (true, true, true) => CellAction::Destroy,
        (true, true, false) | (true, false, true) | (false, false, _) => CellAction::Noop,
    }
}

/// Maps each grid cell to at most one live instance. Destroy-then-create
/// for the same cell happens synchronously on the engine's thread, so the
/// slot can never briefly hold two instances.
pub struct InstanceRegistry {
    slots: Vec<Option<PatternInstance>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        InstanceRegistry {
            slots: (0..CELLS).map(|_| None).collect(),
        }
    }

    pub fn occupied(&self, cell: usize) -> bool {
        self.slots[cell].is_some()
    }

    pub fn insert(&mut self, cell: usize, instance: PatternInstance) {
        debug_assert!(self.slots[cell].is_none());
        self.slots[cell] = Some(instance);
    }

    pub fn take(&mut self, cell: usize) -> Option<PatternInstance> {
        self.slots[cell].take()
    }

    pub fn get_mut(&mut self, cell: usize) -> Option<&mut PatternInstance> {
        self.slots[cell].as_mut()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Remove every live instance, yielding them for teardown.
    pub fn drain(&mut self) -> impl Iterator<Item = PatternInstance> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_mode_press_release_cycle() {
        assert_eq!(decide(false, true, false), CellAction::Create);
        assert_eq!(decide(true, false, false), CellAction::Destroy);
    }

    #[test]
    fn toggle_mode_destroys_on_repress() {
        assert_eq!(decide(false, true, true), CellAction::Create);
        assert_eq!(decide(true, true, true), CellAction::Destroy);
        // Releases do nothing in toggle mode.
        assert_eq!(decide(true, false, true), CellAction::Noop);
    }

    #[test]
    fn redundant_events_are_ignored() {
        // Press while already playing (hold mode), release while vacant.
        assert_eq!(decide(true, true, false), CellAction::Noop);
        assert_eq!(decide(false, false, false), CellAction::Noop);
        assert_eq!(decide(false, false, true), CellAction::Noop);
    }

    #[test]
    fn cell_ids_are_row_major() {
        assert_eq!(cell_id(0, 0), 0);
        assert_eq!(cell_id(0, 7), 7);
        assert_eq!(cell_id(1, 0), 8);
        assert_eq!(cell_id(5, 7), CELLS - 1);
    }
}
