pub const MAX_STEPS: usize = 8;

/// One row's step pattern: an on/off mask of up to 8 steps with a
/// configurable active length. Edits may land at any time while instances
/// are playing; readers always see the current values.
#[derive(Debug, Clone)]
pub struct Pattern {
    length: usize,
    steps: [bool; MAX_STEPS],
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern {
            length: MAX_STEPS,
            steps: [false; MAX_STEPS],
        }
    }
}

impl Pattern {
    pub fn new(length: usize, steps: [bool; MAX_STEPS]) -> Self {
        let mut p = Pattern {
            length: MAX_STEPS,
            steps,
        };
        p.set_length(length);
        p
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Set the active length, clamped into [1, 8]. Steps beyond the new
    /// length are preserved, not cleared; growing the length later brings
    /// them back.
    pub fn set_length(&mut self, length: usize) {
        if !(1..=MAX_STEPS).contains(&length) {
            log::warn!("Pattern length {length} out of range, clamping to [1, {MAX_STEPS}]");
        }
        self.length = length.clamp(1, MAX_STEPS);
    }

    /// Read a step, wrapped by the current length. A cursor that advanced
    /// past a shrunken length wraps back in here instead of going stale.
    pub fn step(&self, index: usize) -> bool {
        self.steps[index % self.length]
    }

    /// Wrap an arbitrary (possibly negative) step offset into the active
    /// window. Used by the LED look-ahead band.
    pub fn wrap(&self, index: isize) -> usize {
        index.rem_euclid(self.length as isize) as usize
    }

    pub fn toggle_step(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            *step = !*step;
        }
    }

    pub fn set_step(&mut self, index: usize, on: bool) {
        if let Some(step) = self.steps.get_mut(index) {
            *step = on;
        }
    }

    pub fn steps(&self) -> &[bool; MAX_STEPS] {
        &self.steps
    }
}
