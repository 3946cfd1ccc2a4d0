use crate::pattern::Pattern;

pub const GRID_ROWS: usize = 6;
pub const GRID_COLS: usize = 8;

/// LED color classes on the pad grid. Primary marks the playing step,
/// secondary the cross-row look-ahead band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadColor {
    Primary,
    Secondary,
}

impl PadColor {
    fn index(self) -> usize {
        match self {
            PadColor::Primary => 0,
            PadColor::Secondary => 1,
        }
    }
}

/// A logical LED surface. The core only mutates LED state through this;
/// the periodic redraw (`flush`) is driven by the frontend's own cadence,
/// never from inside the sequencer.
pub trait DisplaySurface {
    fn set_cell(&mut self, row: usize, col: usize, color: PadColor);
    fn clear_cell(&mut self, row: usize, col: usize, color: PadColor);
    fn flush(&mut self);
}

/// Shared logical frame buffer. Each cell keeps a count per color so that
/// two instances lighting the same cell don't clobber each other: the cell
/// stays lit until every setter has cleared it.
#[derive(Default)]
pub struct FrameBuffer {
    cells: [[[u8; 2]; GRID_COLS]; GRID_ROWS],
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer::default()
    }

    /// Visible color of a cell, primary winning over secondary.
    pub fn color_at(&self, row: usize, col: usize) -> Option<PadColor> {
        let counts = &self.cells[row][col];
        if counts[PadColor::Primary.index()] > 0 {
            Some(PadColor::Primary)
        } else if counts[PadColor::Secondary.index()] > 0 {
            Some(PadColor::Secondary)
        } else {
            None
        }
    }

    pub fn is_dark(&self) -> bool {
        self.cells
            .iter()
            .all(|row| row.iter().all(|c| c[0] == 0 && c[1] == 0))
    }
}

impl DisplaySurface for FrameBuffer {
    fn set_cell(&mut self, row: usize, col: usize, color: PadColor) {
        self.cells[row][col][color.index()] += 1;
    }

    fn clear_cell(&mut self, row: usize, col: usize, color: PadColor) {
        let count = &mut self.cells[row][col][color.index()];
        *count = count.saturating_sub(1);
    }

    fn flush(&mut self) {}
}

/// Tracks exactly which cells one playing instance has lit, so teardown
/// and step changes retract those cells and nothing else. Other instances
/// share the same surface; a blanket clear is never allowed.
#[derive(Debug, Default)]
pub struct LedProjection {
    lit: Vec<(usize, usize, PadColor)>,
}

impl LedProjection {
    pub fn new() -> Self {
        LedProjection { lit: Vec::new() }
    }

    /// Light the LEDs for one step of a pattern playing at (`row`, `col`):
    /// a secondary look-ahead band across all rows (each row shows where
    /// its own cursor would sit if run in lock-step with this one, offset
    /// by its distance from the playing row), then the primary current-step
    /// cell on the playing row. The playing row gets both writes; primary
    /// is applied last so it wins visually.
    pub fn set_leds(
        &mut self,
        pattern: &Pattern,
        row: usize,
        col: usize,
        step: usize,
        surface: &mut dyn DisplaySurface,
    ) {
        for i in 0..GRID_ROWS {
            let offset = step as isize + i as isize - row as isize;
            if pattern.step(pattern.wrap(offset)) {
                self.light(i, col, PadColor::Secondary, surface);
            }
        }
        if pattern.step(step) {
            self.light(row, col, PadColor::Primary, surface);
        }
    }

    /// Retract precisely the cells recorded by the last `set_leds`.
    pub fn clear_leds(&mut self, surface: &mut dyn DisplaySurface) {
        for (row, col, color) in self.lit.drain(..) {
            surface.clear_cell(row, col, color);
        }
    }

    fn light(
        &mut self,
        row: usize,
        col: usize,
        color: PadColor,
        surface: &mut dyn DisplaySurface,
    ) {
        surface.set_cell(row, col, color);
        self.lit.push((row, col, color));
    }

    #[cfg(test)]
    pub fn lit(&self) -> &[(usize, usize, PadColor)] {
        &self.lit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::MAX_STEPS;

    fn pattern(length: usize, on: &[usize]) -> Pattern {
        let mut steps = [false; MAX_STEPS];
        for &i in on {
            steps[i] = true;
        }
        Pattern::new(length, steps)
    }

    #[test]
    fn set_then_clear_leaves_surface_dark() {
        let mut fb = FrameBuffer::new();
        let mut leds = LedProjection::new();
        let p = pattern(4, &[0, 1, 3]);

        leds.set_leds(&p, 2, 5, 1, &mut fb);
        assert!(!fb.is_dark());

        leds.clear_leds(&mut fb);
        assert!(fb.is_dark());
        assert!(leds.lit().is_empty());
    }

    #[test]
    fn playing_row_shows_primary_over_band() {
        let mut fb = FrameBuffer::new();
        let mut leds = LedProjection::new();
        let p = pattern(4, &[1]);

        leds.set_leds(&p, 2, 0, 1, &mut fb);
        assert_eq!(fb.color_at(2, 0), Some(PadColor::Primary));
    }

    #[test]
    fn band_is_diagonal_across_rows() {
        let mut fb = FrameBuffer::new();
        let mut leds = LedProjection::new();
        // Only step 2 is on; playing row 1 at step 1, so the row whose
        // offset lands on step 2 is row 2.
        let p = pattern(4, &[2]);

        leds.set_leds(&p, 1, 3, 1, &mut fb);
        assert_eq!(fb.color_at(1, 3), None);
        assert_eq!(fb.color_at(2, 3), Some(PadColor::Secondary));
        // Row 0 tests step 0 (off), rows 3.. test steps 3, 0, 1 (off).
        assert_eq!(fb.color_at(0, 3), None);
        assert_eq!(fb.color_at(3, 3), None);
    }

    #[test]
    fn shared_cell_survives_one_instance_clearing() {
        let mut fb = FrameBuffer::new();
        fb.set_cell(0, 0, PadColor::Secondary);
        fb.set_cell(0, 0, PadColor::Secondary);
        fb.clear_cell(0, 0, PadColor::Secondary);
        assert_eq!(fb.color_at(0, 0), Some(PadColor::Secondary));
        fb.clear_cell(0, 0, PadColor::Secondary);
        assert_eq!(fb.color_at(0, 0), None);
    }
}
