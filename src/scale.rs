use crate::pattern::MAX_STEPS;

/// Shared scale: an interval table plus a transposition offset. A grid
/// column's pitch is the cumulative interval sum up to that column.
/// `intervals[0]` is conventionally zero so column 0 plays the offset
/// itself.
#[derive(Debug, Clone)]
pub struct ScaleMap {
    pub intervals: [i32; MAX_STEPS],
    pub offset: i32,
}

impl Default for ScaleMap {
    fn default() -> Self {
        // Major scale degrees, rooted at C3.
        ScaleMap {
            intervals: [0, 2, 2, 1, 2, 2, 2, 1],
            offset: 48,
        }
    }
}

impl ScaleMap {
    /// Absolute pitch for a grid column. Pure function of the current
    /// table and offset, so edits are picked up on the very next call.
    pub fn pitch(&self, column: usize) -> i32 {
        self.intervals[..=column].iter().sum::<i32>() + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_prefix_sum_plus_offset() {
        let scale = ScaleMap::default();
        assert_eq!(scale.pitch(0), 48);
        assert_eq!(scale.pitch(1), 50);
        assert_eq!(scale.pitch(2), 52);
        assert_eq!(scale.pitch(7), 48 + 12);
    }

    #[test]
    fn offset_edits_are_visible_immediately() {
        let mut scale = ScaleMap::default();
        assert_eq!(scale.pitch(3), 53);
        scale.offset += 12;
        assert_eq!(scale.pitch(3), 65);
    }
}
