use serde::Deserialize;

use crate::engine::Store;
use crate::led::GRID_ROWS;
use crate::pattern::{MAX_STEPS, Pattern};
use crate::scale::ScaleMap;

#[derive(Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tempo in BPM.
    pub tempo: f64,
    /// Note scheduling lead time in seconds.
    pub latency: f64,
    /// Latch presses instead of holding them.
    pub toggle: bool,
    pub scale: ScaleConfig,
    /// Up to 6 `[[pattern]]` tables, one per grid row from the top.
    /// Missing rows stay empty.
    #[serde(rename = "pattern")]
    pub patterns: Vec<PatternConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            tempo: 120.0,
            latency: 0.0,
            toggle: false,
            scale: ScaleConfig::default(),
            patterns: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub intervals: Vec<i32>,
    pub offset: i32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        let scale = ScaleMap::default();
        ScaleConfig {
            intervals: scale.intervals.to_vec(),
            offset: scale.offset,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub length: usize,
    pub steps: Vec<bool>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            length: MAX_STEPS,
            steps: Vec::new(),
        }
    }
}

pub fn load(path: &str) -> anyhow::Result<SessionConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

impl SessionConfig {
    /// Build the engine store. Out-of-range lengths clamp, short step
    /// lists pad with rests, extra patterns and intervals are dropped.
    pub fn to_store(&self) -> Store {
        let mut store = Store::new(self.tempo, self.latency, self.toggle);

        for (i, v) in self.scale.intervals.iter().take(MAX_STEPS).enumerate() {
            store.scale.intervals[i] = *v;
        }
        store.scale.offset = self.scale.offset;

        for (row, config) in self.patterns.iter().take(GRID_ROWS).enumerate() {
            let mut steps = [false; MAX_STEPS];
            for (i, on) in config.steps.iter().take(MAX_STEPS).enumerate() {
                steps[i] = *on;
            }
            store.patterns[row] = Pattern::new(config.length, steps);
        }

        store
    }
}
