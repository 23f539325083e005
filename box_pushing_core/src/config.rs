use serde::{Deserialize, Serialize};

/// Smallest grid that leaves four distinct cells for box placement.
pub const MIN_GRID_SIZE: usize = 6;

/// Number of boxes (and goals) placed in a generated room.
pub const BOX_COUNT: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid size {0} is too small, need at least 6")]
    GridTooSmall(usize),
    #[error("Required boxes must be between 1 and 4, got {0}")]
    RequiredBoxes(u32),
    #[error("Max steps must be at least 1")]
    ZeroMaxSteps,
    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),
}

/// Environment settings, fixed once an environment is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub grid_size: usize,
    pub required_boxes_num: u32,
    /// Four distinct box/goal colors instead of one shared color.
    pub colored: bool,
    /// Per-delivery step budget. Defaults to `4 * grid_size^2`.
    pub max_steps: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config::new(8)
    }
}

impl Config {
    pub fn new(grid_size: usize) -> Self {
        Config {
            grid_size,
            required_boxes_num: BOX_COUNT,
            colored: false,
            max_steps: None,
        }
    }

    pub fn with_required_boxes(mut self, required_boxes_num: u32) -> Self {
        self.required_boxes_num = required_boxes_num;
        self
    }

    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Looks up one of the registered configurations, e.g. `ColoredBoxPushing-12x12-v0`.
    pub fn preset(name: &str) -> Result<Config, ConfigError> {
        let unknown = || ConfigError::UnknownPreset(name.to_string());
        let (family, rest) = name.split_once('-').ok_or_else(unknown)?;
        let colored = match family {
            "BoxPushing" => false,
            "ColoredBoxPushing" => true,
            _ => return Err(unknown()),
        };
        let grid_size = match rest {
            "8x8-v0" => 8,
            "12x12-v0" => 12,
            "16x16-v0" => 16,
            _ => return Err(unknown()),
        };
        Ok(Config::new(grid_size).with_colored(colored))
    }

    /// Names accepted by [`Config::preset`].
    pub fn preset_names() -> Vec<String> {
        ["BoxPushing", "ColoredBoxPushing"]
            .iter()
            .flat_map(|family| {
                [8, 12, 16]
                    .iter()
                    .map(move |size| format!("{family}-{size}x{size}-v0"))
            })
            .collect()
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
            .unwrap_or_else(|| 4 * (self.grid_size as u64).pow(2))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size < MIN_GRID_SIZE {
            return Err(ConfigError::GridTooSmall(self.grid_size));
        }
        if !(1..=BOX_COUNT).contains(&self.required_boxes_num) {
            return Err(ConfigError::RequiredBoxes(self.required_boxes_num));
        }
        if self.max_steps() == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        Ok(())
    }
}
