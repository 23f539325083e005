use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod entity;
pub mod environment;
pub mod episode;
pub mod layout;
pub mod map;
pub mod movement;

pub use config::Config;
pub use entity::Entity;
pub use environment::{BoxPushingEnv, EnvError, Observation, StepResult};
pub use episode::{EpisodeState, EpisodeStatus};
pub use movement::{Action, AgentState, Direction, MoveEvent};

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Offsets the position by `(dx, dy)`.
    ///
    /// Returns `None` if either coordinate would become negative.
    pub fn offset(self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }
}

/// Colors an entity can carry. Discriminants follow the observation encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Color {
    Red = 0,
    Green = 1,
    Blue = 2,
    Purple = 3,
    Yellow = 4,
    Grey = 5,
}

impl Color {
    /// Index used in the `(kind, color, state)` observation triple.
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Single-letter code used by the text layout format and renderer.
    pub fn letter(self) -> char {
        match self {
            Color::Red => 'R',
            Color::Green => 'G',
            Color::Blue => 'B',
            Color::Purple => 'P',
            Color::Yellow => 'Y',
            Color::Grey => 'E',
        }
    }

    pub fn from_letter(letter: char) -> Option<Color> {
        match letter {
            'R' => Some(Color::Red),
            'G' => Some(Color::Green),
            'B' => Some(Color::Blue),
            'P' => Some(Color::Purple),
            'Y' => Some(Color::Yellow),
            'E' => Some(Color::Grey),
            _ => None,
        }
    }
}
