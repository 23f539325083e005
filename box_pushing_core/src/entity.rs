use serde::{Deserialize, Serialize};

use crate::Color;

/// Object type indices used in the observation encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectKind {
    Empty = 1,
    Wall = 2,
    Box = 7,
    Goal = 8,
}

/// Something that occupies a grid cell. The agent is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Wall,
    /// A pushable box. Once it has been delivered onto a goal of its color
    /// it is `docked`: it sits on that goal cell for the rest of the episode.
    Box { color: Color, docked: bool },
    Goal { color: Color },
}

impl Entity {
    pub fn new_box(color: Color) -> Self {
        Entity::Box {
            color,
            docked: false,
        }
    }

    pub fn goal(color: Color) -> Self {
        Entity::Goal { color }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Entity::Wall => ObjectKind::Wall,
            Entity::Box { .. } => ObjectKind::Box,
            Entity::Goal { .. } => ObjectKind::Goal,
        }
    }

    /// Walls are always grey.
    pub fn color(&self) -> Color {
        match self {
            Entity::Wall => Color::Grey,
            Entity::Box { color, .. } | Entity::Goal { color } => *color,
        }
    }

    /// Whether the agent may stand on this entity's cell.
    pub fn can_overlap(&self) -> bool {
        match self {
            Entity::Goal { .. } => true,
            Entity::Wall | Entity::Box { .. } => false,
        }
    }

    /// `(kind, color, state)` for this entity. The state channel is unused.
    pub fn encode(&self) -> [u8; 3] {
        [self.kind() as u8, self.color().index(), 0]
    }

    /// Encodes a cell that may be empty.
    pub fn encode_cell(cell: &Option<Entity>) -> [u8; 3] {
        match cell {
            Some(entity) => entity.encode(),
            None => [ObjectKind::Empty as u8, 0, 0],
        }
    }
}

/// A box of `box_color` is delivered by landing on a goal of `goal_color`.
#[inline]
pub fn matches(box_color: Color, goal_color: Color) -> bool {
    box_color == goal_color
}

/// The four box/goal colors in corner order.
pub fn palette(colored: bool) -> [Color; 4] {
    if colored {
        [Color::Yellow, Color::Green, Color::Blue, Color::Red]
    } else {
        [Color::Green; 4]
    }
}
