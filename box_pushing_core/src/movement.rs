use serde::{Deserialize, Serialize};

use crate::{
    Color, Position,
    entity::{self, Entity},
    map::{EntityGrid, GridError},
};

/// Heading of the agent. Discriminants follow the observation encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    Right = 0,
    Down = 1,
    Left = 2,
    Up = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Right,
        Direction::Down,
        Direction::Left,
        Direction::Up,
    ];

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Direction after a clockwise quarter turn.
    pub fn right(self) -> Self {
        Self::ALL[(self.index() as usize + 1) % 4]
    }

    /// Direction after a counter-clockwise quarter turn.
    pub fn left(self) -> Self {
        Self::ALL[(self.index() as usize + 3) % 4]
    }

    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Up => (0, -1),
        }
    }

    /// The neighbouring position in this direction, if it has no negative coordinate.
    pub fn step(self, from: Position) -> Option<Position> {
        let (dx, dy) = self.delta();
        from.offset(dx, dy)
    }
}

/// The actions an agent can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    TurnLeft = 0,
    TurnRight = 1,
    MoveForward = 2,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::TurnLeft, Action::TurnRight, Action::MoveForward];

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// A raw action index outside the accepted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action index {0}, expected 0 (left), 1 (right) or 2 (forward)")]
pub struct UnknownAction(pub i64);

impl TryFrom<i64> for Action {
    type Error = UnknownAction;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Action::TurnLeft),
            1 => Ok(Action::TurnRight),
            2 => Ok(Action::MoveForward),
            // 3..=6 are pickup/drop/toggle/done, which this world does not support.
            _ => Err(UnknownAction(value)),
        }
    }
}

/// Position and heading of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentState {
    pub position: Position,
    pub direction: Direction,
}

impl AgentState {
    pub fn new(position: Position, direction: Direction) -> Self {
        AgentState {
            position,
            direction,
        }
    }

    /// The cell directly in front of the agent.
    pub fn front(&self) -> Option<Position> {
        self.direction.step(self.position)
    }
}

/// What happened to the world when an action was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveEvent {
    Turned { direction: Direction },
    Moved { to: Position },
    /// The agent pushed a box one cell and followed it.
    Pushed { from: Position, to: Position },
    /// A box landed on a goal of its own color.
    Delivered { color: Color, at: Position },
    Blocked,
}

/// Looks at the cell one step from `pos` in `direction`.
///
/// Anything past the grid edge reads as `None`, which callers treat as impassable.
fn look(
    grid: &EntityGrid,
    pos: Position,
    direction: Direction,
) -> Option<(Position, Option<Entity>)> {
    let next = direction.step(pos)?;
    let cell = grid.entity_at(next).ok()?;
    Some((next, cell))
}

/// Applies one action to the agent and grid.
///
/// Returns the updated agent together with the event describing the outcome.
/// The grid is mutated in place when a box is pushed. An error is only returned
/// if a write lands outside the grid, which indicates a broken grid invariant.
pub fn apply(
    action: Action,
    agent: AgentState,
    grid: &mut EntityGrid,
) -> Result<(AgentState, MoveEvent), GridError> {
    match action {
        Action::TurnLeft => {
            let direction = agent.direction.left();
            Ok((
                AgentState { direction, ..agent },
                MoveEvent::Turned { direction },
            ))
        }
        Action::TurnRight => {
            let direction = agent.direction.right();
            Ok((
                AgentState { direction, ..agent },
                MoveEvent::Turned { direction },
            ))
        }
        Action::MoveForward => move_forward(agent, grid),
    }
}

fn move_forward(
    agent: AgentState,
    grid: &mut EntityGrid,
) -> Result<(AgentState, MoveEvent), GridError> {
    let Some((fwd, fwd_cell)) = look(grid, agent.position, agent.direction) else {
        return Ok((agent, MoveEvent::Blocked));
    };

    match fwd_cell {
        None => Ok((
            AgentState {
                position: fwd,
                ..agent
            },
            MoveEvent::Moved { to: fwd },
        )),
        Some(entity) if entity.can_overlap() => Ok((
            AgentState {
                position: fwd,
                ..agent
            },
            MoveEvent::Moved { to: fwd },
        )),
        Some(Entity::Box {
            color,
            docked: false,
        }) => push_box(agent, fwd, color, grid),
        Some(_) => Ok((agent, MoveEvent::Blocked)),
    }
}

fn push_box(
    agent: AgentState,
    fwd: Position,
    color: Color,
    grid: &mut EntityGrid,
) -> Result<(AgentState, MoveEvent), GridError> {
    let Some((beyond, beyond_cell)) = look(grid, fwd, agent.direction) else {
        return Ok((agent, MoveEvent::Blocked));
    };

    let (landed, event) = match beyond_cell {
        None => (
            Entity::new_box(color),
            MoveEvent::Pushed {
                from: fwd,
                to: beyond,
            },
        ),
        Some(Entity::Goal { color: goal_color }) if entity::matches(color, goal_color) => (
            Entity::Box {
                color,
                docked: true,
            },
            MoveEvent::Delivered { color, at: beyond },
        ),
        Some(Entity::Wall | Entity::Box { .. } | Entity::Goal { .. }) => {
            return Ok((agent, MoveEvent::Blocked));
        }
    };

    grid.set(beyond, Some(landed))?;
    grid.set(fwd, None)?;
    Ok((
        AgentState {
            position: fwd,
            ..agent
        },
        event,
    ))
}
