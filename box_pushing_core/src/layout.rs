use rand::{Rng, seq::IndexedRandom, seq::index};
use serde::{Deserialize, Serialize};

use crate::{
    Color, Position,
    config::{BOX_COUNT, Config, ConfigError},
    entity::{self, Entity},
    map::{EntityGrid, Grid, GridError},
    movement::{AgentState, Direction},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Map string is empty.")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{code}' at position ({x}, {y}).")]
    UnknownCode { code: String, x: usize, y: usize },
    #[error("Multiple agent start positions found.")]
    MultipleAgents,
    #[error("No agent start position found in map.")]
    MissingAgent,
    #[error("The outer ring of the map must be walls.")]
    OpenBorder,
    #[error("Agent at ({x}, {y}) cannot stand on that cell.")]
    BlockedAgent { x: usize, y: usize },
    #[error("Map has {found} boxes but {required} must be delivered.")]
    NotEnoughBoxes { found: usize, required: u32 },
    #[error("No free cell left for the agent.")]
    NoFreeCell,
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A room ready to play: the entity grid plus the agent's starting state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub grid: EntityGrid,
    pub agent: AgentState,
}

impl Layout {
    /// Checks that the layout can host an episode needing `required` deliveries.
    pub fn validate(&self, required: u32) -> Result<(), LayoutError> {
        if !self.grid.has_wall_border() {
            return Err(LayoutError::OpenBorder);
        }
        let pos = self.agent.position;
        match self.grid.entity_at(pos)? {
            Some(entity) if !entity.can_overlap() => {
                return Err(LayoutError::BlockedAgent { x: pos.x, y: pos.y });
            }
            _ => {}
        }
        let boxes = self
            .grid
            .positions_where(|e| matches!(e, Entity::Box { .. }))
            .len();
        if boxes < required as usize {
            return Err(LayoutError::NotEnoughBoxes {
                found: boxes,
                required,
            });
        }
        Ok(())
    }
}

/// Goal cells in corner order: bottom-right, top-left, top-right, bottom-left.
///
/// Rooms narrower than two cells collapse the far corners onto column or row 0.
pub fn goal_corners(width: usize, height: usize) -> [Position; 4] {
    let (right, bottom) = (width.saturating_sub(2), height.saturating_sub(2));
    [
        Position::new(right, bottom),
        Position::new(1, 1),
        Position::new(right, 1),
        Position::new(1, bottom),
    ]
}

/// Builds a fresh walled room for `config`.
///
/// Goals go in the four inner corners. Boxes are drawn without replacement from
/// the cells at least two away from the border, and the agent takes a random
/// free cell with a random heading.
pub fn generate<R: Rng + ?Sized>(config: &Config, rng: &mut R) -> Result<Layout, LayoutError> {
    config.validate()?;
    let size = config.grid_size;
    let mut grid: EntityGrid = Grid::new(size, size);
    grid.wall_rect(0, 0, size, size)?;

    let colors = entity::palette(config.colored);
    for (corner, color) in goal_corners(size, size).into_iter().zip(colors) {
        grid.set(corner, Some(Entity::goal(color)))?;
    }

    let inner = size - 4;
    let picks = index::sample(rng, inner * inner, BOX_COUNT as usize);
    for (pick, color) in picks.into_iter().zip(colors) {
        let pos = Position::new(pick / inner + 2, pick % inner + 2);
        grid.set(pos, Some(Entity::new_box(color)))?;
    }

    let free: Vec<Position> = grid
        .enumerate()
        .filter_map(|(pos, cell)| cell.is_none().then_some(pos))
        .collect();
    let position = *free.choose(rng).ok_or(LayoutError::NoFreeCell)?;
    let direction = Direction::ALL[rng.random_range(0..Direction::ALL.len())];

    Ok(Layout {
        grid,
        agent: AgentState::new(position, direction),
    })
}

/// Loads a layout from a whitespace separated map of two-letter codes.
///
/// | Code | Cell |
/// |------|------|
/// | `WL` | wall |
/// | `BL` | blank floor |
/// | `B?` | box, `?` is a color letter (`R G B P Y E`) |
/// | `G?` | goal of that color |
/// | `A>` `Av` `A<` `A^` | agent on blank floor, facing that way |
pub fn load_layout_from_string(map_string: &str) -> Result<Layout, LayoutError> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err(LayoutError::Empty);
    }

    let height = lines.len();
    let mut width = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(height);

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if y == 0 {
            width = tokens.len();
            if width == 0 {
                return Err(LayoutError::Empty);
            }
        } else if tokens.len() != width {
            return Err(LayoutError::RaggedRow {
                row: y,
                expected: width,
                found: tokens.len(),
            });
        }
        parsed_rows.push(tokens);
    }

    let mut grid: EntityGrid = Grid::new(width, height);
    let mut agent: Option<AgentState> = None;

    for (y, row_tokens) in parsed_rows.iter().enumerate() {
        for (x, token) in row_tokens.iter().enumerate() {
            let pos = Position::new(x, y);
            let unknown = || LayoutError::UnknownCode {
                code: token.to_string(),
                x,
                y,
            };
            let mut chars = token.chars();
            let (Some(first), Some(second), None) = (chars.next(), chars.next(), chars.next())
            else {
                return Err(unknown());
            };

            let cell = match (first, second) {
                ('W', 'L') => Some(Entity::Wall),
                ('B', 'L') => None,
                ('A', arrow) => {
                    let direction = match arrow {
                        '>' => Direction::Right,
                        'v' => Direction::Down,
                        '<' => Direction::Left,
                        '^' => Direction::Up,
                        _ => return Err(unknown()),
                    };
                    if agent.is_some() {
                        return Err(LayoutError::MultipleAgents);
                    }
                    agent = Some(AgentState::new(pos, direction));
                    None
                }
                ('B', letter) => {
                    let color = Color::from_letter(letter).ok_or_else(unknown)?;
                    Some(Entity::new_box(color))
                }
                ('G', letter) => {
                    let color = Color::from_letter(letter).ok_or_else(unknown)?;
                    Some(Entity::goal(color))
                }
                _ => return Err(unknown()),
            };
            grid.set(pos, cell)?;
        }
    }

    let agent = agent.ok_or(LayoutError::MissingAgent)?;
    Ok(Layout { grid, agent })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    const MAP: &str = "
        WL WL WL WL WL WL
        WL GG BL BL GY WL
        WL BL A> BG BL WL
        WL BL BY BL BL WL
        WL WL WL WL WL WL
    ";

    #[test]
    fn loads_codes() {
        let layout = load_layout_from_string(MAP).unwrap();
        assert_eq!(layout.grid.width(), 6);
        assert_eq!(layout.grid.height(), 5);
        assert_eq!(
            layout.agent,
            AgentState::new(Position::new(2, 2), Direction::Right)
        );
        assert_eq!(
            layout.grid.entity_at(Position::new(3, 2)).unwrap(),
            Some(Entity::new_box(Color::Green))
        );
        assert_eq!(
            layout.grid.entity_at(Position::new(4, 1)).unwrap(),
            Some(Entity::goal(Color::Yellow))
        );
        assert_eq!(layout.grid.entity_at(Position::new(2, 2)).unwrap(), None);
        assert!(layout.validate(2).is_ok());
        assert_eq!(
            layout.validate(3),
            Err(LayoutError::NotEnoughBoxes {
                found: 2,
                required: 3
            })
        );
    }

    #[test]
    fn rejects_malformed_maps() {
        assert_eq!(load_layout_from_string("  \n "), Err(LayoutError::Empty));
        assert_eq!(
            load_layout_from_string("WL WL\nWL"),
            Err(LayoutError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            load_layout_from_string("WL XX"),
            Err(LayoutError::UnknownCode {
                code: "XX".to_string(),
                x: 1,
                y: 0
            })
        );
        assert_eq!(
            load_layout_from_string("A> A<"),
            Err(LayoutError::MultipleAgents)
        );
        assert_eq!(
            load_layout_from_string("WL BL"),
            Err(LayoutError::MissingAgent)
        );
    }

    #[test]
    fn open_border_is_invalid() {
        let layout = load_layout_from_string("BL A> BG\nWL WL WL").unwrap();
        assert_eq!(layout.validate(1), Err(LayoutError::OpenBorder));
    }

    #[test]
    fn generated_room_matches_fixed_corners() {
        let config = Config::new(8).with_colored(true);
        let mut rng = StdRng::seed_from_u64(7);
        let layout = generate(&config, &mut rng).unwrap();
        let grid = &layout.grid;
        assert!(grid.has_wall_border());

        let corners = goal_corners(8, 8);
        let colors = entity::palette(true);
        for (corner, color) in corners.iter().zip(colors) {
            assert_eq!(grid.entity_at(*corner).unwrap(), Some(Entity::goal(color)));
        }
        for color in colors {
            let boxes = grid.positions_where(|e| *e == Entity::new_box(color));
            assert_eq!(boxes.len(), 1);
            let pos = boxes[0];
            assert!((2..6).contains(&pos.x) && (2..6).contains(&pos.y));
        }
        assert_eq!(grid.entity_at(layout.agent.position).unwrap(), None);
        assert!(layout.validate(4).is_ok());
    }

    #[test]
    fn generating_a_room_too_small_for_four_boxes_fails() {
        let mut rng = StdRng::seed_from_u64(0);
        for size in [0, 3, 4, 5] {
            assert_eq!(
                generate(&Config::new(size), &mut rng),
                Err(LayoutError::Config(ConfigError::GridTooSmall(size)))
            );
        }
        assert_eq!(
            generate(&Config::new(6).with_required_boxes(0), &mut rng),
            Err(LayoutError::Config(ConfigError::RequiredBoxes(0)))
        );
        assert!(generate(&Config::new(6), &mut rng).is_ok());
    }

    #[test]
    fn goal_corners_saturate_on_tiny_rooms() {
        let corners = goal_corners(1, 1);
        assert_eq!(corners[0], Position::new(0, 0));
        assert_eq!(corners[1], Position::new(1, 1));
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let config = Config::new(12);
        let a = generate(&config, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = generate(&config, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }
}
