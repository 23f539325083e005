use std::fmt;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Position,
    config::{Config, ConfigError},
    entity::Entity,
    episode::{EpisodeState, EpisodeStatus},
    layout::{self, Layout, LayoutError},
    map::{EntityGrid, GridError},
    movement::{self, Action, AgentState, MoveEvent, UnknownAction},
};

pub const MISSION: &str = "push the box(es) to every goal square";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    OutOfBounds(#[from] GridError),
    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
    #[error("Episode already ended ({0:?}); reset before stepping again")]
    InvalidState(EpisodeStatus),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid layout: {0}")]
    Layout(#[from] LayoutError),
}

/// Fully observable view of the world handed to agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// `(kind, color, state)` per cell, row-major.
    pub grid_encoding: Vec<[u8; 3]>,
    pub width: usize,
    pub height: usize,
    pub direction: u8,
    pub mission: String,
    pub agent_position: Position,
}

impl Observation {
    pub fn cell(&self, pos: Position) -> Option<[u8; 3]> {
        if pos.x < self.width && pos.y < self.height {
            self.grid_encoding.get(pos.y * self.width + pos.x).copied()
        } else {
            None
        }
    }
}

/// Everything produced by a single call to [`BoxPushingEnv::step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub event: MoveEvent,
    /// Counters as they stand after this step.
    pub episode: EpisodeState,
}

/// A single box pushing world.
///
/// Each instance owns its grid, agent, counters and random source outright,
/// so independent instances can run side by side on separate threads.
#[derive(Debug, Clone)]
pub struct BoxPushingEnv {
    config: Config,
    fixed_layout: Option<Layout>,
    grid: EntityGrid,
    agent: AgentState,
    episode: EpisodeState,
    rng: StdRng,
}

impl BoxPushingEnv {
    /// Creates an environment with randomly generated rooms, seeded from the OS.
    pub fn new(config: Config) -> Result<Self, EnvError> {
        Self::build(config, None, StdRng::from_os_rng())
    }

    /// Creates an environment with randomly generated rooms and a fixed seed.
    pub fn with_seed(config: Config, seed: u64) -> Result<Self, EnvError> {
        Self::build(config, None, StdRng::seed_from_u64(seed))
    }

    /// Creates an environment that resets to a copy of `layout` every episode.
    ///
    /// `config.grid_size` only feeds the default step budget here.
    pub fn with_layout(config: Config, layout: Layout) -> Result<Self, EnvError> {
        layout.validate(config.required_boxes_num)?;
        Self::build(config, Some(layout), StdRng::from_os_rng())
    }

    fn build(
        config: Config,
        fixed_layout: Option<Layout>,
        mut rng: StdRng,
    ) -> Result<Self, EnvError> {
        config.validate()?;
        let Layout { grid, agent } = match &fixed_layout {
            Some(layout) => layout.clone(),
            None => layout::generate(&config, &mut rng)?,
        };
        let episode = EpisodeState::new(config.required_boxes_num, config.max_steps());
        Ok(BoxPushingEnv {
            config,
            fixed_layout,
            grid,
            agent,
            episode,
            rng,
        })
    }

    /// Starts a new episode and returns its first observation.
    ///
    /// With `Some(seed)` the random source is reseeded first, which makes the
    /// generated room reproducible. With `None` the existing stream continues.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        let Layout { grid, agent } = match &self.fixed_layout {
            Some(layout) => layout.clone(),
            None => layout::generate(&self.config, &mut self.rng)?,
        };
        self.grid = grid;
        self.agent = agent;
        self.episode = EpisodeState::new(self.config.required_boxes_num, self.config.max_steps());
        info!(
            ?seed,
            width = self.grid.width(),
            height = self.grid.height(),
            agent = ?self.agent,
            "episode reset"
        );
        Ok(self.observation())
    }

    /// Advances the world by one action.
    pub fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        self.ensure_running()?;
        self.episode.begin_step();
        self.resolve(action)
    }

    /// Advances the world by one raw action index.
    ///
    /// The step is counted before the index is decoded, so a rejected index
    /// still uses up a step even though the world does not change.
    pub fn step_index(&mut self, index: i64) -> Result<StepResult, EnvError> {
        self.ensure_running()?;
        self.episode.begin_step();
        let action = Action::try_from(index).inspect_err(|err| {
            warn!(step = self.episode.step_count, %err, "rejected action");
        })?;
        self.resolve(action)
    }

    fn ensure_running(&self) -> Result<(), EnvError> {
        match self.episode.status {
            EpisodeStatus::Running => Ok(()),
            status => Err(EnvError::InvalidState(status)),
        }
    }

    fn resolve(&mut self, action: Action) -> Result<StepResult, EnvError> {
        let (agent, event) = movement::apply(action, self.agent, &mut self.grid)?;
        self.agent = agent;
        let reward = self.episode.record(&event);
        debug!(
            step = self.episode.step_count,
            ?action,
            ?event,
            reward,
            "step"
        );

        let status = self.episode.status;
        match status {
            EpisodeStatus::Terminated => info!(
                steps = self.episode.step_count,
                delivered = self.episode.success_boxes_num,
                "all required boxes delivered"
            ),
            EpisodeStatus::Truncated => info!(
                steps = self.episode.step_count,
                delivered = self.episode.success_boxes_num,
                "step limit reached"
            ),
            EpisodeStatus::Running => {}
        }

        Ok(StepResult {
            observation: self.observation(),
            reward,
            terminated: status == EpisodeStatus::Terminated,
            truncated: status == EpisodeStatus::Truncated,
            event,
            episode: self.episode,
        })
    }

    pub fn observation(&self) -> Observation {
        Observation {
            grid_encoding: self.grid.encode(),
            width: self.grid.width(),
            height: self.grid.height(),
            direction: self.agent.direction.index(),
            mission: MISSION.to_string(),
            agent_position: self.agent.position,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &EntityGrid {
        &self.grid
    }

    pub fn agent(&self) -> AgentState {
        self.agent
    }

    pub fn episode(&self) -> EpisodeState {
        self.episode
    }

    pub fn status(&self) -> EpisodeStatus {
        self.episode.status
    }
}

/// Two characters per cell: `WW` wall, `B?` box, `D?` docked box, `G?` goal,
/// where `?` is the color letter. The agent is drawn as a doubled arrow.
impl fmt::Display for BoxPushingEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.grid.height() {
            for x in 0..self.grid.width() {
                let pos = Position::new(x, y);
                if pos == self.agent.position {
                    let arrow = match self.agent.direction {
                        movement::Direction::Right => '>',
                        movement::Direction::Down => 'v',
                        movement::Direction::Left => '<',
                        movement::Direction::Up => '^',
                    };
                    write!(f, "{arrow}{arrow}")?;
                    continue;
                }
                match self.grid[pos] {
                    None => write!(f, "  ")?,
                    Some(Entity::Wall) => write!(f, "WW")?,
                    Some(Entity::Box {
                        color,
                        docked: false,
                    }) => write!(f, "B{}", color.letter())?,
                    Some(Entity::Box {
                        color,
                        docked: true,
                    }) => write!(f, "D{}", color.letter())?,
                    Some(Entity::Goal { color }) => write!(f, "G{}", color.letter())?,
                }
            }
            if y + 1 < self.grid.height() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::load_layout_from_string;

    const CORRIDOR: &str = "
        WL WL WL WL WL WL
        WL A> BG BL GG WL
        WL BL BL BL BL WL
        WL WL WL WL WL WL
    ";

    fn corridor(required: u32) -> BoxPushingEnv {
        let layout = load_layout_from_string(CORRIDOR).unwrap();
        BoxPushingEnv::with_layout(Config::new(8).with_required_boxes(required), layout).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert_eq!(
            BoxPushingEnv::new(Config::new(4)).unwrap_err(),
            EnvError::Config(ConfigError::GridTooSmall(4))
        );
    }

    #[test]
    fn with_layout_rejects_unwinnable_layout() {
        let layout = load_layout_from_string(CORRIDOR).unwrap();
        let err = BoxPushingEnv::with_layout(Config::new(8).with_required_boxes(2), layout)
            .unwrap_err();
        assert_eq!(
            err,
            EnvError::Layout(LayoutError::NotEnoughBoxes {
                found: 1,
                required: 2
            })
        );
    }

    #[test]
    fn observation_reflects_world() {
        let env = corridor(1);
        let obs = env.observation();
        assert_eq!((obs.width, obs.height), (6, 4));
        assert_eq!(obs.grid_encoding.len(), 24);
        assert_eq!(obs.direction, 0);
        assert_eq!(obs.mission, MISSION);
        assert_eq!(obs.agent_position, Position::new(1, 1));
        assert_eq!(obs.cell(Position::new(2, 1)), Some([7, 1, 0]));
        assert_eq!(obs.cell(Position::new(4, 1)), Some([8, 1, 0]));
        assert_eq!(obs.cell(Position::new(6, 0)), None);
    }

    #[test]
    fn display_draws_two_chars_per_cell() {
        let env = corridor(1);
        let text = env.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "WWWWWWWWWWWW");
        assert_eq!(lines[1], "WW>>BG  GGWW");
    }

    #[test]
    fn stepping_after_termination_is_invalid() {
        let mut env = corridor(1);
        env.step(Action::MoveForward).unwrap();
        let result = env.step(Action::MoveForward).unwrap();
        assert!(result.terminated);
        assert_eq!(
            env.step(Action::TurnLeft).unwrap_err(),
            EnvError::InvalidState(EpisodeStatus::Terminated)
        );
        assert_eq!(
            env.step_index(0).unwrap_err(),
            EnvError::InvalidState(EpisodeStatus::Terminated)
        );

        env.reset(None).unwrap();
        assert_eq!(env.status(), EpisodeStatus::Running);
        assert_eq!(env.episode().step_count, 0);
        assert!(env.step(Action::TurnLeft).is_ok());
    }

    #[test]
    fn seeded_resets_repeat_the_room() {
        let mut env = BoxPushingEnv::new(Config::new(10).with_colored(true)).unwrap();
        let first = env.reset(Some(99)).unwrap();
        env.step(Action::MoveForward).unwrap();
        let second = env.reset(Some(99)).unwrap();
        assert_eq!(first, second);
    }
}
