use std::collections::{HashMap, VecDeque};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    Color, Position,
    entity::{self, Entity},
    environment::{BoxPushingEnv, EnvError},
    episode::{EpisodeState, EpisodeStatus},
    map::EntityGrid,
    movement::{self, Action, AgentState},
};

/// Provides a read-only view of the environment relevant to an agent.
#[derive(Debug)]
pub struct EnvironmentView<'a> {
    pub agent_state: AgentState,
    pub grid: &'a EntityGrid,
    pub episode: EpisodeState,
}

impl BoxPushingEnv {
    pub fn view(&self) -> EnvironmentView<'_> {
        EnvironmentView {
            agent_state: self.agent(),
            grid: self.grid(),
            episode: self.episode(),
        }
    }
}

/// Trait defining the behavior of an agent.
/// Agents decide which action to take based on the EnvironmentView.
pub trait Agent {
    /// Determines the action the agent wants to perform based on its view of the environment.
    fn get_action(&mut self, view: &EnvironmentView) -> Action;
}

/// An agent that picks uniformly among the three actions.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomWalker {
    fn get_action(&mut self, _view: &EnvironmentView) -> Action {
        Action::ALL[self.rng.random_range(0..Action::ALL.len())]
    }
}

/// An agent that searches for the shortest action sequence delivering any
/// loose box onto a goal of its color, treating every other box as fixed.
#[derive(Debug, Default)]
pub struct PlanningAgent {
    current_plan: VecDeque<Action>,
    /// Set once no box can be delivered from the expected world.
    stuck: bool,
    /// Agent and grid the last returned action should lead to.
    expected: Option<(AgentState, EntityGrid)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SearchState {
    agent: AgentState,
    box_pos: Position,
}

enum Transition {
    Next(SearchState),
    Delivered,
    Blocked,
}

impl PlanningAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the view is what the previous action should have produced.
    /// Anything else (a new episode, a manual move) invalidates the plan.
    fn on_expected_path(&self, view: &EnvironmentView) -> bool {
        view.episode.step_count > 0
            && self.expected.as_ref().is_some_and(|(agent, grid)| {
                *agent == view.agent_state && grid == view.grid
            })
    }

    fn predict(view: &EnvironmentView, action: Action) -> Option<(AgentState, EntityGrid)> {
        let mut grid = view.grid.clone();
        let (agent, _) = movement::apply(action, view.agent_state, &mut grid).ok()?;
        Some((agent, grid))
    }

    fn choose(&mut self, view: &EnvironmentView) -> Action {
        if let Some(action) = self.current_plan.pop_front() {
            return action;
        }
        if self.stuck {
            return Action::TurnLeft;
        }

        match Self::plan_to_nearest_delivery(view) {
            Some(plan) => {
                self.current_plan.extend(plan);
                self.current_plan.pop_front().unwrap_or(Action::TurnLeft)
            }
            // Turning never opens a new path, so spin until the world changes.
            None => {
                self.stuck = true;
                Action::TurnLeft
            }
        }
    }

    /// The cell content at `pos` with the box being planned for lifted out.
    /// Anything off the grid reads as a wall.
    fn static_cell(grid: &EntityGrid, lifted: Position, pos: Option<Position>) -> Option<Entity> {
        match pos {
            Some(pos) if pos == lifted => None,
            Some(pos) => grid.entity_at(pos).unwrap_or(Some(Entity::Wall)),
            None => Some(Entity::Wall),
        }
    }

    fn transition(
        grid: &EntityGrid,
        lifted: Position,
        color: Color,
        state: SearchState,
        action: Action,
    ) -> Transition {
        let agent = state.agent;
        match action {
            Action::TurnLeft => Transition::Next(SearchState {
                agent: AgentState::new(agent.position, agent.direction.left()),
                ..state
            }),
            Action::TurnRight => Transition::Next(SearchState {
                agent: AgentState::new(agent.position, agent.direction.right()),
                ..state
            }),
            Action::MoveForward => {
                let Some(fwd) = agent.front() else {
                    return Transition::Blocked;
                };
                if fwd == state.box_pos {
                    let beyond = agent.direction.step(fwd);
                    return match Self::static_cell(grid, lifted, beyond) {
                        None => match beyond {
                            Some(beyond) => Transition::Next(SearchState {
                                agent: AgentState::new(fwd, agent.direction),
                                box_pos: beyond,
                            }),
                            None => Transition::Blocked,
                        },
                        Some(Entity::Goal { color: goal }) if entity::matches(color, goal) => {
                            Transition::Delivered
                        }
                        Some(_) => Transition::Blocked,
                    };
                }
                match Self::static_cell(grid, lifted, Some(fwd)) {
                    Some(entity) if !entity.can_overlap() => Transition::Blocked,
                    _ => Transition::Next(SearchState {
                        agent: AgentState::new(fwd, agent.direction),
                        ..state
                    }),
                }
            }
        }
    }

    /// Breadth-first search for the shortest delivery of the box at `box_pos`.
    fn plan_delivery(
        grid: &EntityGrid,
        start: AgentState,
        box_pos: Position,
        color: Color,
    ) -> Option<Vec<Action>> {
        let origin = SearchState {
            agent: start,
            box_pos,
        };
        let mut frontier = VecDeque::from([origin]);
        let mut came_from: HashMap<SearchState, (SearchState, Action)> = HashMap::new();

        while let Some(current) = frontier.pop_front() {
            for action in Action::ALL {
                match Self::transition(grid, box_pos, color, current, action) {
                    Transition::Blocked => {}
                    Transition::Delivered => {
                        // Reconstruct path
                        let mut path = vec![action];
                        let mut state = current;
                        while state != origin {
                            let (previous, step) = came_from.get(&state)?;
                            path.push(*step);
                            state = *previous;
                        }
                        path.reverse();
                        return Some(path);
                    }
                    Transition::Next(next) => {
                        if next != origin && !came_from.contains_key(&next) {
                            came_from.insert(next, (current, action));
                            frontier.push_back(next);
                        }
                    }
                }
            }
        }
        None
    }

    /// Plans to the box whose delivery takes the fewest actions.
    fn plan_to_nearest_delivery(view: &EnvironmentView) -> Option<Vec<Action>> {
        let loose = view.grid.enumerate().filter_map(|(pos, cell)| match cell {
            Some(Entity::Box {
                color,
                docked: false,
            }) => Some((pos, *color)),
            _ => None,
        });

        let mut best_plan: Option<Vec<Action>> = None;
        for (box_pos, color) in loose {
            if let Some(plan) = Self::plan_delivery(view.grid, view.agent_state, box_pos, color) {
                if best_plan.as_ref().is_none_or(|best| plan.len() < best.len()) {
                    best_plan = Some(plan);
                }
            }
        }
        best_plan
    }
}

impl Agent for PlanningAgent {
    fn get_action(&mut self, view: &EnvironmentView) -> Action {
        if !self.on_expected_path(view) {
            self.current_plan.clear();
            self.stuck = false;
        }
        let action = self.choose(view);
        self.expected = Self::predict(view, action);
        action
    }
}

/// Totals for one finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub steps: u64,
    pub total_reward: f64,
    pub delivered: u32,
    pub status: EpisodeStatus,
}

/// Resets `env` and lets `agent` act until the episode ends.
pub fn rollout<A: Agent + ?Sized>(
    env: &mut BoxPushingEnv,
    agent: &mut A,
    seed: Option<u64>,
) -> Result<EpisodeSummary, EnvError> {
    env.reset(seed)?;
    let mut total_reward = 0.0;
    loop {
        let action = agent.get_action(&env.view());
        let result = env.step(action)?;
        total_reward += result.reward;
        if result.terminated || result.truncated {
            return Ok(EpisodeSummary {
                steps: result.episode.step_count,
                total_reward,
                delivered: result.episode.success_boxes_num,
                status: result.episode.status,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, layout::load_layout_from_string};

    const TWO_BOXES: &str = "
        WL WL WL WL WL WL WL
        WL GY BL BL BL BL WL
        WL BL BL BL BL BL WL
        WL BL BL BY BL BL WL
        WL BL BL BL BR BL WL
        WL A^ BL BL BL GR WL
        WL WL WL WL WL WL WL
    ";

    #[test]
    fn random_walker_is_reproducible() {
        let mut env = BoxPushingEnv::with_seed(Config::new(8), 3).unwrap();
        let mut a = RandomWalker::new(11);
        let mut b = RandomWalker::new(11);
        for _ in 0..32 {
            assert_eq!(a.get_action(&env.view()), b.get_action(&env.view()));
        }
        let summary = rollout(&mut env, &mut a, Some(5)).unwrap();
        assert!(summary.status.is_done());
        assert!(summary.steps <= 256 * 4);
    }

    #[test]
    fn planner_delivers_every_box() {
        let layout = load_layout_from_string(TWO_BOXES).unwrap();
        let config = Config::new(7).with_colored(true).with_required_boxes(2);
        let mut env = BoxPushingEnv::with_layout(config, layout).unwrap();
        let mut planner = PlanningAgent::new();
        let summary = rollout(&mut env, &mut planner, None).unwrap();
        assert_eq!(summary.status, EpisodeStatus::Terminated);
        assert_eq!(summary.delivered, 2);
        assert!(summary.total_reward > 10.0);
    }

    #[test]
    fn planner_replans_after_manual_steps() {
        let layout = load_layout_from_string(TWO_BOXES).unwrap();
        let config = Config::new(7).with_colored(true).with_required_boxes(2);
        let mut env = BoxPushingEnv::with_layout(config, layout).unwrap();
        let mut planner = PlanningAgent::new();

        let planned = planner.get_action(&env.view());
        let manual = if planned == Action::TurnRight {
            Action::TurnLeft
        } else {
            Action::TurnRight
        };
        env.step(manual).unwrap();

        let fresh = PlanningAgent::new().get_action(&env.view());
        assert_eq!(planner.get_action(&env.view()), fresh);
    }

    #[test]
    fn planner_resumes_once_a_blocking_box_is_moved_by_hand() {
        // The yellow box plugs the only way into the green box's row.
        let layout = load_layout_from_string(
            "
            WL WL WL WL WL WL WL
            WL WL WL WL BL WL WL
            WL GG BL BG BL BL WL
            WL WL WL WL BY WL WL
            WL WL WL WL A^ WL WL
            WL WL WL WL WL WL WL
            ",
        )
        .unwrap();
        let config = Config::new(7).with_required_boxes(1);
        let mut env = BoxPushingEnv::with_layout(config, layout).unwrap();
        let mut planner = PlanningAgent::new();

        let action = planner.get_action(&env.view());
        assert_eq!(action, Action::TurnLeft);
        env.step(action).unwrap();
        assert_eq!(planner.get_action(&env.view()), Action::TurnLeft);

        // Undo the spin and shove the yellow box into the pocket above.
        for manual in [Action::TurnRight, Action::MoveForward, Action::MoveForward] {
            env.step(manual).unwrap();
        }
        assert_eq!(env.agent().position, Position::new(4, 2));

        let mut outcome = None;
        for _ in 0..20 {
            let result = env.step(planner.get_action(&env.view())).unwrap();
            if result.terminated || result.truncated {
                outcome = Some(result.episode);
                break;
            }
        }
        let episode = outcome.unwrap();
        assert_eq!(episode.status, EpisodeStatus::Terminated);
        assert_eq!(episode.success_boxes_num, 1);
    }

    #[test]
    fn planner_finds_a_single_push() {
        let layout = load_layout_from_string(
            "
            WL WL WL WL WL
            WL A> BG GG WL
            WL WL WL WL WL
            ",
        )
        .unwrap();
        let plan = PlanningAgent::plan_delivery(
            &layout.grid,
            layout.agent,
            Position::new(2, 1),
            Color::Green,
        );
        assert_eq!(plan, Some(vec![Action::MoveForward]));
    }

    #[test]
    fn planner_gives_up_on_stuck_boxes() {
        let layout = load_layout_from_string(
            "
            WL WL WL WL WL
            WL BG BL GG WL
            WL BL A< BL WL
            WL WL WL WL WL
            ",
        )
        .unwrap();
        let plan = PlanningAgent::plan_delivery(
            &layout.grid,
            layout.agent,
            Position::new(1, 1),
            Color::Green,
        );
        assert_eq!(plan, None);
    }
}
