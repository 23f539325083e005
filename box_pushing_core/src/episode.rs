use serde::{Deserialize, Serialize};

use crate::movement::MoveEvent;

/// Reward granted on the step that delivers the last required box.
pub const TERMINAL_BONUS: f64 = 10.0;

/// How much of the delivery reward decays over `max_steps` steps.
const DECAY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeStatus {
    Running,
    /// Every required box reached its goal.
    Terminated,
    /// The step limit ran out first.
    Truncated,
}

impl EpisodeStatus {
    pub fn is_done(self) -> bool {
        !matches!(self, EpisodeStatus::Running)
    }
}

/// Counters for a single episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    pub step_count: u64,
    pub success_boxes_num: u32,
    /// Steps since the previous delivery (or since reset).
    pub every_box_step_count: u64,
    pub required_boxes_num: u32,
    pub max_steps: u64,
    pub status: EpisodeStatus,
}

impl EpisodeState {
    pub fn new(required_boxes_num: u32, max_steps: u64) -> Self {
        EpisodeState {
            step_count: 0,
            success_boxes_num: 0,
            every_box_step_count: 0,
            required_boxes_num,
            max_steps,
            status: EpisodeStatus::Running,
        }
    }

    /// Total step budget before the episode is truncated.
    pub fn step_limit(&self) -> u64 {
        self.max_steps.saturating_mul(self.required_boxes_num as u64)
    }

    /// Shaped reward for a delivery after `steps` steps since the previous one.
    pub fn delivery_reward(&self, steps: u64) -> f64 {
        (1.0 - DECAY * (steps as f64 / self.max_steps as f64)).max(0.0)
    }

    /// Counts a step. Runs before the action is resolved.
    pub fn begin_step(&mut self) {
        self.step_count += 1;
        self.every_box_step_count += 1;
    }

    /// Folds the outcome of a resolved action into the counters and returns its reward.
    pub fn record(&mut self, event: &MoveEvent) -> f64 {
        let mut reward = 0.0;
        if let MoveEvent::Delivered { .. } = event {
            self.success_boxes_num += 1;
            reward = self.delivery_reward(self.every_box_step_count);
            self.every_box_step_count = 0;
        }

        if self.success_boxes_num == self.required_boxes_num {
            self.status = EpisodeStatus::Terminated;
            reward = TERMINAL_BONUS;
        } else if self.step_count >= self.step_limit() {
            self.status = EpisodeStatus::Truncated;
        }
        reward
    }
}
