//! Reference 2-D point-mass MDP
//!
//! A kinematic point mass inside a square arena. The state is
//! `[x, y, vx, vy]`, the action is a velocity command in `[-1, 1]^2` scaled by
//! `max_speed`, and the episode ends once the point is within
//! `goal_tolerance` of the goal.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::mdp::{Mdp, Reward, State};

/// Configuration for [`PointMassMdp`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointMassConfig {
    pub start: [f64; 2],
    pub goal: [f64; 2],
    pub goal_tolerance: f64,
    /// Lower and upper bound of the arena on both axes
    pub arena: [f64; 2],
    /// Displacement per step for a unit action
    pub max_speed: f64,
    /// Uniform jitter added to the start position on reset
    pub init_noise: f64,
    pub dense_reward: bool,
    pub reward_scale: f64,
    pub seed: u64,
}

impl Default for PointMassConfig {
    fn default() -> Self {
        Self {
            start: [0.0, 0.0],
            goal: [4.0, 4.0],
            goal_tolerance: 0.6,
            arena: [0.0, 5.0],
            max_speed: 1.0,
            init_noise: 0.0,
            dense_reward: false,
            reward_scale: 0.1,
            seed: 0,
        }
    }
}

/// Point-mass navigation task
pub struct PointMassMdp {
    config: PointMassConfig,
    init_state: State,
    current: State,
    rng: ChaCha8Rng,
}

impl PointMassMdp {
    pub fn new(config: PointMassConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let init_state = State::new(vec![config.start[0], config.start[1], 0.0, 0.0], false);
        let mut mdp = Self {
            current: init_state.clone(),
            init_state,
            config,
            rng,
        };
        mdp.reset();
        mdp
    }

    pub fn config(&self) -> &PointMassConfig {
        &self.config
    }

    /// Place the point at an arbitrary position (used by tests and evaluation)
    pub fn set_position(&mut self, x: f64, y: f64) {
        let terminal = self.in_goal(&[x, y]);
        self.current = State::new(vec![x, y, 0.0, 0.0], terminal);
    }

    fn in_goal(&self, position: &[f64]) -> bool {
        self.distance_to_goal(position) <= self.config.goal_tolerance
    }
}

impl Default for PointMassMdp {
    fn default() -> Self {
        Self::new(PointMassConfig::default())
    }
}

impl Mdp for PointMassMdp {
    fn name(&self) -> &str {
        "point_mass"
    }

    fn current_state(&self) -> &State {
        &self.current
    }

    fn init_state(&self) -> &State {
        &self.init_state
    }

    fn reset(&mut self) {
        let [mut x, mut y] = self.config.start;
        if self.config.init_noise > 0.0 {
            let n = self.config.init_noise;
            x += self.rng.gen_range(-n..=n);
            y += self.rng.gen_range(-n..=n);
        }
        let terminal = self.in_goal(&[x, y]);
        self.init_state = State::new(vec![x, y, 0.0, 0.0], terminal);
        self.current = self.init_state.clone();
    }

    fn execute_action(&mut self, action: &[f64]) -> (Reward, State) {
        let [lo, hi] = self.config.arena;
        let bound = self.action_space_bound();
        let vx = action.first().copied().unwrap_or(0.0).clamp(-bound, bound) * self.config.max_speed;
        let vy = action.get(1).copied().unwrap_or(0.0).clamp(-bound, bound) * self.config.max_speed;

        let x = (self.current.features[0] + vx).clamp(lo, hi);
        let y = (self.current.features[1] + vy).clamp(lo, hi);
        let done = self.in_goal(&[x, y]);

        let reward = if self.config.dense_reward {
            -self.config.reward_scale * self.distance_to_goal(&[x, y])
        } else if done {
            0.0
        } else {
            -1.0
        };

        self.current = State::new(vec![x, y, vx, vy], done);
        (reward, self.current.clone())
    }

    fn is_goal_state(&self, state: &State) -> bool {
        let position = state.position(2);
        position.iter().all(|p| p.is_finite()) && self.in_goal(&position)
    }

    fn state_space_size(&self) -> usize {
        4
    }

    fn action_space_size(&self) -> usize {
        2
    }

    fn action_space_bound(&self) -> f64 {
        1.0
    }

    fn distance_to_goal(&self, position: &[f64]) -> f64 {
        let dx = position.first().copied().unwrap_or(f64::NAN) - self.config.goal[0];
        let dy = position.get(1).copied().unwrap_or(f64::NAN) - self.config.goal[1];
        (dx * dx + dy * dy).sqrt()
    }

    fn goal_tolerance(&self) -> f64 {
        self.config.goal_tolerance
    }

    fn dense_reward(&self) -> bool {
        self.config.dense_reward
    }

    fn reward_scale(&self) -> f64 {
        self.config.reward_scale
    }
}
