//! State, Action, Transition and the MDP contract driven by the chaining core

use serde::{Deserialize, Serialize};

/// Reward value from environment
pub type Reward = f64;

/// Continuous primitive action
pub type Action = Vec<f64>;

/// State representation exposed by an MDP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Raw feature vector (position first)
    pub features: Vec<f64>,

    /// Whether the MDP reached a terminal state
    pub terminal: bool,
}

impl State {
    pub fn new(features: Vec<f64>, terminal: bool) -> Self {
        Self { features, terminal }
    }

    /// Feature vector fed to function approximators
    pub fn features(&self) -> &[f64] {
        &self.features
    }

    /// Positional projection: the first `dims` features.
    ///
    /// Missing dimensions are padded with NaN so that downstream classifiers
    /// reject malformed states instead of panicking.
    pub fn position(&self, dims: usize) -> Vec<f64> {
        (0..dims)
            .map(|i| self.features.get(i).copied().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// State dimension for function approximators
    pub fn dimension(&self) -> usize {
        self.features.len()
    }
}

/// A single primitive transition (s, a, r, s')
///
/// Produced only inside an option's execution loop and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: State,
    pub action: Action,
    pub reward: Reward,
    pub next_state: State,
}

impl Transition {
    pub fn new(state: State, action: Action, reward: Reward, next_state: State) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
        }
    }
}

/// Contract of the environment the chaining core runs against.
///
/// The core never inspects an MDP beyond these methods.
pub trait Mdp {
    /// Environment name
    fn name(&self) -> &str;

    /// State the agent currently occupies
    fn current_state(&self) -> &State;

    /// State the last `reset` started from
    fn init_state(&self) -> &State;

    /// Reset to an initial state
    fn reset(&mut self);

    /// Apply a primitive action, returning the reward and the next state
    fn execute_action(&mut self, action: &[f64]) -> (Reward, State);

    /// Extrinsic goal test
    fn is_goal_state(&self, state: &State) -> bool;

    /// Whether `action` lies inside the primitive action bounds
    fn is_primitive_action(&self, action: &[f64]) -> bool {
        let bound = self.action_space_bound();
        action.len() == self.action_space_size()
            && action.iter().all(|a| a.is_finite() && a.abs() <= bound + 1e-9)
    }

    fn state_space_size(&self) -> usize;

    fn action_space_size(&self) -> usize;

    /// Symmetric bound on every action dimension
    fn action_space_bound(&self) -> f64;

    /// Euclidean distance from a position to the goal
    fn distance_to_goal(&self, position: &[f64]) -> f64;

    /// Radius around the goal that counts as reaching it
    fn goal_tolerance(&self) -> f64;

    /// Whether options should shape their rewards densely
    fn dense_reward(&self) -> bool {
        false
    }

    /// Multiplier on the goal distance in dense mode
    fn reward_scale(&self) -> f64 {
        1.0
    }
}
