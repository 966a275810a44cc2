//! Learners embedded in options and in the policy over options
//!
//! The chaining core treats both learners as opaque trainable services: an
//! option drives its controller through [`ContinuousPolicy`], and the
//! controller drives the option selector through [`OptionValueNetwork`].

mod ddpg;
mod dqn;

use rand::Rng;

pub use ddpg::Ddpg;
pub use dqn::OptionValueNetwork;

/// Trait for continuous-control learners (one instance per option)
pub trait ContinuousPolicy: Send {
    /// Learner name
    fn name(&self) -> &str;

    /// Action for a feature vector; `exploit` disables exploration noise
    fn select_action(&mut self, features: &[f64], exploit: bool) -> Vec<f64>;

    /// Record a transition and take a learning step
    fn update(&mut self, state: &[f64], action: &[f64], reward: f64, next_state: &[f64], done: bool);

    /// Decay the exploration rate
    fn update_epsilon(&mut self);

    fn epsilon(&self) -> f64;

    /// Critic estimate for a state-action pair
    fn q_value(&self, state: &[f64], action: &[f64]) -> f64;

    /// Mean critic estimate over a replay sample, if enough data was seen
    fn sampled_q_value(&mut self, sample_size: usize) -> Option<f64>;

    fn replay_len(&self) -> usize;
}

/// Standard normal sample (Box-Muller)
pub(crate) fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// `[features, 1.0]`
pub(crate) fn with_bias(features: &[f64]) -> Vec<f64> {
    let mut extended = Vec::with_capacity(features.len() + 1);
    extended.extend_from_slice(features);
    extended.push(1.0);
    extended
}
