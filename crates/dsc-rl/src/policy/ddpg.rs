//! Deterministic actor-critic learner for option controllers
//!
//! The actor is `bound * tanh(W [s; 1])`. The critic is linear in quadratic
//! state-action features `[s, a, a*a, a (x) s, 1]`, which keeps `dQ/da` in
//! closed form for the deterministic policy gradient. Both have soft-updated
//! target copies and learn from a replay buffer.

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::DdpgConfig;
use crate::experience::{Experience, ReplayBuffer};

use super::{standard_normal, with_bias, ContinuousPolicy};

/// Actor-critic learner over continuous actions
#[derive(Debug, Clone)]
pub struct Ddpg {
    name: String,
    config: DdpgConfig,
    state_dim: usize,
    action_dim: usize,
    action_bound: f64,
    actor: Array2<f64>,
    target_actor: Array2<f64>,
    critic: Array1<f64>,
    target_critic: Array1<f64>,
    replay: ReplayBuffer<Experience>,
    epsilon: f64,
    rng: ChaCha8Rng,
    num_updates: u64,
}

impl Ddpg {
    pub fn new(
        name: impl Into<String>,
        state_dim: usize,
        action_dim: usize,
        action_bound: f64,
        config: DdpgConfig,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let scale = 0.1 / ((state_dim + 1) as f64).sqrt();
        let actor = Array2::from_shape_fn((action_dim, state_dim + 1), |_| {
            rng.gen_range(-scale..=scale)
        });
        let critic_dim = state_dim + 2 * action_dim + action_dim * state_dim + 1;
        let critic = Array1::zeros(critic_dim);

        Self {
            name: name.into(),
            replay: ReplayBuffer::new(config.buffer_capacity),
            epsilon: config.epsilon_start,
            config,
            state_dim,
            action_dim,
            action_bound,
            target_actor: actor.clone(),
            actor,
            target_critic: critic.clone(),
            critic,
            rng,
            num_updates: 0,
        }
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    /// Actor output and the tanh activations it came from
    fn actor_forward(weights: &Array2<f64>, bound: f64, state: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let input = Array1::from(with_bias(state));
        let activations: Vec<f64> = weights.dot(&input).iter().map(|z| z.tanh()).collect();
        let action = activations.iter().map(|t| bound * t).collect();
        (action, activations)
    }

    fn critic_features(&self, state: &[f64], action: &[f64]) -> Array1<f64> {
        let mut phi = Vec::with_capacity(self.critic.len());
        phi.extend_from_slice(state);
        phi.extend_from_slice(action);
        phi.extend(action.iter().map(|a| a * a));
        for a in action {
            phi.extend(state.iter().map(|s| a * s));
        }
        phi.push(1.0);
        Array1::from(phi)
    }

    fn critic_value(&self, weights: &Array1<f64>, state: &[f64], action: &[f64]) -> f64 {
        if state.len() != self.state_dim || action.len() != self.action_dim {
            return f64::NAN;
        }
        weights.dot(&self.critic_features(state, action))
    }

    /// Closed-form `dQ/da` of the online critic
    fn critic_action_gradient(&self, state: &[f64], action: &[f64]) -> Vec<f64> {
        let (n, m) = (self.state_dim, self.action_dim);
        (0..m)
            .map(|j| {
                let cross: f64 = (0..n)
                    .map(|i| self.critic[n + 2 * m + j * n + i] * state[i])
                    .sum();
                self.critic[n + j] + 2.0 * self.critic[n + m + j] * action[j] + cross
            })
            .collect()
    }

    fn learn(&mut self) {
        let batch = self.replay.sample(&mut self.rng, self.config.batch_size);
        if batch.is_empty() {
            return;
        }
        let batch_len = batch.len() as f64;

        let mut critic_grad = Array1::<f64>::zeros(self.critic.len());
        for exp in &batch {
            let (next_action, _) =
                Self::actor_forward(&self.target_actor, self.action_bound, &exp.next_state);
            let bootstrap = if exp.done {
                0.0
            } else {
                self.config.gamma
                    * self.critic_value(&self.target_critic, &exp.next_state, &next_action)
            };
            let target = exp.reward + bootstrap;
            let td = (target - self.critic_value(&self.critic, &exp.state, &exp.action))
                .clamp(-self.config.td_clip, self.config.td_clip);
            if td.is_finite() {
                critic_grad.scaled_add(td, &self.critic_features(&exp.state, &exp.action));
            }
        }
        self.critic
            .scaled_add(self.config.lr_critic / batch_len, &critic_grad);

        let mut actor_grad = Array2::<f64>::zeros(self.actor.raw_dim());
        for exp in &batch {
            let (action, activations) =
                Self::actor_forward(&self.actor, self.action_bound, &exp.state);
            let dq_da = self.critic_action_gradient(&exp.state, &action);
            let input = with_bias(&exp.state);
            for j in 0..self.action_dim {
                let g = dq_da[j] * self.action_bound * (1.0 - activations[j].powi(2));
                if !g.is_finite() {
                    continue;
                }
                for (i, x) in input.iter().enumerate() {
                    actor_grad[[j, i]] += g * x;
                }
            }
        }
        self.actor.scaled_add(self.config.lr_actor / batch_len, &actor_grad);

        let tau = self.config.tau;
        self.target_critic = &self.target_critic * (1.0 - tau) + &self.critic * tau;
        self.target_actor = &self.target_actor * (1.0 - tau) + &self.actor * tau;
        self.num_updates += 1;
    }
}

impl ContinuousPolicy for Ddpg {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_action(&mut self, features: &[f64], exploit: bool) -> Vec<f64> {
        let (mut action, _) = Self::actor_forward(&self.actor, self.action_bound, features);
        if !exploit {
            let std = self.config.noise_std * self.action_bound * self.epsilon;
            for a in &mut action {
                *a += std * standard_normal(&mut self.rng);
            }
        }
        let bound = self.action_bound;
        action
            .into_iter()
            .map(|a| if a.is_finite() { a.clamp(-bound, bound) } else { 0.0 })
            .collect()
    }

    fn update(&mut self, state: &[f64], action: &[f64], reward: f64, next_state: &[f64], done: bool) {
        self.replay.push(Experience::new(
            state.to_vec(),
            action.to_vec(),
            reward,
            next_state.to_vec(),
            done,
        ));
        if self.replay.len() >= self.config.batch_size {
            self.learn();
        }
    }

    fn update_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn q_value(&self, state: &[f64], action: &[f64]) -> f64 {
        self.critic_value(&self.critic, state, action)
    }

    fn sampled_q_value(&mut self, sample_size: usize) -> Option<f64> {
        if self.replay.len() <= sample_size {
            return None;
        }
        let sample = self.replay.sample(&mut self.rng, sample_size);
        let total: f64 = sample.iter().map(|e| self.q_value(&e.state, &e.action)).sum();
        let mean = total / sample.len() as f64;
        debug!("{}: sampled Q {:.4}", self.name, mean);
        Some(mean)
    }

    fn replay_len(&self) -> usize {
        self.replay.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Ddpg {
        let config = DdpgConfig {
            batch_size: 8,
            lr_critic: 0.05,
            lr_actor: 0.05,
            ..DdpgConfig::default()
        };
        Ddpg::new("test_ddpg_agent", 2, 1, 1.0, config, 0)
    }

    #[test]
    fn test_actions_respect_bound() {
        let mut ddpg = agent();
        for i in 0..50 {
            let s = [f64::from(i), -f64::from(i)];
            let a = ddpg.select_action(&s, false);
            assert_eq!(a.len(), 1);
            assert!(a[0].abs() <= 1.0);
        }
    }

    #[test]
    fn test_exploit_is_deterministic() {
        let mut ddpg = agent();
        let a = ddpg.select_action(&[0.3, 0.4], true);
        let b = ddpg.select_action(&[0.3, 0.4], true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_epsilon_decay_has_floor() {
        let mut ddpg = agent();
        for _ in 0..100_000 {
            ddpg.update_epsilon();
        }
        assert!((ddpg.epsilon() - DdpgConfig::default().epsilon_min).abs() < 1e-12);
    }

    #[test]
    fn test_learning_starts_after_batch_is_full() {
        let mut ddpg = agent();
        for _ in 0..7 {
            ddpg.update(&[0.0, 0.0], &[0.5], -1.0, &[0.1, 0.0], false);
        }
        assert_eq!(ddpg.num_updates(), 0);
        ddpg.update(&[0.0, 0.0], &[0.5], -1.0, &[0.1, 0.0], false);
        assert_eq!(ddpg.num_updates(), 1);
        assert_eq!(ddpg.replay_len(), 8);
    }

    #[test]
    fn test_critic_tracks_terminal_reward() {
        let mut ddpg = agent();
        for _ in 0..500 {
            ddpg.update(&[1.0, 1.0], &[0.5], -1.0, &[1.0, 1.0], true);
        }
        let q = ddpg.q_value(&[1.0, 1.0], &[0.5]);
        assert!((q + 1.0).abs() < 0.1, "q = {q}");
    }

    #[test]
    fn test_actor_climbs_critic() {
        // Reward favours positive actions everywhere
        let mut ddpg = agent();
        let before = ddpg.select_action(&[0.5, 0.5], true)[0];
        for i in 0..2000 {
            let a = if i % 2 == 0 { 0.8 } else { -0.8 };
            ddpg.update(&[0.5, 0.5], &[a], a, &[0.5, 0.5], true);
        }
        let after = ddpg.select_action(&[0.5, 0.5], true)[0];
        assert!(after > before);
    }

    #[test]
    fn test_sampled_q_value_requires_data() {
        let mut ddpg = agent();
        assert!(ddpg.sampled_q_value(10).is_none());
        for _ in 0..20 {
            ddpg.update(&[0.0, 0.0], &[0.0], 0.0, &[0.0, 0.0], true);
        }
        assert!(ddpg.sampled_q_value(10).is_some());
    }

    #[test]
    fn test_mismatched_dimensions_yield_nan() {
        let ddpg = agent();
        assert!(ddpg.q_value(&[0.0], &[0.0]).is_nan());
    }
}
