//! Value-based policy over options
//!
//! Q(s, o) is linear in `[s; 1]`, one row per option. Updates are SMDP
//! Q-learning steps: the bootstrap term is discounted by `gamma^k`, where `k`
//! is the number of primitive steps the option ran for.

use ndarray::{s, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use dsc_core::{DscError, Result};

use crate::config::DqnConfig;
use crate::experience::{OptionExperience, ReplayBuffer};

use super::with_bias;

/// Epsilon-greedy option selector with online and target tables
#[derive(Debug, Clone)]
pub struct OptionValueNetwork {
    config: DqnConfig,
    state_dim: usize,
    weights: Array2<f64>,
    target_weights: Array2<f64>,
    replay: ReplayBuffer<OptionExperience>,
    epsilon: f64,
    rng: ChaCha8Rng,
    num_updates: u64,
}

impl OptionValueNetwork {
    pub fn new(state_dim: usize, num_options: usize, config: DqnConfig, seed: u64) -> Self {
        let weights = Array2::zeros((num_options, state_dim + 1));
        Self {
            replay: ReplayBuffer::new(config.buffer_capacity),
            epsilon: config.epsilon_start,
            config,
            state_dim,
            target_weights: weights.clone(),
            weights,
            rng: ChaCha8Rng::seed_from_u64(seed),
            num_updates: 0,
        }
    }

    pub fn num_options(&self) -> usize {
        self.weights.nrows()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn gamma(&self) -> f64 {
        self.config.gamma
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    fn row_value(table: &Array2<f64>, features: &[f64], option: usize) -> f64 {
        table.row(option).dot(&Array1::from(with_bias(features)))
    }

    /// Online Q-values for every option
    pub fn q_values(&self, features: &[f64]) -> Vec<f64> {
        if features.len() != self.state_dim {
            return vec![f64::NAN; self.num_options()];
        }
        let input = Array1::from(with_bias(features));
        self.weights.dot(&input).to_vec()
    }

    /// Online Q-value of one option, NaN for an unknown option
    pub fn q_value(&self, features: &[f64], option: usize) -> f64 {
        if option >= self.num_options() || features.len() != self.state_dim {
            return f64::NAN;
        }
        Self::row_value(&self.weights, features, option)
    }

    fn valid_options(&self, mask: &[bool]) -> Vec<usize> {
        (0..self.num_options())
            .filter(|&o| mask.get(o).copied().unwrap_or(false))
            .collect()
    }

    /// Greedy option among those allowed by `mask` (falls back to option 0)
    pub fn greedy(&self, features: &[f64], mask: &[bool]) -> usize {
        let q = self.q_values(features);
        self.valid_options(mask)
            .into_iter()
            .fold(None, |best: Option<usize>, o| match best {
                Some(b) if q[o].is_nan() || q[o] <= q[b] => Some(b),
                _ => Some(o),
            })
            .unwrap_or(0)
    }

    /// Epsilon-greedy option among those allowed by `mask`
    pub fn select(&mut self, features: &[f64], mask: &[bool]) -> usize {
        let valid = self.valid_options(mask);
        if valid.is_empty() {
            return 0;
        }
        if self.rng.gen::<f64>() < self.epsilon {
            valid[self.rng.gen_range(0..valid.len())]
        } else {
            self.greedy(features, mask)
        }
    }

    pub fn update_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    /// Record an SMDP transition and take a learning step
    pub fn update(
        &mut self,
        state: &[f64],
        option: usize,
        reward: f64,
        next_state: &[f64],
        done: bool,
        num_steps: usize,
    ) -> Result<()> {
        if option >= self.num_options() {
            return Err(DscError::InvalidOption(option));
        }
        self.replay.push(OptionExperience {
            state: state.to_vec(),
            option,
            reward,
            next_state: next_state.to_vec(),
            done,
            num_steps,
        });
        if self.replay.len() >= self.config.batch_size {
            self.learn();
        }
        Ok(())
    }

    fn bootstrap_value(&self, next_state: &[f64]) -> f64 {
        let all = vec![true; self.num_options()];
        let next_option = if self.config.use_double_dqn {
            self.greedy(next_state, &all)
        } else {
            let input = Array1::from(with_bias(next_state));
            let q = self.target_weights.dot(&input);
            (0..q.len()).fold(0, |b, o| if q[o] > q[b] { o } else { b })
        };
        Self::row_value(&self.target_weights, next_state, next_option)
    }

    fn learn(&mut self) {
        let batch = self.replay.sample(&mut self.rng, self.config.batch_size);
        if batch.is_empty() {
            return;
        }
        let step = self.config.learning_rate / batch.len() as f64;

        let mut grad = Array2::<f64>::zeros(self.weights.raw_dim());
        for exp in &batch {
            if exp.option >= self.num_options() || exp.state.len() != self.state_dim {
                continue;
            }
            let bootstrap = if exp.done {
                0.0
            } else {
                self.config.gamma.powi(exp.num_steps as i32) * self.bootstrap_value(&exp.next_state)
            };
            let target = exp.reward + bootstrap;
            let td = (target - Self::row_value(&self.weights, &exp.state, exp.option))
                .clamp(-self.config.td_clip, self.config.td_clip);
            if !td.is_finite() {
                continue;
            }
            for (i, x) in with_bias(&exp.state).iter().enumerate() {
                grad[[exp.option, i]] += td * x;
            }
        }
        self.weights.scaled_add(step, &grad);

        let tau = self.config.tau;
        self.target_weights = &self.target_weights * (1.0 - tau) + &self.weights * tau;
        self.num_updates += 1;
    }

    /// Copy of this selector with room for `new_count` options.
    ///
    /// Rows of existing options are preserved in both tables. New rows get
    /// zero weights and `seed_value` as bias, so their Q-value is
    /// `seed_value` everywhere until trained. Exploration state, replay and
    /// the random stream carry over.
    pub fn grow(&self, new_count: usize, seed_value: f64) -> Result<Self> {
        let old_count = self.num_options();
        if new_count <= old_count {
            return Err(DscError::Config(format!(
                "cannot grow option selector from {old_count} to {new_count} options"
            )));
        }
        let cols = self.state_dim + 1;
        let seed_row = |table: &Array2<f64>| {
            let mut grown = Array2::<f64>::zeros((new_count, cols));
            grown.slice_mut(s![..old_count, ..]).assign(table);
            for o in old_count..new_count {
                grown[[o, cols - 1]] = seed_value;
            }
            grown
        };
        debug!(
            "Growing option selector {} -> {} options (seed Q {:.3})",
            old_count, new_count, seed_value
        );

        Ok(Self {
            config: self.config.clone(),
            state_dim: self.state_dim,
            weights: seed_row(&self.weights),
            target_weights: seed_row(&self.target_weights),
            replay: self.replay.clone(),
            epsilon: self.epsilon,
            rng: self.rng.clone(),
            num_updates: self.num_updates,
        })
    }
}
