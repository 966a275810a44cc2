//! Hyper-parameters for skill chaining and its learners

use serde::{Deserialize, Serialize};

use dsc_core::{DscError, Result};

use crate::classifier::{ClassifierKind, KernelGamma};

/// Configuration of the chaining controller and of the options it creates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainingConfig {
    /// Primitive steps allowed per episode
    pub max_steps: usize,
    /// Reward for reaching an option's termination region
    pub subgoal_reward: f64,
    /// Per-execution step limit for learned options (None = unbounded)
    pub option_timeout: Option<usize>,
    /// Suffix length of trajectories kept as positive examples
    pub buffer_length: usize,
    /// Termination hits needed before an option is trained
    pub num_subgoal_hits_required: usize,
    /// Cap on learned options; 0 disables chaining
    pub max_num_options: usize,
    /// Fixed value for a new option's Q node (None = derived from data)
    pub init_q: Option<f64>,
    /// Discounted SMDP update instead of the sparse 0/-1 update
    pub use_full_smdp_update: bool,
    /// Uniform-random exploration during training executions
    pub random_exploration: bool,
    /// Probability of a uniform random action while exploring
    pub random_action_prob: f64,
    /// Std of the Gaussian noise added to policy actions while exploring
    pub exploration_noise: f64,
    /// Number of leading state dimensions the classifiers see
    pub position_dims: usize,
    /// Greedy evaluation every N episodes (0 = never)
    pub evaluation_interval: u64,
    /// Discount used by SMDP credit assignment
    pub gamma: f64,
    pub seed: u64,
}

impl Default for ChainingConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            subgoal_reward: 0.0,
            option_timeout: Some(100),
            buffer_length: 20,
            num_subgoal_hits_required: 3,
            max_num_options: 5,
            init_q: Some(0.0),
            use_full_smdp_update: false,
            random_exploration: true,
            random_action_prob: 0.95,
            exploration_noise: 0.7,
            position_dims: 2,
            evaluation_interval: 100,
            gamma: 0.99,
            seed: 0,
        }
    }
}

impl ChainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_subgoal_hits_required == 0 {
            return Err(DscError::Config(
                "num_subgoal_hits_required must be at least 1".to_string(),
            ));
        }
        if self.buffer_length == 0 {
            return Err(DscError::Config("buffer_length must be positive".to_string()));
        }
        if self.position_dims == 0 {
            return Err(DscError::Config("position_dims must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DscError::Config(format!("gamma out of range: {}", self.gamma)));
        }
        if !(0.0..=1.0).contains(&self.random_action_prob) {
            return Err(DscError::Config(format!(
                "random_action_prob out of range: {}",
                self.random_action_prob
            )));
        }
        Ok(())
    }
}

/// Initiation classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Classifier family; only "ocsvm" is supported
    pub classifier_type: String,
    /// Upper bound on the fraction of outliers for the one-class boundary
    pub nu: f64,
    /// Box constraint of the two-class boundary
    pub c: f64,
    /// RBF width shared by both boundaries
    pub gamma: KernelGamma,
    /// SMO stopping tolerance
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            classifier_type: "ocsvm".to_string(),
            nu: 0.1,
            c: 1.0,
            // Sized for positions in the 5 x 5 point-mass arena
            gamma: KernelGamma::Fixed(0.05),
            tolerance: 1e-3,
            max_iterations: 1_000_000,
        }
    }
}

impl ClassifierConfig {
    /// Parse the configured family
    pub fn kind(&self) -> Result<ClassifierKind> {
        match self.classifier_type.as_str() {
            "ocsvm" => Ok(ClassifierKind::OneClass),
            other => Err(DscError::Config(format!("Unknown classifier type: {other}"))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.kind()?;
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(DscError::Config(format!("nu must be in (0, 1]: {}", self.nu)));
        }
        if self.c <= 0.0 {
            return Err(DscError::Config(format!("c must be positive: {}", self.c)));
        }
        self.gamma.validate()?;
        Ok(())
    }
}

/// Actor-critic learner configuration (one instance per option)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DdpgConfig {
    pub lr_actor: f64,
    pub lr_critic: f64,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub gamma: f64,
    /// Soft target update rate
    pub tau: f64,
    /// Std of exploration noise relative to the action bound
    pub noise_std: f64,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    /// Clip on the magnitude of the critic's TD error
    pub td_clip: f64,
}

impl Default for DdpgConfig {
    fn default() -> Self {
        Self {
            lr_actor: 1e-4,
            lr_critic: 1e-3,
            batch_size: 64,
            buffer_capacity: 100_000,
            gamma: 0.99,
            tau: 0.005,
            noise_std: 0.2,
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.9995,
            td_clip: 10.0,
        }
    }
}

/// Policy-over-options learner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub gamma: f64,
    pub tau: f64,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    /// Double Q-learning target (online argmax, target evaluation)
    pub use_double_dqn: bool,
    pub td_clip: f64,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            batch_size: 32,
            buffer_capacity: 100_000,
            gamma: 0.99,
            tau: 0.001,
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.999,
            use_double_dqn: true,
            td_clip: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chaining_config_is_valid() {
        let config = ChainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_length, 20);
        assert_eq!(config.num_subgoal_hits_required, 3);
    }

    #[test]
    fn test_zero_hits_rejected() {
        let config = ChainingConfig {
            num_subgoal_hits_required: 0,
            ..ChainingConfig::default()
        };
        assert!(matches!(config.validate(), Err(DscError::Config(_))));
    }

    #[test]
    fn test_unknown_classifier_kind_rejected() {
        let config = ClassifierConfig {
            classifier_type: "elliptic".to_string(),
            ..ClassifierConfig::default()
        };
        assert!(matches!(config.kind(), Err(DscError::Config(_))));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: ChainingConfig =
            serde_json::from_str(r#"{"max_steps": 200, "num_subgoal_hits_required": 2}"#).unwrap();
        assert_eq!(config.max_steps, 200);
        assert_eq!(config.num_subgoal_hits_required, 2);
        assert_eq!(config.buffer_length, 20);
        assert_eq!(config.init_q, Some(0.0));
    }

    #[test]
    fn test_kernel_gamma_accepts_heuristic_or_number() {
        let config: ClassifierConfig = serde_json::from_str(r#"{"gamma": "scale"}"#).unwrap();
        assert_eq!(config.gamma, KernelGamma::SCALE);
        assert!(config.validate().is_ok());

        let config: ClassifierConfig = serde_json::from_str(r#"{"gamma": 0.3}"#).unwrap();
        assert_eq!(config.gamma, KernelGamma::Fixed(0.3));

        assert!(serde_json::from_str::<ClassifierConfig>(r#"{"gamma": "auto"}"#).is_err());

        let config = ClassifierConfig {
            gamma: KernelGamma::Fixed(0.0),
            ..ClassifierConfig::default()
        };
        assert!(matches!(config.validate(), Err(DscError::Config(_))));
    }
}
