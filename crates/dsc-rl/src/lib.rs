//! DSC RL - Deep skill chaining
//!
//! This crate implements the option discovery and chaining algorithm:
//! initiation-region classifiers, options with closed-loop controllers, a
//! growable policy over options, and the controller that chains options
//! backward from the goal.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_arguments)]

pub mod chaining;
pub mod classifier;
pub mod config;
pub mod experience;
pub mod option;
pub mod policy;
pub mod stats;

pub use chaining::SkillChaining;
pub use classifier::{ClassifierKind, InitiationClassifier, KernelGamma};
pub use config::{ChainingConfig, ClassifierConfig, DdpgConfig, DqnConfig};
pub use experience::ReplayBuffer;
pub use option::{OptionKind, SkillOption};
pub use policy::{ContinuousPolicy, Ddpg, OptionValueNetwork};
pub use stats::{EpisodeStats, OptionDiagnostics, OptionHistory, RunData};
