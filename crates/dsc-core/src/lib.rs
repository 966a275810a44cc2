//! DSC Core - Core types, traits, and shared functionality
//!
//! This crate provides the foundational types used across all DSC components:
//! the MDP contract the chaining core drives, the transition and state types
//! it records, and the error taxonomy shared by every crate.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod mdp;
pub mod point_mass;
pub mod util;

pub use error::{DscError, Result};
pub use mdp::{Action, Mdp, Reward, State, Transition};
pub use point_mass::{PointMassConfig, PointMassMdp};
