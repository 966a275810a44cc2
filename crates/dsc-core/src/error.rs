//! Error types for DSC

use thiserror::Error;

/// Main error type for DSC
#[derive(Error, Debug)]
pub enum DscError {
    /// An option was asked to run from a state outside its initiation region.
    #[error("Initiation condition not met: cannot execute {option}")]
    InitiationNotSatisfied { option: String },

    #[error("Option not trained: {0}")]
    NotTrained(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid option index: {0}")]
    InvalidOption(usize),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DscError {
    /// True for errors that indicate a bug in the calling driver rather than
    /// a bad configuration or an environment failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            DscError::InitiationNotSatisfied { .. } | DscError::InvalidOption(_)
        )
    }
}

/// Result type alias for DSC operations
pub type Result<T> = std::result::Result<T, DscError>;
