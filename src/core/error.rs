use thiserror::Error;

/// Conditions that make a search impossible to start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("no requirements were loaded")]
    NoRequirements,
    #[error("no eligible allocation candidates exist for the loaded entities")]
    NoCandidates,
    #[error("requirement {index} is invalid: {reason}")]
    InvalidRequirement { index: usize, reason: String },
    #[error("source {index} is invalid: {reason}")]
    InvalidSource { index: usize, reason: String },
    #[error("balance pool {index} is invalid: {reason}")]
    InvalidBalancePool { index: usize, reason: String },
    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),
}
