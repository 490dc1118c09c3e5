use thiserror::Error;

/**
 * Fatal error conditions for a tree sequence inference run. None of these are
 * retried locally; the run is aborted and all in-memory state drops cleanly.
 */
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrolgaError {
    #[error("Invalid allele in input panel: {0}")]
    InvalidAllele(String),
    #[error("Site positions must be monotonically nondecreasing: {0}")]
    NonMonotonicPositions(String),
    #[error("Empty input panel: {0}")]
    EmptyPanel(String),
    #[error("Input shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No eligible copying parents: {0}")]
    NoEligibleParents(String),
    #[error("Likelihood underflow in copying model: {0}")]
    LikelihoodUnderflow(String),
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}
