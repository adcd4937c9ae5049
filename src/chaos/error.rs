//! Rule configuration errors.

use thiserror::Error;

use crate::chaos::behavior::BehaviorKind;

/// A rejected configuration call. The registry is left exactly as it was
/// before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Probability table does not sum to 1.
    #[error("probabilities must sum to 1, got {sum}")]
    InvalidProbabilitySum { sum: f64 },

    /// A single entry is not a probability.
    #[error("probability for {behavior} must be within [0, 1], got {value}")]
    ProbabilityOutOfRange { behavior: BehaviorKind, value: f64 },

    /// Random mode requested without a table.
    #[error("random mode requires a probability table")]
    MissingProbabilities,

    /// No deterministic rule with the given matcher exists.
    #[error("no deterministic rule found for matcher {matcher}")]
    RuleNotFound { matcher: String },

    /// Regular expression failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Matcher description is missing or ambiguous.
    #[error("invalid matcher: {0}")]
    InvalidMatcher(String),

    #[error("unknown behavior '{0}'")]
    UnknownBehavior(String),

    #[error("unknown selection mode '{0}'")]
    UnknownMode(String),
}

/// Result type for rule configuration calls.
pub type ConfigResult<T> = Result<T, ConfigurationError>;
