//! Behavior kinds, selection modes and probability tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chaos::error::ConfigurationError;

/// Allowed deviation of a probability table's sum from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-12;

/// What the proxy does with a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    /// Proxy the call to upstream.
    Forward,
    /// Simulate a hang: never answer.
    NotAnswer,
    /// Answer with a synthetic error.
    Fail,
}

impl BehaviorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Forward => "forward",
            BehaviorKind::NotAnswer => "not_answer",
            BehaviorKind::Fail => "fail",
        }
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "forward" => Ok(BehaviorKind::Forward),
            "not_answer" | "notanswer" => Ok(BehaviorKind::NotAnswer),
            "fail" => Ok(BehaviorKind::Fail),
            other => Err(ConfigurationError::UnknownBehavior(other.to_string())),
        }
    }
}

/// How a rule (or the default) picks its behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Consume a FIFO queue of one-shot behaviors.
    Deterministic,
    /// Sample from a probability table.
    Random,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Deterministic => f.write_str("deterministic"),
            SelectionMode::Random => f.write_str("random"),
        }
    }
}

impl FromStr for SelectionMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deterministic" => Ok(SelectionMode::Deterministic),
            "random" => Ok(SelectionMode::Random),
            other => Err(ConfigurationError::UnknownMode(other.to_string())),
        }
    }
}

/// Probability of each behavior. Missing entries count as zero.
///
/// Tables are plain data until [`ProbabilityTable::validate`] accepts them;
/// the registry refuses to store a table that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilityTable {
    pub forward: f64,
    pub not_answer: f64,
    pub fail: f64,
}

impl ProbabilityTable {
    pub fn new(forward: f64, not_answer: f64, fail: f64) -> Self {
        Self {
            forward,
            not_answer,
            fail,
        }
    }

    /// Build a table from `(behavior, probability)` pairs. Repeated behaviors
    /// overwrite earlier entries.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (BehaviorKind, f64)>) -> Self {
        let mut table = Self::default();
        for (behavior, p) in pairs {
            match behavior {
                BehaviorKind::Forward => table.forward = p,
                BehaviorKind::NotAnswer => table.not_answer = p,
                BehaviorKind::Fail => table.fail = p,
            }
        }
        table
    }

    pub fn get(&self, behavior: BehaviorKind) -> f64 {
        match behavior {
            BehaviorKind::Forward => self.forward,
            BehaviorKind::NotAnswer => self.not_answer,
            BehaviorKind::Fail => self.fail,
        }
    }

    pub fn sum(&self) -> f64 {
        self.forward + self.not_answer + self.fail
    }

    /// Check every entry is a probability and the entries sum to 1.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for behavior in [BehaviorKind::Forward, BehaviorKind::NotAnswer, BehaviorKind::Fail] {
            let value = self.get(behavior);
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::ProbabilityOutOfRange { behavior, value });
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ConfigurationError::InvalidProbabilitySum { sum });
        }
        Ok(())
    }

    /// Map a uniform sample `r` in `[0, 1)` onto a behavior.
    ///
    /// NotAnswer owns `[0, pNA)`, Fail owns `[pNA, pNA + pFail)`, Forward the rest.
    pub fn pick(&self, r: f64) -> BehaviorKind {
        if r < self.not_answer {
            BehaviorKind::NotAnswer
        } else if r < self.not_answer + self.fail {
            BehaviorKind::Fail
        } else {
            BehaviorKind::Forward
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_parsing() {
        assert_eq!("forward".parse::<BehaviorKind>().unwrap(), BehaviorKind::Forward);
        assert_eq!("not-answer".parse::<BehaviorKind>().unwrap(), BehaviorKind::NotAnswer);
        assert_eq!("NotAnswer".parse::<BehaviorKind>().unwrap(), BehaviorKind::NotAnswer);
        assert_eq!("FAIL".parse::<BehaviorKind>().unwrap(), BehaviorKind::Fail);
        assert!("explode".parse::<BehaviorKind>().is_err());
    }

    #[test]
    fn test_behavior_serde_names() {
        let json = serde_json::to_string(&BehaviorKind::NotAnswer).unwrap();
        assert_eq!(json, "\"not_answer\"");
        let mode: SelectionMode = serde_json::from_str("\"random\"").unwrap();
        assert_eq!(mode, SelectionMode::Random);
    }

    #[test]
    fn test_table_validation() {
        assert!(ProbabilityTable::new(0.5, 0.3, 0.2).validate().is_ok());
        assert!(ProbabilityTable::new(1.0, 0.0, 0.0).validate().is_ok());

        let err = ProbabilityTable::new(0.5, 0.3, 0.3).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidProbabilitySum { .. }));

        let err = ProbabilityTable::new(1.5, -0.5, 0.0).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::ProbabilityOutOfRange { .. }));

        assert!(ProbabilityTable::new(f64::NAN, 0.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_table_from_pairs_defaults_missing_to_zero() {
        let table = ProbabilityTable::from_pairs([(BehaviorKind::Fail, 1.0)]);
        assert_eq!(table.forward, 0.0);
        assert_eq!(table.not_answer, 0.0);
        assert_eq!(table.fail, 1.0);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_pick_boundaries() {
        let table = ProbabilityTable::new(0.5, 0.3, 0.2);
        assert_eq!(table.pick(0.0), BehaviorKind::NotAnswer);
        assert_eq!(table.pick(0.29), BehaviorKind::NotAnswer);
        assert_eq!(table.pick(0.3), BehaviorKind::Fail);
        assert_eq!(table.pick(0.49), BehaviorKind::Fail);
        assert_eq!(table.pick(0.51), BehaviorKind::Forward);
        assert_eq!(table.pick(0.999), BehaviorKind::Forward);
    }
}
