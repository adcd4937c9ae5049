//! Ordered rule list plus the fallback configuration.
//!
//! # Responsibilities
//! - Hold rules in insertion order; the first matching rule wins
//! - Hold the default configuration used when no rule matches
//! - Draw one behavior per request, popping deterministic queues
//!
//! # Design Decisions
//! - Plain data with `&mut self` methods; serialization lives in the selector
//! - Every mutating call validates before touching state, so a rejected call
//!   leaves the registry unchanged
//! - An empty deterministic queue yields `Forward`

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::chaos::behavior::{BehaviorKind, ProbabilityTable, SelectionMode};
use crate::chaos::error::{ConfigResult, ConfigurationError};
use crate::chaos::matcher::MethodMatcher;
use crate::config::schema::{ChaosConfig, DefaultSpec, RuleSpec};

/// Behavior configuration accepted by [`RuleRegistry::add_rule`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuleConfig {
    /// One-shot behavior; sugar for a one-element deterministic queue.
    Behavior(BehaviorKind),
    /// Deterministic FIFO queue.
    Sequence(Vec<BehaviorKind>),
    /// Probability table, validated when the rule is added.
    Random(ProbabilityTable),
}

impl From<BehaviorKind> for RuleConfig {
    fn from(behavior: BehaviorKind) -> Self {
        RuleConfig::Behavior(behavior)
    }
}

impl From<Vec<BehaviorKind>> for RuleConfig {
    fn from(behaviors: Vec<BehaviorKind>) -> Self {
        RuleConfig::Sequence(behaviors)
    }
}

impl From<ProbabilityTable> for RuleConfig {
    fn from(table: ProbabilityTable) -> Self {
        RuleConfig::Random(table)
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Deterministic(VecDeque<BehaviorKind>),
    Random(ProbabilityTable),
}

/// A matcher bound to a selection strategy.
#[derive(Debug, Clone)]
pub struct Rule {
    matcher: MethodMatcher,
    strategy: Strategy,
}

impl Rule {
    /// Validate `config` and build a rule from it.
    pub fn new(matcher: MethodMatcher, config: impl Into<RuleConfig>) -> ConfigResult<Self> {
        let strategy = match config.into() {
            RuleConfig::Behavior(behavior) => Strategy::Deterministic(VecDeque::from([behavior])),
            RuleConfig::Sequence(behaviors) => Strategy::Deterministic(behaviors.into()),
            RuleConfig::Random(table) => {
                table.validate()?;
                Strategy::Random(table)
            }
        };
        Ok(Self { matcher, strategy })
    }

    pub fn matcher(&self) -> &MethodMatcher {
        &self.matcher
    }

    pub fn mode(&self) -> SelectionMode {
        match self.strategy {
            Strategy::Deterministic(_) => SelectionMode::Deterministic,
            Strategy::Random(_) => SelectionMode::Random,
        }
    }

    fn draw(&mut self, rng: &mut impl Rng) -> BehaviorKind {
        match &mut self.strategy {
            Strategy::Deterministic(queue) => queue.pop_front().unwrap_or(BehaviorKind::Forward),
            Strategy::Random(table) => table.pick(rng.gen::<f64>()),
        }
    }

    fn snapshot(&self) -> RuleSnapshot {
        let (queue, probs) = match &self.strategy {
            Strategy::Deterministic(queue) => (queue.iter().copied().collect(), None),
            Strategy::Random(table) => (Vec::new(), Some(*table)),
        };
        RuleSnapshot {
            matcher: self.matcher.representation(),
            mode: self.mode(),
            queue,
            probs,
        }
    }
}

/// Fallback configuration. Keeps both a queue and a table so switching modes
/// back and forth does not lose either.
#[derive(Debug, Clone)]
pub struct DefaultConfig {
    mode: SelectionMode,
    queue: VecDeque<BehaviorKind>,
    probs: Option<ProbabilityTable>,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Deterministic,
            queue: VecDeque::new(),
            probs: None,
        }
    }
}

impl DefaultConfig {
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    fn draw(&mut self, rng: &mut impl Rng) -> BehaviorKind {
        match (self.mode, &self.probs) {
            (SelectionMode::Random, Some(table)) => table.pick(rng.gen::<f64>()),
            // Random without a table cannot be configured; fall through to the queue.
            _ => self.queue.pop_front().unwrap_or(BehaviorKind::Forward),
        }
    }

    fn snapshot(&self) -> DefaultSnapshot {
        DefaultSnapshot {
            mode: self.mode,
            queue: self.queue.iter().copied().collect(),
            probs: self.probs,
        }
    }
}

/// Where a selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    /// Index of the matching rule, in insertion order.
    Rule(usize),
    Default,
}

/// Outcome of one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub behavior: BehaviorKind,
    pub source: RuleSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub matcher: String,
    pub mode: SelectionMode,
    pub queue: Vec<BehaviorKind>,
    pub probs: Option<ProbabilityTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultSnapshot {
    pub mode: SelectionMode,
    pub queue: Vec<BehaviorKind>,
    pub probs: Option<ProbabilityTable>,
}

/// Point-in-time copy of the registry, for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub rules: Vec<RuleSnapshot>,
    pub default: DefaultSnapshot,
}

/// Ordered rules plus the default configuration.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    default: DefaultConfig,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[chaos]` config section.
    pub fn from_config(config: &ChaosConfig) -> ConfigResult<Self> {
        let mut registry = Self::new();
        for spec in &config.rules {
            let (matcher, rule_config) = spec.compile()?;
            registry.add_rule(matcher, rule_config)?;
        }
        registry.apply_default_spec(&config.default)?;
        Ok(registry)
    }

    /// Append a rule. Rules accumulate; duplicates are kept.
    pub fn add_rule(&mut self, matcher: MethodMatcher, config: impl Into<RuleConfig>) -> ConfigResult<()> {
        let rule = Rule::new(matcher, config)?;
        self.rules.push(rule);
        Ok(())
    }

    /// Append `behavior` to the queue of the first deterministic rule whose
    /// matcher equals `matcher`. Never creates a rule.
    pub fn push_rule_behavior(&mut self, matcher: &MethodMatcher, behavior: BehaviorKind) -> ConfigResult<()> {
        let queue = self.rules.iter_mut().find_map(|rule| match &mut rule.strategy {
            Strategy::Deterministic(queue) if rule.matcher == *matcher => Some(queue),
            _ => None,
        });

        match queue {
            Some(queue) => {
                queue.push_back(behavior);
                Ok(())
            }
            None => Err(ConfigurationError::RuleNotFound {
                matcher: matcher.representation(),
            }),
        }
    }

    /// Remove all rules. The default is untouched.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Switch the default's mode. Random requires `probs`; a table passed with
    /// deterministic mode is validated and kept for later.
    pub fn set_default_mode(&mut self, mode: SelectionMode, probs: Option<ProbabilityTable>) -> ConfigResult<()> {
        if let Some(table) = &probs {
            table.validate()?;
        }
        if mode == SelectionMode::Random && probs.is_none() {
            return Err(ConfigurationError::MissingProbabilities);
        }

        self.default.mode = mode;
        if probs.is_some() {
            self.default.probs = probs;
        }
        Ok(())
    }

    /// Push onto the default deterministic queue.
    pub fn add_behavior(&mut self, behavior: BehaviorKind) {
        self.default.queue.push_back(behavior);
    }

    pub fn clear_default_queue(&mut self) {
        self.default.queue.clear();
    }

    /// Replace rules and default in one step.
    pub fn replace_with(&mut self, other: RuleRegistry) {
        *self = other;
    }

    /// Pick the behavior for `method`, consuming at most one queue entry of the
    /// selected rule (or the default).
    pub fn select(&mut self, method: &str, rng: &mut impl Rng) -> Selection {
        if let Some(index) = self.rules.iter().position(|rule| rule.matcher.matches(method)) {
            let behavior = self.rules[index].draw(rng);
            return Selection {
                behavior,
                source: RuleSource::Rule(index),
            };
        }

        Selection {
            behavior: self.default.draw(rng),
            source: RuleSource::Default,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_config(&self) -> &DefaultConfig {
        &self.default
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            rules: self.rules.iter().map(Rule::snapshot).collect(),
            default: self.default.snapshot(),
        }
    }

    fn apply_default_spec(&mut self, spec: &DefaultSpec) -> ConfigResult<()> {
        self.set_default_mode(spec.mode, spec.probs)?;
        self.default.queue = spec.queue.iter().copied().collect();
        Ok(())
    }
}

impl RuleSpec {
    /// Compile into a matcher and rule configuration.
    pub fn compile(&self) -> ConfigResult<(MethodMatcher, RuleConfig)> {
        let matcher = self.matcher_spec().compile()?;
        let config = match self.probs {
            Some(_) if !self.behaviors.is_empty() => {
                return Err(ConfigurationError::InvalidMatcher(format!(
                    "rule {} sets both 'behaviors' and 'probs'",
                    matcher
                )));
            }
            Some(table) => {
                table.validate()?;
                RuleConfig::Random(table)
            }
            None => RuleConfig::Sequence(self.behaviors.clone()),
        };
        Ok((matcher, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule(MethodMatcher::pattern("^eth_").unwrap(), BehaviorKind::Fail)
            .unwrap();
        registry
            .add_rule(MethodMatcher::exact("eth_call"), BehaviorKind::NotAnswer)
            .unwrap();

        let selection = registry.select("eth_call", &mut rng());
        assert_eq!(selection.behavior, BehaviorKind::Fail);
        assert_eq!(selection.source, RuleSource::Rule(0));

        // Rule 0 is exhausted but still matches first, so rule 1 is never consulted.
        let selection = registry.select("eth_call", &mut rng());
        assert_eq!(selection.behavior, BehaviorKind::Forward);
        assert_eq!(selection.source, RuleSource::Rule(0));
        assert_eq!(registry.snapshot().rules[1].queue, vec![BehaviorKind::NotAnswer]);
    }

    #[test]
    fn test_deterministic_queue_fifo() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule(
                MethodMatcher::exact("eth_call"),
                vec![BehaviorKind::Fail, BehaviorKind::NotAnswer, BehaviorKind::Fail],
            )
            .unwrap();

        let mut rng = rng();
        let drawn: Vec<_> = (0..5)
            .map(|_| registry.select("eth_call", &mut rng).behavior)
            .collect();
        assert_eq!(
            drawn,
            vec![
                BehaviorKind::Fail,
                BehaviorKind::NotAnswer,
                BehaviorKind::Fail,
                BehaviorKind::Forward,
                BehaviorKind::Forward,
            ]
        );
    }

    #[test]
    fn test_non_matching_request_does_not_pop() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule(MethodMatcher::exact("eth_call"), BehaviorKind::Fail)
            .unwrap();

        let selection = registry.select("net_version", &mut rng());
        assert_eq!(selection.source, RuleSource::Default);
        assert_eq!(registry.snapshot().rules[0].queue, vec![BehaviorKind::Fail]);
    }

    #[test]
    fn test_invalid_random_rule_not_added() {
        let mut registry = RuleRegistry::new();
        let err = registry
            .add_rule(
                MethodMatcher::exact("eth_call"),
                ProbabilityTable::new(0.5, 0.5, 0.5),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidProbabilitySum { .. }));
        assert!(registry.rules().is_empty());
    }

    #[test]
    fn test_random_rule_distribution() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule(
                MethodMatcher::exact("eth_call"),
                ProbabilityTable::from_pairs([
                    (BehaviorKind::Forward, 0.5),
                    (BehaviorKind::NotAnswer, 0.3),
                    (BehaviorKind::Fail, 0.2),
                ]),
            )
            .unwrap();

        let mut rng = rng();
        let (mut forward, mut not_answer, mut fail) = (0, 0, 0);
        for _ in 0..1000 {
            match registry.select("eth_call", &mut rng).behavior {
                BehaviorKind::Forward => forward += 1,
                BehaviorKind::NotAnswer => not_answer += 1,
                BehaviorKind::Fail => fail += 1,
            }
        }
        assert_eq!(forward + not_answer + fail, 1000);
        assert!(forward > 400, "forward = {}", forward);
        assert!(not_answer > 200, "not_answer = {}", not_answer);
        assert!(fail > 100, "fail = {}", fail);
    }

    #[test]
    fn test_push_rule_behavior() {
        let mut registry = RuleRegistry::new();
        let matcher = MethodMatcher::exact("eth_call");
        registry.add_rule(matcher.clone(), Vec::new()).unwrap();
        registry.push_rule_behavior(&matcher, BehaviorKind::Fail).unwrap();
        registry.push_rule_behavior(&matcher, BehaviorKind::NotAnswer).unwrap();

        assert_eq!(
            registry.snapshot().rules[0].queue,
            vec![BehaviorKind::Fail, BehaviorKind::NotAnswer]
        );
    }

    #[test]
    fn test_push_rule_behavior_requires_deterministic_rule() {
        let mut registry = RuleRegistry::new();
        let err = registry
            .push_rule_behavior(&MethodMatcher::exact("eth_call"), BehaviorKind::Fail)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::RuleNotFound { .. }));
        assert!(registry.rules().is_empty());

        registry
            .add_rule(MethodMatcher::exact("eth_call"), ProbabilityTable::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!(registry
            .push_rule_behavior(&MethodMatcher::exact("eth_call"), BehaviorKind::Fail)
            .is_err());
    }

    #[test]
    fn test_default_mode_validation_keeps_state() {
        let mut registry = RuleRegistry::new();
        registry.add_behavior(BehaviorKind::Fail);

        assert_eq!(
            registry.set_default_mode(SelectionMode::Random, None),
            Err(ConfigurationError::MissingProbabilities)
        );
        assert!(registry
            .set_default_mode(SelectionMode::Random, Some(ProbabilityTable::new(0.2, 0.2, 0.2)))
            .is_err());

        let snapshot = registry.snapshot().default;
        assert_eq!(snapshot.mode, SelectionMode::Deterministic);
        assert_eq!(snapshot.queue, vec![BehaviorKind::Fail]);
        assert_eq!(snapshot.probs, None);
    }

    #[test]
    fn test_default_random_then_deterministic_keeps_queue() {
        let mut registry = RuleRegistry::new();
        registry.add_behavior(BehaviorKind::NotAnswer);
        registry
            .set_default_mode(SelectionMode::Random, Some(ProbabilityTable::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert_eq!(registry.select("any", &mut rng()).behavior, BehaviorKind::Fail);

        registry.set_default_mode(SelectionMode::Deterministic, None).unwrap();
        assert_eq!(registry.select("any", &mut rng()).behavior, BehaviorKind::NotAnswer);
        assert_eq!(registry.select("any", &mut rng()).behavior, BehaviorKind::Forward);
    }

    #[test]
    fn test_reset_sequence_forwards() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule(MethodMatcher::exact("eth_call"), BehaviorKind::Fail)
            .unwrap();
        registry.add_behavior(BehaviorKind::NotAnswer);

        registry.clear_rules();
        registry.clear_default_queue();
        registry.set_default_mode(SelectionMode::Deterministic, None).unwrap();

        for method in ["eth_call", "net_version", ""] {
            assert_eq!(registry.select(method, &mut rng()).behavior, BehaviorKind::Forward);
        }
    }

    #[test]
    fn test_from_config() {
        let config: ChaosConfig = toml::from_str(
            r#"
            [default]
            mode = "deterministic"
            queue = ["fail"]

            [[rules]]
            method = "eth_call"
            behaviors = ["not_answer", "fail"]

            [[rules]]
            pattern = "^debug_"
            probs = { fail = 1.0 }
            "#,
        )
        .unwrap();

        let mut registry = RuleRegistry::from_config(&config).unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.rules.len(), 2);
        assert_eq!(snapshot.rules[0].matcher, "exact:eth_call");
        assert_eq!(snapshot.rules[1].mode, SelectionMode::Random);
        assert_eq!(snapshot.default.queue, vec![BehaviorKind::Fail]);

        assert_eq!(registry.select("debug_trace", &mut rng()).behavior, BehaviorKind::Fail);
        assert_eq!(registry.select("eth_call", &mut rng()).behavior, BehaviorKind::NotAnswer);
    }

    #[test]
    fn test_rule_spec_rejects_mixed_config() {
        let spec = RuleSpec {
            method: Some("eth_call".into()),
            pattern: None,
            behaviors: vec![BehaviorKind::Fail],
            probs: Some(ProbabilityTable::new(1.0, 0.0, 0.0)),
        };
        assert!(spec.compile().is_err());
    }
}
