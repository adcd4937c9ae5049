//! Process-wide behavior selection.
//!
//! Wraps the [`RuleRegistry`] in a mutex so that every read-and-pop happens
//! under one lock: two concurrent selections never pop the same queue entry,
//! and pops happen in lock-acquisition order. Configuration calls take the
//! same lock, so a request observes either all or none of a call's effect.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Mutex, MutexGuard};

use crate::chaos::behavior::{BehaviorKind, ProbabilityTable, SelectionMode};
use crate::chaos::error::ConfigResult;
use crate::chaos::matcher::MethodMatcher;
use crate::chaos::registry::{RegistrySnapshot, RuleConfig, RuleRegistry, RuleSource, Selection};

#[derive(Debug)]
struct SelectorState {
    registry: RuleRegistry,
    rng: StdRng,
}

#[derive(Debug)]
pub struct BehaviorSelector {
    state: Mutex<SelectorState>,
}

impl Default for BehaviorSelector {
    fn default() -> Self {
        Self::with_registry(RuleRegistry::new(), None)
    }
}

impl BehaviorSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a selector over `registry`. A fixed `seed` makes random rules
    /// reproducible across runs.
    pub fn with_registry(registry: RuleRegistry, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: Mutex::new(SelectorState { registry, rng }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SelectorState> {
        // A panic while holding the lock cannot leave the registry half-updated:
        // every mutation validates first and then applies in one statement.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_rule(&self, matcher: MethodMatcher, config: impl Into<RuleConfig>) -> ConfigResult<()> {
        let config = config.into();
        let description = matcher.representation();
        self.lock().registry.add_rule(matcher, config.clone())?;
        tracing::info!(matcher = %description, config = ?config, "Rule added");
        Ok(())
    }

    pub fn push_rule_behavior(&self, matcher: &MethodMatcher, behavior: BehaviorKind) -> ConfigResult<()> {
        self.lock().registry.push_rule_behavior(matcher, behavior)?;
        tracing::debug!(matcher = %matcher, behavior = %behavior, "Behavior queued on rule");
        Ok(())
    }

    pub fn clear_rules(&self) {
        self.lock().registry.clear_rules();
        tracing::info!("Rules cleared");
    }

    pub fn set_default_mode(&self, mode: SelectionMode, probs: Option<ProbabilityTable>) -> ConfigResult<()> {
        self.lock().registry.set_default_mode(mode, probs)?;
        tracing::info!(mode = %mode, probs = ?probs, "Default mode set");
        Ok(())
    }

    pub fn add_behavior(&self, behavior: BehaviorKind) {
        self.lock().registry.add_behavior(behavior);
        tracing::debug!(behavior = %behavior, "Behavior queued on default");
    }

    pub fn clear_default_queue(&self) {
        self.lock().registry.clear_default_queue();
        tracing::debug!("Default queue cleared");
    }

    /// Swap in a whole new registry (config reload).
    pub fn replace(&self, registry: RuleRegistry) {
        let rules = registry.rules().len();
        self.lock().registry.replace_with(registry);
        tracing::info!(rules, "Rule registry replaced");
    }

    /// Select a behavior for `method`. Atomic with respect to queue mutation.
    pub fn select(&self, method: &str) -> Selection {
        let selection = {
            let mut state = self.lock();
            let SelectorState { registry, rng } = &mut *state;
            registry.select(method, rng)
        };
        match selection.source {
            RuleSource::Rule(index) => tracing::debug!(
                method = %method,
                rule = index,
                behavior = %selection.behavior,
                "Behavior selected"
            ),
            RuleSource::Default => tracing::debug!(
                method = %method,
                behavior = %selection.behavior,
                "Behavior selected from default"
            ),
        }
        selection
    }

    pub fn select_behavior(&self, method: &str) -> BehaviorKind {
        self.select(method).behavior
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.lock().registry.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_random_convergence() {
        let selector = BehaviorSelector::new();
        selector
            .add_rule(
                MethodMatcher::exact("eth_call"),
                ProbabilityTable::new(0.5, 0.3, 0.2),
            )
            .unwrap();

        let (mut forward, mut not_answer, mut fail) = (0, 0, 0);
        for _ in 0..200 {
            match selector.select_behavior("eth_call") {
                BehaviorKind::Forward => forward += 1,
                BehaviorKind::NotAnswer => not_answer += 1,
                BehaviorKind::Fail => fail += 1,
            }
        }
        assert_eq!(forward + not_answer + fail, 200);
        // Loose bounds: statistical convergence, not exact values.
        assert!(forward > 40, "forward = {}", forward);
        assert!(not_answer > 10, "not_answer = {}", not_answer);
        assert!(fail > 5, "fail = {}", fail);
    }

    #[test]
    fn test_seeded_selectors_agree() {
        let table = ProbabilityTable::new(0.4, 0.3, 0.3);
        let a = BehaviorSelector::with_registry(RuleRegistry::new(), Some(42));
        let b = BehaviorSelector::with_registry(RuleRegistry::new(), Some(42));
        for selector in [&a, &b] {
            selector.set_default_mode(SelectionMode::Random, Some(table)).unwrap();
        }

        let run = |s: &BehaviorSelector| (0..50).map(|_| s.select_behavior("x")).collect::<Vec<_>>();
        assert_eq!(run(&a), run(&b));
    }

    #[test]
    fn test_concurrent_selection_pops_each_entry_once() {
        let selector = Arc::new(BehaviorSelector::new());
        let queue: Vec<BehaviorKind> = (0..400)
            .map(|i| if i % 2 == 0 { BehaviorKind::Fail } else { BehaviorKind::NotAnswer })
            .collect();
        selector.add_rule(MethodMatcher::exact("eth_call"), queue).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = Arc::clone(&selector);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| selector.select_behavior("eth_call"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let drawn: Vec<BehaviorKind> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let count = |kind| drawn.iter().filter(|b| **b == kind).count();
        assert_eq!(count(BehaviorKind::Fail), 200);
        assert_eq!(count(BehaviorKind::NotAnswer), 200);
        assert_eq!(count(BehaviorKind::Forward), 400);
        assert!(selector.snapshot().rules[0].queue.is_empty());
    }

    #[test]
    fn test_replace_is_atomic_swap() {
        let selector = BehaviorSelector::new();
        selector.add_rule(MethodMatcher::exact("a"), BehaviorKind::Fail).unwrap();

        let mut next = RuleRegistry::new();
        next.add_behavior(BehaviorKind::NotAnswer);
        selector.replace(next);

        let snapshot = selector.snapshot();
        assert!(snapshot.rules.is_empty());
        assert_eq!(selector.select_behavior("a"), BehaviorKind::NotAnswer);
    }
}
