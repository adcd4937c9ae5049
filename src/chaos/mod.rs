//! Behavior-injection engine.
//!
//! # Data Flow
//! ```text
//! method name
//!     → selector.rs (one lock around the registry)
//!     → registry.rs (first matching rule, else default)
//!     → matcher.rs (exact / regex / predicate)
//!     → BehaviorKind: Forward | NotAnswer | Fail
//!
//! Forward only:
//!     delay.rs (pre-delay before upstream, post-delay before response)
//! ```
//!
//! # Design Decisions
//! - Rules are process-wide; no per-connection overrides
//! - Configuration errors fail fast and leave state untouched
//! - The engine never touches a transport; bridges in `http` enact behaviors

pub mod behavior;
pub mod delay;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod selector;

pub use behavior::{BehaviorKind, ProbabilityTable, SelectionMode};
pub use delay::{DelayConfig, DelayController};
pub use error::{ConfigResult, ConfigurationError};
pub use matcher::{MatcherSpec, MethodMatcher};
pub use registry::{RegistrySnapshot, RuleConfig, RuleRegistry, RuleSource, Selection};
pub use selector::BehaviorSelector;
