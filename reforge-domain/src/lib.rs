//! Domain logic: turn registered issues and proposed refactorings into a
//! deterministic, conflict-free, budget-bounded execution plan.
//!
//! This crate owns *what* gets applied and in which order. It does not own
//! *how* transformations run or are verified; that's `reforge-core`.

mod config;
mod conflicts;
mod registry;
mod scheduler;
mod scorer;

pub use config::{ConfigurationError, validate_run_config};
pub use conflicts::{
    ConflictDetector, ConflictGraph, ContradictionRule, ContradictionRules, DependencyCycleError,
    KindMatch, Relation, find_cycles,
};
pub use registry::{Registry, RegistryError, deterministic_refactoring_id};
pub use scheduler::Scheduler;
pub use scorer::{PriorityScorer, WeightedScorer};
