// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The execution backend used by `covenant-driver`.
//!
//! A harness is explored one path at a time. Every path runs on the calling
//! thread with a fresh exploration context and a value source seeded for that
//! path, so a path can be replayed from its seed alone.

use crate::context::{self, Exploration, PathPruned};
use crate::internal::{ContractDef, HarnessDef};
use crate::source;
use covenant_metadata::{PropertyClass, SourceLocation};
use std::panic::{self, AssertUnwindSafe};

pub use crate::source::path_seed;

/// The outcome of one property on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub class: PropertyClass,
    /// The contracted function the property belongs to, if any.
    pub fn_name: Option<String>,
    pub id: u32,
    pub description: String,
    pub location: Option<SourceLocation>,
    pub holds: bool,
}

/// A panic raised on an explored path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicRecord {
    pub message: String,
    pub location: Option<SourceLocation>,
}

/// Knobs for exploring one path.
#[derive(Debug, Clone, Copy)]
pub struct PathConfig {
    pub seed: u64,
    /// Candidate outcomes a replacement draws before the path is pruned.
    pub replace_attempts: u32,
    /// Values `any_where` draws before the path is pruned.
    pub draw_attempts: u32,
    /// Percentage of draws that pick a boundary value.
    pub edge_percent: u32,
}

impl PathConfig {
    pub fn with_seed(seed: u64) -> Self {
        PathConfig {
            seed,
            replace_attempts: context::DEFAULT_REPLACE_ATTEMPTS,
            draw_attempts: context::DEFAULT_DRAW_ATTEMPTS,
            edge_percent: source::DEFAULT_EDGE_PERCENT,
        }
    }
}

/// How a path ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    Completed,
    /// An assumption failed. `infeasible_replacement` is set when no
    /// replacement outcome satisfied a postcondition.
    Pruned { infeasible_replacement: bool },
    Panicked(PanicRecord),
}

/// A contract that was checked or replaced on a path.
#[derive(Debug, Clone)]
pub struct ReachedContract {
    pub name: String,
    pub def: &'static ContractDef,
}

#[derive(Debug, Clone)]
pub struct PathOutcome {
    pub verdict: PathVerdict,
    pub properties: Vec<PropertyRecord>,
    /// Whether the check target of the harness was called.
    pub target_reached: bool,
    pub contracts: Vec<ReachedContract>,
}

/// Read the definition a harness attribute attached to `harness`, without
/// running the harness body.
///
/// Returns `None` for functions that are not harnesses; their body runs to
/// completion, so only pass harness functions.
pub fn describe(harness: fn()) -> Option<&'static HarnessDef> {
    context::begin_describe();
    let described = panic::catch_unwind(harness);
    let def = context::end_describe();
    described.ok().and(def)
}

/// Explore one path of `harness`.
pub fn run_path(harness: fn(), def: &'static HarnessDef, config: &PathConfig) -> PathOutcome {
    source::reseed(config.seed, config.edge_percent);
    context::begin_exploration(Exploration::new(def, config.replace_attempts, config.draw_attempts));
    let result = panic::catch_unwind(AssertUnwindSafe(harness));
    let (exploration, panicked) = context::end_exploration();
    let verdict = match result {
        Ok(()) => PathVerdict::Completed,
        Err(payload) => match payload.downcast::<PathPruned>() {
            Ok(pruned) => PathVerdict::Pruned { infeasible_replacement: pruned.infeasible_replacement },
            Err(_) => PathVerdict::Panicked(panicked.unwrap_or_else(|| PanicRecord {
                message: "harness panicked".to_string(),
                location: None,
            })),
        },
    };
    let (properties, target_reached, contracts) = match exploration {
        Some(exploration) => (
            exploration.properties,
            exploration.target_reached,
            exploration
                .contracts
                .into_iter()
                .map(|(name, def)| ReachedContract { name, def })
                .collect(),
        ),
        None => (Vec::new(), false, Vec::new()),
    };
    tracing::trace!(harness = def.name, seed = config.seed, ?verdict, "explored path");
    PathOutcome { verdict, properties, target_reached, contracts }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PLAIN: HarnessDef = HarnessDef {
        name: "plain",
        module: "demo",
        file: file!(),
        line: 1,
        check: None,
        stubs: &[],
    };

    #[test]
    fn assertions_are_collected_per_path() {
        fn harness() {
            let x: u8 = crate::any();
            crate::assert(x.checked_add(0) == Some(x), "adding zero");
            crate::assert(false, "always fails");
        }
        let outcome = run_path(harness, &PLAIN, &PathConfig::with_seed(5));
        assert_eq!(outcome.verdict, PathVerdict::Completed);
        assert_eq!(outcome.properties.len(), 2);
        assert!(outcome.properties[0].holds);
        assert!(!outcome.properties[1].holds);
        assert_eq!(outcome.properties[1].class, PropertyClass::Assertion);
    }

    #[test]
    fn failed_assumption_prunes_silently() {
        fn harness() {
            crate::assume(false);
            crate::assert(false, "unreachable");
        }
        let outcome = run_path(harness, &PLAIN, &PathConfig::with_seed(6));
        assert_eq!(outcome.verdict, PathVerdict::Pruned { infeasible_replacement: false });
        assert!(outcome.properties.is_empty());
    }

    #[test]
    fn panics_are_captured_with_their_message() {
        fn harness() {
            let divisor: u32 = std::hint::black_box(0);
            let _ = 10 / divisor;
        }
        let outcome = run_path(harness, &PLAIN, &PathConfig::with_seed(7));
        match outcome.verdict {
            PathVerdict::Panicked(record) => {
                assert!(record.message.contains("divide by zero"));
                assert!(record.location.is_some());
            }
            other => panic!("expected a panic, got {other:?}"),
        }
    }

    #[test]
    fn describing_a_plain_function_yields_nothing() {
        fn not_a_harness() {}
        assert!(describe(not_a_harness).is_none());
    }

    #[test]
    fn same_seed_same_values() {
        fn harness() {
            let x: u64 = crate::any();
            crate::assert(x % 2 == 0, "even");
        }
        let first = run_path(harness, &PLAIN, &PathConfig::with_seed(11));
        let second = run_path(harness, &PLAIN, &PathConfig::with_seed(11));
        assert_eq!(first.properties, second.properties);
    }
}
