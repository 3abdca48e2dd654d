// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explore the paths of every harness of a stage on a thread pool.

use crate::args::VerifyArgs;
use crate::util;
use anyhow::{Context, Result};
use covenant::backend::{PathConfig, PathOutcome, PathVerdict, PropertyRecord, path_seed, run_path};
use covenant::internal::{ContractDef, HarnessDef};
use covenant_metadata::{
    CheckStatus, HarnessMetadata, HarnessResult, PathStats, Property, PropertyClass, SourceLocation,
    VerificationStatus,
};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info_span, warn};

/// A harness function with what its attribute declared.
pub(crate) struct Registered {
    pub(crate) run: fn(),
    pub(crate) def: &'static HarnessDef,
    pub(crate) metadata: HarnessMetadata,
    /// Failures found before exploration, such as undeclared globals.
    pub(crate) findings: Vec<Property>,
}

/// The result of one harness plus the contracts its paths went through.
pub(crate) struct HarnessRun {
    pub(crate) result: HarnessResult,
    pub(crate) contracts: BTreeMap<String, &'static ContractDef>,
}

type PropertyKey = (PropertyClass, Option<String>, u32, String, Option<SourceLocation>);

/// Property outcomes merged over paths: a property fails if it failed on any path.
#[derive(Default)]
struct Properties {
    merged: Vec<Property>,
    index: HashMap<PropertyKey, usize>,
}

impl Properties {
    fn add(&mut self, property: Property) {
        let key = (
            property.class,
            property.fn_name.clone(),
            property.id,
            property.description.clone(),
            property.location.clone(),
        );
        match self.index.get(&key) {
            Some(&at) => {
                let known = &mut self.merged[at];
                if property.failed() && !known.failed() {
                    known.status = CheckStatus::Failure;
                    known.failing_path = property.failing_path;
                }
            }
            None => {
                self.index.insert(key, self.merged.len());
                self.merged.push(property);
            }
        }
    }

    fn record(&mut self, record: PropertyRecord, path: u64) {
        let status = if record.holds { CheckStatus::Success } else { CheckStatus::Failure };
        self.add(Property {
            class: record.class,
            fn_name: record.fn_name,
            id: record.id,
            description: record.description,
            location: record.location,
            status,
            failing_path: (!record.holds).then_some(path),
        });
    }

    fn any_failed(&self) -> bool {
        self.merged.iter().any(Property::failed)
    }
}

pub(crate) struct Runner<'a> {
    args: &'a VerifyArgs,
    pool: ThreadPool,
    stop: AtomicBool,
}

impl<'a> Runner<'a> {
    pub(crate) fn new(args: &'a VerifyArgs) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(args.jobs().unwrap_or(0))
            .thread_name(|index| format!("covenant-{index}"))
            .build()
            .context("Failed to create the harness thread pool")?;
        Ok(Runner { args, pool, stop: AtomicBool::new(false) })
    }

    /// Whether `--fail-fast` saw a failure.
    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Verify the harnesses of one stage in parallel, keyed by their index.
    /// Harnesses skipped by `--fail-fast` have no result.
    pub(crate) fn run_stage(&self, stage: usize, harnesses: &[(usize, &Registered)]) -> Vec<(usize, HarnessRun)> {
        debug!(stage, harnesses = harnesses.len(), "running stage");
        self.pool.install(|| {
            harnesses
                .par_iter()
                .filter_map(|(index, harness)| {
                    if self.stopped() {
                        return None;
                    }
                    let run = self.verify(harness, stage);
                    if self.args.fail_fast && !run.result.is_success() {
                        self.stop.store(true, Ordering::Relaxed);
                    }
                    Some((*index, run))
                })
                .collect()
        })
    }

    fn config(&self, harness: &str, path: u64) -> PathConfig {
        PathConfig {
            seed: path_seed(self.args.seed, harness, path),
            replace_attempts: self.args.replace_attempts,
            draw_attempts: self.args.draw_attempts,
            edge_percent: self.args.edge_percent,
        }
    }

    fn verify(&self, harness: &Registered, stage: usize) -> HarnessRun {
        let name = harness.metadata.pretty_name.as_str();
        let _span = info_span!("harness", name).entered();
        let start = Instant::now();
        let mut properties = Properties::default();
        for finding in &harness.findings {
            properties.add(finding.clone());
        }
        let mut paths = PathStats::default();
        let mut reached = false;
        let mut contracts = BTreeMap::new();

        for path in 0..self.args.paths {
            let PathOutcome { verdict, properties: records, target_reached, contracts: seen } =
                run_path(harness.run, harness.def, &self.config(name, path));
            paths.explored += 1;
            match verdict {
                PathVerdict::Completed => {}
                PathVerdict::Pruned { infeasible_replacement } => {
                    paths.pruned += 1;
                    if infeasible_replacement {
                        paths.infeasible_replacements += 1;
                    }
                }
                PathVerdict::Panicked(panic) => {
                    paths.panicked += 1;
                    properties.add(Property {
                        class: PropertyClass::Panic,
                        fn_name: None,
                        id: 0,
                        description: panic.message,
                        location: panic.location,
                        status: CheckStatus::Failure,
                        failing_path: Some(path),
                    });
                }
            }
            reached |= target_reached;
            for record in records {
                properties.record(record, path);
            }
            for contract in seen {
                contracts.entry(contract.name).or_insert(contract.def);
            }
            if self.args.fail_fast && properties.any_failed() {
                debug!(path, "stopping at the first failure");
                break;
            }
        }

        if let Some(target) = harness.metadata.check_target().filter(|_| !reached) {
            properties.add(Property {
                class: PropertyClass::ContractTarget,
                fn_name: None,
                id: 0,
                description: format!("the harness calls `{target}`, the function it checks"),
                location: Some(SourceLocation {
                    file: harness.metadata.original_file.clone(),
                    line: harness.metadata.original_line,
                    column: 1,
                }),
                status: CheckStatus::Failure,
                failing_path: None,
            });
        }
        if paths.is_vacuous() {
            warn!(explored = paths.explored, "every path was pruned");
            if !self.args.quiet {
                util::warning(&format!(
                    "harness `{name}` is vacuous: all {} explored paths were pruned by assumptions",
                    paths.explored
                ));
            }
        }

        let status = if properties.any_failed() {
            VerificationStatus::Failure
        } else {
            VerificationStatus::Success
        };
        let duration_ms = start.elapsed().as_millis();
        debug!(?status, ?paths, duration_ms, "verified harness");
        HarnessRun {
            result: HarnessResult {
                harness: harness.metadata.clone(),
                status,
                properties: properties.merged,
                paths,
                dependency_error: None,
                stage,
                duration_ms,
            },
            contracts,
        }
    }
}

/// The result of a harness that was not run.
pub(crate) fn not_run(harness: &HarnessMetadata, stage: usize, reason: String) -> HarnessResult {
    HarnessResult {
        harness: harness.clone(),
        status: VerificationStatus::DependencyError,
        properties: Vec::new(),
        paths: PathStats::default(),
        dependency_error: Some(reason),
        stage,
        duration_ms: 0,
    }
}
