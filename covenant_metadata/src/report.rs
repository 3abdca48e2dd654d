// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{HarnessMetadata, Property};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Success,
    Failure,
    /// The harness consumes a contract without a passing check; it was not run.
    DependencyError,
}

/// Path statistics of one harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStats {
    pub explored: u64,
    /// Paths cut by a false assumption.
    pub pruned: u64,
    pub panicked: u64,
    /// Pruned paths where a replacement found no value satisfying its postconditions.
    pub infeasible_replacements: u64,
}

impl PathStats {
    /// Every explored path was pruned, so nothing was actually checked.
    pub fn is_vacuous(&self) -> bool {
        self.explored > 0 && self.pruned == self.explored
    }
}

/// The verdict for a single harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessResult {
    pub harness: HarnessMetadata,
    pub status: VerificationStatus,
    pub properties: Vec<Property>,
    pub paths: PathStats,
    /// Why the harness was not run, for [`VerificationStatus::DependencyError`].
    pub dependency_error: Option<String>,
    /// Zero-based stage the dispatcher ran the harness in.
    pub stage: usize,
    pub duration_ms: u128,
}

impl HarnessResult {
    pub fn failed_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.failed())
    }

    pub fn is_success(&self) -> bool {
        self.status == VerificationStatus::Success
    }
}

/// Results grouped under one contracted function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionSummary {
    /// Check harnesses for the function and whether each passed.
    pub checked_by: BTreeMap<String, VerificationStatus>,
    /// Harnesses that used the function's replacement.
    pub replaced_in: Vec<String>,
    /// Frame-condition failures attributed to the function.
    pub frame_violations: usize,
    /// Postcondition failures attributed to the function.
    pub postcondition_failures: usize,
}

impl FunctionSummary {
    /// At least one check harness exists and every one of them passed.
    pub fn is_verified(&self) -> bool {
        !self.checked_by.is_empty()
            && self.checked_by.values().all(|s| *s == VerificationStatus::Success)
    }
}

/// Everything a verification run produced, keyed by harness and by function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub harnesses: Vec<HarnessResult>,
    pub functions: BTreeMap<String, FunctionSummary>,
    /// The run used `--harness` selection and skipped dependency ordering.
    pub ordering_bypassed: bool,
}

impl VerificationReport {
    pub fn harness(&self, name: &str) -> Option<&HarnessResult> {
        self.harnesses
            .iter()
            .find(|r| r.harness.pretty_name == name || r.harness.short_name() == name)
    }

    pub fn successes(&self) -> usize {
        self.harnesses.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.harnesses.len() - self.successes()
    }

    pub fn all_passed(&self) -> bool {
        self.failures() == 0
    }
}
