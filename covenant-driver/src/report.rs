// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rendering of harness results, and their aggregation per contracted function.

use crate::args::OutputFormat;
use covenant::internal::ContractDef;
use covenant_metadata::{
    FunctionSummary, HarnessResult, Property, PropertyClass, VerificationReport, VerificationStatus,
    target_matches,
};
use console::style;
use std::collections::BTreeMap;

/// Render one harness result in the chosen format.
pub fn format_harness(result: &HarnessResult, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Regular => Some(format_result(result, true)),
        OutputFormat::Terse => Some(format_result(result, false)),
        // The report is printed as a whole at the end.
        OutputFormat::Json => None,
    }
}

/// Format the result of a harness: every property when `show_checks` is set,
/// then the counts and the overall verdict.
pub fn format_result(result: &HarnessResult, show_checks: bool) -> String {
    let mut result_str = format!("Checking harness {}...\n", result.harness.pretty_name);

    if let Some(reason) = &result.dependency_error {
        result_str.push_str(&format!("Not run: {reason}\n"));
        let verdict = style("FAILED").red();
        result_str.push_str(&format!("\nVERIFICATION:- {verdict} (dependency error)\n"));
        return result_str;
    }

    if show_checks {
        result_str.push_str("\nRESULTS:\n");
        for (index, prop) in result.properties.iter().enumerate() {
            let index = index + 1;
            let name = prop.property_name();
            result_str.push_str(&format!("Check {index}: {name}\n"));
            result_str.push_str(&format!("\t - Status: {}\n", prop.status));
            result_str.push_str(&format!("\t - Description: \"{}\"\n", prop.description));
            if let Some(location) = &prop.location {
                result_str.push_str(&format!("\t - Location: {location}\n"));
            }
            result_str.push('\n');
        }
        result_str.push_str("\nSUMMARY:");
    } else {
        result_str.push_str("\nVERIFICATION RESULT:");
    }

    let failed: Vec<&Property> = result.failed_properties().collect();
    result_str.push_str(&format!("\n ** {} of {} failed", failed.len(), result.properties.len()));
    let paths = &result.paths;
    let mut other_status = Vec::new();
    if paths.pruned > 0 {
        other_status.push(format!("{} of {} paths pruned", paths.pruned, paths.explored));
    }
    if paths.infeasible_replacements > 0 {
        other_status.push(format!("{} infeasible replacements", paths.infeasible_replacements));
    }
    if !other_status.is_empty() {
        result_str.push_str(&format!(" ({})", other_status.join(", ")));
    }
    result_str.push('\n');

    for prop in failed {
        result_str.push_str(&failure_message(prop));
    }

    let verification_result = if result.status == VerificationStatus::Success {
        style("SUCCESSFUL").green()
    } else {
        style("FAILED").red()
    };
    let vacuity = if paths.is_vacuous() { " (vacuous: every path was pruned)" } else { "" };
    result_str.push_str(&format!("\nVERIFICATION:- {verification_result}{vacuity}\n"));
    if result.properties.iter().any(|p| p.failed() && p.class == PropertyClass::FrameCondition) {
        result_str.push_str(
            "info: A function writes or frees memory outside its `modifies` and `frees` clauses.\n",
        );
    }
    result_str
}

fn failure_message(prop: &Property) -> String {
    let mut message = format!("Failed Checks: {}\n", prop.description);
    if let Some(location) = &prop.location {
        message.push_str(&format!(" File: \"{}\", line {}", location.file, location.line));
        if let Some(fn_name) = &prop.fn_name {
            message.push_str(&format!(", in {fn_name}"));
        }
        message.push('\n');
    }
    if let Some(path) = prop.failing_path {
        message.push_str(&format!(" First failing path: {path}\n"));
    }
    message
}

/// The closing summary of a run. Omitted for a single harness.
pub fn format_summary(report: &VerificationReport) -> Option<String> {
    let total = report.harnesses.len();
    if total == 1 {
        return None;
    }
    if total == 0 {
        return Some(
            "No proof harnesses (functions with #[covenant::proof]) were found to verify.\n".to_string(),
        );
    }
    let mut summary = String::new();
    let failures: Vec<_> = report.harnesses.iter().filter(|r| !r.is_success()).collect();
    if !failures.is_empty() {
        summary.push_str("Summary:\n");
    }
    for failure in failures {
        summary.push_str(&format!("Verification failed for - {}\n", failure.harness.pretty_name));
    }
    summary.push_str(&format!(
        "Complete - {} successfully verified harnesses, {} failures, {} total.\n",
        report.successes(),
        report.failures(),
        total
    ));
    Some(summary)
}

/// Group results under the contracted functions they checked or replaced.
///
/// `contracts` holds, for each harness result, the contracts its paths went
/// through. A check harness that never ran is attributed through its target.
pub fn summarize_functions(
    results: &[HarnessResult],
    contracts: &[BTreeMap<String, &'static ContractDef>],
) -> BTreeMap<String, FunctionSummary> {
    let mut functions: BTreeMap<String, FunctionSummary> = BTreeMap::new();
    for (result, reached) in results.iter().zip(contracts) {
        let pretty = &result.harness.pretty_name;
        let check = result.harness.check_target();
        for name in reached.keys() {
            let summary = functions.entry(name.clone()).or_default();
            if check.is_some_and(|target| target_matches(name, target)) {
                summary.checked_by.insert(pretty.clone(), result.status);
            } else if !summary.replaced_in.contains(pretty) {
                summary.replaced_in.push(pretty.clone());
            }
        }
    }
    for (result, reached) in results.iter().zip(contracts) {
        let Some(target) = result.harness.check_target() else { continue };
        if reached.keys().any(|name| target_matches(name, target)) {
            continue;
        }
        let name = functions
            .keys()
            .find(|name| target_matches(name, target))
            .cloned()
            .unwrap_or_else(|| target.to_string());
        functions.entry(name).or_default().checked_by.insert(result.harness.pretty_name.clone(), result.status);
    }
    for result in results {
        for prop in result.failed_properties() {
            let Some(summary) = prop.fn_name.as_ref().and_then(|name| functions.get_mut(name)) else {
                continue;
            };
            match prop.class {
                PropertyClass::FrameCondition => summary.frame_violations += 1,
                PropertyClass::Postcondition => summary.postcondition_failures += 1,
                _ => {}
            }
        }
    }
    functions
}

/// Render the per-function view of a report.
pub fn format_functions(report: &VerificationReport) -> String {
    let mut out = String::from("Contracts:\n");
    for (name, summary) in &report.functions {
        let verdict = if summary.is_verified() {
            style("VERIFIED").green()
        } else if summary.checked_by.is_empty() {
            style("UNCHECKED").yellow()
        } else {
            style("FAILED").red()
        };
        out.push_str(&format!(
            " - {name}: {verdict} (checked by {}, replaced in {})\n",
            summary.checked_by.len(),
            summary.replaced_in.len()
        ));
    }
    out
}
