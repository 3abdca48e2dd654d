// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
// This module implements the `list` and `globals` subcommands.

use crate::args::{ListArgs, ListFormat};
use crate::globals;
use crate::scan::SourceIndex;
use crate::util;
use anyhow::{Context, Result};
use comfy_table::Table;
use covenant_metadata::{ContractedFunction, CovenantMetadata, GlobalFinding, HarnessKind, target_matches};

/// Set some defaults for how we format tables
fn list_table_new() -> Table {
    use comfy_table::*;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
        .load_preset(comfy_table::presets::NOTHING)
        .set_style(TableComponent::BottomBorder, '=')
        .set_style(TableComponent::BottomBorderIntersections, '=')
        .set_style(TableComponent::TopBorder, '=')
        .set_style(TableComponent::TopBorderIntersections, '=')
        .set_style(TableComponent::HeaderLines, '-')
        .set_style(TableComponent::MiddleHeaderIntersections, '+')
        .set_style(TableComponent::VerticalLines, '|');
    table
}

/// The metadata of an indexed crate.
pub fn metadata(index: &SourceIndex, global_findings: Vec<GlobalFinding>) -> CovenantMetadata {
    let contracted_functions = index
        .contracted()
        .map(|function| {
            let harnesses = index
                .harnesses
                .iter()
                .filter(|h| h.check_target().is_some_and(|target| target_matches(&function.path, target)))
                .map(|h| h.pretty_name.clone())
                .collect();
            ContractedFunction {
                pretty_name: function.path.clone(),
                original_file: function.location.file.clone(),
                original_line: function.location.line,
                requires: function.clauses.requires.clone(),
                ensures: function.clauses.ensures.clone(),
                modifies: function.clauses.modifies.clone(),
                frees: function.clauses.frees.clone(),
                harnesses,
            }
        })
        .collect();
    CovenantMetadata {
        crate_name: index.crate_name.clone(),
        proof_harnesses: index.harnesses.clone(),
        contracted_functions,
        global_findings,
    }
}

fn contracts_table(metadata: &CovenantMetadata) -> Table {
    let mut table = list_table_new();
    table.set_header(vec!["Function", "# of Contracts", "Footprint", "Contract Harnesses"]);
    let mut contracts = 0;
    let mut harnesses = 0;
    for function in &metadata.contracted_functions {
        contracts += function.contracts_count();
        harnesses += function.harnesses.len();
        let footprint =
            if function.has_explicit_footprint() { function.modifies.join(", ") } else { "inferred".to_string() };
        let checked_by =
            if function.harnesses.is_empty() { "NONE".to_string() } else { function.harnesses.join("\n") };
        table.add_row(vec![
            function.pretty_name.clone(),
            function.contracts_count().to_string(),
            footprint,
            checked_by,
        ]);
    }
    table.add_row(vec![
        format!("Total: {}", metadata.contracted_functions.len()),
        contracts.to_string(),
        String::new(),
        harnesses.to_string(),
    ]);
    table
}

fn harnesses_table(metadata: &CovenantMetadata) -> Table {
    let mut table = list_table_new();
    table.set_header(vec!["Harness", "Checks", "Replaces"]);
    for harness in &metadata.proof_harnesses {
        let checks = match &harness.attributes.kind {
            HarnessKind::ProofForContract { target_fn } => target_fn.clone(),
            HarnessKind::Proof => "-".to_string(),
        };
        table.add_row(vec![harness.pretty_name.clone(), checks, harness.verified_stubs().join("\n")]);
    }
    table
}

fn findings_table(findings: &[GlobalFinding]) -> Table {
    let mut table = list_table_new();
    table.set_header(vec!["Function", "Global", "Finding", "Via"]);
    for finding in findings {
        table.add_row(vec![
            finding.function.clone(),
            finding.global.clone(),
            serde_json::to_value(finding.kind)
                .ok()
                .and_then(|kind| kind.as_str().map(str::to_string))
                .unwrap_or_default(),
            finding.via.join(" -> "),
        ]);
    }
    table
}

/// Render the tables of the `list` subcommand.
pub fn pretty(metadata: &CovenantMetadata, globals_only: bool) -> String {
    let mut out = String::new();
    if !globals_only {
        out.push_str("\nContracts:\n");
        if metadata.contracted_functions.is_empty() {
            out.push_str("No contracts or contract harnesses found.\n");
        } else {
            out.push_str(&format!("{}\n", contracts_table(metadata)));
        }
        out.push_str("\nHarnesses (#[covenant::proof] and #[covenant::proof_for_contract]):\n");
        if metadata.proof_harnesses.is_empty() {
            out.push_str("No harnesses found.\n");
        } else {
            out.push_str(&format!("{}\n", harnesses_table(metadata)));
        }
    }
    out.push_str("\nGlobal findings:\n");
    if metadata.global_findings.is_empty() {
        out.push_str("No contracted function reaches an undeclared mutable static.\n");
    } else {
        out.push_str(&format!("{}\n", findings_table(&metadata.global_findings)));
    }
    out
}

/// Entry point of `covenant list` and `covenant globals`.
pub fn list_main(args: &ListArgs, globals_only: bool) -> Result<()> {
    let crate_name = args.crate_name.clone().unwrap_or_else(|| util::crate_name(&args.src));
    let index = SourceIndex::from_path(&args.src, &crate_name)
        .with_context(|| format!("Failed to index the sources under `{}`", args.src.display()))?;
    let findings = globals::analyze(&index);
    let has_findings = !findings.is_empty();
    let mut metadata = metadata(&index, findings);
    if globals_only {
        metadata.contracted_functions.clear();
        metadata.proof_harnesses.clear();
    }
    match args.format {
        ListFormat::Pretty => print!("{}", pretty(&metadata, globals_only)),
        ListFormat::Json => {
            let json = serde_json::to_string_pretty(&metadata).context("Failed to serialize the metadata")?;
            println!("{json}");
        }
    }
    if globals_only && has_findings {
        anyhow::bail!("contracted functions reach undeclared mutable statics");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn index() -> SourceIndex {
        let mut index = SourceIndex { crate_name: "demo".to_string(), ..Default::default() };
        index
            .add_source(
                Path::new("lib.rs"),
                Vec::new(),
                r#"
                static mut TOTAL: u64 = 0;
                #[covenant::requires(b != 0)]
                #[covenant::ensures(|r: &u32| *r <= a)]
                fn divide(a: u32, b: u32) -> u32 { unsafe { TOTAL += 1 }; a / b }
                #[covenant::proof_for_contract(divide)]
                fn check_divide() { divide(covenant::any(), covenant::any()); }
                #[covenant::proof]
                #[covenant::stub_verified(divide)]
                fn use_divide() { divide(4, 2); }
                "#,
            )
            .unwrap();
        index
    }

    #[test]
    fn metadata_links_contracts_to_harnesses() {
        let index = index();
        let metadata = metadata(&index, globals::analyze(&index));
        assert_eq!(metadata.contracted_functions.len(), 1);
        let divide = &metadata.contracted_functions[0];
        assert_eq!(divide.harnesses, vec!["demo::check_divide"]);
        assert_eq!(divide.contracts_count(), 2);
        assert_eq!(metadata.proof_harnesses.len(), 2);
        assert_eq!(metadata.global_findings.len(), 1);
    }

    #[test]
    fn pretty_tables() {
        let index = index();
        let text = pretty(&metadata(&index, globals::analyze(&index)), false);
        assert!(text.contains("demo::divide"));
        assert!(text.contains("demo::use_divide"));
        assert!(text.contains("undeclared_global"));
        let globals_only = pretty(&metadata(&index, Vec::new()), true);
        assert!(!globals_only.contains("Contracts:"));
        assert!(globals_only.contains("No contracted function reaches"));
    }
}
