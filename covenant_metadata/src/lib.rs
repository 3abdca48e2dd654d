// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data shared between the covenant runtime, its driver and external tooling.
//!
//! Everything here is plain data: the runtime records property outcomes with
//! these types, the driver aggregates them into a [`VerificationReport`], and
//! both can be exported as JSON.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub use harness::*;
pub use property::*;
pub use report::*;
pub use target::{normalize_path, strip_generics, target_matches, targets_overlap};

mod harness;
mod property;
mod report;
mod target;

/// The structure of the metadata exported for a crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CovenantMetadata {
    /// The crate (or source root) this metadata was extracted from.
    pub crate_name: String,
    /// The harnesses (`#[covenant::proof]` and `#[covenant::proof_for_contract]`).
    pub proof_harnesses: Vec<HarnessMetadata>,
    /// The functions with contracts.
    pub contracted_functions: Vec<ContractedFunction>,
    /// Mutable statics reached by contracted functions without being declared.
    pub global_findings: Vec<GlobalFinding>,
}

/// A function annotated with at least one contract clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractedFunction {
    /// The fully qualified name of the function.
    pub pretty_name: String,
    /// The path to the file this function was declared within.
    pub original_file: String,
    pub original_line: u32,
    pub requires: Vec<String>,
    pub ensures: Vec<String>,
    /// The frame-condition place ranges the function claims, as written.
    pub modifies: Vec<String>,
    pub frees: Vec<String>,
    /// The pretty names of the harnesses that check this contract.
    pub harnesses: Vec<String>,
}

impl ContractedFunction {
    /// The number of clauses attached to this function.
    pub fn contracts_count(&self) -> usize {
        self.requires.len() + self.ensures.len() + self.modifies.len() + self.frees.len()
    }

    /// Whether the write footprint is declared rather than inferred.
    pub fn has_explicit_footprint(&self) -> bool {
        !self.modifies.is_empty()
    }
}

/// A location in a source file.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// How a contracted function reaches a mutable static it did not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// No `modifies` clause exists, so the global cannot be havocked on replacement.
    UndeclaredGlobal,
    /// A `modifies` clause exists but does not list the global.
    FrameViolation,
}

/// A finding of the source-level global reachability pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalFinding {
    /// The contracted function.
    pub function: String,
    /// The mutable static it transitively reaches.
    pub global: String,
    pub kind: FindingKind,
    /// The chain of calls from `function` to the function touching `global`.
    pub via: Vec<String>,
    pub location: Option<SourceLocation>,
}

impl Display for GlobalFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            FindingKind::UndeclaredGlobal => {
                "reaches mutable static without a `modifies` clause declaring it"
            }
            FindingKind::FrameViolation => "writes mutable static outside its declared footprint",
        };
        write!(f, "`{}` {what} `{}`", self.function, self.global)?;
        if self.via.len() > 1 {
            write!(f, " (via {})", self.via.join(" -> "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_display_mentions_call_chain() {
        let finding = GlobalFinding {
            function: "app::bump".into(),
            global: "app::COUNTER".into(),
            kind: FindingKind::UndeclaredGlobal,
            via: vec!["app::bump".into(), "app::inner".into()],
            location: None,
        };
        let text = finding.to_string();
        assert!(text.contains("without a `modifies` clause"));
        assert!(text.ends_with("(via app::bump -> app::inner)"));
    }

    #[test]
    fn metadata_serializes_findings() {
        let metadata = CovenantMetadata {
            crate_name: "demo".into(),
            global_findings: vec![GlobalFinding {
                function: "demo::f".into(),
                global: "demo::G".into(),
                kind: FindingKind::FrameViolation,
                via: vec![],
                location: None,
            }],
            ..Default::default()
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"kind\":\"frame_violation\""));
    }
}
