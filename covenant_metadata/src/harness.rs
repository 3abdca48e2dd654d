// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use serde::{Deserialize, Serialize};

/// We emit this structure for each annotated harness we find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessMetadata {
    /// The fully qualified name of the harness function.
    pub pretty_name: String,
    /// The path to the file this harness was declared within.
    pub original_file: String,
    /// The line in that file where the harness begins.
    pub original_line: u32,
    /// The role the harness attributes declared.
    pub attributes: HarnessAttributes,
}

impl HarnessMetadata {
    /// The name without its module path.
    pub fn short_name(&self) -> &str {
        self.pretty_name.rsplit("::").next().unwrap_or(&self.pretty_name)
    }

    /// The contract this harness checks, if any.
    pub fn check_target(&self) -> Option<&str> {
        match &self.attributes.kind {
            HarnessKind::ProofForContract { target_fn } => Some(target_fn),
            HarnessKind::Proof => None,
        }
    }

    /// The targets whose replacement this harness consumes.
    pub fn verified_stubs(&self) -> &[String] {
        &self.attributes.verified_stubs
    }
}

/// The attributes that decide how a harness is ordered and which variant
/// each contracted call resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessAttributes {
    pub kind: HarnessKind,
    /// Targets replaced by their contract (`#[covenant::stub_verified]`), as written.
    pub verified_stubs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HarnessKind {
    /// An ordinary entry point (`#[covenant::proof]`).
    Proof,
    /// A contract-check entry point (`#[covenant::proof_for_contract]`).
    ProofForContract { target_fn: String },
}

impl HarnessAttributes {
    pub fn is_consumer(&self) -> bool {
        !self.verified_stubs.is_empty()
    }
}
