// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::SourceLocation;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, VariantNames};

/// The kind of obligation a property discharges.
///
/// Frame conditions are kept apart from postconditions so that "behavior
/// wrong" and "footprint too narrow" are reported differently.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    AsRefStr,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PropertyClass {
    /// A user `covenant::assert`.
    Assertion,
    /// A precondition asserted at a replaced call site.
    Precondition,
    /// A postcondition asserted after the real body ran.
    Postcondition,
    /// A write or deallocation outside the declared footprint.
    FrameCondition,
    /// A panic raised while exploring a path.
    Panic,
    /// A check harness never reached the function it targets.
    ContractTarget,
    /// A clause that could not be honored, found before exploration.
    Specification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Success,
    Failure,
}

/// One property and its outcome over all explored paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub class: PropertyClass,
    /// The function the property belongs to, when known.
    pub fn_name: Option<String>,
    pub id: u32,
    pub description: String,
    pub location: Option<SourceLocation>,
    pub status: CheckStatus,
    /// The first path on which the property failed, for replay with the same seed.
    pub failing_path: Option<u64>,
}

impl Property {
    /// `<function>.<class>.<id>`, or `<class>.<id>` without a function.
    pub fn property_name(&self) -> String {
        let class = &self.class;
        let id = self.id;
        match &self.fn_name {
            Some(fn_name) => format!("{fn_name}.{class}.{id}"),
            None => format!("{class}.{id}"),
        }
    }

    pub fn failed(&self) -> bool {
        self.status == CheckStatus::Failure
    }

    pub fn is_frame_condition(&self) -> bool {
        self.class == PropertyClass::FrameCondition
    }
}
