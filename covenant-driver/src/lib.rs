// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Run covenant harnesses in dependency order and report on them.
//!
//! Harnesses are linked into a test binary together with the code under
//! verification, so the entry point is a [`Session`] built in a test:
//!
//! ```ignore
//! use covenant_driver::{Session, VerifyArgs};
//!
//! #[test]
//! fn verify() -> anyhow::Result<()> {
//!     let report = Session::new(VerifyArgs::default())
//!         .harness(check_divide)
//!         .harness(use_divide)
//!         .run()?;
//!     assert!(report.all_passed());
//!     Ok(())
//! }
//! ```
//!
//! A contract is replaced only in stages after the stage that checked it. The
//! `covenant` binary offers the source-level commands: listing contracts and
//! harnesses, and the global reachability pass.

pub mod args;
pub mod dispatcher;
pub mod globals;
pub mod list;
pub mod report;
mod runner;
pub mod scan;
mod session;
pub mod util;

pub use args::{OutputFormat, VerifyArgs};
pub use dispatcher::{DispatchError, Plan};
pub use scan::AnalysisError;
pub use session::{ARGS_ENV_VAR, LOG_ENV_VAR, Session};
