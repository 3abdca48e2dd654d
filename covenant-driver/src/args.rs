// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Command line arguments of the driver.
//!
//! Verification runs inside a test binary, so [`VerifyArgs`] is parsed from
//! `COVENANT_ARGS` by the session rather than from the process arguments. The
//! `covenant` binary only exposes the source-level commands ([`CovenantArgs`]).

use clap::error::{Error, ErrorKind};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Trait used to perform extra validation after parsing.
pub trait ValidateArgs {
    /// Perform post-parsing validation but do not abort.
    fn validate(&self) -> Result<(), Error>;
}

/// Validate a set of arguments and ensure they are in a valid state.
/// This method will abort execution with a user friendly error message if the state is invalid.
pub fn check_is_valid<T>(command: &T)
where
    T: clap::Parser + ValidateArgs,
{
    if let Err(error) = command.validate() {
        error.format(&mut T::command()).exit()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    /// Every property of every harness, then a summary.
    Regular,
    /// One line per harness.
    Terse,
    /// The serialized report.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LogFormat {
    /// Indented spans on stdout.
    Hier,
    Json,
}

/// Options of a verification session.
#[derive(Debug, Clone, Parser)]
#[command(name = "covenant", about = "Verify covenant harnesses")]
pub struct VerifyArgs {
    /// Number of paths explored per harness
    #[arg(long, default_value_t = 256)]
    pub paths: u64,
    /// Seed every path seed is derived from
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Number of harnesses verified in parallel. Defaults to the number of cores.
    #[arg(long, short)]
    pub jobs: Option<usize>,
    /// Candidate outcomes a replaced call draws before its path is pruned
    #[arg(long, default_value_t = 64)]
    pub replace_attempts: u32,
    /// Values `any_where` draws before its path is pruned
    #[arg(long, default_value_t = 64)]
    pub draw_attempts: u32,
    /// Percentage of values drawn from the boundaries of their type
    #[arg(long, default_value_t = 20)]
    pub edge_percent: u32,
    /// If specified, only run harnesses that match this filter. This option can be provided
    /// multiple times. Selecting harnesses skips dependency ordering.
    #[arg(long = "harness", num_args(1), value_name = "HARNESS_FILTER")]
    pub harnesses: Vec<String>,
    /// Only run harnesses whose name is exactly one of the filters
    #[arg(long, requires("harnesses"))]
    pub exact: bool,
    /// Toggle between different styles of output
    #[arg(long, default_value = "regular", ignore_case = true, value_enum)]
    pub output_format: OutputFormat,
    #[arg(long, default_value = "hier", ignore_case = true, value_enum)]
    pub log_format: LogFormat,
    /// Source root for the global reachability pass. Defaults to the sources declaring the harnesses
    #[arg(long)]
    pub src: Option<PathBuf>,
    /// Crate name used to qualify items found under `--src`
    #[arg(long)]
    pub crate_name: Option<String>,
    /// Stop at the first failing harness
    #[arg(long)]
    pub fail_fast: bool,
    /// Produces no output, just the report
    #[arg(long, short)]
    pub quiet: bool,
    /// Write the metadata of the verified crate to this file as JSON
    #[arg(long)]
    pub metadata: Option<PathBuf>,
}

impl Default for VerifyArgs {
    fn default() -> Self {
        VerifyArgs::parse_from(["covenant"])
    }
}

impl VerifyArgs {
    /// Number of threads of the harness pool; `None` lets rayon decide.
    pub fn jobs(&self) -> Option<usize> {
        self.jobs
    }

    pub fn selects_harnesses(&self) -> bool {
        !self.harnesses.is_empty()
    }

    /// Whether the harness named `pretty_name` (short name `short_name`) passes the filters.
    pub fn is_selected(&self, pretty_name: &str, short_name: &str) -> bool {
        if self.harnesses.is_empty() {
            return true;
        }
        self.harnesses.iter().any(|filter| {
            if self.exact {
                pretty_name == filter || short_name == filter
            } else {
                pretty_name.contains(filter.as_str())
            }
        })
    }
}

impl ValidateArgs for VerifyArgs {
    fn validate(&self) -> Result<(), Error> {
        if self.paths == 0 {
            return Err(Error::raw(ErrorKind::ValueValidation, "`--paths` must be at least 1"));
        }
        if self.jobs == Some(0) {
            return Err(Error::raw(ErrorKind::ValueValidation, "`--jobs` must be at least 1"));
        }
        if self.replace_attempts == 0 || self.draw_attempts == 0 {
            return Err(Error::raw(
                ErrorKind::ValueValidation,
                "`--replace-attempts` and `--draw-attempts` must be at least 1",
            ));
        }
        if self.edge_percent > 100 {
            return Err(Error::raw(
                ErrorKind::ValueValidation,
                format!("`--edge-percent` is a percentage, found {}", self.edge_percent),
            ));
        }
        if self.crate_name.is_some() && self.src.is_none() {
            return Err(Error::raw(
                ErrorKind::ArgumentConflict,
                "`--crate-name` only applies to the sources given with `--src`",
            ));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ListFormat {
    Pretty,
    Json,
}

/// Source-level inspection of a crate annotated with covenant attributes.
#[derive(Debug, Parser)]
#[command(name = "covenant", version, about)]
pub struct CovenantArgs {
    #[command(subcommand)]
    pub command: CovenantSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum CovenantSubcommand {
    /// List contracts, harnesses and global findings
    List(ListArgs),
    /// Only run the global reachability pass
    Globals(ListArgs),
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Source root: a `src` directory or a single file
    #[arg(default_value = "src")]
    pub src: PathBuf,
    /// Crate name used to qualify items. Defaults to the name of the source root's package.
    #[arg(long)]
    pub crate_name: Option<String>,
    /// Output format
    #[arg(long, default_value = "pretty", ignore_case = true, value_enum)]
    pub format: ListFormat,
}

impl ValidateArgs for CovenantArgs {
    fn validate(&self) -> Result<(), Error> {
        let (CovenantSubcommand::List(args) | CovenantSubcommand::Globals(args)) = &self.command;
        if !args.src.exists() {
            return Err(Error::raw(
                ErrorKind::ValueValidation,
                format!("source root `{}` does not exist", args.src.display()),
            ));
        }
        Ok(())
    }
}
