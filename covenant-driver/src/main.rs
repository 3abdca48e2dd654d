// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::process::ExitCode;

use clap::Parser;
use covenant_driver::args::{CovenantArgs, CovenantSubcommand, check_is_valid};
use covenant_driver::{list, util};
use tracing::debug;

/// The main function for the `covenant` command.
fn main() -> ExitCode {
    let args = CovenantArgs::parse();
    check_is_valid(&args);
    let result = match &args.command {
        CovenantSubcommand::List(list_args) => list::list_main(list_args, false),
        CovenantSubcommand::Globals(list_args) => list::list_main(list_args, true),
    };

    if let Err(error) = result {
        // Print the whole chain of contexts.
        debug!(?error, "main_failure");
        util::error(&format!("{error:#}"));
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
