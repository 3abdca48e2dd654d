// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics and small helpers shared by the driver.
//!
//! The `warning` and `error` functions must be used for diagnostic output
//! meant for users; everything else goes through `tracing`.

use std::path::Path;

/// Generate a valid crate name from a source root.
///
/// `demo/src` and `demo/src/lib.rs` both name the crate `demo`; a lone file
/// names it after its stem.
pub fn crate_name(path: &Path) -> String {
    let named = match path.file_name().and_then(|name| name.to_str()) {
        Some("src" | "lib.rs" | "main.rs") => {
            let package = if path.is_dir() { path.parent() } else { path.parent().and_then(Path::parent) };
            package.and_then(Path::file_name)
        }
        _ => path.file_stem(),
    };
    let name = named.map(|name| name.to_string_lossy().into_owned()).unwrap_or_else(|| "crate".to_string());
    name.replace(['-', '.'], "_")
}

/// Print a warning message. This will add a "warning:" tag before the message and style accordingly.
pub fn warning(msg: &str) {
    let warning = console::style("warning:").bold().yellow();
    let msg_fmt = console::style(msg).bold();
    println!("{warning} {msg_fmt}")
}

/// Print an error message. This will add an "error:" tag before the message and style accordingly.
pub fn error(msg: &str) {
    let error = console::style("error:").bold().red();
    let msg_fmt = console::style(msg).bold();
    println!("{error} {msg_fmt}")
}
