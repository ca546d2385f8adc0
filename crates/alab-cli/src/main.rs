//! # alab CLI
//!
//! Command-line front end for installing and inspecting registry apps.
//!
//! Every operation goes through the public `alab-core` API. Run
//! `alab --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
