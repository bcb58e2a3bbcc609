//! Command-line interface definitions for the `flotilla` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Positional command line: provider, identity, credential, group, action,
/// and an optional action argument.
#[derive(Debug, Parser)]
#[command(
    name = "flotilla",
    about = "Create, script, power-cycle, and destroy groups of cloud nodes",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Provider identifier (`scaleway` or `stub`).
    pub(crate) provider: String,
    /// Account identity, for example the Scaleway project id.
    pub(crate) identity: String,
    /// Provider credential; for key-file providers, a path whose contents
    /// become the credential.
    pub(crate) credential: String,
    /// Node group the action applies to.
    pub(crate) group: String,
    /// Action: add, run, exec, poweroff (turnoff), poweron (turnon),
    /// destroy, listimages, or listnodes.
    pub(crate) action: String,
    /// Script file for run/poweroff/poweron, or the quoted command for exec.
    #[arg(allow_hyphen_values = true)]
    pub(crate) argument: Option<String>,
}
