//! Subcommands of the `bootgraph` binary.

mod boot_cmd;
mod trace_cmd;

pub use boot_cmd::*;
pub use trace_cmd::*;
