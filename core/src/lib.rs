//! Root of the `tau-core` library: the sandboxed-execution and worker-agent
//! runtime behind the `tau` CLI.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the appropriate abstraction (e.g.,
// the CLI or the tracing stack).
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agent;
pub mod approval;
pub mod bash_tool;
pub mod error;
pub mod notifier;
pub mod safe_command;
pub mod sandbox;
pub mod session;
pub mod settings;

pub use error::Result;
pub use error::TauErr;
pub use sandbox::get_platform_sandbox;
