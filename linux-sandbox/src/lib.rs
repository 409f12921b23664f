//! The `tau-linux-sandbox` re-exec helper: parses the argv
//! `tau_core::sandbox::linux::build_command` produces and applies Landlock
//! filesystem rules plus a seccomp network filter to itself before
//! `execvp`-ing the wrapped command.

#[cfg(target_os = "linux")]
mod linux_run_main;

#[cfg(target_os = "linux")]
pub use linux_run_main::run_main;

#[cfg(not(target_os = "linux"))]
pub fn run_main() -> ! {
    panic!("tau-linux-sandbox is only supported on Linux");
}
