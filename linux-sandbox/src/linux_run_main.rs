use std::ffi::CString;
use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

use tau_core::sandbox::linux::current_thread::install_filesystem_landlock_rules_on_current_thread;
use tau_core::sandbox::linux::current_thread::install_network_seccomp_filter_on_current_thread;

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum NetworkArg {
    AllowAll,
    Deny,
}

/// Mirrors the argv `tau_core::sandbox::linux::build_command` emits:
/// `tau-linux-sandbox --writable-root <p>... --denied-root <p> --network <mode> -- <command...>`.
#[derive(Debug, Parser)]
#[command(name = "tau-linux-sandbox")]
struct Args {
    #[arg(long = "writable-root")]
    writable_root: Vec<PathBuf>,

    #[arg(long = "denied-root")]
    denied_root: Vec<PathBuf>,

    #[arg(long = "network")]
    network: NetworkArg,

    /// Everything after `--`: the real command to `execvp`.
    #[arg(last = true)]
    command: Vec<String>,
}

pub fn run_main() -> ! {
    let Args { writable_root, denied_root, network, command } = Args::parse();

    if let Err(e) = install_filesystem_landlock_rules_on_current_thread(&writable_root, &denied_root) {
        panic!("failed to install landlock rules: {e}");
    }

    let network_allow_all = matches!(network, NetworkArg::AllowAll);
    if let Err(e) = install_network_seccomp_filter_on_current_thread(network_allow_all) {
        panic!("failed to install seccomp filter: {e}");
    }

    if command.is_empty() {
        panic!("no command specified to execute");
    }

    #[expect(clippy::expect_used)]
    let c_command = CString::new(command[0].as_str()).expect("command contains a NUL byte");
    #[expect(clippy::expect_used)]
    let c_args: Vec<CString> = command
        .iter()
        .map(|arg| CString::new(arg.as_str()).expect("argument contains a NUL byte"))
        .collect();

    let mut c_args_ptrs: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    c_args_ptrs.push(std::ptr::null());

    unsafe {
        libc::execvp(c_command.as_ptr(), c_args_ptrs.as_ptr());
    }

    let err = std::io::Error::last_os_error();
    panic!("execvp {} failed: {err}", command[0].as_str());
}
