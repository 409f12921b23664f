//! The "arg0 trick": `tau` is deployed as a single executable, but the Linux
//! sandbox backend needs a separate process to re-exec into after installing
//! Landlock/seccomp rules on itself. Rather than shipping a second binary,
//! `tau`'s install hard-links (or is invoked under) the alias
//! `tau-linux-sandbox`; this dispatches on argv[0] to tell the two apart.

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;

/// When the current executable is invoked through the hard-link or alias
/// named `tau-linux-sandbox` we *directly* execute
/// [`tau_linux_sandbox::run_main`] (which never returns). Otherwise we:
///
/// 1. Load `.env` files (before any threads exist, since this mutates the
///    environment).
/// 2. Construct a Tokio multi-thread runtime.
/// 3. Derive the path to the current executable (so children can re-invoke
///    the sandbox) when running on Linux.
/// 4. Execute the provided async `main_fn` inside that runtime, forwarding
///    any error. `main_fn` receives the resolved `tau-linux-sandbox` path as
///    `Option<PathBuf>`, which a `BashTool`'s sandbox wrapper needs on Linux.
///
/// This function wraps the `main()` of the `tau` binary crate.
pub fn arg0_dispatch_or_else<F, Fut>(main_fn: F) -> anyhow::Result<()>
where
    F: FnOnce(Option<PathBuf>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let argv0 = std::env::args().next().unwrap_or_default();
    let exe_name = Path::new(&argv0).file_name().and_then(|s| s.to_str()).unwrap_or("");

    if exe_name == "tau-linux-sandbox" {
        // Safety: `run_main` never returns.
        tau_linux_sandbox::run_main();
    }

    // This modifies the environment, which is not thread-safe, so do this
    // before creating any threads/the Tokio runtime.
    load_dotenv();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let linux_sandbox_exe: Option<PathBuf> =
            if cfg!(target_os = "linux") { std::env::current_exe().ok() } else { None };

        main_fn(linux_sandbox_exe).await
    })
}

/// Loads env vars from `~/.pi/agent/.env` and `$(pwd)/.env`, in that order
/// (later loads never override earlier ones, per `dotenvy`'s default).
fn load_dotenv() {
    if let Ok(settings_path) = tau_core::settings::user_settings_path() {
        if let Some(settings_dir) = settings_path.parent() {
            dotenvy::from_path(settings_dir.join(".env")).ok();
        }
    }
    dotenvy::dotenv().ok();
}
