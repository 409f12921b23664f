//! The sandbox wrapper — core of this crate: given a command and an
//! effective config, produces a wrapped command string plus environment,
//! and classifies sandbox-caused failures from output. Covers home-symlink
//! handling, stale-artifact cleanup, and `safe_realpath`.

pub mod classify;
pub mod linux;
pub mod seatbelt;

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::OnceLock;

use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::FilesystemMode;

pub use classify::Classification;
pub use classify::FailureKind;
pub use classify::classify_sandbox_failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxType {
    None,
    MacosSeatbelt,
    LinuxSeccomp,
}

pub fn get_platform_sandbox() -> SandboxType {
    if cfg!(target_os = "macos") {
        SandboxType::MacosSeatbelt
    } else if cfg!(target_os = "linux") {
        SandboxType::LinuxSeccomp
    } else {
        SandboxType::None
    }
}

#[derive(Debug, Clone, Default)]
pub struct WrapOutput {
    pub success: bool,
    pub wrapped_command: Option<Vec<String>>,
    pub home: Option<PathBuf>,
    pub error: Option<String>,
}

/// Zero-byte files a prior sandboxed run may have left in the workspace root
/// (e.g. a shell creating an empty rc file under a denied write path before
/// the sandbox aborted the write). Cleaned up best-effort on every wrap.
const STALE_ARTIFACT_NAMES: &[&str] = &[".bash_history", ".python_history", ".node_repl_history"];

/// `safeRealpath`: resolves `p` if it exists; otherwise resolves its parent
/// and re-appends the basename, so sandbox rules can name paths that don't
/// exist yet (a fresh file about to be created under a writable root).
pub fn safe_realpath(p: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(p) {
        return resolved;
    }
    let Some(name) = p.file_name() else {
        return p.to_path_buf();
    };
    let parent = p.parent().unwrap_or_else(|| Path::new("."));
    let resolved_parent = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
    resolved_parent.join(name)
}

/// Pre-creates directories the underlying sandbox backend expects to exist
/// (bind-mount targets on Linux, directories Seatbelt's base policy reads
/// from on macOS) so the wrapped command's first write doesn't fail on a
/// missing parent.
pub fn ensure_support_dirs(home: &Path) -> std::io::Result<()> {
    fs::create_dir_all(home.join(".claude").join("debug"))?;
    fs::create_dir_all(home.join(".npm").join("_logs"))?;
    fs::create_dir_all(std::env::temp_dir().join("claude"))?;
    Ok(())
}

/// Removes any of `STALE_ARTIFACT_NAMES` sitting directly under
/// `workspace_root` with zero bytes. Best-effort: errors are not fatal to
/// the overall wrap.
pub fn cleanup_workspace_artifacts(workspace_root: &Path) -> std::io::Result<()> {
    for name in STALE_ARTIFACT_NAMES {
        let path = workspace_root.join(name);
        match fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => {
                let _ = fs::remove_file(&path);
            }
            _ => {}
        }
    }
    Ok(())
}

/// The process-wide sandbox-library surface a tool call routes its wrap
/// through: tracks the most recently requested effective config and
/// serializes policy transitions against any other in-flight wrap on this
/// process, then delegates the actual wrapping to `wrap`.
pub trait SandboxLibrary: Send + Sync {
    /// Sets the tracked config for the first time in a session.
    fn initialize(&self, effective: EffectiveSandboxConfig);
    /// Records a config change (e.g. a `sandbox set` command, or a clamp
    /// computed for a newly spawned worker).
    fn update_config(&self, effective: EffectiveSandboxConfig);
    /// Clears the tracked config, as if `initialize` had never been called.
    fn reset(&self);
    /// Returns the most recently tracked config, if any.
    fn get_config(&self) -> Option<EffectiveSandboxConfig>;
    /// Wraps `command` under `effective`, updating the tracked config first
    /// so `get_config` always reflects the config of the last wrap attempt.
    fn wrap_with_sandbox(
        &self,
        command: &[String],
        effective: &EffectiveSandboxConfig,
        workspace_root: &Path,
    ) -> WrapOutput;
}

/// The concrete `SandboxLibrary` backing this process: macOS Seatbelt or
/// Linux Landlock+seccomp, selected at wrap time by `get_platform_sandbox`.
#[derive(Default)]
pub struct PlatformSandboxLibrary {
    config: Mutex<Option<EffectiveSandboxConfig>>,
}

impl SandboxLibrary for PlatformSandboxLibrary {
    fn initialize(&self, effective: EffectiveSandboxConfig) {
        self.update_config(effective);
    }

    #[allow(clippy::expect_used)]
    fn update_config(&self, effective: EffectiveSandboxConfig) {
        *self.config.lock().expect("sandbox library lock") = Some(effective);
    }

    #[allow(clippy::expect_used)]
    fn reset(&self) {
        *self.config.lock().expect("sandbox library lock") = None;
    }

    #[allow(clippy::expect_used)]
    fn get_config(&self) -> Option<EffectiveSandboxConfig> {
        *self.config.lock().expect("sandbox library lock")
    }

    fn wrap_with_sandbox(
        &self,
        command: &[String],
        effective: &EffectiveSandboxConfig,
        workspace_root: &Path,
    ) -> WrapOutput {
        self.update_config(*effective);
        wrap(command, effective, workspace_root)
    }
}

static DEFAULT_LIBRARY: OnceLock<PlatformSandboxLibrary> = OnceLock::new();

/// The process-wide `SandboxLibrary` singleton, lazily initialized on first
/// access.
pub fn default_library() -> &'static PlatformSandboxLibrary {
    DEFAULT_LIBRARY.get_or_init(PlatformSandboxLibrary::default)
}

fn writable_roots_for(mode: FilesystemMode, workspace_real: &Path) -> Vec<PathBuf> {
    let tmp = std::env::temp_dir();
    match mode {
        FilesystemMode::ReadOnly => vec![tmp],
        FilesystemMode::WorkspaceWrite => vec![workspace_real.to_path_buf(), tmp],
        FilesystemMode::DangerFullAccess => vec![PathBuf::from("/")],
    }
}

/// `wrap(command, effective, workspace_root)`. The returned
/// command is always `bash -lc <wrappedScript>`-shaped under the hood, built
/// by the platform-specific backend module.
pub fn wrap(
    command: &[String],
    effective: &EffectiveSandboxConfig,
    workspace_root: &Path,
) -> WrapOutput {
    let home = match dirs::home_dir() {
        Some(h) => h,
        None => {
            return WrapOutput {
                success: false,
                error: Some("could not determine home directory".to_string()),
                ..Default::default()
            };
        }
    };

    // process.env["HOME"] is temporarily reassigned around wrap invocation
    // so dotfile mount generation resolves against a real path even when
    // `home` is itself a symlink; the executed child still sees the real
    // HOME via the read-only root bind, so its own dotfile reads succeed.
    let prior_home = std::env::var_os("HOME");
    let home_for_mounts = safe_realpath(&home);
    unsafe {
        std::env::set_var("HOME", &home_for_mounts);
    }
    let restore_home = || {
        if let Some(prior) = &prior_home {
            unsafe { std::env::set_var("HOME", prior) };
        }
    };

    if let Err(e) = ensure_support_dirs(&home_for_mounts) {
        restore_home();
        return WrapOutput {
            success: false,
            home: Some(home),
            error: Some(format!("failed to prepare support directories: {e}")),
            ..Default::default()
        };
    }

    let workspace_real = safe_realpath(workspace_root);
    if let Err(e) = cleanup_workspace_artifacts(&workspace_real) {
        tracing::debug!("cleanup_workspace_artifacts failed (ignored): {e}");
    }

    let writable_roots = writable_roots_for(effective.filesystem_mode, &workspace_real);
    let script = shlex::try_join(command.iter().map(String::as_str))
        .unwrap_or_else(|_| command.join(" "));

    let built = match get_platform_sandbox() {
        SandboxType::MacosSeatbelt => {
            seatbelt::build_command(&script, effective, &workspace_real, &writable_roots)
        }
        SandboxType::LinuxSeccomp => {
            linux::build_command(&script, effective, &workspace_real, &writable_roots)
        }
        SandboxType::None => Err("no sandbox backend is available on this platform".to_string()),
    };

    restore_home();

    match built {
        Ok(wrapped_command) => WrapOutput {
            success: true,
            wrapped_command: Some(wrapped_command),
            home: Some(home),
            error: None,
        },
        Err(error) => WrapOutput {
            success: false,
            wrapped_command: None,
            home: Some(home),
            error: Some(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_realpath_of_nonexistent_path_resolves_parent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-yet-created.txt");
        let resolved = safe_realpath(&missing);
        assert_eq!(resolved.file_name().unwrap(), "not-yet-created.txt");
        assert_eq!(resolved.parent().unwrap(), fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn cleanup_removes_only_zero_byte_known_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".bash_history"), b"").unwrap();
        fs::write(dir.path().join("keep.txt"), b"content").unwrap();
        cleanup_workspace_artifacts(dir.path()).unwrap();
        assert!(!dir.path().join(".bash_history").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn wrap_produces_success_or_explicit_error() {
        let dir = tempfile::tempdir().unwrap();
        let effective = EffectiveSandboxConfig::default();
        let out = wrap(&["echo".to_string(), "hi".to_string()], &effective, dir.path());
        assert!(out.success || out.error.is_some());
    }
}
