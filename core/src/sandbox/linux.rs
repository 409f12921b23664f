//! Linux sandbox backend: Landlock filesystem rules + a seccomp network
//! filter, installed on the current thread before `execvp`-ing the wrapped
//! command.
//!
//! `build_command` lives here so `wrap()` can compute the argv for the
//! `tau-linux-sandbox` re-exec helper, which is the process that actually
//! calls `current_thread::install_*` on itself (Landlock/seccomp apply to
//! the calling thread, so they must run in the child, not here).

use std::path::Path;
use std::path::PathBuf;

use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::NetworkMode;

pub(super) fn build_command(
    script: &str,
    effective: &EffectiveSandboxConfig,
    workspace_real: &Path,
    writable_roots: &[PathBuf],
) -> Result<Vec<String>, String> {
    let mut argv = vec!["tau-linux-sandbox".to_string()];

    for root in writable_roots {
        argv.push("--writable-root".to_string());
        argv.push(root.display().to_string());
    }

    let denied_hooks = workspace_real.join(".git").join("hooks");
    argv.push("--denied-root".to_string());
    argv.push(denied_hooks.display().to_string());

    argv.push("--network".to_string());
    argv.push(
        match effective.network_mode {
            NetworkMode::AllowAll => "allow-all",
            NetworkMode::Deny => "deny",
        }
        .to_string(),
    );

    argv.push("--".to_string());
    argv.push("bash".to_string());
    argv.push("-lc".to_string());
    argv.push(script.to_string());
    Ok(argv)
}

/// Rule installation, run by the `tau-linux-sandbox` re-exec helper on
/// itself, immediately before `execvp`. Shared here so both that binary and
/// this crate's tests exercise the identical logic.
#[cfg(target_os = "linux")]
pub mod current_thread {
    use std::path::Path;
    use std::path::PathBuf;

    use landlock::ABI;
    use landlock::Access;
    use landlock::AccessFs;
    use landlock::CompatLevel;
    use landlock::Compatible;
    use landlock::RulesetAttr;
    use landlock::RulesetCreatedAttr;
    use landlock::RulesetStatus;
    use landlock::path_beneath_rules;

    use crate::error::Result;
    use crate::error::SandboxErr;

    const LANDLOCK_ABI: ABI = ABI::V5;

    /// Restricts the calling thread to read-everywhere, write only under
    /// `writable_roots`, with `denied_roots` excluded even when they sit
    /// inside a writable root (e.g. `<workspace>/.git/hooks`).
    pub fn install_filesystem_landlock_rules_on_current_thread(
        writable_roots: &[PathBuf],
        denied_roots: &[PathBuf],
    ) -> Result<()> {
        let access_rw = AccessFs::from_all(LANDLOCK_ABI);
        let access_ro = AccessFs::from_read(LANDLOCK_ABI);

        let effective_writable: Vec<&PathBuf> = writable_roots
            .iter()
            .filter(|root| !denied_roots.iter().any(|d| d == *root || root.starts_with(d)))
            .collect();

        let ruleset = landlock::Ruleset::default()
            .set_compatibility(CompatLevel::BestEffort)
            .handle_access(access_rw)?
            .create()?
            .add_rules(path_beneath_rules(["/"], access_ro))?
            .add_rules(path_beneath_rules(effective_writable, access_rw))?;

        let status = ruleset.restrict_self()?;
        if status.ruleset == RulesetStatus::NotEnforced {
            return Err(SandboxErr::LandlockRestrict.into());
        }
        Ok(())
    }

    #[cfg(target_arch = "x86_64")]
    const TARGET_ARCH: seccompiler::TargetArch = seccompiler::TargetArch::x86_64;
    #[cfg(target_arch = "aarch64")]
    const TARGET_ARCH: seccompiler::TargetArch = seccompiler::TargetArch::aarch64;

    /// Installs a seccomp filter on the current thread denying outbound
    /// network syscalls with EPERM. A no-op under `allow-all`.
    pub fn install_network_seccomp_filter_on_current_thread(network_allow_all: bool) -> Result<()> {
        if network_allow_all {
            return Ok(());
        }

        use std::collections::BTreeMap;
        use std::convert::TryInto;

        use seccompiler::BpfProgram;
        use seccompiler::SeccompAction;
        use seccompiler::SeccompFilter;

        let mut rules: BTreeMap<i64, Vec<seccompiler::SeccompRule>> = BTreeMap::new();
        for syscall in [libc::SYS_connect, libc::SYS_socket, libc::SYS_bind] {
            rules.insert(syscall, vec![]);
        }

        let filter = SeccompFilter::new(
            rules,
            SeccompAction::Allow,
            SeccompAction::Errno(libc::EPERM as u32),
            TARGET_ARCH,
        )
        .map_err(SandboxErr::SeccompBackend)?;

        let program: BpfProgram = filter.try_into().map_err(SandboxErr::SeccompInstall)?;
        seccompiler::apply_filter(&program).map_err(SandboxErr::SeccompInstall)?;
        Ok(())
    }

    pub fn resolve_workspace_fd_safe(p: &Path) -> Option<PathBuf> {
        p.canonicalize().ok()
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn build_command_includes_denied_git_hooks() {
        let effective = EffectiveSandboxConfig::default();
        let ws = PathBuf::from("/home/me/project");
        let cmd = build_command("echo hi", &effective, &ws, &[ws.clone()]).unwrap();
        assert!(cmd.iter().any(|a| a.contains(".git/hooks")));
        assert_eq!(cmd[0], "tau-linux-sandbox");
    }
}
