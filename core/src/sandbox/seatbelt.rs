//! macOS Seatbelt backend: builds a `sandbox-exec -p <policy>` invocation
//! wrapping the original command. A fixed, read-only-by-default base policy
//! is bundled via `include_str!`, with dynamic `file-write*`/`network*`
//! clauses appended on top, computed from the effective config.

use std::path::Path;
use std::path::PathBuf;

use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::NetworkMode;

const BASE_POLICY: &str = include_str!("seatbelt_base_policy.sbpl");

pub(super) fn build_command(
    script: &str,
    effective: &EffectiveSandboxConfig,
    workspace_real: &Path,
    writable_roots: &[PathBuf],
) -> Result<Vec<String>, String> {
    let mut policy = String::from(BASE_POLICY);

    policy.push_str("\n(allow file-write*\n");
    for root in writable_roots {
        policy.push_str(&format!("  (subpath {})\n", quote_sbpl(root)));
    }
    policy.push_str(")\n");

    let denied_hooks = workspace_real.join(".git").join("hooks");
    policy.push_str(&format!(
        "(deny file-write* (subpath {}))\n",
        quote_sbpl(&denied_hooks)
    ));

    policy.push_str(match effective.network_mode {
        NetworkMode::AllowAll => "(allow network*)\n",
        NetworkMode::Deny => "(deny network*)\n(deny network-bind)\n",
    });

    Ok(vec![
        "sandbox-exec".to_string(),
        "-p".to_string(),
        policy,
        "bash".to_string(),
        "-lc".to_string(),
        script.to_string(),
    ])
}

fn quote_sbpl(p: &Path) -> String {
    format!("\"{}\"", p.display().to_string().replace('"', "\\\""))
}
