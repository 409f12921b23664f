use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::FilesystemMode;
use tau_protocol::NetworkMode;

/// A human-readable, one-line summary of an effective sandbox config for CLI
/// output — distinct from `EffectiveSandboxConfig::describe`'s compact
/// `fs=... net=...` form, which is meant for the model, not a terminal.
pub fn summarize_sandbox_config(effective: &EffectiveSandboxConfig) -> String {
    let mut summary = match effective.filesystem_mode {
        FilesystemMode::ReadOnly => "read-only".to_string(),
        FilesystemMode::WorkspaceWrite => "workspace-write".to_string(),
        FilesystemMode::DangerFullAccess => "danger-full-access".to_string(),
    };

    if effective.network_mode == NetworkMode::AllowAll {
        summary.push_str(" (network access enabled)");
    }

    if effective.subagent {
        summary.push_str(" [subagent]");
    }

    summary
}
