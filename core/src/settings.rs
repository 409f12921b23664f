//! Layered JSON settings + the config resolver.
//!
//! Persistence is atomic: a `NamedTempFile` is written alongside the target
//! and renamed into place. The `tau.sandbox` key holds the current schema;
//! a legacy top-level `sandbox` key is accepted on read only.

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value as JsonValue;
use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::SandboxConfig;
use tau_protocol::sandbox::apply_defaults;
use tau_protocol::sandbox::deep_merge;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::error::TauErr;

pub const USER_SETTINGS_RELATIVE_PATH: &str = ".pi/agent/settings.json";
pub const PROJECT_SETTINGS_RELATIVE_PATH: &str = ".pi/settings.json";

/// Resolves the user settings path (`~/.pi/agent/settings.json`).
pub fn user_settings_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        TauErr::Io(std::io::Error::other("could not determine home directory"))
    })?;
    Ok(home.join(USER_SETTINGS_RELATIVE_PATH))
}

/// Resolves the project settings path (`<workspaceRoot>/.pi/settings.json`).
pub fn project_settings_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(PROJECT_SETTINGS_RELATIVE_PATH)
}

/// Reads a settings file and extracts its `SandboxConfig` layer. A missing
/// file is treated as an empty layer; malformed JSON fails with the file
/// path included. Recognises `tau.sandbox`, falling back to a legacy
/// top-level `sandbox` key for back-compat (never written).
pub fn read_sandbox_layer(path: &Path) -> Result<SandboxConfig> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SandboxConfig::default()),
        Err(e) => return Err(TauErr::Io(e)),
    };

    let doc: JsonValue = serde_json::from_str(&raw).map_err(|source| {
        TauErr::Policy(tau_protocol::PolicyError::Malformed {
            path: path.display().to_string(),
            source: std::sync::Arc::new(source),
        })
    })?;

    let sandbox_value = doc
        .get("tau")
        .and_then(|tau| tau.get("sandbox"))
        .or_else(|| doc.get("sandbox"))
        .cloned()
        .unwrap_or(JsonValue::Null);

    Ok(SandboxConfig::decode(&sandbox_value, &path.display().to_string())?)
}

/// Writes an updated `tau.sandbox` object into the settings file at `path`,
/// deep-merging `patch` into whatever already lives there, preserving all
/// other top-level keys untouched. Persistence is atomic: write to a temp
/// file in the same directory, then rename over the target.
pub fn persist_sandbox_patch(path: &Path, patch: &SandboxConfig) -> Result<()> {
    let mut doc: JsonValue = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).map_err(|source| {
            TauErr::Policy(tau_protocol::PolicyError::Malformed {
                path: path.display().to_string(),
                source: std::sync::Arc::new(source),
            })
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => JsonValue::Object(Default::default()),
        Err(e) => return Err(TauErr::Io(e)),
    };

    let existing = read_sandbox_layer(path).unwrap_or_default();
    let merged = deep_merge(&existing, patch);
    let merged_value = serde_json::to_value(&merged)?;

    if let Some(obj) = doc.as_object_mut() {
        let tau_entry = obj
            .entry("tau".to_string())
            .or_insert_with(|| JsonValue::Object(Default::default()));
        if let Some(tau_obj) = tau_entry.as_object_mut() {
            tau_obj.insert("sandbox".to_string(), merged_value);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
    tmp.persist(path).map_err(|e| TauErr::Io(e.error))?;
    Ok(())
}

/// `ensureUserDefaults()` — idempotent; writes any *missing* field into the
/// user settings file without touching fields already present. A second
/// call is a no-op.
pub fn ensure_user_defaults() -> Result<()> {
    let path = user_settings_path()?;
    let existing = read_sandbox_layer(&path)?;
    if !existing.is_empty() {
        // At least one field already set; only fill the gaps.
        let defaults = apply_defaults(&SandboxConfig::default());
        let filled = SandboxConfig {
            filesystem_mode: existing.filesystem_mode.or(Some(defaults.filesystem_mode)),
            network_mode: existing.network_mode.or(Some(defaults.network_mode)),
            approval_policy: existing.approval_policy.or(Some(defaults.approval_policy)),
            approval_timeout_seconds: existing
                .approval_timeout_seconds
                .or(Some(defaults.approval_timeout_seconds)),
            subagent: existing.subagent.or(Some(defaults.subagent)),
        };
        if filled == existing {
            return Ok(());
        }
        return persist_sandbox_patch(&path, &filled);
    }

    let defaults = apply_defaults(&SandboxConfig::default());
    let full = SandboxConfig {
        filesystem_mode: Some(defaults.filesystem_mode),
        network_mode: Some(defaults.network_mode),
        approval_policy: Some(defaults.approval_policy),
        approval_timeout_seconds: Some(defaults.approval_timeout_seconds),
        subagent: Some(defaults.subagent),
    };
    persist_sandbox_patch(&path, &full)
}

pub fn persist_user_config_patch(patch: &SandboxConfig) -> Result<()> {
    persist_sandbox_patch(&user_settings_path()?, patch)
}

pub fn persist_project_config_patch(workspace_root: &Path, patch: &SandboxConfig) -> Result<()> {
    persist_sandbox_patch(&project_settings_path(workspace_root), patch)
}

/// Inputs to `computeEffectiveConfig` beyond the on-disk layers.
#[derive(Debug, Clone, Default)]
pub struct ResolveInputs {
    pub workspace_root: PathBuf,
    pub session_override: SandboxConfig,
    pub cli_override: SandboxConfig,
}

/// `computeEffectiveConfig` — merges user < project < session < cli, then
/// applies defaults. Missing files are empty layers; malformed JSON or an
/// invalid enum value fails the call (never silently corrected).
pub fn compute_effective_config(inputs: &ResolveInputs) -> Result<EffectiveSandboxConfig> {
    let user_layer = read_sandbox_layer(&user_settings_path()?)?;
    let project_layer = read_sandbox_layer(&project_settings_path(&inputs.workspace_root))?;

    let merged = deep_merge(&user_layer, &project_layer);
    let merged = deep_merge(&merged, &inputs.session_override);
    let merged = deep_merge(&merged, &inputs.cli_override);

    Ok(apply_defaults(&merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tau_protocol::FilesystemMode;
    use tau_protocol::NetworkMode;

    #[test]
    fn missing_files_resolve_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = ResolveInputs {
            workspace_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        // Point HOME at an empty temp dir so the user layer is also empty.
        let prior_home = std::env::var_os("HOME");
        unsafe { std::env::set_var("HOME", dir.path()) };
        let eff = compute_effective_config(&inputs).unwrap();
        if let Some(home) = prior_home {
            unsafe { std::env::set_var("HOME", home) };
        }
        assert_eq!(eff.filesystem_mode, FilesystemMode::WorkspaceWrite);
        assert_eq!(eff.network_mode, NetworkMode::Deny);
    }

    #[test]
    fn precedence_session_beats_project_beats_user() {
        let dir = tempfile::tempdir().unwrap();
        let project_path = project_settings_path(dir.path());
        fs::create_dir_all(project_path.parent().unwrap()).unwrap();
        fs::write(
            &project_path,
            r#"{"tau":{"sandbox":{"filesystemMode":"read-only"}}}"#,
        )
        .unwrap();

        let inputs = ResolveInputs {
            workspace_root: dir.path().to_path_buf(),
            session_override: SandboxConfig {
                filesystem_mode: Some(FilesystemMode::DangerFullAccess),
                ..Default::default()
            },
            ..Default::default()
        };
        let prior_home = std::env::var_os("HOME");
        unsafe { std::env::set_var("HOME", dir.path()) };
        let eff = compute_effective_config(&inputs).unwrap();
        if let Some(home) = prior_home {
            unsafe { std::env::set_var("HOME", home) };
        }
        assert_eq!(eff.filesystem_mode, FilesystemMode::DangerFullAccess);
    }

    #[test]
    fn malformed_json_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_sandbox_layer(&path).unwrap_err();
        match err {
            TauErr::Policy(tau_protocol::PolicyError::Malformed { path: p, .. }) => {
                assert_eq!(p, path.display().to_string());
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn ensure_user_defaults_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let prior_home = std::env::var_os("HOME");
        unsafe { std::env::set_var("HOME", dir.path()) };
        ensure_user_defaults().unwrap();
        let path = user_settings_path().unwrap();
        let after_first = fs::read_to_string(&path).unwrap();
        ensure_user_defaults().unwrap();
        let after_second = fs::read_to_string(&path).unwrap();
        if let Some(home) = prior_home {
            unsafe { std::env::set_var("HOME", home) };
        }
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn legacy_top_level_sandbox_key_accepted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"sandbox":{"networkMode":"allow-all"}}"#).unwrap();
        let layer = read_sandbox_layer(&path).unwrap();
        assert_eq!(layer.network_mode, Some(NetworkMode::AllowAll));
    }
}
