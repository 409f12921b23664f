//! The sandbox policy algebra: types, defaults, and layered merge.
//!
//! `SandboxConfig` is flat and JSON-layered rather than a closed
//! struct-of-permissions: every field is independently optional in a layer
//! and deep-merges across layers, which is what the config resolver needs.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;
use strum_macros::Display;
use strum_macros::EnumString;
use ts_rs::TS;

use crate::error::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, TS)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FilesystemMode {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, TS)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkMode {
    Deny,
    AllowAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, TS)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApprovalPolicy {
    Never,
    OnFailure,
    OnRequest,
    UnlessTrusted,
}

/// A `SandboxConfig` as it appears in any single layer (user settings,
/// project settings, session override, CLI override): every field optional,
/// missing means "defer to the next layer down."
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_mode: Option<FilesystemMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<NetworkMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_policy: Option<ApprovalPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent: Option<bool>,
}

impl SandboxConfig {
    pub fn is_empty(&self) -> bool {
        self.filesystem_mode.is_none()
            && self.network_mode.is_none()
            && self.approval_policy.is_none()
            && self.approval_timeout_seconds.is_none()
            && self.subagent.is_none()
    }

    /// Decode a layer from a raw JSON object, rejecting unknown enum values
    /// and non-positive timeouts rather than silently correcting them.
    /// `source_path` names the origin (a file path or "<cli>"/"<session>")
    /// so errors can point at the offending source.
    pub fn decode(value: &JsonValue, source_path: &str) -> Result<Self, PolicyError> {
        let obj = match value {
            JsonValue::Object(map) => map,
            JsonValue::Null => return Ok(Self::default()),
            other => {
                return Err(PolicyError::WrongType {
                    path: source_path.to_string(),
                    expected: "object",
                    found: type_name(other).to_string(),
                });
            }
        };

        let mut cfg = Self::default();
        for (key, val) in obj {
            match key.as_str() {
                "filesystemMode" => {
                    cfg.filesystem_mode = Some(decode_enum(val, source_path, "filesystemMode")?);
                }
                "networkMode" => {
                    cfg.network_mode = Some(decode_enum(val, source_path, "networkMode")?);
                }
                "approvalPolicy" => {
                    cfg.approval_policy = Some(decode_enum(val, source_path, "approvalPolicy")?);
                }
                "approvalTimeoutSeconds" => {
                    let n = val.as_i64().ok_or_else(|| PolicyError::WrongType {
                        path: format!("{source_path}#approvalTimeoutSeconds"),
                        expected: "positive integer",
                        found: type_name(val).to_string(),
                    })?;
                    if n <= 0 {
                        return Err(PolicyError::NonPositiveTimeout {
                            path: format!("{source_path}#approvalTimeoutSeconds"),
                            value: n,
                        });
                    }
                    cfg.approval_timeout_seconds = Some(n as u64);
                }
                "subagent" => {
                    cfg.subagent = Some(val.as_bool().ok_or_else(|| PolicyError::WrongType {
                        path: format!("{source_path}#subagent"),
                        expected: "boolean",
                        found: type_name(val).to_string(),
                    })?);
                }
                other => {
                    return Err(PolicyError::UnknownField {
                        path: source_path.to_string(),
                        field: other.to_string(),
                    });
                }
            }
        }
        Ok(cfg)
    }
}

fn type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn decode_enum<T>(val: &JsonValue, source_path: &str, field: &str) -> Result<T, PolicyError>
where
    T: std::str::FromStr,
{
    let s = val.as_str().ok_or_else(|| PolicyError::WrongType {
        path: format!("{source_path}#{field}"),
        expected: "string",
        found: type_name(val).to_string(),
    })?;
    s.parse::<T>().map_err(|_| PolicyError::UnknownValue {
        path: format!("{source_path}#{field}"),
        value: s.to_string(),
    })
}

/// `deepMerge(a, b)`: scalar/enum fields in `b` replace those in `a`; `b`'s
/// absence of a field defers to `a`. Used to fold layers in increasing
/// precedence (user < project < session < cli).
pub fn deep_merge(a: &SandboxConfig, b: &SandboxConfig) -> SandboxConfig {
    SandboxConfig {
        filesystem_mode: b.filesystem_mode.or(a.filesystem_mode),
        network_mode: b.network_mode.or(a.network_mode),
        approval_policy: b.approval_policy.or(a.approval_policy),
        approval_timeout_seconds: b.approval_timeout_seconds.or(a.approval_timeout_seconds),
        subagent: b.subagent.or(a.subagent),
    }
}

/// A fully-populated `SandboxConfig` — the effective policy that governs one
/// tool invocation after all layers and clamps have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveSandboxConfig {
    pub filesystem_mode: FilesystemMode,
    pub network_mode: NetworkMode,
    pub approval_policy: ApprovalPolicy,
    pub approval_timeout_seconds: u64,
    pub subagent: bool,
}

impl Default for EffectiveSandboxConfig {
    fn default() -> Self {
        Self {
            filesystem_mode: FilesystemMode::WorkspaceWrite,
            network_mode: NetworkMode::Deny,
            approval_policy: ApprovalPolicy::OnFailure,
            approval_timeout_seconds: 60,
            subagent: false,
        }
    }
}

/// `applyDefaults(partial) -> Required`.
pub fn apply_defaults(partial: &SandboxConfig) -> EffectiveSandboxConfig {
    let default = EffectiveSandboxConfig::default();
    EffectiveSandboxConfig {
        filesystem_mode: partial.filesystem_mode.unwrap_or(default.filesystem_mode),
        network_mode: partial.network_mode.unwrap_or(default.network_mode),
        approval_policy: partial.approval_policy.unwrap_or(default.approval_policy),
        approval_timeout_seconds: partial
            .approval_timeout_seconds
            .unwrap_or(default.approval_timeout_seconds),
        subagent: partial.subagent.unwrap_or(default.subagent),
    }
}

impl EffectiveSandboxConfig {
    /// Deep-merge a single additional partial layer on top of this effective
    /// config (used to layer a CLI override or session override onto an
    /// already-resolved config without re-deriving from scratch).
    pub fn merge_partial(&self, patch: &SandboxConfig) -> EffectiveSandboxConfig {
        EffectiveSandboxConfig {
            filesystem_mode: patch.filesystem_mode.unwrap_or(self.filesystem_mode),
            network_mode: patch.network_mode.unwrap_or(self.network_mode),
            approval_policy: patch.approval_policy.unwrap_or(self.approval_policy),
            approval_timeout_seconds: patch
                .approval_timeout_seconds
                .unwrap_or(self.approval_timeout_seconds),
            subagent: patch.subagent.unwrap_or(self.subagent),
        }
    }

    /// A fingerprint used by the sandbox-state notifier to detect config
    /// changes across turns; stable under field-order and serialization
    /// changes since it's built from the typed fields directly.
    pub fn fingerprint(&self) -> String {
        format!(
            "fs={}:net={}:approval={}:timeout={}:subagent={}",
            self.filesystem_mode, self.network_mode, self.approval_policy, self.approval_timeout_seconds, self.subagent
        )
    }

    /// The `SANDBOX_STATE`/`SANDBOX_CHANGE` body shared by both notice kinds:
    /// `fs=<mode> net=<mode> approval=<policy> timeout=<n>s subagent=<bool>`.
    pub fn describe(&self) -> String {
        format!(
            "fs={} net={} approval={} timeout={}s subagent={}",
            self.filesystem_mode,
            self.network_mode,
            self.approval_policy,
            self.approval_timeout_seconds,
            self.subagent
        )
    }
}

impl fmt::Display for EffectiveSandboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Per-field "stricter of two" selection used to clamp a worker's requested
/// sandbox against its parent's effective one. `subagent` is forced `true`
/// unconditionally.
pub fn clamp(parent: &EffectiveSandboxConfig, requested: &SandboxConfig) -> EffectiveSandboxConfig {
    let merged = parent.merge_partial(requested);
    EffectiveSandboxConfig {
        filesystem_mode: merged.filesystem_mode.min(parent.filesystem_mode),
        network_mode: merged.network_mode.min(parent.network_mode),
        approval_policy: merged.approval_policy,
        approval_timeout_seconds: merged.approval_timeout_seconds,
        subagent: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let eff = apply_defaults(&SandboxConfig::default());
        assert_eq!(eff.filesystem_mode, FilesystemMode::WorkspaceWrite);
        assert_eq!(eff.network_mode, NetworkMode::Deny);
        assert_eq!(eff.approval_policy, ApprovalPolicy::OnFailure);
        assert_eq!(eff.approval_timeout_seconds, 60);
        assert!(!eff.subagent);
    }

    #[test]
    fn deep_merge_precedence_b_wins() {
        let a = SandboxConfig {
            filesystem_mode: Some(FilesystemMode::ReadOnly),
            network_mode: Some(NetworkMode::Deny),
            ..Default::default()
        };
        let b = SandboxConfig {
            filesystem_mode: Some(FilesystemMode::DangerFullAccess),
            ..Default::default()
        };
        let merged = deep_merge(&a, &b);
        assert_eq!(merged.filesystem_mode, Some(FilesystemMode::DangerFullAccess));
        assert_eq!(merged.network_mode, Some(NetworkMode::Deny));
    }

    #[test]
    fn clamp_never_relaxes_parent() {
        let parent = EffectiveSandboxConfig {
            filesystem_mode: FilesystemMode::WorkspaceWrite,
            network_mode: NetworkMode::Deny,
            approval_policy: ApprovalPolicy::OnFailure,
            approval_timeout_seconds: 60,
            subagent: false,
        };
        let requested = SandboxConfig {
            filesystem_mode: Some(FilesystemMode::DangerFullAccess),
            network_mode: Some(NetworkMode::AllowAll),
            ..Default::default()
        };
        let child = clamp(&parent, &requested);
        assert_eq!(child.filesystem_mode, FilesystemMode::WorkspaceWrite);
        assert_eq!(child.network_mode, NetworkMode::Deny);
        assert!(child.subagent);
    }

    #[test]
    fn clamp_allows_stricter_request() {
        let parent = EffectiveSandboxConfig {
            filesystem_mode: FilesystemMode::WorkspaceWrite,
            ..EffectiveSandboxConfig::default()
        };
        let requested = SandboxConfig {
            filesystem_mode: Some(FilesystemMode::ReadOnly),
            ..Default::default()
        };
        let child = clamp(&parent, &requested);
        assert_eq!(child.filesystem_mode, FilesystemMode::ReadOnly);
    }

    #[test]
    fn decode_rejects_unknown_enum_value() {
        let raw = serde_json::json!({"filesystemMode": "read-write"});
        let err = SandboxConfig::decode(&raw, "settings.json").unwrap_err();
        assert!(matches!(err, PolicyError::UnknownValue { .. }));
    }

    #[test]
    fn decode_rejects_non_positive_timeout() {
        let raw = serde_json::json!({"approvalTimeoutSeconds": 0});
        let err = SandboxConfig::decode(&raw, "settings.json").unwrap_err();
        assert!(matches!(err, PolicyError::NonPositiveTimeout { .. }));
    }

    #[test]
    fn hash_stable_under_double_apply_defaults() {
        let x = SandboxConfig {
            filesystem_mode: Some(FilesystemMode::ReadOnly),
            ..Default::default()
        };
        let once = apply_defaults(&x);
        let twice = apply_defaults(&apply_defaults(&x).merge_partial(&SandboxConfig::default()));
        assert_eq!(once.fingerprint(), twice.fingerprint());
    }
}
