//! Session-scoped sandbox state: the single custom entry appended to the
//! session history on each change, last-write-wins.

use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

use crate::sandbox::SandboxConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PendingSandboxNotice {
    pub hash: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum SandboxUnavailableDecision {
    Allow,
    Deny,
    Unset,
}

impl Default for SandboxUnavailableDecision {
    fn default() -> Self {
        SandboxUnavailableDecision::Unset
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub session_override: SandboxConfig,
    #[serde(default)]
    pub system_prompt_injected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_communicated_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_sandbox_notice: Option<PendingSandboxNotice>,
    #[serde(default)]
    pub sandbox_unavailable_decision: SandboxUnavailableDecision,
    /// Exact argvs approved for the remainder of the session via
    /// `ApprovedForSession`, so the bash tool skips re-prompting for a
    /// command the user already cleared once this session.
    #[serde(default)]
    pub approved_commands: HashSet<Vec<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}
