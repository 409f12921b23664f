//! Worker-agent data model: definitions (static, per-session) and runtime
//! `Agent`/`AgentStatus`/`ToolRecord` values.
//!
//! An id-keyed, tree-shaped registry of conversations, split between
//! transient turn/tool counters and a terminal outcome.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::sandbox::EffectiveSandboxConfig;
use crate::sandbox::SandboxConfig;

const PREVIEW_MAX_CHARS: usize = 100;

/// Truncates `s` to at most `PREVIEW_MAX_CHARS` characters, appending an
/// ellipsis marker when truncation occurred. Operates on chars, not bytes,
/// so multi-byte UTF-8 is never split.
pub fn truncate_preview(s: &str) -> String {
    truncate_chars(s, PREVIEW_MAX_CHARS)
}

pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

/// Immutable per-session definition of an agent type the `agent` tool can
/// spawn (`finder`, `rush`, `general`, `oracle`, `librarian`, `painter`,
/// `review`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub sandbox: SandboxConfig,
    pub system_prompt: String,
}

/// A single tool invocation made by a worker, surfaced to the parent for
/// status display. `args_preview`/`result_preview` are each truncated to
/// `PREVIEW_MAX_CHARS`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ToolRecord {
    pub name: String,
    pub args_preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolRecord {
    pub fn new(name: impl Into<String>, args_preview: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            args_preview: truncate_preview(args_preview.as_ref()),
            result_preview: None,
            is_error: None,
        }
    }

    pub fn finish(mut self, result_preview: impl AsRef<str>, is_error: bool) -> Self {
        self.result_preview = Some(truncate_preview(result_preview.as_ref()));
        self.is_error = Some(is_error);
        self
    }
}

/// Tagged-union terminal/non-terminal status of a worker agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Pending,
    Running {
        turns: u32,
        tool_calls: u32,
        worked_ms: u64,
        tools: Vec<ToolRecord>,
    },
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structured_output: Option<serde_json::Value>,
        turns: u32,
        tool_calls: u32,
        worked_ms: u64,
        tools: Vec<ToolRecord>,
    },
    Failed {
        reason: String,
        turns: u32,
        tool_calls: u32,
        worked_ms: u64,
        tools: Vec<ToolRecord>,
    },
    Shutdown,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Completed { .. } | AgentStatus::Failed { .. } | AgentStatus::Shutdown
        )
    }
}

/// A node in the agent tree rooted at the interactive session. Depth is
/// `parent.depth + 1`; there are no sibling references, only parent->child.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub depth: u32,
    pub sandbox: EffectiveSandboxConfig,
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(agent_type: impl Into<String>, depth: u32, sandbox: EffectiveSandboxConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            depth,
            sandbox,
            status: AgentStatus::Pending,
        }
    }
}

/// Formats a `Duration` as the compact `workedMs` counter unit used in
/// status snapshots (milliseconds, no rounding beyond truncation).
pub fn duration_to_worked_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
