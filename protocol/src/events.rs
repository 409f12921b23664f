//! Minimal event surface the engine emits toward a hosting UI: just what
//! bash-tool and agent-tool callers need to render progress and approvals.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Event {
    pub id: String,
    pub msg: EventMsg,
}

#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMsg {
    ExecCommandBegin {
        call_id: String,
        command: Vec<String>,
        cwd: PathBuf,
    },
    ExecCommandEnd {
        call_id: String,
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    ExecApprovalRequest {
        call_id: String,
        command: Vec<String>,
        cwd: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    BackgroundEvent {
        message: String,
    },
    /// UI-display-only notice describing a sandbox config change; never part
    /// of the model-visible context, stripped before context build.
    SandboxChangeDisplay {
        summary: String,
    },
    AgentStatusChanged {
        agent_id: Uuid,
    },
}

impl EventMsg {
    /// True for events that exist purely to drive a UI display and must
    /// never reach model-visible context (currently only
    /// `SandboxChangeDisplay`).
    pub fn is_ui_only(&self) -> bool {
        matches!(self, EventMsg::SandboxChangeDisplay { .. })
    }
}
