//! Built-in `AgentDefinition` registry: the fixed set of worker agent types
//! the `agent` tool's `spawn` operation resolves `agent` against — `finder`,
//! `rush`, `general`, `oracle`, `librarian`, `painter`, `review`.

use tau_protocol::AgentDefinition;
use tau_protocol::ApprovalPolicy;
use tau_protocol::FilesystemMode;
use tau_protocol::NetworkMode;
use tau_protocol::SandboxConfig;

/// The fixed "worker delegation" block appended to every spawned worker's
/// system prompt: no git, file issues for out-of-scope findings, only the
/// last message is returned to the parent.
pub const WORKER_DELEGATION_BLOCK: &str = "\n\n---\nYou are a worker agent spawned to perform one focused task. You cannot use git (it requires host credentials the orchestrator retains). If you find something out of scope for your task, note it in your final message rather than acting on it. Only your final message is returned to the agent that spawned you — earlier turns are not visible to it.";

fn def(
    name: &'static str,
    description: &'static str,
    filesystem_mode: FilesystemMode,
    network_mode: NetworkMode,
    system_prompt: &'static str,
) -> AgentDefinition {
    AgentDefinition {
        name: name.to_string(),
        description: description.to_string(),
        model: None,
        thinking: None,
        sandbox: SandboxConfig {
            filesystem_mode: Some(filesystem_mode),
            network_mode: Some(network_mode),
            approval_policy: Some(ApprovalPolicy::Never),
            approval_timeout_seconds: None,
            subagent: Some(true),
        },
        system_prompt: system_prompt.to_string(),
    }
}

/// The built-in definitions. Looked up by name from `AgentTool::spawn`;
/// unknown names are rejected.
pub fn builtin_definitions() -> Vec<AgentDefinition> {
    vec![
        def(
            "finder",
            "Locates files, symbols, and usages across the workspace; read-only.",
            FilesystemMode::ReadOnly,
            NetworkMode::Deny,
            "Find what the caller is looking for as precisely as possible. Report file paths and line numbers; do not modify anything.",
        ),
        def(
            "rush",
            "Fast, narrowly-scoped edits with no network access.",
            FilesystemMode::WorkspaceWrite,
            NetworkMode::Deny,
            "Make the requested change as directly as possible. Prefer the smallest correct diff.",
        ),
        def(
            "general",
            "General-purpose worker for multi-step tasks requiring reads and writes.",
            FilesystemMode::WorkspaceWrite,
            NetworkMode::Deny,
            "Carry out the requested task end to end, using whatever tools are needed within your sandbox.",
        ),
        def(
            "oracle",
            "Deep reasoning over a read-only view of the workspace; no edits.",
            FilesystemMode::ReadOnly,
            NetworkMode::Deny,
            "Reason carefully about the question you were given. Do not attempt to edit files; report your analysis in your final message.",
        ),
        def(
            "librarian",
            "Reads documentation and external references; network access granted.",
            FilesystemMode::ReadOnly,
            NetworkMode::AllowAll,
            "Research the question using the workspace and external references available to you. Do not modify the workspace.",
        ),
        def(
            "painter",
            "Generates or edits non-code assets (diagrams, docs, fixtures).",
            FilesystemMode::WorkspaceWrite,
            NetworkMode::Deny,
            "Produce or edit the requested asset. Keep changes scoped to the files you were asked about.",
        ),
        def(
            "review",
            "Reviews a diff or module for correctness issues; read-only.",
            FilesystemMode::ReadOnly,
            NetworkMode::Deny,
            "Review the specified change or area for correctness bugs. Do not modify anything; report findings in your final message.",
        ),
    ]
}

pub fn find_definition(name: &str) -> Option<AgentDefinition> {
    builtin_definitions().into_iter().find(|d| d.name == name)
}
