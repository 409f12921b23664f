//! Standard types to use with the `tau` CLI's `--approval`, `--filesystem`,
//! and `--network` options. Available when the `cli` feature is enabled for
//! the crate.

use clap::ValueEnum;

use tau_protocol::ApprovalPolicy;
use tau_protocol::FilesystemMode;
use tau_protocol::NetworkMode;

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ApprovalModeCliArg {
    /// Run all commands without asking for user approval.
    /// Only asks for approval if a command fails to execute, in which case it
    /// will escalate to the user to ask for un-sandboxed execution.
    OnFailure,

    /// Only run "known safe" commands (e.g. ls, cat, sed) without asking for
    /// user approval. Escalates to the user for anything else.
    OnRequest,

    /// Same as `on-request`, but also escalates for commands the safe-command
    /// classifier cannot positively identify as read-only.
    UnlessTrusted,

    /// Never ask for user approval. Execution failures are returned to the
    /// model directly.
    Never,
}

impl From<ApprovalModeCliArg> for ApprovalPolicy {
    fn from(value: ApprovalModeCliArg) -> Self {
        match value {
            ApprovalModeCliArg::OnFailure => ApprovalPolicy::OnFailure,
            ApprovalModeCliArg::OnRequest => ApprovalPolicy::OnRequest,
            ApprovalModeCliArg::UnlessTrusted => ApprovalPolicy::UnlessTrusted,
            ApprovalModeCliArg::Never => ApprovalPolicy::Never,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum FilesystemModeCliArg {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl From<FilesystemModeCliArg> for FilesystemMode {
    fn from(value: FilesystemModeCliArg) -> Self {
        match value {
            FilesystemModeCliArg::ReadOnly => FilesystemMode::ReadOnly,
            FilesystemModeCliArg::WorkspaceWrite => FilesystemMode::WorkspaceWrite,
            FilesystemModeCliArg::DangerFullAccess => FilesystemMode::DangerFullAccess,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum NetworkModeCliArg {
    Deny,
    AllowAll,
}

impl From<NetworkModeCliArg> for NetworkMode {
    fn from(value: NetworkModeCliArg) -> Self {
        match value {
            NetworkModeCliArg::Deny => NetworkMode::Deny,
            NetworkModeCliArg::AllowAll => NetworkMode::AllowAll,
        }
    }
}
