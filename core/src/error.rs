//! The error taxonomy for this crate. Bash exec never raises for a
//! non-zero exit — exit codes are data — so this enum is reserved for
//! genuinely exceptional conditions: malformed config, I/O failures, and the
//! handful of sandbox setup failures that require a one-time user decision.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TauErr>;

#[derive(Error, Debug)]
pub enum SandboxErr {
    #[error("sandbox denied exec, exit code: {0}, stdout: {1}, stderr: {2}")]
    Denied(i32, String, String),

    #[cfg(target_os = "linux")]
    #[error("seccomp setup error")]
    SeccompInstall(#[from] seccompiler::Error),

    #[cfg(target_os = "linux")]
    #[error("seccomp backend error")]
    SeccompBackend(#[from] seccompiler::BackendError),

    #[error("command timed out")]
    Timeout,

    #[error("command was killed by a signal")]
    Signal(i32),

    #[error("Landlock was not able to fully enforce all sandbox rules")]
    LandlockRestrict,
}

/// Subtype of a failed approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDeniedReason {
    Declined,
    TimedOut,
    Cancelled,
    Headless,
}

impl std::fmt::Display for ApprovalDeniedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalDeniedReason::Declined => "declined",
            ApprovalDeniedReason::TimedOut => "timed out",
            ApprovalDeniedReason::Cancelled => "cancelled",
            ApprovalDeniedReason::Headless => "headless",
        };
        f.write_str(s)
    }
}

/// Subtype of a `SandboxUnavailable` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxUnavailableKind {
    LibraryMissing,
    PrereqsMissing,
    WrapFailed,
}

#[derive(Error, Debug)]
pub enum TauErr {
    #[error("policy error: {0}")]
    Policy(#[from] tau_protocol::PolicyError),

    #[error("approval denied: {0}")]
    ApprovalDenied(ApprovalDeniedReason),

    #[error("sandbox unavailable ({kind:?}): {detail}")]
    SandboxUnavailable {
        kind: SandboxUnavailableKind,
        detail: String,
    },

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxErr),

    #[error("agent error: {0}")]
    Agent(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(target_os = "linux")]
    #[error(transparent)]
    LandlockRuleset(#[from] landlock::RulesetError),

    #[cfg(target_os = "linux")]
    #[error(transparent)]
    LandlockPathFd(#[from] landlock::PathFdError),

    #[error(transparent)]
    TokioJoin(#[from] tokio::task::JoinError),
}
