//! The approval broker: a oneshot-channel request/response pair keyed by
//! submission id, generalized into an id-keyed registry so workers can
//! forward requests up to the root session's broker without holding a
//! direct handle to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::time::Duration;

use regex_lite::Regex;
use tokio::sync::Notify;
use tokio::sync::oneshot;
use uuid::Uuid;

pub use crate::error::ApprovalDeniedReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    BashEscalation,
    /// Unsafe-but-not-escalated command under `unless-trusted`: approval
    /// only permits running it under the sandbox, never unsandboxed.
    SandboxedRun,
    FilesystemWriteOutOfScope,
    SandboxUnavailable,
}

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub kind: PromptKind,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResult {
    Approved { run_unsandboxed: bool },
    /// Like `Approved`, but the decision also covers any later occurrence of
    /// the same argv within the session — callers should record it in
    /// `SessionState::approved_commands` and skip re-prompting.
    ApprovedForSession { run_unsandboxed: bool },
    Denied { reason: ApprovalDeniedReason },
}

impl ApprovalResult {
    /// Whether this result authorizes running the command at all (regardless
    /// of whether the approval carries over to later occurrences).
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            ApprovalResult::Approved { .. } | ApprovalResult::ApprovedForSession { .. }
        )
    }

    pub fn run_unsandboxed(&self) -> Option<bool> {
        match self {
            ApprovalResult::Approved { run_unsandboxed }
            | ApprovalResult::ApprovedForSession { run_unsandboxed } => Some(*run_unsandboxed),
            ApprovalResult::Denied { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalOptions {
    pub timeout: Duration,
    pub escalate_hint: Option<String>,
}

/// Truncates a one-line preview to `max_chars` characters (60 for command
/// previews, 200 for error evidence).
pub fn truncate_preview_line(s: &str, max_chars: usize) -> String {
    let single_line: String = s.lines().collect::<Vec<_>>().join(" ");
    tau_protocol::agent::truncate_chars(&single_line, max_chars)
}

/// Strips ANSI escape sequences and other control codes before an approval
/// body is rendered to the user.
pub fn sanitize_for_display(s: &str) -> String {
    // ESC [ ... final-byte in 0x40-0x7E, the common CSI form used by color
    // and cursor-movement sequences.
    #[allow(clippy::expect_used)]
    static ANSI: LazyLock<Regex> =
        LazyLock::new(|| Regex::new("\u{1b}\\[[0-?]*[ -/]*[@-~]").expect("valid regex"));
    let without_ansi = ANSI.replace_all(s, "");
    without_ansi
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Fires a best-effort OS desktop notification. A failure to notify never
/// affects the approval result — errors are swallowed.
pub fn notify_desktop(summary: &str, body: &str) {
    let result = notify_rust::Notification::new()
        .summary(summary)
        .body(body)
        .show();
    if let Err(e) = result {
        tracing::debug!("desktop notification failed (ignored): {e}");
    }
}

/// A decided approval broker: something that can answer `request_approval`.
/// Implemented once locally by whatever hosts the interactive UI (out of
/// scope for this crate — it plugs in via `InteractiveApprovalBroker`'s
/// `ApprovalUi` hook) and once by forwarding to a root broker.
#[async_trait::async_trait]
pub trait ApprovalBroker: Send + Sync {
    async fn request_approval(
        &self,
        kind: PromptKind,
        title: &str,
        body: &str,
        opts: ApprovalOptions,
    ) -> ApprovalResult;
}

/// The UI-facing hook an interactive host implements to actually render a
/// prompt and collect a decision. Kept minimal since the terminal UI itself
/// is out of scope for this crate.
#[async_trait::async_trait]
pub trait ApprovalUi: Send + Sync {
    async fn prompt(&self, request: ApprovalRequest) -> ApprovalResult;
}

/// Broker used by a process that owns an interactive UI: prompts locally via
/// the injected `ApprovalUi`, honoring timeout and an external abort signal.
pub struct InteractiveApprovalBroker {
    ui: Arc<dyn ApprovalUi>,
}

impl InteractiveApprovalBroker {
    pub fn new(ui: Arc<dyn ApprovalUi>) -> Self {
        Self { ui }
    }
}

#[async_trait::async_trait]
impl ApprovalBroker for InteractiveApprovalBroker {
    async fn request_approval(
        &self,
        kind: PromptKind,
        title: &str,
        body: &str,
        opts: ApprovalOptions,
    ) -> ApprovalResult {
        let sanitized_body = sanitize_for_display(body);
        notify_desktop(title, &sanitized_body);

        let request = ApprovalRequest {
            kind,
            title: title.to_string(),
            body: sanitized_body,
        };

        match tokio::time::timeout(opts.timeout, self.ui.prompt(request)).await {
            Ok(result) => result,
            Err(_) => ApprovalResult::Denied {
                reason: ApprovalDeniedReason::TimedOut,
            },
        }
    }
}

/// Broker used by a worker session with no UI of its own: forwards the
/// request to the root session's broker over an in-process channel keyed by
/// the root session id.
pub struct ForwardingApprovalBroker {
    tx: tokio::sync::mpsc::Sender<(ApprovalRequest, oneshot::Sender<ApprovalResult>)>,
}

impl ForwardingApprovalBroker {
    pub fn new(
        tx: tokio::sync::mpsc::Sender<(ApprovalRequest, oneshot::Sender<ApprovalResult>)>,
    ) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl ApprovalBroker for ForwardingApprovalBroker {
    async fn request_approval(
        &self,
        kind: PromptKind,
        title: &str,
        body: &str,
        opts: ApprovalOptions,
    ) -> ApprovalResult {
        let (resp_tx, resp_rx) = oneshot::channel();
        let request = ApprovalRequest {
            kind,
            title: title.to_string(),
            body: sanitize_for_display(body),
        };
        if self.tx.send((request, resp_tx)).await.is_err() {
            return ApprovalResult::Denied {
                reason: ApprovalDeniedReason::Headless,
            };
        }
        match tokio::time::timeout(opts.timeout, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => ApprovalResult::Denied {
                reason: ApprovalDeniedReason::TimedOut,
            },
        }
    }
}

/// A broker that immediately cancels the current request, used to model an
/// explicit abort of the surrounding operation.
pub struct CancellingApprovalBroker;

#[async_trait::async_trait]
impl ApprovalBroker for CancellingApprovalBroker {
    async fn request_approval(
        &self,
        _kind: PromptKind,
        _title: &str,
        _body: &str,
        _opts: ApprovalOptions,
    ) -> ApprovalResult {
        ApprovalResult::Denied {
            reason: ApprovalDeniedReason::Cancelled,
        }
    }
}

/// Wraps any broker so the request can be cancelled by an external
/// `Notify`, surfacing `denied{reason="cancelled"}`.
pub async fn request_with_abort(
    broker: &dyn ApprovalBroker,
    abort: Arc<Notify>,
    kind: PromptKind,
    title: &str,
    body: &str,
    opts: ApprovalOptions,
) -> ApprovalResult {
    tokio::select! {
        result = broker.request_approval(kind, title, body, opts) => result,
        _ = abort.notified() => ApprovalResult::Denied { reason: ApprovalDeniedReason::Cancelled },
    }
}

/// Process-wide registry mapping worker session ids to their approval
/// brokers; inserted at spawn, removed at shutdown.
#[derive(Default)]
pub struct BrokerRegistry {
    brokers: Mutex<HashMap<Uuid, Arc<dyn ApprovalBroker>>>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)]
    pub fn register(&self, session_id: Uuid, broker: Arc<dyn ApprovalBroker>) {
        self.brokers.lock().expect("broker registry lock").insert(session_id, broker);
    }

    #[allow(clippy::expect_used)]
    pub fn get(&self, session_id: Uuid) -> Option<Arc<dyn ApprovalBroker>> {
        self.brokers.lock().expect("broker registry lock").get(&session_id).cloned()
    }

    #[allow(clippy::expect_used)]
    pub fn remove(&self, session_id: Uuid) {
        self.brokers.lock().expect("broker registry lock").remove(&session_id);
    }
}

/// The three fixed prompt templates.
pub mod templates {
    use super::truncate_preview_line;

    pub fn bash_escalation(command: &str) -> (String, String) {
        (
            "Run without sandbox?".to_string(),
            format!("Command: {}", truncate_preview_line(command, 60)),
        )
    }

    pub fn sandboxed_run(command: &str) -> (String, String) {
        (
            "Run this command?".to_string(),
            format!("Command: {}", truncate_preview_line(command, 60)),
        )
    }

    pub fn filesystem_write_out_of_scope(path: &str) -> (String, String) {
        (
            "Write outside workspace?".to_string(),
            format!("Path: {}", truncate_preview_line(path, 60)),
        )
    }

    pub fn sandbox_unavailable(evidence: &str) -> (String, String) {
        (
            "Sandbox unavailable — run unsandboxed for this session?".to_string(),
            truncate_preview_line(evidence, 200),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_ansi() {
        let input = "\u{1b}[31mred text\u{1b}[0m";
        assert_eq!(sanitize_for_display(input), "red text");
    }

    #[test]
    fn truncate_caps_at_max_chars() {
        let long = "a".repeat(100);
        let truncated = truncate_preview_line(&long, 60);
        assert_eq!(truncated.chars().count(), 60);
    }

    #[tokio::test]
    async fn cancelling_broker_denies_with_cancelled() {
        let broker = CancellingApprovalBroker;
        let result = broker
            .request_approval(
                PromptKind::BashEscalation,
                "t",
                "b",
                ApprovalOptions {
                    timeout: Duration::from_secs(1),
                    escalate_hint: None,
                },
            )
            .await;
        assert_eq!(
            result,
            ApprovalResult::Denied {
                reason: ApprovalDeniedReason::Cancelled
            }
        );
    }

    struct AlwaysApprove;
    #[async_trait::async_trait]
    impl ApprovalUi for AlwaysApprove {
        async fn prompt(&self, _request: ApprovalRequest) -> ApprovalResult {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ApprovalResult::Approved {
                run_unsandboxed: true,
            }
        }
    }

    #[tokio::test]
    async fn timeout_denies_slow_prompts() {
        struct NeverResponds;
        #[async_trait::async_trait]
        impl ApprovalUi for NeverResponds {
            async fn prompt(&self, _request: ApprovalRequest) -> ApprovalResult {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
        let broker = InteractiveApprovalBroker::new(Arc::new(NeverResponds));
        let result = broker
            .request_approval(
                PromptKind::BashEscalation,
                "t",
                "b",
                ApprovalOptions {
                    timeout: Duration::from_millis(10),
                    escalate_hint: None,
                },
            )
            .await;
        assert_eq!(
            result,
            ApprovalResult::Denied {
                reason: ApprovalDeniedReason::TimedOut
            }
        );
    }

    #[tokio::test]
    async fn approval_grants_run_unsandboxed() {
        let broker = InteractiveApprovalBroker::new(Arc::new(AlwaysApprove));
        let result = broker
            .request_approval(
                PromptKind::BashEscalation,
                "t",
                "b",
                ApprovalOptions {
                    timeout: Duration::from_secs(1),
                    escalate_hint: None,
                },
            )
            .await;
        assert_eq!(
            result,
            ApprovalResult::Approved {
                run_unsandboxed: true
            }
        );
    }
}
