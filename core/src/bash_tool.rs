//! Bash tool core: approval-gated, sandbox-wrapped command execution with
//! post-hoc failure classification and an on-failure unsandboxed retry
//! path. The control flow is approve, then spawn, then classify, then
//! retry.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tau_protocol::ApprovalPolicy;
use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::FilesystemMode;
use tau_protocol::NetworkMode;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::Notify;

use crate::approval::ApprovalBroker;
use crate::approval::ApprovalOptions;
use crate::approval::ApprovalResult;
use crate::approval::PromptKind;
use crate::approval::templates;
use crate::error::ApprovalDeniedReason;
use crate::error::Result;
use crate::error::SandboxErr;
use crate::error::SandboxUnavailableKind;
use crate::error::TauErr;
use crate::safe_command::Safety;
use crate::safe_command::is_safe_command;
use crate::sandbox;
use crate::sandbox::FailureKind;

/// Combined stdout+stderr is buffered up to this many bytes for post-hoc
/// classification; beyond that, bytes still stream to `on_data` but are no
/// longer retained (teacher's `exec.rs` output-capping analogue).
const OUTPUT_BYTE_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ExecParams {
    pub command: Vec<String>,
    pub cwd: std::path::PathBuf,
    pub timeout: Option<Duration>,
    pub escalate: bool,
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub sandboxed: bool,
}

/// Sink for streamed output bytes, in arrival order.
pub trait OnData: Send + Sync {
    fn on_data(&self, chunk: &[u8]);
}

pub struct BashTool {
    broker: Arc<dyn ApprovalBroker>,
    sandbox_globally_disabled: bool,
    subagent: bool,
    sandbox_unavailable_decision: Mutex<Option<bool>>,
    /// Exact argvs the user has approved for the rest of the session (see
    /// `ApprovalResult::ApprovedForSession`); checked before re-prompting.
    approved_commands: Mutex<HashSet<Vec<String>>>,
}

impl BashTool {
    pub fn new(broker: Arc<dyn ApprovalBroker>, sandbox_globally_disabled: bool, subagent: bool) -> Self {
        Self {
            broker,
            sandbox_globally_disabled,
            subagent,
            sandbox_unavailable_decision: Mutex::new(None),
            approved_commands: Mutex::new(HashSet::new()),
        }
    }

    /// Seeds the session-approved-command set, e.g. when restoring from a
    /// persisted `SessionState`.
    pub async fn seed_approved_commands(&self, commands: HashSet<Vec<String>>) {
        *self.approved_commands.lock().await = commands;
    }

    /// A snapshot of the current session-approved-command set, suitable for
    /// persisting back onto a `SessionState`.
    pub async fn approved_commands_snapshot(&self) -> HashSet<Vec<String>> {
        self.approved_commands.lock().await.clone()
    }

    pub async fn exec(
        &self,
        params: ExecParams,
        effective: &EffectiveSandboxConfig,
        on_data: &dyn OnData,
        abort: Arc<Notify>,
    ) -> Result<ExecOutcome> {
        // Step 1: operator-level kill switch.
        if self.sandbox_globally_disabled {
            let (code, stdout, stderr) =
                self.run(&params.command, &params.cwd, params.timeout, on_data, abort).await?;
            return Ok(ExecOutcome { exit_code: code, stdout, stderr, sandboxed: false });
        }

        // Step 2: git is always unsandboxed; refused outright for subagents.
        if params.command.first().map(String::as_str) == Some("git") {
            if self.subagent {
                let msg = "git is unavailable to worker agents (requires host credentials)\n";
                on_data.on_data(msg.as_bytes());
                return Ok(ExecOutcome {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: msg.to_string(),
                    sandboxed: false,
                });
            }
            let (code, stdout, stderr) =
                self.run(&params.command, &params.cwd, params.timeout, on_data, abort).await?;
            return Ok(ExecOutcome { exit_code: code, stdout, stderr, sandboxed: false });
        }

        // Step 3: approval-policy dispatch.
        let mut forced_unsandboxed = false;
        let command_preview = params.command.join(" ");
        let approval_timeout = Duration::from_secs(effective.approval_timeout_seconds);

        match effective.approval_policy {
            ApprovalPolicy::Never => {}
            ApprovalPolicy::OnFailure => {}
            ApprovalPolicy::OnRequest => {
                if params.escalate {
                    forced_unsandboxed = self
                        .ask_bash_escalation(&params.command, &command_preview, approval_timeout)
                        .await?;
                }
            }
            ApprovalPolicy::UnlessTrusted => {
                let safe = is_safe_command(&params.command) == Safety::Safe;
                if !safe {
                    if params.escalate {
                        forced_unsandboxed = self
                            .ask_bash_escalation(&params.command, &command_preview, approval_timeout)
                            .await?;
                    } else {
                        self.ask_sandboxed_run(&command_preview, approval_timeout).await?;
                    }
                }
            }
        }

        if forced_unsandboxed {
            on_data.on_data(b"[sandbox] Running without sandbox\n");
        }

        // Steps 4-5: wrap, falling back to a cached or freshly-asked
        // sandbox-unavailable decision when prerequisites are missing or
        // wrapping itself fails.
        let mut sandboxed = !forced_unsandboxed;
        let mut wrapped_command = None;

        if sandboxed {
            let wrap_output = sandbox::wrap(&params.command, effective, &params.cwd);
            if wrap_output.success {
                wrapped_command = wrap_output.wrapped_command;
            } else {
                let evidence = wrap_output.error.unwrap_or_else(|| "unknown sandbox failure".to_string());
                if self.decide_sandbox_unavailable(&evidence, approval_timeout).await? {
                    sandboxed = false;
                } else {
                    return Err(TauErr::SandboxUnavailable {
                        kind: SandboxUnavailableKind::WrapFailed,
                        detail: evidence,
                    });
                }
            }
        }

        let command_to_run = wrapped_command.unwrap_or_else(|| params.command.clone());

        // Steps 6-7: spawn, stream, classify.
        let (exit_code, stdout_bytes, stderr_bytes) =
            self.run(&command_to_run, &params.cwd, params.timeout, on_data, abort.clone()).await?;

        let mut final_exit_code = exit_code;
        let mut final_stdout = stdout_bytes;
        let mut final_stderr = stderr_bytes;
        let mut final_sandboxed = sandboxed;

        if sandboxed {
            if let Some(code) = exit_code {
                if code != 0 {
                    let combined = format!(
                        "{}\n{}",
                        String::from_utf8_lossy(&final_stdout),
                        String::from_utf8_lossy(&final_stderr)
                    );
                    let classification = sandbox::classify_sandbox_failure(&combined);
                    let gated = is_gated_by_config(classification.kind, effective);

                    if gated {
                        emit_diagnostic(on_data, &classification, effective);
                    }

                    if effective.approval_policy == ApprovalPolicy::OnFailure
                        && classification.kind != FailureKind::Unknown
                    {
                        let (title, body) = templates::bash_escalation(&command_preview);
                        let result = self
                            .broker
                            .request_approval(
                                PromptKind::BashEscalation,
                                &title,
                                &body,
                                ApprovalOptions { timeout: approval_timeout, escalate_hint: None },
                            )
                            .await;
                        if let ApprovalResult::ApprovedForSession { .. } = result {
                            self.approved_commands.lock().await.insert(params.command.clone());
                        }
                        if result.is_approved() {
                            on_data.on_data(b"[sandbox] Running without sandbox (retry after sandboxed failure)\n");
                            let (retry_code, retry_stdout, retry_stderr) = self
                                .run(&params.command, &params.cwd, params.timeout, on_data, Arc::new(Notify::new()))
                                .await?;
                            final_exit_code = retry_code;
                            final_stdout = retry_stdout;
                            final_stderr = retry_stderr;
                            final_sandboxed = false;
                        }
                    }
                }
            }
        }

        Ok(ExecOutcome {
            exit_code: final_exit_code,
            stdout: String::from_utf8_lossy(&final_stdout).into_owned(),
            stderr: String::from_utf8_lossy(&final_stderr).into_owned(),
            sandboxed: final_sandboxed,
        })
    }

    async fn ask_bash_escalation(
        &self,
        command: &[String],
        command_preview: &str,
        timeout: Duration,
    ) -> Result<bool> {
        if self.approved_commands.lock().await.contains(command) {
            return Ok(true);
        }

        let (title, body) = templates::bash_escalation(command_preview);
        match self
            .broker
            .request_approval(
                PromptKind::BashEscalation,
                &title,
                &body,
                ApprovalOptions { timeout, escalate_hint: None },
            )
            .await
        {
            ApprovalResult::Approved { run_unsandboxed } => Ok(run_unsandboxed),
            ApprovalResult::ApprovedForSession { run_unsandboxed } => {
                self.approved_commands.lock().await.insert(command.to_vec());
                Ok(run_unsandboxed)
            }
            ApprovalResult::Denied { reason } => Err(TauErr::ApprovalDenied(reason)),
        }
    }

    /// Prompts to run the command sandboxed, as opposed to
    /// `ask_bash_escalation`'s unsandboxed-run prompt. Used for an unsafe
    /// command under `unless-trusted` when the caller hasn't asked to
    /// escalate — approval just permits the sandboxed run; denial aborts.
    async fn ask_sandboxed_run(&self, command_preview: &str, timeout: Duration) -> Result<()> {
        let (title, body) = templates::sandboxed_run(command_preview);
        match self
            .broker
            .request_approval(
                PromptKind::SandboxedRun,
                &title,
                &body,
                ApprovalOptions { timeout, escalate_hint: None },
            )
            .await
        {
            ApprovalResult::Approved { .. } | ApprovalResult::ApprovedForSession { .. } => Ok(()),
            ApprovalResult::Denied { reason } => Err(TauErr::ApprovalDenied(reason)),
        }
    }

    async fn decide_sandbox_unavailable(&self, evidence: &str, timeout: Duration) -> Result<bool> {
        let mut cache = self.sandbox_unavailable_decision.lock().await;
        if let Some(decision) = *cache {
            return Ok(decision);
        }
        let (title, body) = templates::sandbox_unavailable(evidence);
        let result = self
            .broker
            .request_approval(
                PromptKind::SandboxUnavailable,
                &title,
                &body,
                ApprovalOptions { timeout, escalate_hint: None },
            )
            .await;
        let decision = result.is_approved();
        *cache = Some(decision);
        Ok(decision)
    }

    async fn run(
        &self,
        command: &[String],
        cwd: &Path,
        timeout: Option<Duration>,
        on_data: &dyn OnData,
        abort: Arc<Notify>,
    ) -> Result<(Option<i32>, Vec<u8>, Vec<u8>)> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| TauErr::Agent("empty command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);

        run_with_cancellation(child, pid, on_data, timeout, abort).await
    }
}

fn is_gated_by_config(kind: FailureKind, effective: &EffectiveSandboxConfig) -> bool {
    match kind {
        FailureKind::Network => effective.network_mode != NetworkMode::AllowAll,
        FailureKind::Filesystem => effective.filesystem_mode != FilesystemMode::DangerFullAccess,
        FailureKind::Unknown => false,
    }
}

fn emit_diagnostic(on_data: &dyn OnData, classification: &sandbox::Classification, effective: &EffectiveSandboxConfig) {
    let human = format!(
        "sandbox blocked this command ({:?}, fs={} net={}): {}\n",
        classification.kind, effective.filesystem_mode, effective.network_mode, classification.evidence
    );
    on_data.on_data(human.as_bytes());

    let diagnostic = json!({
        "kind": classification.kind,
        "subtype": classification.subtype,
        "evidence": classification.evidence,
        "fs": effective.filesystem_mode.to_string(),
        "net": effective.network_mode.to_string(),
    });
    let line = format!("SANDBOX_DIAGNOSTIC={}\n", diagnostic);
    on_data.on_data(line.as_bytes());
}

#[allow(clippy::expect_used)]
async fn stream_to_completion(
    mut child: tokio::process::Child,
    on_data: &dyn OnData,
) -> std::io::Result<(Option<i32>, Vec<u8>, Vec<u8>)> {
    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    let stdout_fut = read_and_forward(&mut stdout, on_data);
    let stderr_fut = read_and_forward(&mut stderr, on_data);
    let (stdout_buf, stderr_buf) = tokio::try_join!(stdout_fut, stderr_fut)?;

    let status = child.wait().await?;
    Ok((status.code(), stdout_buf, stderr_buf))
}

async fn read_and_forward(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    on_data: &dyn OnData,
) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        on_data.on_data(&chunk[..n]);
        if buf.len() < OUTPUT_BYTE_CAP {
            let remaining = OUTPUT_BYTE_CAP - buf.len();
            buf.extend_from_slice(&chunk[..n.min(remaining)]);
        }
    }
    Ok(buf)
}

async fn run_with_cancellation(
    child: tokio::process::Child,
    pid: u32,
    on_data: &dyn OnData,
    timeout: Option<Duration>,
    abort: Arc<Notify>,
) -> Result<(Option<i32>, Vec<u8>, Vec<u8>)> {
    let stream_fut = stream_to_completion(child, on_data);
    tokio::pin!(stream_fut);

    let timeout_fut = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timeout_fut);

    tokio::select! {
        result = &mut stream_fut => Ok(result?),
        _ = &mut timeout_fut => {
            kill_process_group(pid);
            let _ = stream_fut.await;
            Ok((None, Vec::new(), Vec::new()))
        }
        _ = abort.notified() => {
            kill_process_group(pid);
            let _ = stream_fut.await;
            Err(TauErr::Sandbox(SandboxErr::Signal(libc::SIGTERM)))
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    if pid == 0 {
        return;
    }
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalUi;
    use crate::approval::InteractiveApprovalBroker;

    struct Collector(Mutex<Vec<u8>>);
    impl OnData for Collector {
        fn on_data(&self, chunk: &[u8]) {
            self.0.try_lock().unwrap().extend_from_slice(chunk);
        }
    }

    struct AlwaysApprove;
    #[async_trait::async_trait]
    impl ApprovalUi for AlwaysApprove {
        async fn prompt(&self, _request: crate::approval::ApprovalRequest) -> ApprovalResult {
            ApprovalResult::Approved { run_unsandboxed: true }
        }
    }

    #[tokio::test]
    async fn git_is_refused_for_subagents() {
        let broker = Arc::new(InteractiveApprovalBroker::new(Arc::new(AlwaysApprove)));
        let tool = BashTool::new(broker, false, true);
        let effective = EffectiveSandboxConfig::default();
        let collector = Collector(Mutex::new(Vec::new()));
        let outcome = tool
            .exec(
                ExecParams {
                    command: vec!["git".to_string(), "status".to_string()],
                    cwd: std::env::temp_dir(),
                    timeout: None,
                    escalate: false,
                },
                &effective,
                &collector,
                Arc::new(Notify::new()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(1));
        assert!(!outcome.sandboxed);
    }

    #[tokio::test]
    async fn approved_for_session_is_not_reprompted() {
        struct CountingUi(std::sync::atomic::AtomicUsize);
        #[async_trait::async_trait]
        impl ApprovalUi for CountingUi {
            async fn prompt(&self, _request: crate::approval::ApprovalRequest) -> ApprovalResult {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                ApprovalResult::ApprovedForSession { run_unsandboxed: true }
            }
        }
        let ui = Arc::new(CountingUi(std::sync::atomic::AtomicUsize::new(0)));
        let broker = Arc::new(InteractiveApprovalBroker::new(ui.clone()));
        let tool = BashTool::new(broker, false, false);

        let params = ExecParams {
            command: vec!["echo".to_string(), "hi".to_string()],
            cwd: std::env::temp_dir(),
            timeout: None,
            escalate: true,
        };
        let effective = EffectiveSandboxConfig {
            approval_policy: ApprovalPolicy::OnRequest,
            ..EffectiveSandboxConfig::default()
        };
        let collector = Collector(Mutex::new(Vec::new()));

        tool.exec(params.clone(), &effective, &collector, Arc::new(Notify::new())).await.unwrap();
        tool.exec(params, &effective, &collector, Arc::new(Notify::new())).await.unwrap();

        assert_eq!(ui.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(
            tool.approved_commands_snapshot().await,
            std::collections::HashSet::from([vec!["echo".to_string(), "hi".to_string()]])
        );
    }

    #[tokio::test]
    async fn unless_trusted_without_escalate_prompts_for_sandboxed_run() {
        // Denies rather than approves: approving would let `exec` carry on
        // into the real sandbox wrap/spawn, which needs the platform helper
        // binary built and on PATH. Denial is enough to prove the dispatch
        // picked the sandboxed-run prompt instead of the escalation one.
        struct RecordingUi(Mutex<Vec<PromptKind>>);
        #[async_trait::async_trait]
        impl ApprovalUi for RecordingUi {
            async fn prompt(&self, request: crate::approval::ApprovalRequest) -> ApprovalResult {
                self.0.lock().await.push(request.kind);
                ApprovalResult::Denied { reason: ApprovalDeniedReason::Declined }
            }
        }
        let ui = Arc::new(RecordingUi(Mutex::new(Vec::new())));
        let broker = Arc::new(InteractiveApprovalBroker::new(ui.clone()));
        let tool = BashTool::new(broker, false, false);

        let effective = EffectiveSandboxConfig {
            approval_policy: ApprovalPolicy::UnlessTrusted,
            ..EffectiveSandboxConfig::default()
        };
        let collector = Collector(Mutex::new(Vec::new()));
        let err = tool
            .exec(
                ExecParams {
                    command: vec!["curl".to_string(), "http://example.com".to_string()],
                    cwd: std::env::temp_dir(),
                    timeout: None,
                    escalate: false,
                },
                &effective,
                &collector,
                Arc::new(Notify::new()),
            )
            .await
            .unwrap_err();

        assert_eq!(*ui.0.lock().await, vec![PromptKind::SandboxedRun]);
        assert!(matches!(err, TauErr::ApprovalDenied(ApprovalDeniedReason::Declined)));
        assert!(!collector.0.lock().await.starts_with(b"[sandbox]"));
    }

    #[tokio::test]
    async fn unless_trusted_with_escalate_prompts_for_unsandboxed_run_and_marks_stream() {
        struct RecordingUi(Mutex<Vec<PromptKind>>);
        #[async_trait::async_trait]
        impl ApprovalUi for RecordingUi {
            async fn prompt(&self, request: crate::approval::ApprovalRequest) -> ApprovalResult {
                self.0.lock().await.push(request.kind);
                ApprovalResult::Approved { run_unsandboxed: true }
            }
        }
        let ui = Arc::new(RecordingUi(Mutex::new(Vec::new())));
        let broker = Arc::new(InteractiveApprovalBroker::new(ui.clone()));
        let tool = BashTool::new(broker, false, false);

        let effective = EffectiveSandboxConfig {
            approval_policy: ApprovalPolicy::UnlessTrusted,
            ..EffectiveSandboxConfig::default()
        };
        let collector = Collector(Mutex::new(Vec::new()));
        let outcome = tool
            .exec(
                ExecParams {
                    command: vec!["whoami".to_string()],
                    cwd: std::env::temp_dir(),
                    timeout: None,
                    escalate: true,
                },
                &effective,
                &collector,
                Arc::new(Notify::new()),
            )
            .await
            .unwrap();

        assert_eq!(*ui.0.lock().await, vec![PromptKind::BashEscalation]);
        assert!(!outcome.sandboxed);
        assert!(collector.0.lock().await.starts_with(b"[sandbox] Running without sandbox"));
    }

    #[tokio::test]
    async fn globally_disabled_sandbox_runs_directly() {
        let broker = Arc::new(InteractiveApprovalBroker::new(Arc::new(AlwaysApprove)));
        let tool = BashTool::new(broker, true, false);
        let effective = EffectiveSandboxConfig::default();
        let collector = Collector(Mutex::new(Vec::new()));
        let outcome = tool
            .exec(
                ExecParams {
                    command: vec!["echo".to_string(), "hi".to_string()],
                    cwd: std::env::temp_dir(),
                    timeout: None,
                    escalate: false,
                },
                &effective,
                &collector,
                Arc::new(Notify::new()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stdout.contains("hi"));
        assert!(!outcome.sandboxed);
    }
}
