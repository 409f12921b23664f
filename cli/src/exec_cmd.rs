use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tau_common::ApprovalModeCliArg;
use tau_common::FilesystemModeCliArg;
use tau_common::NetworkModeCliArg;
use tau_core::approval::InteractiveApprovalBroker;
use tau_core::bash_tool::BashTool;
use tau_core::bash_tool::ExecParams;
use tau_core::bash_tool::OnData;
use tau_core::settings::ResolveInputs;
use tau_core::settings::compute_effective_config;
use tau_protocol::SandboxConfig;
use tokio::sync::Notify;

use crate::approval_ui::TerminalApprovalUi;

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Filesystem access granted for this run (overrides the resolved config).
    #[arg(long)]
    pub filesystem: Option<FilesystemModeCliArg>,

    /// Network access granted for this run (overrides the resolved config).
    #[arg(long)]
    pub network: Option<NetworkModeCliArg>,

    /// Approval policy for this run (overrides the resolved config).
    #[arg(long)]
    pub approval: Option<ApprovalModeCliArg>,

    /// Workspace root the command is considered scoped to.
    #[arg(long, default_value = ".")]
    pub workspace_root: std::path::PathBuf,

    /// Disables the sandbox entirely for this run (the operator-level kill
    /// switch).
    #[arg(long, default_value_t = false)]
    pub no_sandbox: bool,

    /// Kills the command after this many milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// The command to run, e.g. `tau exec -- ls -la`.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

struct StreamToStdio;
impl OnData for StreamToStdio {
    fn on_data(&self, chunk: &[u8]) {
        use std::io::Write as _;
        let _ = std::io::stdout().write_all(chunk);
    }
}

pub async fn run(args: ExecArgs) -> anyhow::Result<()> {
    let cli_override = SandboxConfig {
        filesystem_mode: args.filesystem.map(Into::into),
        network_mode: args.network.map(Into::into),
        approval_policy: args.approval.map(Into::into),
        approval_timeout_seconds: None,
        subagent: None,
    };

    let workspace_root = args.workspace_root.canonicalize().unwrap_or(args.workspace_root.clone());
    let effective = compute_effective_config(&ResolveInputs {
        workspace_root: workspace_root.clone(),
        session_override: SandboxConfig::default(),
        cli_override,
    })?;

    let broker = Arc::new(InteractiveApprovalBroker::new(Arc::new(TerminalApprovalUi)));
    let bash_tool = BashTool::new(broker, args.no_sandbox, false);

    let params = ExecParams {
        command: args.command,
        cwd: workspace_root,
        timeout: args.timeout_ms.map(Duration::from_millis),
        escalate: false,
    };

    let abort = Arc::new(Notify::new());
    let abort_for_signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_for_signal.notify_waiters();
        }
    });

    let outcome = bash_tool.exec(params, &effective, &StreamToStdio, abort).await?;
    if !outcome.sandboxed {
        tracing::warn!("command ran unsandboxed");
    }
    std::process::exit(outcome.exit_code.unwrap_or(1));
}
