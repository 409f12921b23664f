use clap::Args;
use clap::Subcommand;
use clap::ValueEnum;
use tau_common::ApprovalModeCliArg;
use tau_common::FilesystemModeCliArg;
use tau_common::NetworkModeCliArg;
use tau_common::summarize_sandbox_config;
use tau_core::settings::ResolveInputs;
use tau_core::settings::compute_effective_config;
use tau_core::settings::persist_project_config_patch;
use tau_core::settings::persist_user_config_patch;
use tau_protocol::SandboxConfig;

#[derive(Debug, Subcommand)]
pub enum SandboxArgs {
    /// Print the effective sandbox config for a workspace root.
    Show(ShowArgs),
    /// Persist a partial override into the user or project settings file.
    Set(SetArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SettingsScope {
    User,
    Project,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long, default_value = ".")]
    pub workspace_root: std::path::PathBuf,

    /// Print the raw JSON form instead of the one-line summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    #[arg(long, value_enum)]
    pub scope: SettingsScope,

    #[arg(long)]
    pub filesystem: Option<FilesystemModeCliArg>,

    #[arg(long)]
    pub network: Option<NetworkModeCliArg>,

    #[arg(long)]
    pub approval: Option<ApprovalModeCliArg>,

    #[arg(long)]
    pub approval_timeout_seconds: Option<u64>,

    #[arg(long, default_value = ".")]
    pub workspace_root: std::path::PathBuf,
}

pub fn run(args: SandboxArgs) -> anyhow::Result<()> {
    match args {
        SandboxArgs::Show(args) => show(args),
        SandboxArgs::Set(args) => set(args),
    }
}

fn show(args: ShowArgs) -> anyhow::Result<()> {
    let workspace_root = args.workspace_root.canonicalize().unwrap_or(args.workspace_root);
    let effective = compute_effective_config(&ResolveInputs { workspace_root, ..Default::default() })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&effective)?);
    } else {
        println!("{}", summarize_sandbox_config(&effective));
        println!("{}", effective.describe());
    }
    Ok(())
}

fn set(args: SetArgs) -> anyhow::Result<()> {
    let patch = SandboxConfig {
        filesystem_mode: args.filesystem.map(Into::into),
        network_mode: args.network.map(Into::into),
        approval_policy: args.approval.map(Into::into),
        approval_timeout_seconds: args.approval_timeout_seconds,
        subagent: None,
    };

    if patch.is_empty() {
        anyhow::bail!("no fields given to set; pass at least one of --filesystem/--network/--approval/--approval-timeout-seconds");
    }

    match args.scope {
        SettingsScope::User => persist_user_config_patch(&patch)?,
        SettingsScope::Project => {
            let workspace_root = args.workspace_root.canonicalize().unwrap_or(args.workspace_root);
            persist_project_config_patch(&workspace_root, &patch)?
        }
    }
    Ok(())
}
