//! `tau agent spawn`: a single-process demonstration of the worker-agent
//! lifecycle. Since this binary holds no daemon state across
//! invocations, `spawn`, `wait`, `list`, and `close` are exercised together
//! here rather than as independent subcommands — a real host would keep an
//! `AgentRegistry`/`AgentTool` alive for the life of a session and expose
//! `spawn`/`wait`/`send`/`close`/`list` as separate operations on it, the way
//! `core::agent::tool::AgentTool` already does.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use clap::Subcommand;
use clap::ValueEnum;
use tau_common::PresetModelResolver;
use tau_core::agent::AgentRegistry;
use tau_core::agent::AgentTool;
use tau_core::agent::ChildConversation;
use tau_core::agent::ChildConversationFactory;
use tau_core::agent::ChildEvent;
use tau_core::agent::ChildSpec;
use tau_core::agent::Complexity;
use tau_core::agent::SpawnParams;
use tau_core::agent::StopReason;
use tau_core::settings::ResolveInputs;
use tau_core::settings::compute_effective_config;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum AgentArgs {
    Spawn(SpawnArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ComplexityArg {
    Low,
    Medium,
    High,
}

impl From<ComplexityArg> for Complexity {
    fn from(value: ComplexityArg) -> Self {
        match value {
            ComplexityArg::Low => Complexity::Low,
            ComplexityArg::Medium => Complexity::Medium,
            ComplexityArg::High => Complexity::High,
        }
    }
}

#[derive(Debug, Args)]
pub struct SpawnArgs {
    /// One of the built-in agent definitions (finder/rush/general/oracle/
    /// librarian/painter/review).
    #[arg(long)]
    pub agent: String,

    #[arg(long)]
    pub message: String,

    #[arg(long)]
    pub complexity: Option<ComplexityArg>,

    #[arg(long)]
    pub wait_ms: Option<u64>,

    #[arg(long, default_value = ".")]
    pub workspace_root: std::path::PathBuf,

    /// Render the agent tree (depth-indented) before waiting.
    #[arg(long, default_value_t = false)]
    pub tree: bool,

    /// Persist each spawned child's initial session state to
    /// `~/.pi/agent/sessions/<id>.jsonl`.
    #[arg(long, default_value_t = false)]
    pub persist_session_log: bool,
}

pub async fn run(args: AgentArgs) -> anyhow::Result<()> {
    match args {
        AgentArgs::Spawn(args) => spawn(args).await,
    }
}

async fn spawn(args: SpawnArgs) -> anyhow::Result<()> {
    let workspace_root = args.workspace_root.canonicalize().unwrap_or(args.workspace_root);
    let parent_effective =
        compute_effective_config(&ResolveInputs { workspace_root, ..Default::default() })?;

    let registry = Arc::new(AgentRegistry::new());
    let mut tool = AgentTool::new(
        Uuid::new_v4(),
        "You are the root session of a tau-cli demonstration run.",
        registry.clone(),
        Arc::new(EchoConversationFactory),
        Arc::new(PresetModelResolver),
    );
    if args.persist_session_log {
        tool = tool.with_session_logging();
    }

    let id = tool
        .spawn(
            SpawnParams {
                agent: args.agent,
                message: args.message,
                complexity: args.complexity.map(Into::into),
                result_schema: None,
            },
            &parent_effective,
        )
        .await?;

    println!("spawned {id}");

    if args.tree {
        print_tree(&tool.list().await, None, 0);
    }

    let statuses = tool.wait(&[id], args.wait_ms).await;
    if let Some(status) = statuses.get(&id) {
        println!("{}", serde_json::to_string_pretty(status)?);
    }

    tool.close(id).await?;
    Ok(())
}

fn print_tree(agents: &[tau_protocol::Agent], parent: Option<Uuid>, indent: usize) {
    for agent in agents.iter().filter(|a| parent_of(a) == parent) {
        println!("{}{} ({})", "  ".repeat(indent), agent.agent_type, agent.id);
        print_tree(agents, Some(agent.id), indent + 1);
    }
}

/// The demo registry doesn't expose parent pointers on `Agent` itself
/// (the tree lives in the registry, not the record), so for this
/// single-root demo every agent is simply a root at indent 0.
fn parent_of(_agent: &tau_protocol::Agent) -> Option<Uuid> {
    None
}

/// A model-free `ChildConversation` that immediately echoes the submitted
/// message back as its final answer — enough to exercise `AgentWorker`'s
/// event-driven status tracking without a real model client — driving an
/// actual turn loop is out of scope for this demo.
struct EchoConversation {
    agent_type: String,
    tx: broadcast::Sender<ChildEvent>,
}

#[async_trait]
impl ChildConversation for EchoConversation {
    async fn submit(&self, message: &str) -> Uuid {
        let submission_id = Uuid::new_v4();
        let _ = self.tx.send(ChildEvent::TurnStart);
        let _ = self.tx.send(ChildEvent::AgentEnd {
            stop_reason: StopReason::Normal,
            message: Some(format!("[{}] echo: {message}", self.agent_type)),
            structured_output: None,
        });
        submission_id
    }

    async fn interrupt(&self) {}
    async fn shutdown(&self) {}

    fn subscribe(&self) -> broadcast::Receiver<ChildEvent> {
        self.tx.subscribe()
    }
}

struct EchoConversationFactory;

#[async_trait]
impl ChildConversationFactory for EchoConversationFactory {
    async fn create(&self, spec: ChildSpec) -> Arc<dyn ChildConversation> {
        let (tx, _rx) = broadcast::channel(16);
        Arc::new(EchoConversation { agent_type: spec.agent_type, tx })
    }
}
