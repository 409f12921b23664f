//! The `agent` tool: the model-visible `spawn`/`wait`/`send`/`close`/`list`
//! surface backed by `AgentRegistry` + `AgentWorker`. A child inherits the
//! parent's config, then is clamped to it — the same spawn-then-adjust
//! shape a conversation fork uses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tau_protocol::Agent;
use tau_protocol::AgentStatus;
use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::SandboxConfig;
use tau_protocol::SessionState;
use tau_protocol::sandbox::clamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::child::ChildConversation;
use super::definitions::WORKER_DELEGATION_BLOCK;
use super::definitions::find_definition;
use super::lifecycle::AgentWorker;
use super::registry::AgentRegistry;
use crate::error::Result;
use crate::error::TauErr;
use crate::session::SessionLog;

/// Upper bound on `wait`'s timeout regardless of what the caller requests.
pub const MAX_WAIT_MS: u64 = 10 * 60 * 1000;
/// Default `wait` timeout when the caller doesn't specify one.
pub const DEFAULT_WAIT_MS: u64 = 60 * 1000;

/// What `AgentTool::spawn` hands to the external child-conversation host so
/// it can construct the actual streaming-model session. Driving a real
/// model turn loop is out of scope for this crate; this is the whole
/// interface a host needs to implement against.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub agent_type: String,
    pub system_prompt: String,
    pub effective: EffectiveSandboxConfig,
    pub model: Option<String>,
    pub result_schema: Option<JsonValue>,
}

#[async_trait]
pub trait ChildConversationFactory: Send + Sync {
    async fn create(&self, spec: ChildSpec) -> Arc<dyn ChildConversation>;
}

#[derive(Debug, Clone)]
pub struct SpawnParams {
    pub agent: String,
    pub message: String,
    pub complexity: Option<Complexity>,
    pub result_schema: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Resolves an execution model slug from a requested complexity tier. The
/// concrete model-resolution policy is injected so callers can swap in
/// whatever preset table `tau-common` exposes without this crate depending
/// on it.
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, complexity: Complexity) -> Option<String>;
}

pub struct NoopModelResolver;
impl ModelResolver for NoopModelResolver {
    fn resolve(&self, _complexity: Complexity) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SendParams {
    pub id: Uuid,
    pub message: String,
    pub interrupt: bool,
}

/// `AgentTool`: one instance per parent session. `parent_id` identifies the
/// session this tool's operations are scoped to (used as the `parent`
/// pointer recorded in the registry for every agent spawned through it).
pub struct AgentTool {
    parent_id: Uuid,
    default_system_prompt: String,
    registry: Arc<AgentRegistry>,
    factory: Arc<dyn ChildConversationFactory>,
    model_resolver: Arc<dyn ModelResolver>,
    /// `SessionState` as recorded for each spawned child at creation time:
    /// its clamped config, stored as the child's initial override.
    initial_session_state: Mutex<HashMap<Uuid, SessionState>>,
    /// Rollout-equivalent persistence for each spawned child's initial
    /// session state, keyed by child id. Absent in tests and other contexts
    /// that don't want session history written to disk.
    session_logs: Mutex<HashMap<Uuid, Arc<SessionLog>>>,
    persist_session_logs: bool,
}

impl AgentTool {
    pub fn new(
        parent_id: Uuid,
        default_system_prompt: impl Into<String>,
        registry: Arc<AgentRegistry>,
        factory: Arc<dyn ChildConversationFactory>,
        model_resolver: Arc<dyn ModelResolver>,
    ) -> Self {
        Self {
            parent_id,
            default_system_prompt: default_system_prompt.into(),
            registry,
            factory,
            model_resolver,
            initial_session_state: Mutex::new(HashMap::new()),
            session_logs: Mutex::new(HashMap::new()),
            persist_session_logs: false,
        }
    }

    /// Enables persisting each spawned child's initial `SessionState` to a
    /// per-child `SessionLog` under `~/.pi/agent/sessions/`.
    pub fn with_session_logging(mut self) -> Self {
        self.persist_session_logs = true;
        self
    }

    /// `spawn { agent, message, complexity?, result_schema? } -> { agent_id }`.
    /// `parent_effective` is the parent's *current* effective config,
    /// resolved by the caller immediately before this call — clamping is
    /// always computed at spawn time.
    pub async fn spawn(
        &self,
        params: SpawnParams,
        parent_effective: &EffectiveSandboxConfig,
    ) -> Result<Uuid> {
        let definition = find_definition(&params.agent)
            .ok_or_else(|| TauErr::Agent(format!("unknown agent definition: {}", params.agent)))?;

        let effective = clamp(parent_effective, &definition.sandbox);

        let model = params
            .complexity
            .and_then(|c| self.model_resolver.resolve(c));

        let mut system_prompt = self.default_system_prompt.clone();
        system_prompt.push_str(WORKER_DELEGATION_BLOCK);
        system_prompt.push_str("\n\n---\n");
        system_prompt.push_str(&definition.system_prompt);
        if let Some(schema) = &params.result_schema {
            system_prompt.push_str(&format!(
                "\n\n---\nWhen you have your final answer, call `submit_result` exactly once with parameters matching this schema, then stop:\n{schema}"
            ));
        }

        let child = self
            .factory
            .create(ChildSpec {
                agent_type: definition.name.clone(),
                system_prompt,
                effective,
                model,
                result_schema: params.result_schema,
            })
            .await;

        let parent_depth = self.registry.depth_of(self.parent_id).await.unwrap_or(0);
        let (worker, record, events) = AgentWorker::new(&definition.name, parent_depth + 1, effective, child);
        let agent_id = record.id;

        self.registry.insert(worker.clone(), record, Some(self.parent_id)).await;

        let child_state = SessionState {
            session_override: SandboxConfig {
                filesystem_mode: Some(effective.filesystem_mode),
                network_mode: Some(effective.network_mode),
                approval_policy: Some(effective.approval_policy),
                approval_timeout_seconds: Some(effective.approval_timeout_seconds),
                subagent: Some(effective.subagent),
            },
            ..SessionState::new()
        };

        {
            let mut initial = self.initial_session_state.lock().await;
            initial.insert(agent_id, child_state.clone());
        }

        if self.persist_session_logs {
            if let Ok(log) = SessionLog::open(agent_id) {
                let log = Arc::new(log);
                // Best-effort: a failed rollout write never blocks spawning
                // the worker itself.
                let _ = log.append(&child_state).await;
                self.session_logs.lock().await.insert(agent_id, log);
            }
        }

        tokio::spawn(worker.clone().run_event_loop(events));
        worker.prompt(&params.message).await;

        Ok(agent_id)
    }

    /// The `SessionState` recorded for `id` at spawn time, if it is a child
    /// spawned through this tool.
    pub async fn initial_session_state(&self, id: Uuid) -> Option<SessionState> {
        self.initial_session_state.lock().await.get(&id).cloned()
    }

    /// `wait { ids[], timeout_ms? } -> map<id, terminal-status-snapshot>`.
    /// Blocks until every id reaches a terminal state or the timeout
    /// elapses; ids still running at timeout get their current snapshot.
    pub async fn wait(&self, ids: &[Uuid], timeout_ms: Option<u64>) -> HashMap<Uuid, AgentStatus> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_MS).min(MAX_WAIT_MS));

        let futures = ids.iter().map(|&id| {
            let registry = self.registry.clone();
            async move {
                let Some(worker) = registry.get_worker(id).await else {
                    return (id, None);
                };
                let mut rx = worker.subscribe_status();
                loop {
                    if rx.borrow().is_terminal() {
                        return (id, Some(rx.borrow().clone()));
                    }
                    if rx.changed().await.is_err() {
                        return (id, Some(rx.borrow().clone()));
                    }
                }
            }
        });

        let joined = futures::future::join_all(futures);
        let results = match tokio::time::timeout(timeout, joined).await {
            Ok(results) => results,
            Err(_) => {
                // Timed out: collect whatever each agent's current status is.
                let mut out = HashMap::new();
                for &id in ids {
                    if let Some(status) = self.registry.status(id).await {
                        out.insert(id, status);
                    }
                }
                return out;
            }
        };

        results.into_iter().filter_map(|(id, status)| status.map(|s| (id, s))).collect()
    }

    /// `send { id, message, interrupt? }`. Continues the same worker's
    /// conversation; aborts the in-flight turn first when `interrupt`.
    pub async fn send(&self, params: SendParams) -> Result<()> {
        let worker = self
            .registry
            .get_worker(params.id)
            .await
            .ok_or_else(|| TauErr::Agent(format!("unknown agent id: {}", params.id)))?;
        if params.interrupt {
            worker.interrupt().await;
        }
        worker.prompt(&params.message).await;
        Ok(())
    }

    /// `close { id }`. Shuts the worker down; subsequent operations on the
    /// id fail.
    pub async fn close(&self, id: Uuid) -> Result<()> {
        if self.registry.close(id).await {
            self.initial_session_state.lock().await.remove(&id);
            self.session_logs.lock().await.remove(&id);
            Ok(())
        } else {
            Err(TauErr::Agent(format!("unknown agent id: {id}")))
        }
    }

    /// `list {}`. Snapshot of every agent reachable from this session.
    pub async fn list(&self) -> Vec<Agent> {
        self.registry.snapshot_all().await
    }
}
