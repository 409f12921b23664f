//! `AgentRegistry`: the id-keyed, tree-shaped store of live `AgentWorker`s
//! for one session — a `HashMap<Uuid, Arc<...>>` behind a lock, inserted on
//! spawn and removed on shutdown, with a parent/child tree layered on top
//! (agents form a rooted tree; no sibling references exist).

use std::collections::HashMap;
use std::sync::Arc;

use tau_protocol::Agent;
use tau_protocol::AgentStatus;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::lifecycle::AgentWorker;

struct Entry {
    worker: Arc<AgentWorker>,
    record: Agent,
    parent: Option<Uuid>,
}

/// Holds every agent reachable from one session's tree: the registry is
/// per-session, not process-wide. A parent may read any child's status;
/// there are no sibling references.
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, worker: Arc<AgentWorker>, record: Agent, parent: Option<Uuid>) {
        let id = record.id;
        self.entries.write().await.insert(id, Entry { worker, record, parent });
    }

    pub async fn get_worker(&self, id: Uuid) -> Option<Arc<AgentWorker>> {
        self.entries.read().await.get(&id).map(|e| e.worker.clone())
    }

    /// A snapshot of `{ agent_id -> (depth, status) }`-equivalent info for
    /// every agent currently known to this registry.
    pub async fn snapshot_all(&self) -> Vec<Agent> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| Agent { status: e.worker.status(), ..e.record.clone() })
            .collect()
    }

    pub async fn depth_of(&self, id: Uuid) -> Option<u32> {
        self.entries.read().await.get(&id).map(|e| e.record.depth)
    }

    /// Releases one agent's resources: shuts its worker down and removes it
    /// from the registry. Subsequent operations on `id` fail to find it.
    pub async fn close(&self, id: Uuid) -> bool {
        let worker = { self.entries.write().await.remove(&id).map(|e| e.worker) };
        match worker {
            Some(worker) => {
                worker.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Cascades shutdown to every descendant of `root` (including `root`
    /// itself); innermost-first is not required since shutdown is
    /// idempotent per agent.
    pub async fn shutdown_tree(&self, root: Uuid) {
        let ids = self.descendant_ids(root).await;
        for id in ids {
            self.close(id).await;
        }
        self.close(root).await;
    }

    /// Cascades shutdown to every agent currently known to this registry
    /// (a session end cascades to the whole tree).
    pub async fn shutdown_all(&self) {
        let ids: Vec<Uuid> = self.entries.read().await.keys().copied().collect();
        for id in ids {
            self.close(id).await;
        }
    }

    async fn descendant_ids(&self, root: Uuid) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        let mut out = Vec::new();
        let mut frontier = vec![root];
        while let Some(id) = frontier.pop() {
            for (candidate_id, entry) in entries.iter() {
                if entry.parent == Some(id) {
                    out.push(*candidate_id);
                    frontier.push(*candidate_id);
                }
            }
        }
        out
    }

    pub async fn status(&self, id: Uuid) -> Option<AgentStatus> {
        let worker = self.get_worker(id).await?;
        Some(worker.status())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tau_protocol::EffectiveSandboxConfig;
    use tokio::sync::broadcast;

    use super::*;
    use crate::agent::child::ChildConversation;
    use crate::agent::child::ChildEvent;
    use crate::agent::lifecycle::AgentWorker;

    struct NoopChild {
        tx: broadcast::Sender<ChildEvent>,
    }

    #[async_trait::async_trait]
    impl ChildConversation for NoopChild {
        async fn submit(&self, _message: &str) -> Uuid {
            Uuid::new_v4()
        }
        async fn interrupt(&self) {}
        async fn shutdown(&self) {}
        fn subscribe(&self) -> broadcast::Receiver<ChildEvent> {
            self.tx.subscribe()
        }
    }

    fn make_worker() -> (Arc<AgentWorker>, Agent) {
        let (tx, _rx) = broadcast::channel(4);
        let child: Arc<dyn ChildConversation> = Arc::new(NoopChild { tx });
        let (worker, agent, _events) = AgentWorker::new("general", 1, EffectiveSandboxConfig::default(), child);
        (worker, agent)
    }

    #[tokio::test]
    async fn close_removes_from_registry_and_shuts_down() {
        let registry = AgentRegistry::new();
        let (worker, record) = make_worker();
        let id = record.id;
        registry.insert(worker, record, None).await;
        assert!(registry.get_worker(id).await.is_some());
        assert!(registry.close(id).await);
        assert!(registry.get_worker(id).await.is_none());
        assert!(!registry.close(id).await);
    }

    #[tokio::test]
    async fn shutdown_tree_cascades_to_descendants() {
        let registry = AgentRegistry::new();
        let (parent_worker, parent_record) = make_worker();
        let parent_id = parent_record.id;
        registry.insert(parent_worker, parent_record, None).await;

        let (child_worker, child_record) = make_worker();
        let child_id = child_record.id;
        registry.insert(child_worker, child_record, Some(parent_id)).await;

        registry.shutdown_tree(parent_id).await;
        assert!(registry.get_worker(parent_id).await.is_none());
        assert!(registry.get_worker(child_id).await.is_none());
    }

    #[tokio::test]
    async fn snapshot_all_reports_every_agent() {
        let registry = AgentRegistry::new();
        let (w1, r1) = make_worker();
        let (w2, r2) = make_worker();
        registry.insert(w1, r1.clone(), None).await;
        registry.insert(w2, r2.clone(), Some(r1.id)).await;
        let snapshot = registry.snapshot_all().await;
        assert_eq!(snapshot.len(), 2);
    }
}
