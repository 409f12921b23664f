//! `AgentWorker`: subscribes to a child conversation's events and maintains
//! the corresponding `Agent`'s status, the way an exec-begin/end counter
//! update does for a single command, generalized here to a whole
//! child-session turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use tau_protocol::Agent;
use tau_protocol::AgentStatus;
use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::ToolRecord;
use tau_protocol::agent::duration_to_worked_ms;
use tau_protocol::agent::truncate_chars;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::watch;
use uuid::Uuid;

use super::child::ChildConversation;
use super::child::ChildEvent;
use super::child::StopReason;

/// Formats a tool call's argument preview: the command for `bash`, the path
/// for `read`/`write`/`edit`, a best-effort label for anything else.
pub fn format_args_preview(tool_name: &str, args: &JsonValue) -> String {
    let raw = match tool_name {
        "bash" => args.get("command").and_then(JsonValue::as_str).map(str::to_string),
        "read" | "write" | "edit" => args.get("path").and_then(JsonValue::as_str).map(str::to_string),
        _ => None,
    };
    let text = raw.unwrap_or_else(|| args.to_string());
    truncate_chars(&text, 100)
}

pub struct AgentWorker {
    pub agent_id: Uuid,
    status_tx: watch::Sender<AgentStatus>,
    status_rx: watch::Receiver<AgentStatus>,
    child: Arc<dyn ChildConversation>,
    pending_tools: Mutex<HashMap<String, (String, String, Instant)>>,
    turn_start: Mutex<Option<Instant>>,
}

impl AgentWorker {
    /// Builds the worker, the initial `Agent` record, and a receiver
    /// already subscribed to the child's event stream. `depth` and
    /// `effective` must already be clamped by the caller: the clamp happens
    /// at spawn time, before the worker exists.
    ///
    /// Subscribing here rather than lazily inside `run_event_loop` matters:
    /// a broadcast receiver only observes events sent after it was created,
    /// so subscribing before the caller has any chance to call `prompt` is
    /// what keeps "events observed in submission order" from racing against
    /// the first `submit` call. The receiver
    /// is returned rather than stored so `run_event_loop` can take it by
    /// value, making "at most one event loop per worker" a type-level fact
    /// instead of a runtime check.
    pub fn new(
        agent_type: &str,
        depth: u32,
        effective: EffectiveSandboxConfig,
        child: Arc<dyn ChildConversation>,
    ) -> (Arc<Self>, Agent, broadcast::Receiver<ChildEvent>) {
        let agent = Agent::new(agent_type.to_string(), depth, effective);
        let agent_id = agent.id;
        let (status_tx, status_rx) = watch::channel(agent.status.clone());
        let events = child.subscribe();
        let worker = Arc::new(Self {
            agent_id,
            status_tx,
            status_rx,
            child,
            pending_tools: Mutex::new(HashMap::new()),
            turn_start: Mutex::new(None),
        });
        (worker, agent, events)
    }

    pub fn status(&self) -> AgentStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AgentStatus> {
        self.status_rx.clone()
    }

    pub async fn prompt(&self, message: &str) -> Uuid {
        self.child.submit(message).await
    }

    pub async fn interrupt(&self) {
        self.child.interrupt().await;
    }

    pub async fn shutdown(&self) {
        self.child.shutdown().await;
        self.status_tx.send_replace(AgentStatus::Shutdown);
    }

    /// Drives the subscription loop over the receiver returned by `new`;
    /// spawned once per worker via
    /// `tokio::spawn(worker.clone().run_event_loop(events))`. Returns once
    /// the child reports `AgentEnd` or its event channel closes.
    pub async fn run_event_loop(self: Arc<Self>, mut events: broadcast::Receiver<ChildEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let terminal = self.handle_event(event).await;
                    if terminal {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Applies one event to the running status; returns `true` if the
    /// worker reached a terminal state.
    async fn handle_event(&self, event: ChildEvent) -> bool {
        match event {
            ChildEvent::TurnStart => {
                *self.turn_start.lock().await = Some(Instant::now());
                self.status_tx.send_if_modified(|status| {
                    let (turns, tool_calls, worked_ms, tools) = running_fields(status);
                    *status = AgentStatus::Running {
                        turns: turns + 1,
                        tool_calls,
                        worked_ms,
                        tools,
                    };
                    true
                });
                false
            }
            ChildEvent::TurnEnd => {
                let elapsed = self.turn_start.lock().await.take().map(|start| start.elapsed());
                if let Some(elapsed) = elapsed {
                    self.status_tx.send_if_modified(|status| {
                        let (turns, tool_calls, worked_ms, tools) = running_fields(status);
                        *status = AgentStatus::Running {
                            turns,
                            tool_calls,
                            worked_ms: worked_ms + duration_to_worked_ms(elapsed),
                            tools,
                        };
                        true
                    });
                }
                false
            }
            ChildEvent::ToolStart { call_id, name, args_preview } => {
                self.pending_tools
                    .lock()
                    .await
                    .insert(call_id.clone(), (name.clone(), args_preview.clone(), Instant::now()));
                self.status_tx.send_if_modified(|status| {
                    let (turns, tool_calls, worked_ms, mut tools) = running_fields(status);
                    tools.push(ToolRecord::new(name, args_preview));
                    *status = AgentStatus::Running {
                        turns,
                        tool_calls: tool_calls + 1,
                        worked_ms,
                        tools,
                    };
                    true
                });
                false
            }
            ChildEvent::ToolEnd { call_id, result_preview, is_error } => {
                self.pending_tools.lock().await.remove(&call_id);
                self.status_tx.send_if_modified(|status| {
                    let (turns, tool_calls, worked_ms, mut tools) = running_fields(status);
                    if let Some(last) = tools.last_mut() {
                        *last = std::mem::replace(last, ToolRecord::new(String::new(), String::new()))
                            .finish(result_preview.unwrap_or_default(), is_error.unwrap_or(false));
                    }
                    *status = AgentStatus::Running {
                        turns,
                        tool_calls,
                        worked_ms,
                        tools,
                    };
                    true
                });
                false
            }
            ChildEvent::AgentEnd { stop_reason, message, structured_output } => {
                let running = running_fields(&self.status_rx.borrow());
                let final_status = derive_terminal_status(stop_reason, message, structured_output, running);
                self.status_tx.send_replace(final_status);
                true
            }
        }
    }
}

fn running_fields(status: &AgentStatus) -> (u32, u32, u64, Vec<ToolRecord>) {
    match status {
        AgentStatus::Running { turns, tool_calls, worked_ms, tools } => {
            (*turns, *tool_calls, *worked_ms, tools.clone())
        }
        _ => (0, 0, 0, Vec::new()),
    }
}

/// Derives the terminal status from the child's final event, carrying the
/// last-known running counters forward rather than discarding them — a
/// completed or failed agent still reports how many turns/tools it used.
fn derive_terminal_status(
    stop_reason: StopReason,
    message: Option<String>,
    structured_output: Option<JsonValue>,
    running: (u32, u32, u64, Vec<ToolRecord>),
) -> AgentStatus {
    let (turns, tool_calls, worked_ms, tools) = running;
    match stop_reason {
        StopReason::Error(reason) => AgentStatus::Failed { reason, turns, tool_calls, worked_ms, tools },
        StopReason::AbortedEmpty => AgentStatus::Failed {
            reason: "aborted before response".to_string(),
            turns,
            tool_calls,
            worked_ms,
            tools,
        },
        StopReason::Normal => {
            AgentStatus::Completed { message, structured_output, turns, tool_calls, worked_ms, tools }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    struct FakeChild {
        tx: broadcast::Sender<ChildEvent>,
    }

    #[async_trait::async_trait]
    impl ChildConversation for FakeChild {
        async fn submit(&self, _message: &str) -> Uuid {
            Uuid::new_v4()
        }
        async fn interrupt(&self) {}
        async fn shutdown(&self) {}
        fn subscribe(&self) -> broadcast::Receiver<ChildEvent> {
            self.tx.subscribe()
        }
    }

    #[tokio::test]
    async fn turn_and_tool_events_update_status() {
        let (tx, _rx) = broadcast::channel(16);
        let child: Arc<dyn ChildConversation> = Arc::new(FakeChild { tx: tx.clone() });
        let (worker, agent, events) = AgentWorker::new("finder", 1, EffectiveSandboxConfig::default(), child);
        assert!(matches!(agent.status, AgentStatus::Pending));

        let handle = tokio::spawn(worker.clone().run_event_loop(events));

        tx.send(ChildEvent::TurnStart).unwrap();
        tx.send(ChildEvent::ToolStart {
            call_id: "1".to_string(),
            name: "bash".to_string(),
            args_preview: "ls".to_string(),
        })
        .unwrap();
        tx.send(ChildEvent::ToolEnd { call_id: "1".to_string(), result_preview: Some("ok".to_string()), is_error: Some(false) })
            .unwrap();
        tx.send(ChildEvent::AgentEnd {
            stop_reason: StopReason::Normal,
            message: Some("done".to_string()),
            structured_output: None,
        })
        .unwrap();

        handle.await.unwrap();
        match worker.status() {
            AgentStatus::Completed { message, .. } => assert_eq!(message.as_deref(), Some("done")),
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn aborted_with_no_output_fails_with_reason() {
        let (tx, _rx) = broadcast::channel(16);
        let child: Arc<dyn ChildConversation> = Arc::new(FakeChild { tx: tx.clone() });
        let (worker, _agent, events) = AgentWorker::new("general", 1, EffectiveSandboxConfig::default(), child);
        let handle = tokio::spawn(worker.clone().run_event_loop(events));
        tx.send(ChildEvent::AgentEnd { stop_reason: StopReason::AbortedEmpty, message: None, structured_output: None }).unwrap();
        handle.await.unwrap();
        match worker.status() {
            AgentStatus::Failed { reason, .. } => assert_eq!(reason, "aborted before response"),
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_status_carries_running_counters_forward() {
        let (tx, _rx) = broadcast::channel(16);
        let child: Arc<dyn ChildConversation> = Arc::new(FakeChild { tx: tx.clone() });
        let (worker, _agent, events) = AgentWorker::new("finder", 1, EffectiveSandboxConfig::default(), child);
        let handle = tokio::spawn(worker.clone().run_event_loop(events));

        tx.send(ChildEvent::TurnStart).unwrap();
        tx.send(ChildEvent::ToolStart {
            call_id: "1".to_string(),
            name: "bash".to_string(),
            args_preview: "ls".to_string(),
        })
        .unwrap();
        tx.send(ChildEvent::ToolEnd { call_id: "1".to_string(), result_preview: Some("ok".to_string()), is_error: Some(false) })
            .unwrap();
        tx.send(ChildEvent::AgentEnd {
            stop_reason: StopReason::Error("boom".to_string()),
            message: None,
            structured_output: None,
        })
        .unwrap();

        handle.await.unwrap();
        match worker.status() {
            AgentStatus::Failed { reason, turns, tool_calls, tools, .. } => {
                assert_eq!(reason, "boom");
                assert_eq!(turns, 1);
                assert_eq!(tool_calls, 1);
                assert_eq!(tools.len(), 1);
            }
            other => panic!("expected failed, got {other:?}"),
        }
    }
}
