//! The abstract child-session hook. Driving an actual model turn loop
//! (token streaming, tool dispatch, provider calls) is out of scope for
//! this crate — whatever hosts a real model client implements
//! `ChildConversation` and this crate only aggregates the status it
//! reports.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Normal,
    Error(String),
    AbortedEmpty,
}

/// One event a driven child session reports upward, in submission order.
#[derive(Debug, Clone)]
pub enum ChildEvent {
    TurnStart,
    TurnEnd,
    ToolStart { call_id: String, name: String, args_preview: String },
    ToolEnd { call_id: String, result_preview: Option<String>, is_error: Option<bool> },
    AgentEnd { stop_reason: StopReason, message: Option<String>, structured_output: Option<JsonValue> },
}

/// The driven child conversation a worker wraps. `submit` enqueues a user
/// message and returns a fresh submission id immediately; status updates
/// stream out through whatever channel the `AgentWorker` subscribed via
/// when the conversation was created.
#[async_trait]
pub trait ChildConversation: Send + Sync {
    async fn submit(&self, message: &str) -> Uuid;
    async fn interrupt(&self);
    async fn shutdown(&self);

    /// A fresh receiver observing this conversation's events from the point
    /// of subscription onward. Called once, by the `AgentWorker` that owns
    /// this conversation, right after creation.
    fn subscribe(&self) -> broadcast::Receiver<ChildEvent>;
}
