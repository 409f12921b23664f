//! Worker-agent lifecycle and scheduling: a nested tree of sandboxed child
//! sessions spawned, watched, and torn down through the `agent` tool.

pub mod child;
pub mod definitions;
pub mod lifecycle;
pub mod registry;
pub mod tool;

pub use child::ChildConversation;
pub use child::ChildEvent;
pub use child::StopReason;
pub use definitions::builtin_definitions;
pub use definitions::find_definition;
pub use lifecycle::AgentWorker;
pub use registry::AgentRegistry;
pub use tool::AgentTool;
pub use tool::ChildConversationFactory;
pub use tool::ChildSpec;
pub use tool::Complexity;
pub use tool::ModelResolver;
pub use tool::SendParams;
pub use tool::SpawnParams;
