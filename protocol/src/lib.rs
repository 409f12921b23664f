//! Root of the `tau-protocol` library: the wire-level data model shared
//! between the sandbox/approval/agent core and its hosting UI.

pub mod agent;
pub mod error;
pub mod events;
pub mod sandbox;
pub mod session;

pub use agent::Agent;
pub use agent::AgentDefinition;
pub use agent::AgentStatus;
pub use agent::ToolRecord;
pub use error::PolicyError;
pub use events::Event;
pub use events::EventMsg;
pub use sandbox::ApprovalPolicy;
pub use sandbox::EffectiveSandboxConfig;
pub use sandbox::FilesystemMode;
pub use sandbox::NetworkMode;
pub use sandbox::SandboxConfig;
pub use session::PendingSandboxNotice;
pub use session::SandboxUnavailableDecision;
pub use session::SessionState;
