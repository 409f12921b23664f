#[cfg(feature = "cli")]
mod approval_mode_cli_arg;

#[cfg(feature = "elapsed")]
pub mod elapsed;

#[cfg(feature = "sandbox_summary")]
mod sandbox_summary;

#[cfg(feature = "model_presets")]
mod model_presets;

#[cfg(feature = "cli")]
pub use approval_mode_cli_arg::ApprovalModeCliArg;
#[cfg(feature = "cli")]
pub use approval_mode_cli_arg::FilesystemModeCliArg;
#[cfg(feature = "cli")]
pub use approval_mode_cli_arg::NetworkModeCliArg;

#[cfg(feature = "sandbox_summary")]
pub use sandbox_summary::summarize_sandbox_config;

#[cfg(feature = "model_presets")]
pub use model_presets::ModelPreset;
#[cfg(feature = "model_presets")]
pub use model_presets::PresetModelResolver;
#[cfg(feature = "model_presets")]
pub use model_presets::builtin_model_presets;
