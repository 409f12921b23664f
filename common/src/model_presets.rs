use tau_core::agent::Complexity;
use tau_core::agent::ModelResolver;

/// A simple preset pairing a model slug with the complexity tier it answers
/// for. `spawn`'s optional `complexity` resolves against the parent's
/// model-resolution policy via this table.
#[derive(Debug, Clone, Copy)]
pub struct ModelPreset {
    /// Stable identifier for the preset.
    pub id: &'static str,
    /// Display label shown in UIs.
    pub label: &'static str,
    /// Short human description shown next to the label in UIs.
    pub description: &'static str,
    /// Model slug (e.g., "gpt-5").
    pub model: &'static str,
    /// The complexity tier this preset answers for.
    pub complexity: Complexity,
}

/// Built-in list of model presets, one per `Complexity` tier.
pub fn builtin_model_presets() -> &'static [ModelPreset] {
    const PRESETS: &[ModelPreset] = &[
        ModelPreset {
            id: "gpt-5-low",
            label: "gpt-5 low",
            description: "— fastest responses with limited reasoning; ideal for narrowly scoped worker tasks",
            model: "gpt-5",
            complexity: Complexity::Low,
        },
        ModelPreset {
            id: "gpt-5-medium",
            label: "gpt-5 medium",
            description: "— default setting; balances reasoning depth and latency for general-purpose worker tasks",
            model: "gpt-5",
            complexity: Complexity::Medium,
        },
        ModelPreset {
            id: "gpt-5-high",
            label: "gpt-5 high",
            description: "— maximizes reasoning depth for complex or ambiguous worker tasks",
            model: "gpt-5",
            complexity: Complexity::High,
        },
    ];
    PRESETS
}

/// A `ModelResolver` backed by `builtin_model_presets`.
pub struct PresetModelResolver;

impl ModelResolver for PresetModelResolver {
    fn resolve(&self, complexity: Complexity) -> Option<String> {
        builtin_model_presets()
            .iter()
            .find(|preset| preset.complexity == complexity)
            .map(|preset| preset.model.to_string())
    }
}
