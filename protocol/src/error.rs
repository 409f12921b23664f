use thiserror::Error;

/// Errors surfaced while decoding or merging [`crate::sandbox::SandboxConfig`]
/// layers. Never silently corrected — every variant names the offending
/// source so the caller can report it back to the user.
#[derive(Debug, Error, Clone)]
pub enum PolicyError {
    #[error("{path}: unknown value {value:?} for this field")]
    UnknownValue { path: String, value: String },

    #[error("{path}: expected {expected}, found {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("{path}: approvalTimeoutSeconds must be a positive integer, got {value}")]
    NonPositiveTimeout { path: String, value: i64 },

    #[error("{path}: unrecognized field {field:?}")]
    UnknownField { path: String, field: String },

    #[error("malformed JSON in {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: std::sync::Arc<serde_json::Error>,
    },
}
