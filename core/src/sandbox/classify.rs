//! `classify_sandbox_failure`: recognises canonical sandbox denial messages
//! and common downstream errors so the bash tool can decide whether a
//! non-zero exit was sandbox-caused and worth a corrective hint.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Filesystem,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub evidence: String,
}

const NETWORK_MARKERS: &[&str] = &[
    "Temporary failure in name resolution",
    "Could not resolve host",
    "Name or service not known",
    "Network is unreachable",
    "Connection refused",
    "could not connect",
    "nodename nor servname provided",
];

const DNS_MARKERS: &[&str] = &[
    "Temporary failure in name resolution",
    "Could not resolve host",
    "Name or service not known",
    "nodename nor servname provided",
];

const FILESYSTEM_MARKERS: &[&str] = &[
    "Read-only file system",
    "Permission denied",
    "Operation not permitted",
];

/// Extracts a single-line excerpt from `output` suitable for inclusion in a
/// diagnostic: the first line that matches one of the given markers, or the
/// last non-empty line as a fallback.
fn excerpt(output: &str, markers: &[&str]) -> String {
    for line in output.lines() {
        if markers.iter().any(|m| line.contains(m)) {
            return line.trim().to_string();
        }
    }
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Idempotent and depends only on the output string.
pub fn classify_sandbox_failure(output: &str) -> Classification {
    if NETWORK_MARKERS.iter().any(|m| output.contains(m)) {
        let is_dns = DNS_MARKERS.iter().any(|m| output.contains(m));
        return Classification {
            kind: FailureKind::Network,
            subtype: if is_dns {
                Some("dns".to_string())
            } else {
                Some("connect".to_string())
            },
            evidence: excerpt(output, NETWORK_MARKERS),
        };
    }

    if FILESYSTEM_MARKERS.iter().any(|m| output.contains(m)) {
        return Classification {
            kind: FailureKind::Filesystem,
            subtype: Some("write".to_string()),
            evidence: excerpt(output, FILESYSTEM_MARKERS),
        };
    }

    Classification {
        kind: FailureKind::Unknown,
        subtype: None,
        evidence: excerpt(output, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_dns_failure_as_network() {
        let out = "curl: (6) Could not resolve host: example.com";
        let c = classify_sandbox_failure(out);
        assert_eq!(c.kind, FailureKind::Network);
        assert_eq!(c.subtype.as_deref(), Some("dns"));
    }

    #[test]
    fn classifies_read_only_fs_as_filesystem() {
        let out = "touch: cannot touch 'x': Read-only file system";
        let c = classify_sandbox_failure(out);
        assert_eq!(c.kind, FailureKind::Filesystem);
    }

    #[test]
    fn unknown_when_no_marker_matches() {
        let out = "segmentation fault";
        let c = classify_sandbox_failure(out);
        assert_eq!(c.kind, FailureKind::Unknown);
    }

    #[test]
    fn idempotent_and_deterministic() {
        let out = "Operation not permitted";
        assert_eq!(
            classify_sandbox_failure(out),
            classify_sandbox_failure(out)
        );
    }

    #[test]
    fn bare_permission_denial_classifies_as_filesystem_not_network() {
        let out = "mkdir: cannot create directory 'x': Operation not permitted";
        let c = classify_sandbox_failure(out);
        assert_eq!(c.kind, FailureKind::Filesystem);
    }
}
