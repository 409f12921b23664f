//! The sandbox-state notifier: injects `SANDBOX_STATE`/`SANDBOX_CHANGE`
//! lines as the first content part of the latest user message, once per
//! config change, and a one-time system-prompt suffix explaining the
//! convention.

use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::Event;
use tau_protocol::EventMsg;
use tau_protocol::PendingSandboxNotice;
use tau_protocol::SessionState;
use uuid::Uuid;

pub const PERMISSIONS_SYSTEM_PROMPT_SUFFIX: &str = "\n\n---\nSandbox permissions: every turn may carry a `SANDBOX_STATE: ...` or `SANDBOX_CHANGE: ...` line as the first part of the user message. These lines are authoritative and supersede any earlier belief about filesystem or network access. `fs` is one of read-only/workspace-write/danger-full-access; `net` is deny/allow-all; `approval` governs whether a bash command may run without a prompt. A tool-output line beginning `SANDBOX_DIAGNOSTIC=` reports a sandbox-caused command failure as machine-readable JSON.";

/// One content-part injection to prepend to the latest user message, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub text: String,
}

/// Runs the notifier state machine against `state` for one `beforeTurn`/
/// `contextBuild` pass, returning the system-prompt suffix to append (first
/// turn only) and the user-message injection to prepend (if any), mutating
/// `state` exactly as the table specifies.
pub struct SandboxStateNotifier;

impl SandboxStateNotifier {
    /// `before_turn`: appends the permissions block to the system prompt
    /// exactly once per session.
    pub fn before_turn(state: &mut SessionState) -> Option<&'static str> {
        if state.system_prompt_injected {
            return None;
        }
        state.system_prompt_injected = true;
        Some(PERMISSIONS_SYSTEM_PROMPT_SUFFIX)
    }

    /// Call whenever the effective config may have changed (e.g. after a
    /// `sandbox set` command, or a worker spawn's clamp). Queues a pending
    /// notice if the new hash differs from both the previous and the last
    /// communicated one; clears it if the config reverted to what was last
    /// communicated. Returns a UI-only `SandboxChangeDisplay` event the host
    /// can render immediately — it carries the same text as the queued
    /// notice but must never reach model-visible context; see
    /// `strip_ui_only_entries`.
    pub fn on_config_change(state: &mut SessionState, next: &EffectiveSandboxConfig) -> Option<Event> {
        let next_hash = next.fingerprint();

        if state.last_communicated_hash.as_deref() == Some(next_hash.as_str()) {
            state.pending_sandbox_notice = None;
            return None;
        }

        if !state.system_prompt_injected {
            // No communicated state yet; context_build's first-ever path
            // handles the initial SANDBOX_STATE line instead.
            return None;
        }

        let summary = next.describe();
        state.pending_sandbox_notice = Some(PendingSandboxNotice {
            hash: next_hash.clone(),
            text: format!("SANDBOX_CHANGE: {summary}"),
        });

        Some(Event {
            id: Uuid::new_v4().to_string(),
            msg: EventMsg::SandboxChangeDisplay { summary },
        })
    }

    /// Drops UI-only events (currently `SandboxChangeDisplay`) from a batch
    /// before it is folded into model-visible context.
    pub fn strip_ui_only_entries(events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter(|e| !e.msg.is_ui_only()).collect()
    }

    /// `context_build`: returns the injection to prepend to the latest user
    /// message for this turn, if any, mutating `state` per the table. Must
    /// be called with the config that will actually be in effect for this
    /// turn (the caller resolves clamps/overrides first).
    pub fn context_build(state: &mut SessionState, current: &EffectiveSandboxConfig) -> Option<Injection> {
        if state.last_communicated_hash.is_none() {
            let hash = current.fingerprint();
            state.last_communicated_hash = Some(hash);
            return Some(Injection { text: format!("SANDBOX_STATE: {}", current.describe()) });
        }

        if let Some(pending) = state.pending_sandbox_notice.take() {
            state.last_communicated_hash = Some(pending.hash);
            return Some(Injection { text: pending.text });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tau_protocol::FilesystemMode;

    #[test]
    fn first_turn_injects_system_prompt_once() {
        let mut state = SessionState::new();
        assert!(SandboxStateNotifier::before_turn(&mut state).is_some());
        assert!(SandboxStateNotifier::before_turn(&mut state).is_none());
    }

    #[test]
    fn first_context_build_injects_sandbox_state() {
        let mut state = SessionState::new();
        let cfg = EffectiveSandboxConfig::default();
        let injection = SandboxStateNotifier::context_build(&mut state, &cfg).unwrap();
        assert!(injection.text.starts_with("SANDBOX_STATE:"));
        assert_eq!(state.last_communicated_hash, Some(cfg.fingerprint()));
    }

    #[test]
    fn config_change_after_prompt_injected_queues_notice_once() {
        let mut state = SessionState::new();
        let initial = EffectiveSandboxConfig::default();
        SandboxStateNotifier::before_turn(&mut state);
        SandboxStateNotifier::context_build(&mut state, &initial);

        let mut changed = initial;
        changed.filesystem_mode = FilesystemMode::ReadOnly;
        SandboxStateNotifier::on_config_change(&mut state, &changed);
        assert!(state.pending_sandbox_notice.is_some());

        let injection = SandboxStateNotifier::context_build(&mut state, &changed).unwrap();
        assert!(injection.text.starts_with("SANDBOX_CHANGE:"));
        assert_eq!(state.last_communicated_hash, Some(changed.fingerprint()));
        assert!(state.pending_sandbox_notice.is_none());

        // No further change: no more injections.
        assert!(SandboxStateNotifier::context_build(&mut state, &changed).is_none());
    }

    #[test]
    fn config_change_emits_ui_only_display_event() {
        let mut state = SessionState::new();
        let initial = EffectiveSandboxConfig::default();
        SandboxStateNotifier::before_turn(&mut state);
        SandboxStateNotifier::context_build(&mut state, &initial);

        let mut changed = initial;
        changed.filesystem_mode = FilesystemMode::ReadOnly;
        let event = SandboxStateNotifier::on_config_change(&mut state, &changed).unwrap();
        assert!(event.msg.is_ui_only());
    }

    #[test]
    fn strip_ui_only_entries_drops_display_events_only() {
        let kept = tau_protocol::Event {
            id: "1".to_string(),
            msg: tau_protocol::EventMsg::BackgroundEvent { message: "hi".to_string() },
        };
        let dropped = tau_protocol::Event {
            id: "2".to_string(),
            msg: tau_protocol::EventMsg::SandboxChangeDisplay { summary: "fs=read-only".to_string() },
        };
        let stripped = SandboxStateNotifier::strip_ui_only_entries(vec![kept.clone(), dropped]);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped[0].id, kept.id);
    }

    #[test]
    fn config_reverting_to_communicated_hash_clears_pending() {
        let mut state = SessionState::new();
        let initial = EffectiveSandboxConfig::default();
        SandboxStateNotifier::before_turn(&mut state);
        SandboxStateNotifier::context_build(&mut state, &initial);

        let mut changed = initial;
        changed.filesystem_mode = FilesystemMode::ReadOnly;
        SandboxStateNotifier::on_config_change(&mut state, &changed);
        assert!(state.pending_sandbox_notice.is_some());

        // Reverts before the pending notice is ever surfaced.
        SandboxStateNotifier::on_config_change(&mut state, &initial);
        assert!(state.pending_sandbox_notice.is_none());
        assert!(SandboxStateNotifier::context_build(&mut state, &initial).is_none());
    }

    #[test]
    fn exactly_one_injection_per_changed_turn() {
        let mut state = SessionState::new();
        let initial = EffectiveSandboxConfig::default();
        SandboxStateNotifier::before_turn(&mut state);

        for turn in 0..3 {
            let cfg = if turn == 1 {
                let mut c = initial;
                c.network_mode = tau_protocol::NetworkMode::AllowAll;
                SandboxStateNotifier::on_config_change(&mut state, &c);
                c
            } else {
                initial
            };
            let injection = SandboxStateNotifier::context_build(&mut state, &cfg);
            if turn == 0 || turn == 1 {
                assert!(injection.is_some(), "turn {turn} should inject");
            } else {
                assert!(injection.is_none(), "turn {turn} should not inject");
            }
        }
    }
}
