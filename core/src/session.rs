//! `SessionLog`: an append-only JSONL record of `SessionState` snapshots,
//! the rollout-equivalent of a conversation history but scoped to just the
//! sandbox-state slice this crate owns. One file per session id, written in
//! the same atomic-ish append style `settings.rs` uses for its layered
//! config, minus the rename dance since this is a pure log, never rewritten.

use std::fs;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tau_protocol::SessionState;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;

pub const SESSIONS_RELATIVE_DIR: &str = ".pi/agent/sessions";

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp_unix_ms: u128,
    session_id: Uuid,
    state: &'a SessionState,
}

/// An append-only JSONL log of `SessionState` snapshots for one session id.
/// Each `append` writes exactly one line; nothing is ever rewritten.
pub struct SessionLog {
    session_id: Uuid,
    path: PathBuf,
    file: Mutex<File>,
}

impl SessionLog {
    /// `~/.pi/agent/sessions/<id>.jsonl`.
    pub fn default_path(session_id: Uuid) -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            crate::error::TauErr::Io(std::io::Error::other("could not determine home directory"))
        })?;
        Ok(home.join(SESSIONS_RELATIVE_DIR).join(format!("{session_id}.jsonl")))
    }

    /// Opens (creating if absent) the default per-user log file for
    /// `session_id`, positioned for appending.
    pub fn open(session_id: Uuid) -> Result<Self> {
        Self::open_at(Self::default_path(session_id)?, session_id)
    }

    /// Opens a log file at an explicit path, creating its parent directory
    /// and the file itself if they don't exist yet.
    pub fn open_at(path: PathBuf, session_id: Uuid) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { session_id, path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Appends one snapshot as a single JSON line, flushing before return so
    /// a crash right after `append` never loses the entry.
    pub async fn append(&self, state: &SessionState) -> Result<()> {
        let timestamp_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let entry = LogEntry { timestamp_unix_ms, session_id: self.session_id, state };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Reads back every entry's `SessionState`, in append order. Used by
    /// tests and by a host resuming a session after a restart.
    pub fn read_all(&self) -> Result<Vec<SessionState>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| -> Result<SessionState> {
                let value: serde_json::Value = serde_json::from_str(line)?;
                let state = value
                    .get("state")
                    .cloned()
                    .ok_or_else(|| crate::error::TauErr::Agent("log entry missing state".to_string()))?;
                Ok(serde_json::from_value(state)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = Uuid::new_v4();
        let path = dir.path().join("log.jsonl");
        let log = SessionLog::open_at(path, session_id).unwrap();

        let mut first = SessionState::new();
        first.system_prompt_injected = true;
        log.append(&first).await.unwrap();

        let mut second = SessionState::new();
        second.last_communicated_hash = Some("abc".to_string());
        log.append(&second).await.unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].system_prompt_injected);
        assert_eq!(entries[1].last_communicated_hash.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::open_at(dir.path().join("absent.jsonl"), Uuid::new_v4()).unwrap();
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn default_path_is_scoped_by_session_id() {
        let id = Uuid::new_v4();
        let path = SessionLog::default_path(id).unwrap();
        assert!(path.to_string_lossy().contains(&id.to_string()));
        assert!(path.to_string_lossy().contains(".pi/agent/sessions"));
    }
}
