//! Crash-safe on-disk snapshots: one JSON file per workflow at
//! `<data_root>/workflows/<id>.json` (§4.B, §6 persisted state layout).
use crate::errors::{PersistenceError, PersistenceResult};
use crate::state::{WorkflowMetadata, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    metadata: WorkflowMetadata,
    state: WorkflowState,
    saved_at: DateTime<Utc>,
}

/// Best-effort, crash-safe persistence of workflow snapshots.
///
/// `save` never propagates an error to its caller: persistence errors are
/// logged and swallowed because the in-memory store remains authoritative
/// (§4.B failure semantics).
pub struct WorkflowPersistence {
    root: PathBuf,
}

impl WorkflowPersistence {
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            root: data_root.as_ref().join("workflows"),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Writes a snapshot via write-temp-then-rename so readers never observe
    /// a partially-written file.
    pub fn save(&self, id: &str, state: &WorkflowState, metadata: &WorkflowMetadata) {
        if let Err(e) = self.try_save(id, state, metadata) {
            error!(workflow_id = %id, error = %e, "failed to persist workflow snapshot");
        }
    }

    fn try_save(&self, id: &str, state: &WorkflowState, metadata: &WorkflowMetadata) -> PersistenceResult<()> {
        std::fs::create_dir_all(&self.root)?;
        let snapshot = Snapshot {
            metadata: metadata.clone(),
            state: state.clone(),
            saved_at: Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = self.root.join(format!(".{id}.{}.tmp", Uuid::new_v4()));
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, self.path_for(id))?;
        Ok(())
    }

    /// Loads a snapshot; returns `None` if absent or malformed. Malformed
    /// files are logged, never propagated as an error to the caller.
    pub fn load(&self, id: &str) -> Option<(WorkflowState, WorkflowMetadata)> {
        let path = self.path_for(id);
        let content = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "failed to read workflow snapshot");
                return None;
            }
        };
        match serde_json::from_slice::<Snapshot>(&content) {
            Ok(snap) => Some((snap.state, snap.metadata)),
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "malformed workflow snapshot, ignoring");
                None
            }
        }
    }

    pub fn delete(&self, id: &str) -> PersistenceResult<()> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ReleaseState, WorkflowKind};
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let persistence = WorkflowPersistence::new(dir.path());
        let state = WorkflowState::Release(ReleaseState::new("wf-1"));
        let metadata = WorkflowMetadata::new("wf-1", WorkflowKind::Release, "start");

        persistence.save("wf-1", &state, &metadata);
        let (loaded_state, loaded_meta) = persistence.load("wf-1").expect("snapshot should exist");
        assert_eq!(loaded_state.workflow_id(), "wf-1");
        assert_eq!(loaded_meta.workflow_id, "wf-1");
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let persistence = WorkflowPersistence::new(dir.path());
        assert!(persistence.load("does-not-exist").is_none());
    }

    #[test]
    fn load_malformed_file_returns_none_not_panic() {
        let dir = tempdir().unwrap();
        let persistence = WorkflowPersistence::new(dir.path());
        std::fs::create_dir_all(dir.path().join("workflows")).unwrap();
        std::fs::write(dir.path().join("workflows/broken.json"), b"not json").unwrap();
        assert!(persistence.load("broken").is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let persistence = WorkflowPersistence::new(dir.path());
        let state = WorkflowState::Release(ReleaseState::new("wf-1"));
        let metadata = WorkflowMetadata::new("wf-1", WorkflowKind::Release, "start");
        persistence.save("wf-1", &state, &metadata);
        assert!(persistence.delete("wf-1").is_ok());
        assert!(persistence.delete("wf-1").is_ok());
    }
}
