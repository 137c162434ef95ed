//! Process-wide, TTL-bounded, mutex-serialized cache of live workflow state (§4.A).
use crate::state::{WorkflowMetadata, WorkflowState};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub metadata: WorkflowMetadata,
}

struct Entry {
    state: WorkflowState,
    metadata: WorkflowMetadata,
}

/// In-memory owner of all live workflow state. All operations serialize
/// across one mutex so that a reader always observes a consistent
/// `(state, metadata)` pair (§4.A contract).
pub struct WorkflowStateStore {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl WorkflowStateStore {
    pub fn new(default_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        })
    }

    /// Stores a snapshot, stamping `updated_at = now`.
    pub fn store(&self, id: &str, state: WorkflowState, mut metadata: WorkflowMetadata) {
        metadata.touch();
        let mut guard = self.entries.lock();
        guard.insert(id.to_string(), Entry { state, metadata });
    }

    pub fn get_state(&self, id: &str) -> Option<WorkflowState> {
        self.entries.lock().get(id).map(|e| e.state.clone())
    }

    pub fn get_metadata(&self, id: &str) -> Option<WorkflowMetadata> {
        self.entries.lock().get(id).map(|e| e.metadata.clone())
    }

    pub fn get(&self, id: &str) -> Option<(WorkflowState, WorkflowMetadata)> {
        self.entries
            .lock()
            .get(id)
            .map(|e| (e.state.clone(), e.metadata.clone()))
    }

    pub fn list(&self) -> Vec<WorkflowSummary> {
        self.entries
            .lock()
            .iter()
            .map(|(id, e)| WorkflowSummary {
                workflow_id: id.clone(),
                metadata: e.metadata.clone(),
            })
            .collect()
    }

    pub fn delete(&self, id: &str) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Evicts any workflow whose `updated_at` is older than `default_ttl`.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.default_ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut guard = self.entries.lock();
        let before = guard.len();
        guard.retain(|id, e| {
            let age = now - e.metadata.updated_at;
            let keep = age < ttl;
            if !keep {
                debug!(workflow_id = %id, "evicting expired workflow from state store");
            }
            keep
        });
        before - guard.len()
    }

    /// Spawns the hourly-by-default sweep task; returns its join handle so
    /// the caller owns its lifetime explicitly rather than relying on a
    /// hidden module-level background task (§9 design note).
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = store.sweep();
                if evicted > 0 {
                    info!(evicted, "state store TTL sweep evicted workflows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ReleaseState, WorkflowKind};

    fn meta(id: &str) -> WorkflowMetadata {
        WorkflowMetadata::new(id, WorkflowKind::Release, "start")
    }

    #[test]
    fn store_and_get_round_trip() {
        let store = WorkflowStateStore::new(Duration::from_secs(3600));
        let state = WorkflowState::Release(ReleaseState::new("wf-1"));
        store.store("wf-1", state, meta("wf-1"));
        assert!(store.get_state("wf-1").is_some());
        assert!(store.get_metadata("wf-1").is_some());
    }

    #[test]
    fn delete_reports_existence() {
        let store = WorkflowStateStore::new(Duration::from_secs(3600));
        store.store(
            "wf-1",
            WorkflowState::Release(ReleaseState::new("wf-1")),
            meta("wf-1"),
        );
        assert!(store.delete("wf-1"));
        assert!(!store.delete("wf-1"));
    }

    #[test]
    fn sweep_evicts_stale_entries() {
        let store = WorkflowStateStore::new(Duration::from_millis(1));
        store.store(
            "wf-1",
            WorkflowState::Release(ReleaseState::new("wf-1")),
            meta("wf-1"),
        );
        std::thread::sleep(Duration::from_millis(5));
        let evicted = store.sweep();
        assert_eq!(evicted, 1);
        assert!(!store.contains("wf-1"));
    }

    #[test]
    fn list_returns_stable_copies() {
        let store = WorkflowStateStore::new(Duration::from_secs(3600));
        store.store(
            "wf-1",
            WorkflowState::Release(ReleaseState::new("wf-1")),
            meta("wf-1"),
        );
        let summaries = store.list();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].workflow_id, "wf-1");
    }
}
