//! Drives one workflow kind's compiled graph: start/resume/pause/cancel,
//! status and list queries, and event streaming (§4.E).
use crate::errors::{WorkflowError, WorkflowResult};
use crate::graph::Graph;
use crate::persistence::WorkflowPersistence;
use crate::runtime::{astream, terminal_status, RuntimeEvent};
use crate::state::{WorkflowKind, WorkflowMetadata, WorkflowState, WorkflowStatus};
use crate::workflow_store::{WorkflowStateStore, WorkflowSummary};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

#[derive(Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Pause,
    Cancel,
}

struct TaskHandle {
    stop_reason: Arc<Mutex<Option<StopReason>>>,
    cancel_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<RuntimeEvent>,
    #[allow(dead_code)]
    join: JoinHandle<()>,
}

/// Owns the live driver tasks for one workflow kind (one `WorkflowManager`
/// per kind, per the registry's §4.F design).
pub struct WorkflowManager {
    kind: WorkflowKind,
    graph: Graph,
    store: Arc<WorkflowStateStore>,
    persistence: Arc<WorkflowPersistence>,
    tasks: Mutex<HashMap<String, TaskHandle>>,
    #[allow(dead_code)]
    flush_task: JoinHandle<()>,
}

impl WorkflowManager {
    pub fn new(
        kind: WorkflowKind,
        graph: Graph,
        store: Arc<WorkflowStateStore>,
        persistence: Arc<WorkflowPersistence>,
        flush_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let flush_task = tokio::spawn(async move {
                let mut interval = tokio::time::interval(flush_interval);
                loop {
                    interval.tick().await;
                    if let Some(manager) = weak.upgrade() {
                        manager.flush_to_disk();
                    } else {
                        break;
                    }
                }
            });
            Self {
                kind,
                graph,
                store,
                persistence,
                tasks: Mutex::new(HashMap::new()),
                flush_task,
            }
        })
    }

    fn flush_to_disk(&self) {
        for summary in self.store.list() {
            if let Some(state) = self.store.get_state(&summary.workflow_id) {
                self.persistence.save(&summary.workflow_id, &state, &summary.metadata);
            }
        }
    }

    /// Starts a fresh workflow at the graph's entry point.
    pub fn start(self: &Arc<Self>, initial_state: WorkflowState) -> WorkflowResult<String> {
        let id = initial_state.workflow_id().to_string();
        let metadata = WorkflowMetadata::new(id.clone(), self.kind, self.graph.entry());
        self.store.store(&id, initial_state.clone(), metadata);
        self.spawn_driver(id.clone(), initial_state, None);
        Ok(id)
    }

    /// Resumes a paused workflow from its last persisted step.
    pub fn resume(self: &Arc<Self>, id: &str) -> WorkflowResult<()> {
        let (mut state, mut metadata) = self.load(id)?;
        if metadata.status != WorkflowStatus::Paused {
            return Err(WorkflowError::NotPaused(id.to_string()));
        }
        state.set_workflow_paused(false);
        metadata.status = WorkflowStatus::Running;
        let start_node = state.current_step().to_string();
        self.store.store(id, state.clone(), metadata);
        self.spawn_driver(id.to_string(), state, Some(start_node));
        Ok(())
    }

    fn load(&self, id: &str) -> WorkflowResult<(WorkflowState, WorkflowMetadata)> {
        if let Some(pair) = self.store.get(id) {
            return Ok(pair);
        }
        if let Some((state, metadata)) = self.persistence.load(id) {
            self.store.store(id, state.clone(), metadata.clone());
            return Ok((state, metadata));
        }
        Err(WorkflowError::NotFound(id.to_string()))
    }

    fn request_stop(&self, id: &str, reason: StopReason) -> WorkflowResult<()> {
        let tasks = self.tasks.lock();
        match tasks.get(id) {
            Some(handle) => {
                *handle.stop_reason.lock() = Some(reason);
                let _ = handle.cancel_tx.send(true);
                Ok(())
            }
            None => {
                if self.store.contains(id) {
                    Err(WorkflowError::AlreadyTerminal(id.to_string()))
                } else {
                    Err(WorkflowError::NotFound(id.to_string()))
                }
            }
        }
    }

    /// Cooperatively pauses a running workflow; it may be resumed later.
    pub fn pause(&self, id: &str) -> WorkflowResult<()> {
        self.request_stop(id, StopReason::Pause)
    }

    /// Cooperatively cancels a running workflow; cancellation is terminal.
    pub fn cancel(&self, id: &str) -> WorkflowResult<()> {
        self.request_stop(id, StopReason::Cancel)
    }

    pub fn status(&self, id: &str) -> WorkflowResult<WorkflowMetadata> {
        self.load(id).map(|(_, metadata)| metadata)
    }

    /// Current `(state, metadata)` pair, for callers that need the full
    /// accumulated state rather than just metadata (e.g. the HTTP boundary).
    pub fn current(&self, id: &str) -> WorkflowResult<(WorkflowState, WorkflowMetadata)> {
        self.load(id)
    }

    pub fn list(&self) -> Vec<WorkflowSummary> {
        self.store.list()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    pub fn delete(&self, id: &str) -> WorkflowResult<()> {
        self.cancel(id).ok();
        self.store.delete(id);
        self.persistence.delete(id)?;
        Ok(())
    }

    /// Streams events for `id`: live events if the workflow is running,
    /// otherwise a single event replaying its last known state.
    pub fn stream(&self, id: &str) -> WorkflowResult<Pin<Box<dyn Stream<Item = RuntimeEvent> + Send>>> {
        if let Some(handle) = self.tasks.lock().get(id) {
            let rx = handle.events_tx.subscribe();
            let stream = BroadcastStream::new(rx).filter_map(|item| async move { item.ok() });
            return Ok(Box::pin(stream));
        }
        let (state, _) = self.load(id)?;
        let event = RuntimeEvent {
            node: state.current_step().to_string(),
            accumulated: state,
        };
        Ok(Box::pin(futures::stream::once(async move { event })))
    }

    fn spawn_driver(self: &Arc<Self>, id: String, initial_state: WorkflowState, start_node: Option<String>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, _rx) = broadcast::channel(256);
        let stop_reason = Arc::new(Mutex::new(None));

        let manager = Arc::clone(self);
        let events_tx_task = events_tx.clone();
        let stop_reason_task = Arc::clone(&stop_reason);
        let graph = manager.graph.clone();
        let task_id = id.clone();

        let join = tokio::spawn(async move {
            let id = task_id;
            let mut stream = Box::pin(astream(graph, initial_state.clone(), start_node, cancel_rx));
            let mut last_state = initial_state;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(event) => {
                        last_state = event.accumulated.clone();
                        manager.touch_metadata(&id, &last_state);
                        let _ = events_tx_task.send(event);
                    }
                    Err(e) => {
                        warn!(workflow_id = %id, error = %e, "graph node execution failed");
                        break;
                    }
                }
            }

            manager.finalize(&id, last_state, *stop_reason_task.lock());
        });

        self.tasks.lock().insert(
            id,
            TaskHandle {
                stop_reason,
                cancel_tx,
                events_tx,
                join,
            },
        );
    }

    fn touch_metadata(&self, id: &str, state: &WorkflowState) {
        if let Some(mut metadata) = self.store.get_metadata(id) {
            metadata.current_step = state.current_step().to_string();
            metadata.touch();
            self.store.store(id, state.clone(), metadata);
        }
    }

    fn finalize(&self, id: &str, final_state: WorkflowState, stop_reason: Option<StopReason>) {
        self.tasks.lock().remove(id);
        let mut metadata = self.store.get_metadata(id).unwrap_or_else(|| WorkflowMetadata::new(id, self.kind, final_state.current_step()));
        let mut final_state = final_state;

        metadata.status = match stop_reason {
            Some(StopReason::Pause) => {
                final_state.set_workflow_paused(true);
                WorkflowStatus::Paused
            }
            Some(StopReason::Cancel) => WorkflowStatus::Cancelled,
            None => match terminal_status(&final_state) {
                Some("failed") => WorkflowStatus::Failed,
                _ => WorkflowStatus::Completed,
            },
        };
        if final_state.error_without_recovery() {
            metadata.last_error = final_state.as_release().map(|s| s.error.clone()).filter(|e| !e.is_empty());
            metadata.error_count += 1;
        }
        metadata.current_step = final_state.current_step().to_string();
        metadata.touch();

        self.store.store(id, final_state.clone(), metadata.clone());
        self.persistence.save(id, &final_state, &metadata);
        info!(workflow_id = %id, status = ?metadata.status, "workflow driver task finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterBundle;
    use crate::qa_pipeline::{build_qa_graph, initial_qa_state};
    use crate::release_pipeline::{build_release_graph, initial_release_state};
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_manager(kind: WorkflowKind, graph: Graph) -> (Arc<WorkflowManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = WorkflowStateStore::new(Duration::from_secs(3600));
        let persistence = Arc::new(WorkflowPersistence::new(dir.path()));
        let manager = WorkflowManager::new(kind, graph, store, persistence, Duration::from_secs(3600));
        (manager, dir)
    }

    #[tokio::test]
    async fn qa_workflow_starts_and_reaches_completed_status() {
        let graph = build_qa_graph(AdapterBundle::mock(), None).unwrap();
        let (manager, _dir) = test_manager(WorkflowKind::Qa, graph);
        let state = WorkflowState::Qa(initial_qa_state("wf-qa-1", "hello"));
        let id = manager.start(state).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = manager.status(&id).unwrap();
        assert_eq!(status.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn pausing_then_resuming_continues_the_release_workflow() {
        let graph = build_release_graph(AdapterBundle::mock()).unwrap();
        let (manager, _dir) = test_manager(WorkflowKind::Release, graph);
        let state = WorkflowState::Release(initial_release_state(
            "wf-rel-1",
            vec!["api-service".to_string()],
            "v2.0.0".to_string(),
            "sprint-1".to_string(),
            "release".to_string(),
        ));
        let id = manager.start(state).unwrap();
        manager.pause(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = manager.status(&id).unwrap();
        assert_eq!(status.status, WorkflowStatus::Paused);

        manager.resume(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = manager.status(&id).unwrap();
        assert_eq!(status.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_marks_workflow_cancelled_and_delete_removes_it() {
        let graph = build_release_graph(AdapterBundle::mock()).unwrap();
        let (manager, _dir) = test_manager(WorkflowKind::Release, graph);
        let state = WorkflowState::Release(initial_release_state(
            "wf-rel-2",
            vec!["api-service".to_string()],
            "v2.0.0".to_string(),
            "sprint-1".to_string(),
            "release".to_string(),
        ));
        let id = manager.start(state).unwrap();
        manager.cancel(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.status(&id).unwrap().status, WorkflowStatus::Cancelled);

        manager.delete(&id).unwrap();
        assert!(manager.status(&id).is_err());
    }

    #[tokio::test]
    async fn status_of_unknown_workflow_is_not_found() {
        let graph = build_qa_graph(AdapterBundle::mock(), None).unwrap();
        let (manager, _dir) = test_manager(WorkflowKind::Qa, graph);
        assert!(matches!(manager.status("ghost"), Err(WorkflowError::NotFound(_))));
    }
}
