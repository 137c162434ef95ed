//! Process-wide registry of workflow managers: one per kind, discovered by
//! linear scan when a request carries only a workflow id (§4.F).
use crate::adapters::AdapterBundle;
use crate::config::AppConfig;
use crate::manager::WorkflowManager;
use crate::persistence::WorkflowPersistence;
use crate::qa_pipeline::build_qa_graph;
use crate::release_pipeline::build_release_graph;
use crate::state::WorkflowKind;
use crate::workflow_store::{WorkflowStateStore, WorkflowSummary};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct WorkflowRegistry {
    managers: HashMap<WorkflowKind, Arc<WorkflowManager>>,
}

impl WorkflowRegistry {
    /// Builds one manager per workflow kind from `config`. Live adapter
    /// wiring is a Non-goal (see DESIGN.md); the mock bundle is used
    /// whenever `adapters.use_mock_apis` is set, which is the only
    /// supported mode in this build.
    pub fn init(config: &AppConfig) -> Self {
        let adapters = AdapterBundle::mock();
        let ttl = Duration::from_secs(config.workflows.ttl_hours * 3600);
        let sweep_period = Duration::from_secs(config.workflows.sweep_period_secs);
        let flush_interval = Duration::from_secs(config.workflows.snapshot_flush_interval_secs);
        let persistence = Arc::new(WorkflowPersistence::new(&config.workflows.data_root));

        let mut managers = HashMap::new();

        let release_store = WorkflowStateStore::new(ttl);
        let _release_sweeper = release_store.spawn_sweeper(sweep_period);
        let release_graph = build_release_graph(adapters.clone()).expect("release graph definition is valid");
        managers.insert(
            WorkflowKind::Release,
            WorkflowManager::new(
                WorkflowKind::Release,
                release_graph,
                release_store,
                Arc::clone(&persistence),
                flush_interval,
            ),
        );

        let qa_store = WorkflowStateStore::new(ttl);
        let _qa_sweeper = qa_store.spawn_sweeper(sweep_period);
        let qa_graph = build_qa_graph(adapters, None).expect("qa graph definition is valid");
        managers.insert(
            WorkflowKind::Qa,
            WorkflowManager::new(WorkflowKind::Qa, qa_graph, qa_store, persistence, flush_interval),
        );

        Self { managers }
    }

    pub fn manager_for_kind(&self, kind: WorkflowKind) -> Arc<WorkflowManager> {
        Arc::clone(
            self.managers
                .get(&kind)
                .expect("all workflow kinds are registered at init"),
        )
    }

    /// Finds the manager owning `id`. Workflow ids are unique across kinds,
    /// and a process runs only two managers, so a linear scan beats
    /// maintaining a separate id-to-kind index.
    pub fn manager_for_id(&self, id: &str) -> Option<Arc<WorkflowManager>> {
        self.managers.values().find(|m| m.contains(id)).cloned()
    }

    pub fn all(&self) -> Vec<WorkflowSummary> {
        self.managers.values().flat_map(|m| m.list()).collect()
    }

    pub fn kinds(&self) -> Vec<WorkflowKind> {
        self.managers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_registers_both_kinds_and_finds_a_started_workflow() {
        let config = AppConfig::default();
        let registry = WorkflowRegistry::init(&config);
        assert_eq!(registry.kinds().len(), 2);

        let release_manager = registry.manager_for_kind(WorkflowKind::Release);
        let state = crate::state::WorkflowState::Release(crate::release_pipeline::initial_release_state(
            "wf-registry-1",
            vec![],
            "v1.0.0".to_string(),
            "sprint-x".to_string(),
            "release".to_string(),
        ));
        let id = release_manager.start(state).unwrap();

        let found = registry.manager_for_id(&id);
        assert!(found.is_some());
        assert!(registry.manager_for_id("does-not-exist").is_none());
    }
}
