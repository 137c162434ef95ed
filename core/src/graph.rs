//! Graph definition: named nodes, conditional edges, compiled into a frozen,
//! validated schema (§4.C).
use crate::errors::{GraphError, GraphResult};
use crate::state::{Partial, WorkflowState};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel target name meaning "terminate the graph".
pub const END: &str = "__end__";

/// An async node function: reads accumulated state, returns a partial update.
pub type NodeFn = Arc<dyn Fn(WorkflowState) -> BoxFuture<'static, GraphResult<Partial>> + Send + Sync>;

/// A routing function: given accumulated state, names the next node (or [`END`]).
pub type RouteFn = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

struct ConditionalEdge {
    route: RouteFn,
    targets: HashMap<String, String>,
}

/// A static, validated graph schema: nodes bound to functions plus the
/// conditional edges connecting them.
#[derive(Clone)]
pub struct Graph {
    nodes: HashMap<String, NodeFn>,
    entry: String,
    edges: Arc<HashMap<String, ConditionalEdgeShared>>,
}

type ConditionalEdgeShared = Arc<ConditionalEdge>;

impl Graph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&NodeFn> {
        self.nodes.get(name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        name == END || self.nodes.contains_key(name)
    }

    /// Evaluates the route function for `from`, returning the resolved target name.
    pub fn route(&self, from: &str, state: &WorkflowState) -> GraphResult<String> {
        let edge = self
            .edges
            .get(from)
            .ok_or_else(|| GraphError::NoRoute(from.to_string()))?;
        let label = (edge.route)(state);
        edge.targets
            .get(&label)
            .cloned()
            .ok_or_else(|| GraphError::NoRoute(format!("{from} -> {label}")))
    }
}

/// Builds and validates a [`Graph`].
pub struct GraphBuilder {
    nodes: HashMap<String, NodeFn>,
    entry: Option<String>,
    edges: HashMap<String, ConditionalEdge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            entry: None,
            edges: HashMap::new(),
        }
    }

    pub fn add_node(mut self, name: impl Into<String>, f: NodeFn) -> Self {
        self.nodes.insert(name.into(), f);
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Adds a conditional edge from `from`, with `route` producing labels that
    /// must all be keys of `targets`.
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<String>,
        route: RouteFn,
        targets: HashMap<String, String>,
    ) -> Self {
        self.edges.insert(from.into(), ConditionalEdge { route, targets });
        self
    }

    /// Adds a direct (unconditional) edge from `from` to `to`.
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        let route: RouteFn = Arc::new(move |_state| "next".to_string());
        let mut targets = HashMap::new();
        targets.insert("next".to_string(), to);
        self.add_conditional_edge(from, route, targets)
    }

    /// Validates and freezes the graph: every routing target must name a
    /// known node or [`END`]; the entry node must exist.
    pub fn build(self) -> GraphResult<Graph> {
        let entry = self.entry.ok_or(GraphError::NoEntryPoint)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            for target in edge.targets.values() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(GraphError::UnknownNode(target.clone()));
                }
            }
        }
        let edges = self
            .edges
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect::<HashMap<_, _>>();
        Ok(Graph {
            nodes: self.nodes,
            entry,
            edges: Arc::new(edges),
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PartialFields, ReleaseState};

    fn noop_node() -> NodeFn {
        Arc::new(|state| {
            Box::pin(async move {
                let _ = &state;
                Ok(Partial::flat(PartialFields::default()))
            })
        })
    }

    #[test]
    fn build_rejects_missing_entry() {
        let result = GraphBuilder::new().add_node("a", noop_node()).build();
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_unknown_route_target() {
        let mut targets = HashMap::new();
        targets.insert("next".to_string(), "ghost".to_string());
        let route: RouteFn = Arc::new(|_| "next".to_string());
        let result = GraphBuilder::new()
            .add_node("a", noop_node())
            .set_entry("a")
            .add_conditional_edge("a", route, targets)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_accepts_valid_graph_and_routes() {
        let graph = GraphBuilder::new()
            .add_node("a", noop_node())
            .add_node("b", noop_node())
            .set_entry("a")
            .add_edge("a", "b")
            .build()
            .unwrap();

        let state = WorkflowState::Release(ReleaseState::new("wf-1"));
        assert_eq!(graph.route("a", &state).unwrap(), "b");
    }
}
