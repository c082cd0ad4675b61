use std::num::NonZeroU32;

use tracing::debug;

use crate::OperationKind;
use crate::error::PlannerError;
use crate::query_graph::QueryGraph;
use crate::query_graph::build::build_query_graph;
use crate::query_plan::QueryPlan;
use crate::query_plan::builder::build_plan;
use crate::supergraph::Supergraph;
use crate::walker::QueryStep;
use crate::walker::Walker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlannerConfig {
    /// Upper bound on the number of candidate paths one planning call may
    /// materialize. Entity keys shared by many subgraphs make the search
    /// space grow quickly, and a planning call that exceeds this bound aborts
    /// with [`PlannerError::PathLimitExceeded`] instead of churning.
    pub max_explored_paths: NonZeroU32,
}

impl Default for QueryPlannerConfig {
    fn default() -> Self {
        Self {
            max_explored_paths: NonZeroU32::new(10_000).expect("10000 is non-zero"),
        }
    }
}

/// The planning facade: owns the query graph built from a supergraph and
/// translates operations into query plans.
///
/// Planning calls are pure functions of the planner and their inputs; a
/// planner can be shared across threads and reused for any number of calls.
pub struct QueryPlanner {
    graph: QueryGraph,
    config: QueryPlannerConfig,
}

impl QueryPlanner {
    pub fn new(supergraph: &Supergraph, config: QueryPlannerConfig) -> Result<Self, PlannerError> {
        Ok(Self {
            graph: build_query_graph(supergraph)?,
            config,
        })
    }

    pub fn query_graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// Plans the operation described by `steps`. Returns `Ok(None)` when no
    /// combination of field moves and entity jumps can satisfy every step.
    pub fn build_query_plan(
        &self,
        operation_kind: OperationKind,
        steps: &[QueryStep],
    ) -> Result<Option<QueryPlan>, PlannerError> {
        if steps.is_empty() {
            return Ok(None);
        }
        let mut walker = Walker::new(&self.graph, self.config.max_explored_paths);
        let Some(path) = walker.walk_query(operation_kind, steps)? else {
            return Ok(None);
        };
        debug!(cost = path.cost(), "selected the cheapest operation path");
        build_plan(&self.graph, &path, operation_kind).map(Some)
    }
}
