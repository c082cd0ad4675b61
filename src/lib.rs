//! Query planner core for a federated GraphQL gateway.
//!
//! Given a composed supergraph schema and a client operation, the planner
//! decides which subgraphs to call, in what order, with what keys and what
//! selection sets:
//!
//! 1. The supergraph document is parsed into per-subgraph type tables
//!    ([`supergraph`]).
//! 2. The tables are flattened into one directed graph whose nodes are
//!    (type, subgraph) pairs and whose edges are typed moves; entity edges
//!    carry the key selection required before the jump ([`query_graph`]).
//! 3. A walker explores direct and entity-jump paths, recursively checking
//!    that every jump's requirement is satisfiable, and picks a cost-minimal
//!    path ([`walker`]).
//! 4. The selected path is translated into a tree of Fetch / Sequence /
//!    Parallel / Flatten nodes ([`query_plan`]).
//!
//! ```no_run
//! use supergraph_planner::{OperationKind, QueryPlanner, QueryPlannerConfig, QueryStep, Supergraph};
//!
//! # fn main() -> Result<(), supergraph_planner::PlannerError> {
//! let supergraph = Supergraph::parse("...supergraph SDL...")?;
//! let planner = QueryPlanner::new(&supergraph, QueryPlannerConfig::default())?;
//! let plan = planner.build_query_plan(
//!     OperationKind::Query,
//!     &[QueryStep::field("users"), QueryStep::field("age")],
//! )?;
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use serde::Serialize;

pub mod error;
pub mod query_graph;
pub mod query_plan;
pub mod selection;
pub mod supergraph;
pub mod walker;

pub use error::PlannerError;
pub use query_plan::QueryPlan;
pub use query_plan::query_planner::QueryPlanner;
pub use query_plan::query_planner::QueryPlannerConfig;
pub use supergraph::Supergraph;
pub use walker::QueryStep;

/// The kind of root operation being planned.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[strum(to_string = "query")]
    Query,
    #[strum(to_string = "mutation")]
    Mutation,
    #[strum(to_string = "subscription")]
    Subscription,
}

impl From<OperationKind> for apollo_compiler::ast::OperationType {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Query => apollo_compiler::ast::OperationType::Query,
            OperationKind::Mutation => apollo_compiler::ast::OperationType::Mutation,
            OperationKind::Subscription => apollo_compiler::ast::OperationType::Subscription,
        }
    }
}
