//! The query graph: one directed graph over every (type, subgraph) pair.
//!
//! Nodes are types as hosted by a particular subgraph; edges are the moves the
//! planner may take from one node to another. Field moves stay inside a
//! subgraph, entity moves re-enter the same logical entity in another subgraph
//! and carry the requirement that must be resolvable before the jump is taken.
//!
//! Once built, a graph is immutable and can be shared across planning calls.

use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexMap;
use indexmap::IndexSet;
use petgraph::graph::DiGraph;
use petgraph::graph::EdgeIndex;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::OperationKind;
use crate::error::PlannerError;
use crate::selection::Selection;
use crate::supergraph::TypeKind;

pub mod build;
pub mod output;

#[derive(Debug, Clone)]
pub struct QueryGraphNode {
    /// The GraphQL type this node points to.
    pub type_name: Name,
    pub kind: TypeKind,
    /// The subgraph hosting this view of the type.
    pub source: Arc<str>,
}

impl Display for QueryGraphNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.type_name, self.source)
    }
}

/// What taking an edge means, in GraphQL terms.
#[derive(Debug, Clone)]
pub enum QueryGraphEdgeTransition {
    /// Traverse a field, going from the field's parent type to its (named)
    /// output type within one subgraph.
    Field {
        field_name: Name,
        /// The field's named output type.
        type_name: Name,
        type_kind: TypeKind,
        /// True if the field returns a list at any nullability depth; drives
        /// the `@` segments of flatten paths during plan synthesis.
        is_list: bool,
    },
    /// Re-enter the same entity in another subgraph. The requirement lives on
    /// the edge itself.
    Entity,
    /// Narrow an abstract type to one of its possible types, as `... on X`
    /// would.
    Downcast {
        from_type: Name,
        from_kind: TypeKind,
        to_type: Name,
        to_kind: TypeKind,
    },
    /// Move from an interface to an object type standing in for it in another
    /// subgraph. Emitted for structural completeness; the walker does not
    /// traverse these.
    InterfaceObject {
        from_type: Name,
        from_kind: TypeKind,
        to_type: Name,
    },
}

impl QueryGraphEdgeTransition {
    /// The coarse cost model: field moves are cheap, everything else is a
    /// subgraph hop and is penalized heavily enough that single-subgraph
    /// solutions win when available.
    pub fn base_cost(&self) -> u64 {
        match self {
            QueryGraphEdgeTransition::Field { .. } => 1,
            _ => 10,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, QueryGraphEdgeTransition::Entity)
    }

    pub fn is_field(&self) -> bool {
        matches!(self, QueryGraphEdgeTransition::Field { .. })
    }
}

impl Display for QueryGraphEdgeTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryGraphEdgeTransition::Field { field_name, .. } => {
                write!(f, "{field_name}")
            }
            QueryGraphEdgeTransition::Entity => {
                write!(f, "key()")
            }
            QueryGraphEdgeTransition::Downcast { to_type, .. } => {
                write!(f, "... on {to_type}")
            }
            QueryGraphEdgeTransition::InterfaceObject { to_type, .. } => {
                write!(f, "itf-object({to_type})")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryGraphEdge {
    pub transition: QueryGraphEdgeTransition,
    /// Non-null only for entity edges: the selection that must be resolvable
    /// at the head before the jump may be taken.
    pub requirement: Option<Arc<Selection>>,
}

impl Display for QueryGraphEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(requirement) = &self.requirement {
            write!(f, "{requirement} ⊢ {}", self.transition)
        } else {
            self.transition.fmt(f)
        }
    }
}

pub struct QueryGraph {
    /// The nodes/edges of the query graph. Nodes and edges are never removed,
    /// so indexes stay valid for the life of the graph.
    graph: DiGraph<QueryGraphNode, QueryGraphEdge>,
    /// All nodes pointing to a type of a given name, across subgraphs.
    types_to_nodes: IndexMap<Name, IndexSet<NodeIndex>>,
    /// The node for a (subgraph, type) pair, if the subgraph hosts the type.
    nodes_by_source_and_type: IndexMap<(Arc<str>, Name), NodeIndex>,
    /// Root operation type names, copied from the supergraph.
    root_types: IndexMap<OperationKind, Name>,
    /// The subgraphs contributing nodes, in supergraph declaration order.
    sources: IndexSet<Arc<str>>,
}

impl QueryGraph {
    pub fn graph(&self) -> &DiGraph<QueryGraphNode, QueryGraphEdge> {
        &self.graph
    }

    pub fn node_weight(&self, node: NodeIndex) -> Result<&QueryGraphNode, PlannerError> {
        self.graph
            .node_weight(node)
            .ok_or_else(|| PlannerError::internal("Node unexpectedly missing"))
    }

    pub fn edge_weight(&self, edge: EdgeIndex) -> Result<&QueryGraphEdge, PlannerError> {
        self.graph
            .edge_weight(edge)
            .ok_or_else(|| PlannerError::internal("Edge unexpectedly missing"))
    }

    pub fn edge_endpoints(&self, edge: EdgeIndex) -> Result<(NodeIndex, NodeIndex), PlannerError> {
        self.graph
            .edge_endpoints(edge)
            .ok_or_else(|| PlannerError::internal("Edge unexpectedly missing"))
    }

    pub fn edge_head(&self, edge: EdgeIndex) -> Result<&QueryGraphNode, PlannerError> {
        self.node_weight(self.edge_endpoints(edge)?.0)
    }

    pub fn edge_tail(&self, edge: EdgeIndex) -> Result<&QueryGraphNode, PlannerError> {
        self.node_weight(self.edge_endpoints(edge)?.1)
    }

    /// Outgoing edges of `node` as (edge, tail) pairs.
    pub fn out_edges(
        &self,
        node: NodeIndex,
    ) -> impl Iterator<Item = (EdgeIndex, NodeIndex)> + '_ {
        self.graph.edges(node).map(|edge| (edge.id(), edge.target()))
    }

    /// Every node hosting a type of the given name, across all subgraphs.
    pub fn nodes_for_type(&self, type_name: &Name) -> impl Iterator<Item = NodeIndex> + '_ {
        self.types_to_nodes
            .get(type_name)
            .into_iter()
            .flat_map(|nodes| nodes.iter().copied())
    }

    pub fn node_for(&self, source: &Arc<str>, type_name: &Name) -> Option<NodeIndex> {
        self.nodes_by_source_and_type
            .get(&(source.clone(), type_name.clone()))
            .copied()
    }

    pub fn root_type(&self, kind: OperationKind) -> Option<&Name> {
        self.root_types.get(&kind)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<str>> {
        self.sources.iter()
    }
}
