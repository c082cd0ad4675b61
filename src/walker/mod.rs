//! Path search over the query graph.
//!
//! Given a sequence of field steps, the walker expands every current path by
//! direct field moves and by entity jumps into other subgraphs, recursively
//! verifying that each jump's requirement can be satisfied from the current
//! position, and keeps the cheapest survivor per terminal subgraph after each
//! step. The entity graph is cyclic by construction, so the search relies on
//! branch-local visited sets rather than global marks: a subgraph rejected on
//! one branch may be perfectly fine on a sibling branch.

use std::fmt::Write;
use std::num::NonZeroU32;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::IndexSet;
use indexmap::map::Entry;
use itertools::Itertools;
use petgraph::graph::EdgeIndex;
use tracing::trace;

use crate::OperationKind;
use crate::error::PlannerError;
use crate::query_graph::QueryGraph;
use crate::query_graph::QueryGraphEdgeTransition;
use crate::selection::Selection;
use crate::selection::SelectionNode;

mod operation_path;

pub use operation_path::OperationPath;

/// One step of the operation to plan. The planner only understands plain
/// field steps; anything else fails the planning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStep {
    Field(String),
    InlineFragment(String),
}

impl QueryStep {
    pub fn field(name: impl Into<String>) -> Self {
        QueryStep::Field(name.into())
    }
}

/// Exclusions propagated into recursive requirement-satisfaction calls: the
/// requirement walk may not re-use the edge it is trying to satisfy, re-check
/// the same requirement, or hop back into subgraphs pinned by the outer
/// context.
#[derive(Debug, Clone, Default)]
struct Excluded {
    graphs: IndexSet<Arc<str>>,
    requirements: Vec<Arc<Selection>>,
    edges: IndexSet<EdgeIndex>,
}

impl Excluded {
    fn descend(&self, edge: EdgeIndex, graph_id: Arc<str>, requirement: Arc<Selection>) -> Self {
        let mut descended = self.clone();
        descended.graphs.insert(graph_id);
        descended.requirements.push(requirement);
        descended.edges.insert(edge);
        descended
    }
}

/// An entry of the indirect-path frontier. The visited sets are local to this
/// branch of the search.
struct Frontier {
    visited_graphs: IndexSet<Arc<str>>,
    visited_requirements: Vec<Arc<Selection>>,
    path: OperationPath,
}

/// One pending element of a requirement being checked: a selection node and
/// the candidate paths that could resolve it.
struct MoveRequirement {
    selection: SelectionNode,
    paths: Vec<OperationPath>,
}

pub struct Walker<'a> {
    graph: &'a QueryGraph,
    limit: u32,
    explored: u32,
}

impl<'a> Walker<'a> {
    pub fn new(graph: &'a QueryGraph, max_explored_paths: NonZeroU32) -> Self {
        Self {
            graph,
            limit: max_explored_paths.get(),
            explored: 0,
        }
    }

    /// Returns the minimum-cost path realizing the given field steps, with
    /// any necessary entity jumps interleaved, or `None` if no such path
    /// exists.
    pub fn walk_query(
        &mut self,
        kind: OperationKind,
        steps: &[QueryStep],
    ) -> Result<Option<OperationPath>, PlannerError> {
        let Some(root_type) = self.graph.root_type(kind) else {
            return Ok(None);
        };
        let mut paths: Vec<OperationPath> = self
            .graph
            .nodes_for_type(root_type)
            .map(OperationPath::new)
            .collect();
        let excluded = Excluded::default();
        for step in steps {
            let field_name = match step {
                QueryStep::Field(name) => name.as_str(),
                QueryStep::InlineFragment(type_condition) => {
                    return Err(PlannerError::unsupported_feature(format!(
                        "cannot plan the inline fragment step \"... on {type_condition}\": \
                         only field steps are supported",
                    )));
                }
            };
            let mut expanded = Vec::new();
            for path in &paths {
                expanded.extend(self.find_direct_paths(path, field_name, &excluded)?);
                expanded.extend(self.find_indirect_paths(path, field_name, &excluded)?);
            }
            paths = best_paths_per_subgraph(self.graph, expanded)?;
            trace!(
                step = field_name,
                survivors = paths.len(),
                "expanded one operation step"
            );
            if paths.is_empty() {
                return Ok(None);
            }
        }
        let best = paths.iter().position_min_by_key(|path| path.cost());
        Ok(best.map(|index| paths.swap_remove(index)))
    }

    /// Field moves out of the path's tail matching the requested field.
    fn find_direct_paths(
        &mut self,
        path: &OperationPath,
        field_name: &str,
        excluded: &Excluded,
    ) -> Result<Vec<OperationPath>, PlannerError> {
        let tail = path.tail(self.graph)?;
        let mut results = Vec::new();
        let candidates: Vec<EdgeIndex> = self.graph.out_edges(tail).map(|(edge, _)| edge).collect();
        for edge in candidates {
            let weight = self.graph.edge_weight(edge)?;
            let matches = matches!(
                &weight.transition,
                QueryGraphEdgeTransition::Field { field_name: name, .. }
                    if name.as_str() == field_name
            );
            if !matches || path.contains_edge(edge) || excluded.edges.contains(&edge) {
                continue;
            }
            let Some(required) = self.can_satisfy_edge(edge, path, excluded)? else {
                continue;
            };
            self.register_explored()?;
            results.push(path.advance(self.graph, edge)?.add_required_paths(required)?);
        }
        Ok(results)
    }

    /// Entity jumps (possibly chained) out of the path's tail that end in a
    /// position where the requested field resolves directly. Reduced to the
    /// cheapest survivor per terminal subgraph.
    fn find_indirect_paths(
        &mut self,
        path: &OperationPath,
        field_name: &str,
        excluded: &Excluded,
    ) -> Result<Vec<OperationPath>, PlannerError> {
        let source_tail = path.tail(self.graph)?;
        let source_subgraph = self.graph.node_weight(source_tail)?.source.clone();
        let mut results = Vec::new();
        let mut frontier = vec![Frontier {
            visited_graphs: IndexSet::new(),
            visited_requirements: Vec::new(),
            path: path.clone(),
        }];
        while let Some(entry) = frontier.pop() {
            let tail = entry.path.tail(self.graph)?;
            let candidates: Vec<EdgeIndex> =
                self.graph.out_edges(tail).map(|(edge, _)| edge).collect();
            for edge in candidates {
                let weight = self.graph.edge_weight(edge)?;
                if !weight.transition.is_entity() {
                    continue;
                }
                let (_, target) = self.graph.edge_endpoints(edge)?;
                let target_subgraph = self.graph.node_weight(target)?.source.clone();
                // Never revisit a subgraph on this branch, and never hop back
                // to where the step started.
                if entry.visited_graphs.contains(&target_subgraph)
                    || target_subgraph == source_subgraph
                    || excluded.graphs.contains(&target_subgraph)
                {
                    continue;
                }
                if entry.path.contains_edge(edge) || excluded.edges.contains(&edge) {
                    continue;
                }
                let requirement = weight.requirement.clone();
                if let Some(requirement) = &requirement {
                    // A cheaper edge with this exact requirement was already
                    // taken on this branch.
                    if entry
                        .visited_requirements
                        .iter()
                        .any(|seen| **seen == **requirement)
                        || excluded
                            .requirements
                            .iter()
                            .any(|seen| **seen == **requirement)
                    {
                        continue;
                    }
                }
                let Some(required) = self.can_satisfy_edge(edge, &entry.path, excluded)? else {
                    continue;
                };
                self.register_explored()?;
                let jumped = entry
                    .path
                    .advance(self.graph, edge)?
                    .add_required_paths(required)?;
                let direct = self.find_direct_paths(&jumped, field_name, excluded)?;
                if direct.is_empty() {
                    let mut visited_graphs = entry.visited_graphs.clone();
                    visited_graphs.insert(target_subgraph);
                    let mut visited_requirements = entry.visited_requirements.clone();
                    if let Some(requirement) = requirement {
                        visited_requirements.push(requirement);
                    }
                    frontier.push(Frontier {
                        visited_graphs,
                        visited_requirements,
                        path: jumped,
                    });
                } else {
                    results.extend(direct);
                }
            }
        }
        best_paths_per_subgraph(self.graph, results)
    }

    /// Checks that the edge's requirement (if any) is resolvable at the
    /// path's current position. Returns the resolver paths that must execute
    /// before the edge, or `None` if the requirement cannot be satisfied.
    fn can_satisfy_edge(
        &mut self,
        edge: EdgeIndex,
        path: &OperationPath,
        excluded: &Excluded,
    ) -> Result<Option<Vec<OperationPath>>, PlannerError> {
        let weight = self.graph.edge_weight(edge)?;
        let Some(requirement) = weight.requirement.clone() else {
            return Ok(Some(Vec::new()));
        };
        let (_, target) = self.graph.edge_endpoints(edge)?;
        let target_subgraph = self.graph.node_weight(target)?.source.clone();
        let excluded = excluded.descend(edge, target_subgraph, requirement.clone());

        let mut resolved = Vec::new();
        let mut pending: Vec<MoveRequirement> = requirement
            .selection_set
            .iter()
            .map(|selection| MoveRequirement {
                selection: selection.clone(),
                paths: vec![path.clone()],
            })
            .collect();
        while let Some(move_requirement) = pending.pop() {
            match move_requirement.selection {
                SelectionNode::Fragment { type_name, .. } => {
                    return Err(PlannerError::unsupported_feature(format!(
                        "fragments are not supported in key and requires selections \
                         (found \"... on {type_name}\")",
                    )));
                }
                SelectionNode::Field {
                    field_name,
                    selections,
                    ..
                } => {
                    let Some(survivors) = self.validate_field_requirement(
                        field_name.as_str(),
                        &move_requirement.paths,
                        &excluded,
                    )?
                    else {
                        return Ok(None);
                    };
                    if selections.is_empty() {
                        resolved.extend(survivors);
                    } else {
                        for child in selections {
                            pending.push(MoveRequirement {
                                selection: child,
                                paths: survivors.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(Some(resolved))
    }

    /// One field of a requirement: it must resolve, directly or indirectly,
    /// from at least one of the candidate paths.
    fn validate_field_requirement(
        &mut self,
        field_name: &str,
        paths: &[OperationPath],
        excluded: &Excluded,
    ) -> Result<Option<Vec<OperationPath>>, PlannerError> {
        let mut survivors = Vec::new();
        for path in paths {
            survivors.extend(self.find_direct_paths(path, field_name, excluded)?);
            survivors.extend(self.find_indirect_paths(path, field_name, excluded)?);
        }
        if survivors.is_empty() {
            return Ok(None);
        }
        Ok(Some(best_paths_per_subgraph(self.graph, survivors)?))
    }

    fn register_explored(&mut self) -> Result<(), PlannerError> {
        self.explored += 1;
        if self.explored > self.limit {
            return Err(PlannerError::PathLimitExceeded { limit: self.limit });
        }
        Ok(())
    }
}

/// Reduces a set of paths to one per terminal subgraph, keeping the cheapest.
/// Ties keep the first-discovered path.
fn best_paths_per_subgraph(
    graph: &QueryGraph,
    paths: Vec<OperationPath>,
) -> Result<Vec<OperationPath>, PlannerError> {
    let mut best: IndexMap<Arc<str>, OperationPath> = IndexMap::new();
    for path in paths {
        let tail = path.tail(graph)?;
        let subgraph = graph.node_weight(tail)?.source.clone();
        match best.entry(subgraph) {
            Entry::Occupied(mut occupied) => {
                if path.cost() < occupied.get().cost() {
                    occupied.insert(path);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(path);
            }
        }
    }
    Ok(best.into_values().collect())
}

/// Renders a set of paths as DOT source, for debugging.
pub fn paths_to_dot(graph: &QueryGraph, paths: &[OperationPath]) -> String {
    let mut out = String::from("digraph \"operation paths\" {\n");
    let mut seen_nodes = IndexSet::new();
    for path in paths {
        seen_nodes.insert(path.root());
        for &edge in path.edges() {
            if let Ok((head, tail)) = graph.edge_endpoints(edge) {
                seen_nodes.insert(head);
                seen_nodes.insert(tail);
            }
        }
    }
    for node in &seen_nodes {
        if let Ok(weight) = graph.node_weight(*node) {
            let _ = writeln!(out, "  {} [label=\"{}\"]", node.index(), weight);
        }
    }
    let mut seen_edges = IndexSet::new();
    for path in paths {
        for &edge in path.edges() {
            if !seen_edges.insert(edge) {
                continue;
            }
            if let (Ok((head, tail)), Ok(weight)) =
                (graph.edge_endpoints(edge), graph.edge_weight(edge))
            {
                let _ = writeln!(
                    out,
                    "  {} -> {} [label=\"{}\"]",
                    head.index(),
                    tail.index(),
                    weight
                );
            }
        }
    }
    out.push_str("}\n");
    out
}

/// Same as [`paths_to_dot`], wrapped as a link to an online Graphviz viewer.
pub fn paths_to_dot_url(graph: &QueryGraph, paths: &[OperationPath]) -> String {
    format!(
        "https://dreampuf.github.io/GraphvizOnline/#{}",
        urlencoding::encode(&paths_to_dot(graph, paths))
    )
}
