//! Translation of a selected path into an executable plan.
//!
//! The path is split into service segments at its entity moves. The first
//! segment becomes the root fetch; every later segment becomes an entity
//! fetch wrapped in a `Flatten` applying it at the response position of the
//! jump. Wherever a downstream segment will re-enter an entity, the upstream
//! segment's selection ends with `__typename` and the key fields that
//! downstream jump requires.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::name;

use crate::OperationKind;
use crate::bail;
use crate::error::PlannerError;
use crate::query_graph::QueryGraph;
use crate::query_graph::QueryGraphEdgeTransition;
use crate::query_plan::FetchNode;
use crate::query_plan::FetchPathElement;
use crate::query_plan::FlattenNode;
use crate::query_plan::PlanNode;
use crate::query_plan::QueryPlan;
use crate::query_plan::SequenceNode;
use crate::selection::Selection;
use crate::selection::SelectionNode;
use crate::selection::sort_selection_set;
use crate::walker::OperationPath;

const TYPENAME_FIELD: Name = name!("__typename");

/// An entity jump introducing a segment: where it re-enters, what it
/// requires, and the response position it applies at.
struct EntityEntry {
    head_type: Name,
    requirement: Arc<Selection>,
    flatten_path: Vec<FetchPathElement>,
}

/// One field collected inside a segment.
struct SegmentField {
    field_name: Name,
    parent_type: Name,
}

/// A run of same-subgraph field moves, introduced (except for the first) by
/// an entity move.
struct Segment {
    service: Arc<str>,
    entry: Option<EntityEntry>,
    fields: Vec<SegmentField>,
}

pub(crate) fn build_plan(
    graph: &QueryGraph,
    path: &OperationPath,
    operation_kind: OperationKind,
) -> Result<QueryPlan, PlannerError> {
    let segments = segment_path(graph, path)?;
    let mut nodes: Vec<PlanNode> = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        let downstream_entry = segments
            .get(index + 1)
            .and_then(|segment| segment.entry.as_ref());

        // The innermost position of this segment's selection: the key fields
        // (plus __typename) of the next entity jump, if there is one.
        let mut selection: Vec<SelectionNode> = match downstream_entry {
            Some(entry) => {
                let mut injected = vec![SelectionNode::field(
                    entry.head_type.clone(),
                    TYPENAME_FIELD,
                )];
                injected.extend(entry.requirement.selection_set.iter().cloned());
                sort_selection_set(&mut injected);
                injected
            }
            None => Vec::new(),
        };
        for field in segment.fields.iter().rev() {
            selection = vec![SelectionNode::Field {
                type_name: field.parent_type.clone(),
                field_name: field.field_name.clone(),
                selections: selection,
            }];
        }

        match &segment.entry {
            None => {
                if selection.is_empty() {
                    bail!("cannot build a fetch for an empty root segment");
                }
                nodes.push(
                    FetchNode::new(segment.service.clone(), None, selection, operation_kind)
                        .into(),
                );
            }
            Some(entry) => {
                if selection.is_empty() {
                    return Err(PlannerError::MissingTargetField {
                        type_name: entry.head_type.to_string(),
                        subgraph: segment.service.to_string(),
                    });
                }
                let requires = SelectionNode::Fragment {
                    type_name: entry.head_type.clone(),
                    selections: entry.requirement.selection_set.clone(),
                };
                let fragment = SelectionNode::Fragment {
                    type_name: entry.head_type.clone(),
                    selections: selection,
                };
                let fetch = FetchNode::new(
                    segment.service.clone(),
                    Some(requires),
                    vec![fragment],
                    OperationKind::Query,
                );
                nodes.push(
                    FlattenNode {
                        path: entry.flatten_path.clone(),
                        node: Box::new(fetch.into()),
                    }
                    .into(),
                );
            }
        }
    }

    let node = if nodes.len() == 1 {
        nodes.pop()
    } else {
        Some(SequenceNode { nodes }.into())
    };
    Ok(QueryPlan { node })
}

fn segment_path(graph: &QueryGraph, path: &OperationPath) -> Result<Vec<Segment>, PlannerError> {
    let root = graph.node_weight(path.root())?;
    let mut segments = vec![Segment {
        service: root.source.clone(),
        entry: None,
        fields: Vec::new(),
    }];
    let mut flatten_path: Vec<FetchPathElement> = Vec::new();
    for &edge in path.edges() {
        let weight = graph.edge_weight(edge)?;
        match &weight.transition {
            QueryGraphEdgeTransition::Field {
                field_name,
                is_list,
                ..
            } => {
                let head = graph.edge_head(edge)?;
                segments
                    .last_mut()
                    .expect("segments list starts non-empty")
                    .fields
                    .push(SegmentField {
                        field_name: field_name.clone(),
                        parent_type: head.type_name.clone(),
                    });
                flatten_path.push(FetchPathElement::Key(field_name.clone()));
                if *is_list {
                    flatten_path.push(FetchPathElement::AnyIndex);
                }
            }
            QueryGraphEdgeTransition::Entity => {
                let head = graph.edge_head(edge)?;
                let tail = graph.edge_tail(edge)?;
                let Some(requirement) = weight.requirement.clone() else {
                    bail!(
                        "entity edge into \"{}\" unexpectedly carries no requirement",
                        tail.source,
                    );
                };
                segments.push(Segment {
                    service: tail.source.clone(),
                    entry: Some(EntityEntry {
                        head_type: head.type_name.clone(),
                        requirement,
                        flatten_path: flatten_path.clone(),
                    }),
                    fields: Vec::new(),
                });
            }
            QueryGraphEdgeTransition::Downcast { to_type, .. }
            | QueryGraphEdgeTransition::InterfaceObject { to_type, .. } => {
                bail!(
                    "selected path unexpectedly contains an abstract move toward \"{to_type}\"",
                );
            }
        }
    }
    Ok(segments)
}
