//! The executable query plan: a tree of fetches against individual subgraphs,
//! composed sequentially or in parallel, with nested entity fetches applied at
//! a structural path of the response.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use apollo_compiler::Name;

use crate::OperationKind;
use crate::selection::SelectionNode;

pub(crate) mod builder;
mod display;
pub mod query_planner;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub node: Option<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    Fetch(Box<FetchNode>),
    Sequence(SequenceNode),
    Parallel(ParallelNode),
    Flatten(FlattenNode),
}

impl From<FetchNode> for PlanNode {
    fn from(node: FetchNode) -> Self {
        PlanNode::Fetch(Box::new(node))
    }
}

impl From<SequenceNode> for PlanNode {
    fn from(node: SequenceNode) -> Self {
        PlanNode::Sequence(node)
    }
}

impl From<ParallelNode> for PlanNode {
    fn from(node: ParallelNode) -> Self {
        PlanNode::Parallel(node)
    }
}

impl From<FlattenNode> for PlanNode {
    fn from(node: FlattenNode) -> Self {
        PlanNode::Flatten(node)
    }
}

/// One request against one subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchNode {
    pub service_name: Arc<str>,
    pub variable_usages: Vec<String>,
    /// For entity fetches: the fragment describing the representations sent
    /// as `$representations`.
    pub requires: Option<SelectionNode>,
    /// The body of the operation. For entity fetches this is the selection
    /// under `_entities`, i.e. the `... on T { ... }` fragment.
    pub selection_set: Vec<SelectionNode>,
    /// The operation as a standalone GraphQL document.
    pub operation: String,
    pub operation_kind: OperationKind,
}

impl FetchNode {
    pub(crate) fn new(
        service_name: Arc<str>,
        requires: Option<SelectionNode>,
        selection_set: Vec<SelectionNode>,
        operation_kind: OperationKind,
    ) -> Self {
        let mut body = String::new();
        for (i, selection) in selection_set.iter().enumerate() {
            if i > 0 {
                body.push(' ');
            }
            selection.write_compact(&mut body);
        }
        let (operation, variable_usages) = if requires.is_some() {
            (
                format!(
                    "query($representations:[_Any!]!){{_entities(representations:$representations){{{body}}}}}"
                ),
                vec!["representations".to_owned()],
            )
        } else {
            let prefix = match operation_kind {
                OperationKind::Query => "",
                OperationKind::Mutation => "mutation",
                OperationKind::Subscription => "subscription",
            };
            (format!("{prefix}{{{body}}}"), Vec::new())
        };
        Self {
            service_name,
            variable_usages,
            requires,
            selection_set,
            operation,
            operation_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceNode {
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelNode {
    pub nodes: Vec<PlanNode>,
}

/// Applies the inner node to every response value matched by `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenNode {
    pub path: Vec<FetchPathElement>,
    pub node: Box<PlanNode>,
}

/// One element of a flatten path: a response key, or `@` standing for every
/// element of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchPathElement {
    Key(Name),
    AnyIndex,
}
