use petgraph::graph::EdgeIndex;
use petgraph::graph::NodeIndex;

use crate::bail;
use crate::ensure;
use crate::error::PlannerError;
use crate::query_graph::QueryGraph;

/// A path through the query graph, from a root node through a sequence of
/// edges, with the resolver sub-paths discovered for each edge's requirement.
///
/// `edges` and `required_paths` are always the same length; the sub-path list
/// for an edge is only non-empty when the edge carried a requirement. The cost
/// is the sum of per-edge base costs plus the full cost of every attached
/// requirement sub-path. Summing the sub-paths over-counts when the gateway
/// later deduplicates entity calls, but every candidate is priced with the
/// same formula so the relative order of plans is unaffected.
#[derive(Debug, Clone)]
pub struct OperationPath {
    root: NodeIndex,
    edges: Vec<EdgeIndex>,
    required_paths: Vec<Vec<OperationPath>>,
    cost: u64,
}

impl OperationPath {
    pub(crate) fn new(root: NodeIndex) -> Self {
        Self {
            root,
            edges: Vec::new(),
            required_paths: Vec::new(),
            cost: 0,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn edges(&self) -> &[EdgeIndex] {
        &self.edges
    }

    /// The resolver sub-paths attached to each edge, aligned with [`edges`].
    ///
    /// [`edges`]: Self::edges
    pub fn required_paths(&self) -> &[Vec<OperationPath>] {
        &self.required_paths
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// The node this path currently ends on.
    pub fn tail(&self, graph: &QueryGraph) -> Result<NodeIndex, PlannerError> {
        match self.edges.last() {
            Some(&edge) => Ok(graph.edge_endpoints(edge)?.1),
            None => Ok(self.root),
        }
    }

    pub fn contains_edge(&self, edge: EdgeIndex) -> bool {
        self.edges.contains(&edge)
    }

    /// Extends the path by one edge, producing a new path sharing no mutable
    /// state with this one.
    pub(crate) fn advance(
        &self,
        graph: &QueryGraph,
        edge: EdgeIndex,
    ) -> Result<Self, PlannerError> {
        let mut advanced = self.clone();
        advanced.cost += graph.edge_weight(edge)?.transition.base_cost();
        advanced.edges.push(edge);
        advanced.required_paths.push(Vec::new());
        Ok(advanced)
    }

    /// Attaches resolver sub-paths to the most recently taken edge, adding
    /// their cost.
    pub(crate) fn add_required_paths(
        mut self,
        paths: Vec<OperationPath>,
    ) -> Result<Self, PlannerError> {
        ensure!(
            self.edges.len() == self.required_paths.len(),
            "operation path has {} edges but {} requirement slots",
            self.edges.len(),
            self.required_paths.len(),
        );
        let added_cost: u64 = paths.iter().map(|path| path.cost).sum();
        let Some(slot) = self.required_paths.last_mut() else {
            bail!("cannot attach requirement paths to an empty operation path");
        };
        slot.extend(paths);
        self.cost += added_cost;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_graph::QueryGraphEdgeTransition;
    use crate::query_graph::build::build_query_graph;
    use crate::supergraph::Supergraph;

    const SDL: &str = r#"
      directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION
      directive @join__graph(name: String!, url: String!) on ENUM_VALUE
      directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true, isInterfaceObject: Boolean! = false) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR

      scalar join__FieldSet

      enum join__Graph {
        A @join__graph(name: "A", url: "http://localhost:4001")
        B @join__graph(name: "B", url: "http://localhost:4002")
      }

      type Query @join__type(graph: A) @join__type(graph: B) {
        users: [User] @join__field(graph: B)
      }

      type User @join__type(graph: A, key: "id") @join__type(graph: B, key: "id") {
        id: ID!
        name: String
        age: Int @join__field(graph: A)
      }
    "#;

    fn graph() -> QueryGraph {
        let supergraph = Supergraph::parse(SDL).unwrap();
        build_query_graph(&supergraph).unwrap()
    }

    fn field_edge_in(graph: &QueryGraph, field: &str, source: &str) -> EdgeIndex {
        graph
            .graph()
            .edge_indices()
            .find(|&edge| {
                let weight = graph.edge_weight(edge).unwrap();
                let head = graph.edge_head(edge).unwrap();
                matches!(
                    &weight.transition,
                    QueryGraphEdgeTransition::Field { field_name, .. }
                        if field_name.as_str() == field
                ) && &*head.source == source
            })
            .unwrap()
    }

    fn entity_edge_out_of(graph: &QueryGraph, source: &str) -> EdgeIndex {
        graph
            .graph()
            .edge_indices()
            .find(|&edge| {
                graph.edge_weight(edge).unwrap().transition.is_entity()
                    && &*graph.edge_head(edge).unwrap().source == source
            })
            .unwrap()
    }

    #[test]
    fn advance_accumulates_per_edge_base_costs() {
        let graph = graph();
        let users = field_edge_in(&graph, "users", "B");
        let jump = entity_edge_out_of(&graph, "B");

        let (root, users_tail) = graph.edge_endpoints(users).unwrap();
        let path = OperationPath::new(root);
        assert_eq!(path.cost(), 0);
        assert_eq!(path.tail(&graph).unwrap(), root);

        // Field moves cost 1, any other move costs 10.
        let path = path.advance(&graph, users).unwrap();
        assert_eq!(path.cost(), 1);
        assert_eq!(path.tail(&graph).unwrap(), users_tail);

        let path = path.advance(&graph, jump).unwrap();
        assert_eq!(path.cost(), 11);
        assert_eq!(path.edges().len(), path.required_paths().len());
        assert!(path.contains_edge(users));
        assert!(path.contains_edge(jump));
    }

    #[test]
    fn attached_requirement_paths_add_their_full_cost() {
        let graph = graph();
        let users = field_edge_in(&graph, "users", "B");
        let jump = entity_edge_out_of(&graph, "B");
        let id = field_edge_in(&graph, "id", "B");

        let (root, _) = graph.edge_endpoints(users).unwrap();
        let reached_users = OperationPath::new(root).advance(&graph, users).unwrap();

        // The resolver sub-path is a clone of the position the jump leaves
        // from, extended by the key field, and it is priced at its full cost
        // of 2, not just the cost of the extension.
        let resolver = reached_users.advance(&graph, id).unwrap();
        assert_eq!(resolver.cost(), 2);

        let jumped = reached_users
            .advance(&graph, jump)
            .unwrap()
            .add_required_paths(vec![resolver])
            .unwrap();
        assert_eq!(jumped.cost(), 13);
        assert_eq!(jumped.required_paths().last().unwrap().len(), 1);

        // Attaching nothing leaves the cost alone.
        let unchanged = jumped.clone().add_required_paths(Vec::new()).unwrap();
        assert_eq!(unchanged.cost(), 13);
    }
}
