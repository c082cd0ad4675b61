//! Query graph construction.
//!
//! Each subgraph contributes its own nodes and field edges, starting from the
//! root operation types and the subgraph's entity types and recursing until
//! every reachable type has a node. A final pass joins entities across
//! subgraphs: for every resolvable key of a type in subgraph G, every other
//! subgraph hosting that type gets an entity edge into G carrying the resolved
//! key selection as its requirement. Redundant jumps with identical
//! requirements are not pruned here; the walker prunes them during search.

use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use tracing::debug;

use apollo_compiler::Name;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::OperationKind;
use crate::error::PlannerError;
use crate::query_graph::QueryGraph;
use crate::query_graph::QueryGraphEdge;
use crate::query_graph::QueryGraphEdgeTransition;
use crate::query_graph::QueryGraphNode;
use crate::selection::SelectionResolver;
use crate::supergraph::Subgraph;
use crate::supergraph::Supergraph;
use crate::supergraph::TypeKind;

pub fn build_query_graph(supergraph: &Supergraph) -> Result<QueryGraph, PlannerError> {
    let mut builder = QueryGraphBuilder::new(supergraph);
    for subgraph in supergraph.subgraphs() {
        builder.add_subgraph(subgraph)?;
    }
    builder.join_by_keys()?;
    builder.add_interface_object_edges();
    let graph = builder.graph;
    debug!(
        nodes = graph.graph.node_count(),
        edges = graph.graph.edge_count(),
        "built query graph"
    );
    Ok(graph)
}

struct QueryGraphBuilder<'a> {
    supergraph: &'a Supergraph,
    graph: QueryGraph,
}

impl<'a> QueryGraphBuilder<'a> {
    fn new(supergraph: &'a Supergraph) -> Self {
        let mut root_types = IndexMap::new();
        for kind in [
            OperationKind::Query,
            OperationKind::Mutation,
            OperationKind::Subscription,
        ] {
            if let Some(type_name) = supergraph.root_type(kind) {
                root_types.insert(kind, type_name.clone());
            }
        }
        Self {
            supergraph,
            graph: QueryGraph {
                graph: DiGraph::new(),
                types_to_nodes: IndexMap::new(),
                nodes_by_source_and_type: IndexMap::new(),
                root_types,
                sources: IndexSet::new(),
            },
        }
    }

    fn add_subgraph(&mut self, subgraph: &Subgraph) -> Result<(), PlannerError> {
        self.graph.sources.insert(subgraph.id.clone());
        let supergraph = self.supergraph;
        for kind in [
            OperationKind::Query,
            OperationKind::Mutation,
            OperationKind::Subscription,
        ] {
            if let Some(root_type) = supergraph.root_type(kind) {
                if subgraph.types.contains_key(root_type) {
                    self.add_type_recursively(subgraph, root_type)?;
                }
            }
        }
        // Entity types may not be reachable from any root of this subgraph,
        // but other subgraphs can still jump to them.
        let entity_types: Vec<Name> = subgraph.entity_types.iter().cloned().collect();
        for type_name in &entity_types {
            self.add_type_recursively(subgraph, type_name)?;
        }
        Ok(())
    }

    /// Adds a node for the given type in the given subgraph, then recursively
    /// adds nodes and edges for everything its fields reach. Scalars and enums
    /// become leaf nodes with no outgoing edges.
    fn add_type_recursively(
        &mut self,
        subgraph: &Subgraph,
        type_name: &Name,
    ) -> Result<NodeIndex, PlannerError> {
        if let Some(node) = self.graph.node_for(&subgraph.id, type_name) {
            return Ok(node);
        }
        let entry = subgraph.type_entry(type_name).ok_or_else(|| {
            PlannerError::malformed_supergraph(format!(
                "type \"{type_name}\" is not defined in subgraph \"{}\"",
                subgraph.id,
            ))
        })?;
        let node = self.create_node(subgraph, type_name, entry.kind);
        match entry.kind {
            TypeKind::Object | TypeKind::Interface => {
                for field in &entry.fields {
                    // External fields only exist to keep the subgraph schema
                    // valid; they cannot be traversed.
                    if field.is_external() {
                        continue;
                    }
                    let tail = self.add_type_recursively(subgraph, &field.type_name)?;
                    let tail_kind = self.graph.node_weight(tail)?.kind;
                    self.graph.graph.add_edge(
                        node,
                        tail,
                        QueryGraphEdge {
                            transition: QueryGraphEdgeTransition::Field {
                                field_name: field.name.clone(),
                                type_name: field.type_name.clone(),
                                type_kind: tail_kind,
                                is_list: field.is_list,
                            },
                            requirement: None,
                        },
                    );
                }
                for implements in &entry.implements_joins {
                    if !subgraph.types.contains_key(&implements.interface) {
                        continue;
                    }
                    let interface_node =
                        self.add_type_recursively(subgraph, &implements.interface)?;
                    self.graph.graph.add_edge(
                        interface_node,
                        node,
                        QueryGraphEdge {
                            transition: QueryGraphEdgeTransition::Downcast {
                                from_type: implements.interface.clone(),
                                from_kind: TypeKind::Interface,
                                to_type: type_name.clone(),
                                to_kind: entry.kind,
                            },
                            requirement: None,
                        },
                    );
                }
            }
            TypeKind::Union => {
                for member in &entry.union_member_joins {
                    if !subgraph.types.contains_key(&member.member) {
                        continue;
                    }
                    let tail = self.add_type_recursively(subgraph, &member.member)?;
                    let tail_kind = self.graph.node_weight(tail)?.kind;
                    self.graph.graph.add_edge(
                        node,
                        tail,
                        QueryGraphEdge {
                            transition: QueryGraphEdgeTransition::Downcast {
                                from_type: type_name.clone(),
                                from_kind: TypeKind::Union,
                                to_type: member.member.clone(),
                                to_kind: tail_kind,
                            },
                            requirement: None,
                        },
                    );
                }
            }
            TypeKind::Scalar | TypeKind::Enum | TypeKind::InputObject => {}
        }
        Ok(node)
    }

    fn create_node(&mut self, subgraph: &Subgraph, type_name: &Name, kind: TypeKind) -> NodeIndex {
        let node = self.graph.graph.add_node(QueryGraphNode {
            type_name: type_name.clone(),
            kind,
            source: subgraph.id.clone(),
        });
        self.graph
            .types_to_nodes
            .entry(type_name.clone())
            .or_default()
            .insert(node);
        self.graph
            .nodes_by_source_and_type
            .insert((subgraph.id.clone(), type_name.clone()), node);
        node
    }

    /// For every resolvable key of an entity, fan entity edges out of every
    /// other subgraph hosting the type into the key's owner. Only object
    /// types participate; interface and union keys are skipped.
    fn join_by_keys(&mut self) -> Result<(), PlannerError> {
        let supergraph = self.supergraph;
        for target_subgraph in supergraph.subgraphs() {
            let mut resolver = SelectionResolver::new(supergraph.schema(), target_subgraph);
            for type_name in &target_subgraph.entity_types {
                let Some(entry) = target_subgraph.type_entry(type_name) else {
                    continue;
                };
                if entry.kind != TypeKind::Object {
                    continue;
                }
                let Some(target_node) = self.graph.node_for(&target_subgraph.id, type_name) else {
                    continue;
                };
                for join in &entry.join {
                    if !join.resolvable {
                        continue;
                    }
                    let Some(key) = &join.key else {
                        continue;
                    };
                    let requirement = resolver.resolve(type_name, key)?;
                    for source_subgraph in supergraph.subgraphs() {
                        if source_subgraph.id == target_subgraph.id {
                            continue;
                        }
                        let Some(source_node) =
                            self.graph.node_for(&source_subgraph.id, type_name)
                        else {
                            continue;
                        };
                        self.graph.graph.add_edge(
                            source_node,
                            target_node,
                            QueryGraphEdge {
                                transition: QueryGraphEdgeTransition::Entity,
                                requirement: Some(requirement.clone()),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// An object marked `isInterfaceObject` stands in for an interface other
    /// subgraphs define for real. The edges only record that relationship;
    /// the walker never takes them.
    fn add_interface_object_edges(&mut self) {
        let supergraph = self.supergraph;
        for subgraph in supergraph.subgraphs() {
            for (type_name, entry) in &subgraph.types {
                if !entry.join.iter().any(|join| join.is_interface_object) {
                    continue;
                }
                let Some(object_node) = self.graph.node_for(&subgraph.id, type_name) else {
                    continue;
                };
                for other_subgraph in supergraph.subgraphs() {
                    if other_subgraph.id == subgraph.id {
                        continue;
                    }
                    let hosted_as_interface = other_subgraph
                        .type_entry(type_name)
                        .is_some_and(|other| other.kind == TypeKind::Interface);
                    if !hosted_as_interface {
                        continue;
                    }
                    let Some(interface_node) = self.graph.node_for(&other_subgraph.id, type_name)
                    else {
                        continue;
                    };
                    self.graph.graph.add_edge(
                        interface_node,
                        object_node,
                        QueryGraphEdge {
                            transition: QueryGraphEdgeTransition::InterfaceObject {
                                from_type: type_name.clone(),
                                from_kind: TypeKind::Interface,
                                to_type: type_name.clone(),
                            },
                            requirement: None,
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SUBGRAPH_SDL: &str = r#"
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

    #[test]
    fn merged_graph_joins_entities_in_both_directions() {
        let supergraph = Supergraph::parse(TWO_SUBGRAPH_SDL).unwrap();
        let graph = build_query_graph(&supergraph).unwrap();

        let user = Name::new("User").unwrap();
        let user_nodes: Vec<_> = graph.nodes_for_type(&user).collect();
        assert_eq!(user_nodes.len(), 2);

        let mut entity_edges = Vec::new();
        for edge in graph.graph().edge_indices() {
            let weight = graph.edge_weight(edge).unwrap();
            if weight.transition.is_entity() {
                entity_edges.push(edge);
            }
        }
        assert_eq!(entity_edges.len(), 2);

        // One edge per direction, each carrying the canonical "id" selection.
        let mut directions = Vec::new();
        for edge in entity_edges {
            let head = graph.edge_head(edge).unwrap();
            let tail = graph.edge_tail(edge).unwrap();
            assert_eq!(head.type_name, user);
            assert_eq!(tail.type_name, user);
            directions.push((head.source.clone(), tail.source.clone()));

            let requirement = graph.edge_weight(edge).unwrap().requirement.clone().unwrap();
            let expected = {
                let subgraph = supergraph
                    .subgraphs()
                    .find(|subgraph| subgraph.id == tail.source)
                    .unwrap();
                let mut resolver = SelectionResolver::new(supergraph.schema(), subgraph);
                resolver.resolve(&user, "id").unwrap()
            };
            assert_eq!(*requirement, *expected);
        }
        directions.sort();
        let directions: Vec<(&str, &str)> = directions
            .iter()
            .map(|(head, tail)| (&**head, &**tail))
            .collect();
        assert_eq!(directions, [("A", "B"), ("B", "A")]);
    }

    const ABSTRACT_SDL: &str = r#"
      directive @join__enumValue(graph: join__Graph!) repeatable on ENUM_VALUE
      directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION
      directive @join__graph(name: String!, url: String!) on ENUM_VALUE
      directive @join__implements(graph: join__Graph!, interface: String!) repeatable on OBJECT | INTERFACE
      directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true, isInterfaceObject: Boolean! = false) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR
      directive @join__unionMember(graph: join__Graph!, member: String!) repeatable on UNION

      scalar join__FieldSet

      enum join__Graph {
        CATALOG @join__graph(name: "catalog", url: "http://catalog")
        REVIEWS @join__graph(name: "reviews", url: "http://reviews")
      }

      type Query @join__type(graph: CATALOG) @join__type(graph: REVIEWS) {
        media: Media @join__field(graph: CATALOG)
        search: [SearchResult] @join__field(graph: CATALOG)
      }

      interface Media
        @join__type(graph: CATALOG, key: "id")
        @join__type(graph: REVIEWS, key: "id", isInterfaceObject: true)
      {
        id: ID!
        title: String
      }

      type Book implements Media
        @join__type(graph: CATALOG)
        @join__implements(graph: CATALOG, interface: "Media")
      {
        id: ID!
        title: String
        genre: Genre
      }

      union SearchResult
        @join__type(graph: CATALOG)
        @join__unionMember(graph: CATALOG, member: "Book")
       = Book

      enum Genre @join__type(graph: CATALOG) {
        FICTION @join__enumValue(graph: CATALOG)
        NONFICTION @join__enumValue(graph: CATALOG)
      }
    "#;

    #[test]
    fn abstract_moves_are_emitted_but_interface_keys_are_never_joined() {
        let supergraph = Supergraph::parse(ABSTRACT_SDL).unwrap();
        let graph = build_query_graph(&supergraph).unwrap();

        let mut downcasts = Vec::new();
        let mut interface_objects = Vec::new();
        let mut entity_edges = 0;
        for edge in graph.graph().edge_indices() {
            match &graph.edge_weight(edge).unwrap().transition {
                QueryGraphEdgeTransition::Downcast {
                    from_type, to_type, ..
                } => downcasts.push((from_type.to_string(), to_type.to_string())),
                QueryGraphEdgeTransition::InterfaceObject { .. } => {
                    let head = graph.edge_head(edge).unwrap();
                    let tail = graph.edge_tail(edge).unwrap();
                    interface_objects
                        .push((head.source.to_string(), tail.source.to_string()));
                }
                QueryGraphEdgeTransition::Entity => entity_edges += 1,
                QueryGraphEdgeTransition::Field { .. } => {}
            }
        }

        // One narrowing edge per @join__implements and @join__unionMember.
        downcasts.sort();
        assert_eq!(
            downcasts,
            [
                ("Media".to_owned(), "Book".to_owned()),
                ("SearchResult".to_owned(), "Book".to_owned()),
            ]
        );

        // The interface-object edge points from the real interface toward the
        // subgraph standing in for it.
        assert_eq!(
            interface_objects,
            [("catalog".to_owned(), "reviews".to_owned())]
        );

        // Media carries resolvable keys in both subgraphs, but only object
        // types participate in key joining.
        assert_eq!(entity_edges, 0);
    }

    #[test]
    fn external_fields_get_no_edges() {
        let sdl = TWO_SUBGRAPH_SDL.replace(
            "age: Int @join__field(graph: A)",
            "age: Int @join__field(graph: A, external: true)",
        );
        let supergraph = Supergraph::parse(&sdl).unwrap();
        let graph = build_query_graph(&supergraph).unwrap();
        let has_age_edge = graph.graph().edge_indices().any(|edge| {
            matches!(
                &graph.edge_weight(edge).unwrap().transition,
                QueryGraphEdgeTransition::Field { field_name, .. } if field_name == "age"
            )
        });
        assert!(!has_age_edge);
    }
}
