//! Supergraph parsing.
//!
//! A composed supergraph document annotates every type and field with join
//! directives describing which subgraph can resolve what. This module parses
//! the document once and projects it into one type table per subgraph, which
//! is all the query graph builder needs.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;
use tracing::debug;

use crate::OperationKind;
use crate::error::PlannerError;

mod join_spec;

pub use join_spec::JoinEnumValue;
pub use join_spec::JoinField;
pub use join_spec::JoinGraph;
pub use join_spec::JoinImplements;
pub use join_spec::JoinType;
pub use join_spec::JoinUnionMember;

/// The GraphQL kind of a type entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum TypeKind {
    Object,
    Interface,
    Enum,
    Union,
    InputObject,
    Scalar,
}

impl TypeKind {
    fn of(extended_type: &ExtendedType) -> Self {
        match extended_type {
            ExtendedType::Scalar(_) => TypeKind::Scalar,
            ExtendedType::Object(_) => TypeKind::Object,
            ExtendedType::Interface(_) => TypeKind::Interface,
            ExtendedType::Union(_) => TypeKind::Union,
            ExtendedType::Enum(_) => TypeKind::Enum,
            ExtendedType::InputObject(_) => TypeKind::InputObject,
        }
    }
}

/// One field of a type, as seen from a single subgraph.
#[derive(Debug, Clone)]
pub struct ObjectTypeField {
    pub name: Name,
    /// The field's named type with all list/non-null wrappers stripped.
    pub type_name: Name,
    /// True if a list wrapper appears at any nullability depth.
    pub is_list: bool,
    pub join: Option<JoinField>,
}

impl ObjectTypeField {
    pub fn is_external(&self) -> bool {
        self.join.as_ref().is_some_and(|join| join.external)
    }
}

/// One type, as seen from a single subgraph. Despite the name this covers all
/// type kinds; only objects and interfaces carry fields.
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: Name,
    pub kind: TypeKind,
    pub fields: Vec<ObjectTypeField>,
    /// The `@join__type` applications naming this subgraph, one per key.
    pub join: Vec<JoinType>,
    pub implements_joins: Vec<JoinImplements>,
    pub union_member_joins: Vec<JoinUnionMember>,
    pub enum_value_joins: Vec<JoinEnumValue>,
}

impl ObjectType {
    pub fn field(&self, name: &Name) -> Option<&ObjectTypeField> {
        self.fields.iter().find(|field| field.name == *name)
    }

    pub fn is_entity(&self) -> bool {
        self.join
            .iter()
            .any(|join| join.resolvable && join.key.is_some())
    }
}

/// One backend service of the federated system.
#[derive(Debug, Clone)]
pub struct Subgraph {
    /// The service name, from `@join__graph(name:)`.
    pub id: Arc<str>,
    /// The `join__Graph` enum value referring to this subgraph.
    pub enum_value: Name,
    pub types: IndexMap<Name, ObjectType>,
    pub entity_types: IndexSet<Name>,
}

impl Subgraph {
    fn new(enum_value: Name, id: Arc<str>) -> Self {
        Self {
            id,
            enum_value,
            types: IndexMap::new(),
            entity_types: IndexSet::new(),
        }
    }

    pub fn type_entry(&self, name: &Name) -> Option<&ObjectType> {
        self.types.get(name)
    }

    fn insert_type(&mut self, entry: ObjectType) -> Result<(), PlannerError> {
        if entry.is_entity() {
            self.entity_types.insert(entry.name.clone());
        }
        let name = entry.name.clone();
        if self.types.insert(name.clone(), entry).is_some() {
            return Err(PlannerError::malformed_supergraph(format!(
                "type \"{name}\" is defined twice in subgraph \"{}\"",
                self.id,
            )));
        }
        Ok(())
    }
}

/// The parsed supergraph: the validated schema plus one [`Subgraph`] per
/// `join__Graph` enum value, in declaration order.
#[derive(Debug)]
pub struct Supergraph {
    schema: Valid<Schema>,
    subgraphs: IndexMap<Name, Subgraph>,
    root_types: IndexMap<OperationKind, Name>,
}

impl Supergraph {
    pub fn parse(sdl: &str) -> Result<Self, PlannerError> {
        let schema = Schema::parse_and_validate(sdl, "supergraph.graphql")?;
        let mut subgraphs = extract_subgraph_table(&schema)?;
        let root_types = extract_root_types(&schema);

        for (type_name, extended_type) in &schema.types {
            if is_spec_internal_type(type_name) {
                continue;
            }
            let kind = TypeKind::of(extended_type);
            let mut join_types = Vec::new();
            for directive in extended_type.directives().iter() {
                if directive.name == join_spec::JOIN_TYPE_DIRECTIVE_NAME {
                    join_types.push(join_spec::join_type_arguments(directive)?);
                }
            }
            // A type carrying no @join__type application (built-in scalars in
            // particular) is available in every subgraph.
            let owners: Vec<Name> = if join_types.is_empty() {
                subgraphs.keys().cloned().collect()
            } else {
                join_types
                    .iter()
                    .map(|join| join.graph.clone())
                    .unique()
                    .collect()
            };
            for owner in owners {
                let entry = project_type(type_name, kind, extended_type, &join_types, &owner)?;
                let subgraph = subgraphs.get_mut(&owner).ok_or_else(|| {
                    PlannerError::malformed_supergraph(format!(
                        "type \"{type_name}\" is joined to \"{owner}\", which is not a value of \
                         the {} enum",
                        join_spec::JOIN_GRAPH_ENUM_NAME,
                    ))
                })?;
                subgraph.insert_type(entry)?;
            }
        }

        debug!(
            subgraphs = subgraphs.len(),
            "parsed supergraph: {}",
            subgraphs.values().map(|subgraph| &subgraph.id).join(", ")
        );
        Ok(Self {
            schema,
            subgraphs,
            root_types,
        })
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub fn subgraphs(&self) -> impl Iterator<Item = &Subgraph> {
        self.subgraphs.values()
    }

    pub fn subgraph(&self, enum_value: &Name) -> Option<&Subgraph> {
        self.subgraphs.get(enum_value)
    }

    /// The name of the root operation type for the given kind, honoring an
    /// explicit `schema { ... }` block when one is present.
    pub fn root_type(&self, kind: OperationKind) -> Option<&Name> {
        self.root_types.get(&kind)
    }
}

fn extract_subgraph_table(schema: &Valid<Schema>) -> Result<IndexMap<Name, Subgraph>, PlannerError> {
    let Some(ExtendedType::Enum(graph_enum)) = schema.types.get(&join_spec::JOIN_GRAPH_ENUM_NAME)
    else {
        return Err(PlannerError::malformed_supergraph(format!(
            "supergraph does not define the {} enum",
            join_spec::JOIN_GRAPH_ENUM_NAME,
        )));
    };
    let mut subgraphs = IndexMap::new();
    for (value_name, value_def) in &graph_enum.values {
        let directive = value_def
            .directives
            .iter()
            .find(|directive| directive.name == join_spec::JOIN_GRAPH_DIRECTIVE_NAME)
            .ok_or_else(|| {
                PlannerError::malformed_supergraph(format!(
                    "{} value \"{value_name}\" is missing its @{} application",
                    join_spec::JOIN_GRAPH_ENUM_NAME,
                    join_spec::JOIN_GRAPH_DIRECTIVE_NAME,
                ))
            })?;
        let arguments = join_spec::join_graph_arguments(directive)?;
        subgraphs.insert(
            value_name.clone(),
            Subgraph::new(value_name.clone(), Arc::from(arguments.name.as_str())),
        );
    }
    Ok(subgraphs)
}

fn extract_root_types(schema: &Valid<Schema>) -> IndexMap<OperationKind, Name> {
    let mut root_types = IndexMap::new();
    for kind in [
        OperationKind::Query,
        OperationKind::Mutation,
        OperationKind::Subscription,
    ] {
        if let Some(type_name) = schema.root_operation(kind.into()) {
            root_types.insert(kind, type_name.clone());
        }
    }
    root_types
}

fn is_spec_internal_type(type_name: &Name) -> bool {
    type_name.starts_with("__")
        || type_name.starts_with("join__")
        || type_name.starts_with("link__")
}

fn type_is_list(ty: &ast::Type) -> bool {
    matches!(ty, ast::Type::List(_) | ast::Type::NonNullList(_))
}

/// Builds the view of `extended_type` from subgraph `owner`: only the fields
/// the subgraph defines, with the join metadata that names it.
fn project_type(
    type_name: &Name,
    kind: TypeKind,
    extended_type: &ExtendedType,
    join_types: &[JoinType],
    owner: &Name,
) -> Result<ObjectType, PlannerError> {
    let mut fields = Vec::new();
    let field_definitions: Vec<(&Name, &ast::FieldDefinition)> = match extended_type {
        ExtendedType::Object(object) => object
            .fields
            .iter()
            .map(|(name, field)| (name, field.as_ref()))
            .collect(),
        ExtendedType::Interface(interface) => interface
            .fields
            .iter()
            .map(|(name, field)| (name, field.as_ref()))
            .collect(),
        _ => Vec::new(),
    };
    for (field_name, field_def) in field_definitions {
        let mut field_joins = Vec::new();
        for directive in field_def.directives.iter() {
            if directive.name == join_spec::JOIN_FIELD_DIRECTIVE_NAME {
                field_joins.push(join_spec::join_field_arguments(directive)?);
            }
        }
        // A field with no @join__field belongs to every subgraph hosting the
        // type; otherwise it belongs to the subgraphs its applications name.
        let join = if field_joins.is_empty() {
            None
        } else {
            match field_joins
                .into_iter()
                .find(|join| join.graph.as_ref() == Some(owner) || join.graph.is_none())
            {
                Some(join) => Some(join),
                None => continue,
            }
        };
        fields.push(ObjectTypeField {
            name: field_name.clone(),
            type_name: field_def.ty.inner_named_type().clone(),
            is_list: type_is_list(&field_def.ty),
            join,
        });
    }

    let mut implements_joins = Vec::new();
    let mut union_member_joins = Vec::new();
    let mut enum_value_joins = Vec::new();
    for directive in extended_type.directives().iter() {
        if directive.name == join_spec::JOIN_IMPLEMENTS_DIRECTIVE_NAME {
            let arguments = join_spec::join_implements_arguments(directive)?;
            if arguments.graph == *owner {
                implements_joins.push(arguments);
            }
        } else if directive.name == join_spec::JOIN_UNION_MEMBER_DIRECTIVE_NAME {
            let arguments = join_spec::join_union_member_arguments(directive)?;
            if arguments.graph == *owner {
                union_member_joins.push(arguments);
            }
        }
    }
    if let ExtendedType::Enum(enum_type) = extended_type {
        for (value_name, value_def) in &enum_type.values {
            for directive in value_def.directives.iter() {
                if directive.name == join_spec::JOIN_ENUM_VALUE_DIRECTIVE_NAME {
                    let arguments = join_spec::join_enum_value_arguments(directive, value_name)?;
                    if arguments.graph == *owner {
                        enum_value_joins.push(arguments);
                    }
                }
            }
        }
    }

    Ok(ObjectType {
        name: type_name.clone(),
        kind,
        fields,
        join: join_types
            .iter()
            .filter(|join| join.graph == *owner)
            .cloned()
            .collect(),
        implements_joins,
        union_member_joins,
        enum_value_joins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

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
        email: String @join__field(graph: B, external: true)
      }
    "#;

    #[test]
    fn projects_one_type_table_per_subgraph() {
        let supergraph = Supergraph::parse(SDL).unwrap();
        let subgraphs: Vec<_> = supergraph.subgraphs().collect();
        assert_eq!(subgraphs.len(), 2);
        assert_eq!(&*subgraphs[0].id, "A");
        assert_eq!(&*subgraphs[1].id, "B");

        let user_name = Name::new("User").unwrap();
        let user_in_a = subgraphs[0].type_entry(&user_name).unwrap();
        let field_names: Vec<_> = user_in_a
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(field_names, ["id", "name", "age"]);
        assert!(user_in_a.is_entity());

        let user_in_b = subgraphs[1].type_entry(&user_name).unwrap();
        let field_names: Vec<_> = user_in_b
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(field_names, ["id", "name", "email"]);
        let email = user_in_b.field(&Name::new("email").unwrap()).unwrap();
        assert!(email.is_external());

        // Query is not an entity and `users` only lives in B.
        let query_name = Name::new("Query").unwrap();
        assert!(subgraphs[0].type_entry(&query_name).unwrap().fields.is_empty());
        assert!(!subgraphs[1].entity_types.contains(&query_name));
        assert!(subgraphs[1].entity_types.contains(&user_name));
    }

    #[test]
    fn list_detection_ignores_nullability_wrappers() {
        let supergraph = Supergraph::parse(SDL).unwrap();
        let subgraph = supergraph.subgraphs().nth(1).unwrap();
        let query = subgraph.type_entry(&Name::new("Query").unwrap()).unwrap();
        let users = query.field(&Name::new("users").unwrap()).unwrap();
        assert!(users.is_list);
        assert_eq!(users.type_name.as_str(), "User");
    }

    #[test]
    fn root_types_default_to_conventional_names() {
        let supergraph = Supergraph::parse(SDL).unwrap();
        assert_eq!(
            supergraph.root_type(OperationKind::Query).unwrap().as_str(),
            "Query"
        );
        assert!(supergraph.root_type(OperationKind::Mutation).is_none());
    }

    #[test]
    fn missing_graph_enum_is_a_hard_error() {
        let error = Supergraph::parse("type Query { id: ID }").unwrap_err();
        assert!(matches!(error, PlannerError::MalformedSupergraph { .. }));
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
    fn abstract_join_metadata_is_parsed() {
        let supergraph = Supergraph::parse(ABSTRACT_SDL).unwrap();
        let catalog = supergraph.subgraphs().next().unwrap();
        assert_eq!(&*catalog.id, "catalog");

        let book = catalog.type_entry(&Name::new("Book").unwrap()).unwrap();
        assert_eq!(book.kind, TypeKind::Object);
        assert_eq!(book.implements_joins.len(), 1);
        assert_eq!(book.implements_joins[0].interface.as_str(), "Media");
        assert_eq!(book.implements_joins[0].graph.as_str(), "CATALOG");

        let search = catalog
            .type_entry(&Name::new("SearchResult").unwrap())
            .unwrap();
        assert_eq!(search.kind, TypeKind::Union);
        assert_eq!(search.union_member_joins.len(), 1);
        assert_eq!(search.union_member_joins[0].member.as_str(), "Book");

        let genre = catalog.type_entry(&Name::new("Genre").unwrap()).unwrap();
        assert_eq!(genre.kind, TypeKind::Enum);
        let values: Vec<_> = genre
            .enum_value_joins
            .iter()
            .map(|join| join.value.as_str())
            .collect();
        assert_eq!(values, ["FICTION", "NONFICTION"]);

        // Media is an interface in catalog, an interface object in reviews.
        let media_name = Name::new("Media").unwrap();
        let reviews = supergraph.subgraphs().nth(1).unwrap();
        let media_in_reviews = reviews.type_entry(&media_name).unwrap();
        assert!(media_in_reviews.join[0].is_interface_object);
        assert!(!catalog.type_entry(&media_name).unwrap().join[0].is_interface_object);
    }
}
