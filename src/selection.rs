//! Canonical key/requires selections.
//!
//! Requirement equality sits on a hot path of the walker, so a [`Selection`]
//! keeps two representations: the raw key string (fast early-out when two
//! selections come from the same SDL text) and a canonically sorted tree
//! (the definitive comparison). The memoizing [`SelectionResolver`] guarantees
//! structural sharing for identical `(type name, key fields)` pairs.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable;
use apollo_compiler::executable::FieldSet;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PlannerError;
use crate::supergraph::Subgraph;

/// A single node of a canonical selection set: either a field (tagged with the
/// type it is selected on) or an inline fragment narrowing to a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionNode {
    Field {
        type_name: Name,
        field_name: Name,
        selections: Vec<SelectionNode>,
    },
    Fragment {
        type_name: Name,
        selections: Vec<SelectionNode>,
    },
}

impl SelectionNode {
    pub fn field(type_name: Name, field_name: Name) -> Self {
        SelectionNode::Field {
            type_name,
            field_name,
            selections: Vec::new(),
        }
    }

    pub(crate) fn write_compact(&self, out: &mut String) {
        match self {
            SelectionNode::Field {
                field_name,
                selections,
                ..
            } => {
                out.push_str(field_name);
                write_compact_sub_selections(selections, out);
            }
            SelectionNode::Fragment {
                type_name,
                selections,
            } => {
                out.push_str("... on ");
                out.push_str(type_name);
                write_compact_sub_selections(selections, out);
            }
        }
    }
}

fn write_compact_sub_selections(selections: &[SelectionNode], out: &mut String) {
    if selections.is_empty() {
        return;
    }
    out.push('{');
    for (i, selection) in selections.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        selection.write_compact(out);
    }
    out.push('}');
}

impl fmt::Display for SelectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionNode::Field {
                field_name,
                selections,
                ..
            } => {
                write!(f, "{field_name}")?;
                if !selections.is_empty() {
                    write!(f, " ")?;
                    write_selection_set(f, selections)?;
                }
                Ok(())
            }
            SelectionNode::Fragment {
                type_name,
                selections,
            } => {
                write!(f, "... on {type_name} ")?;
                write_selection_set(f, selections)
            }
        }
    }
}

/// Writes `{ a b { c } }` with single-space separators, the format used by the
/// query plan pretty-printer.
pub(crate) fn write_selection_set(
    f: &mut fmt::Formatter<'_>,
    selections: &[SelectionNode],
) -> fmt::Result {
    write!(f, "{{")?;
    for selection in selections {
        write!(f, " {selection}")?;
    }
    write!(f, " }}")
}

/// Sorts a selection set into its canonical order, recursively:
/// fields before fragments, fields by `Type.field`, fragments by type name.
/// The sort is stable so repeated applications are idempotent.
pub(crate) fn sort_selection_set(selections: &mut [SelectionNode]) {
    for selection in selections.iter_mut() {
        match selection {
            SelectionNode::Field { selections, .. }
            | SelectionNode::Fragment { selections, .. } => sort_selection_set(selections),
        }
    }
    selections.sort_by(|a, b| match (a, b) {
        (
            SelectionNode::Field {
                type_name: a_type,
                field_name: a_field,
                ..
            },
            SelectionNode::Field {
                type_name: b_type,
                field_name: b_field,
                ..
            },
        ) => (a_type.as_str(), a_field.as_str()).cmp(&(b_type.as_str(), b_field.as_str())),
        (SelectionNode::Field { .. }, SelectionNode::Fragment { .. }) => Ordering::Less,
        (SelectionNode::Fragment { .. }, SelectionNode::Field { .. }) => Ordering::Greater,
        (
            SelectionNode::Fragment { type_name: a, .. },
            SelectionNode::Fragment { type_name: b, .. },
        ) => a.as_str().cmp(b.as_str()),
    });
}

/// A resolved key or requires selection, anchored at a type.
#[derive(Debug, Clone, Eq)]
pub struct Selection {
    pub type_name: Name,
    /// The raw field-set string this selection was resolved from.
    pub key_fields: String,
    /// Canonically sorted selection tree.
    pub selection_set: Vec<SelectionNode>,
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && (self.key_fields == other.key_fields || self.selection_set == other.selection_set)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_selection_set(f, &self.selection_set)
    }
}

/// Resolves `(type name, key fields)` pairs into canonical [`Selection`]s for
/// one subgraph. The memo is scoped to the resolver and dies with it.
pub struct SelectionResolver<'a> {
    schema: &'a Valid<Schema>,
    subgraph: &'a Subgraph,
    cache: IndexMap<(Name, String), Arc<Selection>>,
}

impl<'a> SelectionResolver<'a> {
    pub fn new(schema: &'a Valid<Schema>, subgraph: &'a Subgraph) -> Self {
        Self {
            schema,
            subgraph,
            cache: IndexMap::new(),
        }
    }

    pub fn resolve(
        &mut self,
        type_name: &Name,
        key_fields: &str,
    ) -> Result<Arc<Selection>, PlannerError> {
        let cache_key = (type_name.clone(), key_fields.to_owned());
        if let Some(selection) = self.cache.get(&cache_key) {
            return Ok(selection.clone());
        }
        // The parse adds the surrounding braces and validates that every field
        // exists in the supergraph; fields unknown to this particular subgraph
        // are caught while converting below.
        let field_set = FieldSet::parse_and_validate(
            self.schema,
            type_name.clone(),
            key_fields,
            "key_fields.graphql",
        )?;
        let mut selection_set = self.convert(&field_set.selection_set, type_name)?;
        sort_selection_set(&mut selection_set);
        let selection = Arc::new(Selection {
            type_name: type_name.clone(),
            key_fields: key_fields.to_owned(),
            selection_set,
        });
        self.cache.insert(cache_key, selection.clone());
        Ok(selection)
    }

    fn convert(
        &self,
        selection_set: &executable::SelectionSet,
        type_name: &Name,
    ) -> Result<Vec<SelectionNode>, PlannerError> {
        let type_entry = self.subgraph.type_entry(type_name).ok_or_else(|| {
            PlannerError::malformed_supergraph(format!(
                "key fields select type \"{type_name}\", which does not exist in subgraph \"{}\"",
                self.subgraph.id,
            ))
        })?;
        let mut converted = Vec::with_capacity(selection_set.selections.len());
        for selection in &selection_set.selections {
            match selection {
                executable::Selection::Field(field) => {
                    let field_entry = type_entry.field(&field.name).ok_or_else(|| {
                        PlannerError::malformed_supergraph(format!(
                            "key field \"{type_name}.{}\" does not exist in subgraph \"{}\"",
                            field.name, self.subgraph.id,
                        ))
                    })?;
                    let selections = if field.selection_set.selections.is_empty() {
                        Vec::new()
                    } else {
                        self.convert(&field.selection_set, &field_entry.type_name)?
                    };
                    converted.push(SelectionNode::Field {
                        type_name: type_name.clone(),
                        field_name: field.name.clone(),
                        selections,
                    });
                }
                executable::Selection::FragmentSpread(_)
                | executable::Selection::InlineFragment(_) => {
                    return Err(PlannerError::unsupported_feature(format!(
                        "fragments are not supported in key and requires selections \
                         (found one in the selection on \"{type_name}\")",
                    )));
                }
            }
        }
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supergraph::Supergraph;

    fn category_supergraph() -> Supergraph {
        let sdl = r#"
          directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION
          directive @join__graph(name: String!, url: String!) on ENUM_VALUE
          directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true, isInterfaceObject: Boolean! = false) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR

          scalar join__FieldSet

          enum join__Graph {
            PRODUCTS @join__graph(name: "products", url: "http://products")
          }

          type Query @join__type(graph: PRODUCTS) {
            product: Product
          }

          type Product @join__type(graph: PRODUCTS, key: "id pid") {
            id: ID!
            pid: ID!
            category: Category
          }

          type Category @join__type(graph: PRODUCTS) {
            id: ID!
            tag: String
          }
        "#;
        Supergraph::parse(sdl).unwrap()
    }

    #[test]
    fn resolution_is_field_order_invariant() {
        let supergraph = category_supergraph();
        let subgraph = supergraph.subgraphs().next().unwrap();
        let mut resolver = SelectionResolver::new(supergraph.schema(), subgraph);
        let product = Name::new("Product").unwrap();

        let a = resolver
            .resolve(&product, "id pid category { tag id }")
            .unwrap();
        let b = resolver
            .resolve(&product, "pid category { id tag } id")
            .unwrap();
        assert_eq!(*a, *b);

        // Canonical order: Product.category, Product.id, Product.pid.
        let names: Vec<_> = a
            .selection_set
            .iter()
            .map(|node| match node {
                SelectionNode::Field { field_name, .. } => field_name.as_str(),
                SelectionNode::Fragment { .. } => "...",
            })
            .collect();
        assert_eq!(names, ["category", "id", "pid"]);
    }

    #[test]
    fn identical_key_strings_share_one_resolution() {
        let supergraph = category_supergraph();
        let subgraph = supergraph.subgraphs().next().unwrap();
        let mut resolver = SelectionResolver::new(supergraph.schema(), subgraph);
        let product = Name::new("Product").unwrap();

        let a = resolver.resolve(&product, "id pid").unwrap();
        let b = resolver.resolve(&product, "id pid").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn fragments_in_key_fields_are_rejected() {
        let supergraph = category_supergraph();
        let subgraph = supergraph.subgraphs().next().unwrap();
        let mut resolver = SelectionResolver::new(supergraph.schema(), subgraph);
        let product = Name::new("Product").unwrap();

        let error = resolver
            .resolve(&product, "id ... on Product { pid }")
            .unwrap_err();
        assert!(matches!(error, PlannerError::UnsupportedFeature { .. }));
    }

    #[test]
    fn unknown_key_fields_are_a_hard_error() {
        let supergraph = category_supergraph();
        let subgraph = supergraph.subgraphs().next().unwrap();
        let mut resolver = SelectionResolver::new(supergraph.schema(), subgraph);
        let product = Name::new("Product").unwrap();

        let error = resolver.resolve(&product, "id nonexistent").unwrap_err();
        assert!(matches!(error, PlannerError::MalformedSupergraph { .. }));
    }
}
