//! Extraction of the join spec directive arguments.
//!
//! Every argument must have the declared GraphQL kind: `graph` arguments are
//! enum values, field sets and service names are strings, flags are booleans.
//! Anything else is a malformed supergraph and aborts the parse.

use std::ops::Deref;

use apollo_compiler::Name;
use apollo_compiler::ast::Directive;
use apollo_compiler::ast::Value;
use apollo_compiler::name;

use crate::error::PlannerError;

pub(crate) const JOIN_GRAPH_ENUM_NAME: Name = name!("join__Graph");
pub(crate) const JOIN_GRAPH_DIRECTIVE_NAME: &str = "join__graph";
pub(crate) const JOIN_TYPE_DIRECTIVE_NAME: &str = "join__type";
pub(crate) const JOIN_FIELD_DIRECTIVE_NAME: &str = "join__field";
pub(crate) const JOIN_IMPLEMENTS_DIRECTIVE_NAME: &str = "join__implements";
pub(crate) const JOIN_UNION_MEMBER_DIRECTIVE_NAME: &str = "join__unionMember";
pub(crate) const JOIN_ENUM_VALUE_DIRECTIVE_NAME: &str = "join__enumValue";

/// The semantic content of one `@join__type` application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinType {
    pub graph: Name,
    pub key: Option<String>,
    pub extension: bool,
    pub resolvable: bool,
    pub is_interface_object: bool,
}

/// The semantic content of one `@join__field` application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinField {
    pub graph: Option<Name>,
    pub requires: Option<String>,
    pub provides: Option<String>,
    pub type_: Option<String>,
    pub external: bool,
    pub override_: Option<String>,
    pub used_overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinImplements {
    pub graph: Name,
    pub interface: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinUnionMember {
    pub graph: Name,
    pub member: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEnumValue {
    pub graph: Name,
    pub value: Name,
}

/// `@join__graph(name:, url:)` on a `join__Graph` enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGraph {
    pub name: String,
    pub url: String,
}

pub(crate) fn join_type_arguments(directive: &Directive) -> Result<JoinType, PlannerError> {
    Ok(JoinType {
        graph: directive_required_enum_argument(directive, "graph")?,
        key: directive_optional_string_argument(directive, "key")?,
        extension: directive_optional_boolean_argument(directive, "extension")?.unwrap_or(false),
        resolvable: directive_optional_boolean_argument(directive, "resolvable")?.unwrap_or(true),
        is_interface_object: directive_optional_boolean_argument(directive, "isInterfaceObject")?
            .unwrap_or(false),
    })
}

pub(crate) fn join_field_arguments(directive: &Directive) -> Result<JoinField, PlannerError> {
    Ok(JoinField {
        graph: directive_optional_enum_argument(directive, "graph")?,
        requires: directive_optional_string_argument(directive, "requires")?,
        provides: directive_optional_string_argument(directive, "provides")?,
        type_: directive_optional_string_argument(directive, "type")?,
        external: directive_optional_boolean_argument(directive, "external")?.unwrap_or(false),
        override_: directive_optional_string_argument(directive, "override")?,
        used_overridden: directive_optional_boolean_argument(directive, "usedOverridden")?
            .unwrap_or(false),
    })
}

pub(crate) fn join_implements_arguments(
    directive: &Directive,
) -> Result<JoinImplements, PlannerError> {
    Ok(JoinImplements {
        graph: directive_required_enum_argument(directive, "graph")?,
        interface: required_name_argument(directive, "interface")?,
    })
}

pub(crate) fn join_union_member_arguments(
    directive: &Directive,
) -> Result<JoinUnionMember, PlannerError> {
    Ok(JoinUnionMember {
        graph: directive_required_enum_argument(directive, "graph")?,
        member: required_name_argument(directive, "member")?,
    })
}

pub(crate) fn join_enum_value_arguments(
    directive: &Directive,
    value: &Name,
) -> Result<JoinEnumValue, PlannerError> {
    Ok(JoinEnumValue {
        graph: directive_required_enum_argument(directive, "graph")?,
        value: value.clone(),
    })
}

pub(crate) fn join_graph_arguments(directive: &Directive) -> Result<JoinGraph, PlannerError> {
    Ok(JoinGraph {
        name: directive_required_string_argument(directive, "name")?,
        url: directive_required_string_argument(directive, "url")?,
    })
}

fn required_name_argument(directive: &Directive, name: &str) -> Result<Name, PlannerError> {
    let value = directive_required_string_argument(directive, name)?;
    Name::new(value.as_str()).map_err(|_| {
        PlannerError::malformed_supergraph(format!(
            "Argument \"{}\" of directive \"@{}\" must be a valid GraphQL name, got \"{}\".",
            name, directive.name, value,
        ))
    })
}

fn directive_optional_enum_argument(
    directive: &Directive,
    name: &str,
) -> Result<Option<Name>, PlannerError> {
    match directive.specified_argument_by_name(name) {
        Some(value) => match value.deref() {
            Value::Enum(value) => Ok(Some(value.clone())),
            Value::Null => Ok(None),
            _ => Err(PlannerError::malformed_supergraph(format!(
                "Argument \"{}\" of directive \"@{}\" must be an enum value.",
                name, directive.name,
            ))),
        },
        None => Ok(None),
    }
}

fn directive_required_enum_argument(
    directive: &Directive,
    name: &str,
) -> Result<Name, PlannerError> {
    directive_optional_enum_argument(directive, name)?.ok_or_else(|| {
        PlannerError::malformed_supergraph(format!(
            "Required argument \"{}\" of directive \"@{}\" was not present.",
            name, directive.name,
        ))
    })
}

fn directive_optional_string_argument(
    directive: &Directive,
    name: &str,
) -> Result<Option<String>, PlannerError> {
    match directive.specified_argument_by_name(name) {
        Some(value) => match value.deref() {
            Value::String(value) => Ok(Some(value.to_string())),
            Value::Null => Ok(None),
            _ => Err(PlannerError::malformed_supergraph(format!(
                "Argument \"{}\" of directive \"@{}\" must be a string.",
                name, directive.name,
            ))),
        },
        None => Ok(None),
    }
}

fn directive_required_string_argument(
    directive: &Directive,
    name: &str,
) -> Result<String, PlannerError> {
    directive_optional_string_argument(directive, name)?.ok_or_else(|| {
        PlannerError::malformed_supergraph(format!(
            "Required argument \"{}\" of directive \"@{}\" was not present.",
            name, directive.name,
        ))
    })
}

fn directive_optional_boolean_argument(
    directive: &Directive,
    name: &str,
) -> Result<Option<bool>, PlannerError> {
    match directive.specified_argument_by_name(name) {
        Some(value) => match value.deref() {
            Value::Boolean(value) => Ok(Some(*value)),
            Value::Null => Ok(None),
            _ => Err(PlannerError::malformed_supergraph(format!(
                "Argument \"{}\" of directive \"@{}\" must be a boolean.",
                name, directive.name,
            ))),
        },
        None => Ok(None),
    }
}
