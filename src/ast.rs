//! Operation-AST plumbing over `graphql-parser`: recreating parsed nodes as
//! owned `'static` values, converting between GraphQL literals and JSON, and
//! synthesizing the documents delegation sends to a target schema.

use graphql_parser::query::{
    Definition, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, Mutation,
    Number, OperationDefinition, Query, Selection, SelectionSet, Subscription, TypeCondition,
    Value as AstValue, VariableDefinition,
};
use graphql_parser::query::{parse_query, Type as AstType};
use graphql_parser::{query::Directive, Pos};
use serde_json::Value as Json;
use std::collections::BTreeMap;

use crate::error::StitchError;
use crate::JsonMap;
use crate::OperationKind;

pub fn pos() -> Pos {
    Pos::default()
}

pub fn empty_selection_set() -> SelectionSet<'static, String> {
    SelectionSet {
        span: (pos(), pos()),
        items: Vec::new(),
    }
}

/// Parses an executable document into owned nodes that can outlive the
/// source text.
pub fn parse_operation(text: &str) -> Result<Document<'static, String>, StitchError> {
    let document =
        parse_query::<String>(text).map_err(|e| StitchError::parse("operation document", e))?;
    Ok(own_document(document))
}

/// Accepts either a named `fragment X on T { ... }` or a bare inline
/// fragment and returns it as an inline fragment.
pub fn parse_inline_fragment(text: &str) -> Result<InlineFragment<'static, String>, StitchError> {
    let trimmed = text.trim();
    if trimmed.starts_with("fragment") {
        let document = parse_operation(trimmed)?;
        for definition in document.definitions {
            if let Definition::Fragment(fragment) = definition {
                return Ok(InlineFragment {
                    position: pos(),
                    type_condition: Some(fragment.type_condition),
                    directives: fragment.directives,
                    selection_set: fragment.selection_set,
                });
            }
        }
        Err(StitchError::InvalidSource(
            "fragment text contained no fragment definition".into(),
        ))
    } else {
        let document = parse_operation(&format!("{{ {} }}", trimmed))?;
        for definition in document.definitions {
            if let Definition::Operation(OperationDefinition::SelectionSet(set)) = definition {
                for selection in set.items {
                    if let Selection::InlineFragment(inline) = selection {
                        return Ok(inline);
                    }
                }
            }
        }
        Err(StitchError::InvalidSource(
            "expected an inline fragment selection".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Owned-node recreation. `graphql-parser` ties its AST lifetime to the input
// text; these rebuilds move the already-owned `String` values into nodes with
// a `'static` parameter so documents can be stored and threaded through
// transforms.
// ---------------------------------------------------------------------------

pub fn own_document(document: Document<'_, String>) -> Document<'static, String> {
    Document {
        definitions: document.definitions.into_iter().map(own_definition).collect(),
    }
}

fn own_definition(definition: Definition<'_, String>) -> Definition<'static, String> {
    match definition {
        Definition::Operation(op) => Definition::Operation(own_operation(op)),
        Definition::Fragment(fragment) => Definition::Fragment(own_fragment(fragment)),
    }
}

pub fn own_fragment(fragment: FragmentDefinition<'_, String>) -> FragmentDefinition<'static, String> {
    FragmentDefinition {
        position: fragment.position,
        name: fragment.name,
        type_condition: own_type_condition(fragment.type_condition),
        directives: fragment.directives.into_iter().map(own_directive).collect(),
        selection_set: own_selection_set(fragment.selection_set),
    }
}

fn own_operation(op: OperationDefinition<'_, String>) -> OperationDefinition<'static, String> {
    match op {
        OperationDefinition::SelectionSet(set) => {
            OperationDefinition::SelectionSet(own_selection_set(set))
        }
        OperationDefinition::Query(query) => OperationDefinition::Query(Query {
            position: query.position,
            name: query.name,
            variable_definitions: query
                .variable_definitions
                .into_iter()
                .map(own_variable_definition)
                .collect(),
            directives: query.directives.into_iter().map(own_directive).collect(),
            selection_set: own_selection_set(query.selection_set),
        }),
        OperationDefinition::Mutation(mutation) => OperationDefinition::Mutation(Mutation {
            position: mutation.position,
            name: mutation.name,
            variable_definitions: mutation
                .variable_definitions
                .into_iter()
                .map(own_variable_definition)
                .collect(),
            directives: mutation.directives.into_iter().map(own_directive).collect(),
            selection_set: own_selection_set(mutation.selection_set),
        }),
        OperationDefinition::Subscription(subscription) => {
            OperationDefinition::Subscription(Subscription {
                position: subscription.position,
                name: subscription.name,
                variable_definitions: subscription
                    .variable_definitions
                    .into_iter()
                    .map(own_variable_definition)
                    .collect(),
                directives: subscription
                    .directives
                    .into_iter()
                    .map(own_directive)
                    .collect(),
                selection_set: own_selection_set(subscription.selection_set),
            })
        }
    }
}

pub fn own_selection_set(set: SelectionSet<'_, String>) -> SelectionSet<'static, String> {
    SelectionSet {
        span: set.span,
        items: set.items.into_iter().map(own_selection).collect(),
    }
}

fn own_selection(selection: Selection<'_, String>) -> Selection<'static, String> {
    match selection {
        Selection::Field(field) => Selection::Field(Field {
            position: field.position,
            alias: field.alias,
            name: field.name,
            arguments: field
                .arguments
                .into_iter()
                .map(|(name, value)| (name, own_value(value)))
                .collect(),
            directives: field.directives.into_iter().map(own_directive).collect(),
            selection_set: own_selection_set(field.selection_set),
        }),
        Selection::FragmentSpread(spread) => Selection::FragmentSpread(FragmentSpread {
            position: spread.position,
            fragment_name: spread.fragment_name,
            directives: spread.directives.into_iter().map(own_directive).collect(),
        }),
        Selection::InlineFragment(inline) => Selection::InlineFragment(InlineFragment {
            position: inline.position,
            type_condition: inline.type_condition.map(own_type_condition),
            directives: inline.directives.into_iter().map(own_directive).collect(),
            selection_set: own_selection_set(inline.selection_set),
        }),
    }
}

fn own_type_condition(condition: TypeCondition<'_, String>) -> TypeCondition<'static, String> {
    match condition {
        TypeCondition::On(name) => TypeCondition::On(name),
    }
}

fn own_directive(directive: Directive<'_, String>) -> Directive<'static, String> {
    Directive {
        position: directive.position,
        name: directive.name,
        arguments: directive
            .arguments
            .into_iter()
            .map(|(name, value)| (name, own_value(value)))
            .collect(),
    }
}

fn own_variable_definition(
    definition: VariableDefinition<'_, String>,
) -> VariableDefinition<'static, String> {
    VariableDefinition {
        position: definition.position,
        name: definition.name,
        var_type: own_type(definition.var_type),
        default_value: definition.default_value.map(own_value),
    }
}

fn own_type(ty: AstType<'_, String>) -> AstType<'static, String> {
    match ty {
        AstType::NamedType(name) => AstType::NamedType(name),
        AstType::ListType(inner) => AstType::ListType(Box::new(own_type(*inner))),
        AstType::NonNullType(inner) => AstType::NonNullType(Box::new(own_type(*inner))),
    }
}

fn own_value(value: AstValue<'_, String>) -> AstValue<'static, String> {
    match value {
        AstValue::Variable(name) => AstValue::Variable(name),
        AstValue::Int(n) => AstValue::Int(n),
        AstValue::Float(f) => AstValue::Float(f),
        AstValue::String(s) => AstValue::String(s),
        AstValue::Boolean(b) => AstValue::Boolean(b),
        AstValue::Null => AstValue::Null,
        AstValue::Enum(name) => AstValue::Enum(name),
        AstValue::List(items) => AstValue::List(items.into_iter().map(own_value).collect()),
        AstValue::Object(fields) => AstValue::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name, own_value(value)))
                .collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Literal / JSON conversion.
// ---------------------------------------------------------------------------

/// Converts a GraphQL literal to JSON. Variables resolve to `null`; use
/// [`value_to_json`] when variable values are in scope.
pub fn literal_to_json(value: &AstValue<'_, String>) -> Json {
    value_to_json(value, &JsonMap::new())
}

/// Converts a GraphQL value to JSON, resolving variables against the given
/// variable values.
pub fn value_to_json(value: &AstValue<'_, String>, variables: &JsonMap) -> Json {
    match value {
        AstValue::Variable(name) => variables.get(name).cloned().unwrap_or(Json::Null),
        AstValue::Int(n) => n.as_i64().map(Json::from).unwrap_or(Json::Null),
        AstValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        AstValue::String(s) => Json::String(s.clone()),
        AstValue::Boolean(b) => Json::Bool(*b),
        AstValue::Null => Json::Null,
        AstValue::Enum(name) => Json::String(name.clone()),
        AstValue::List(items) => {
            Json::Array(items.iter().map(|v| value_to_json(v, variables)).collect())
        }
        AstValue::Object(fields) => Json::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}

/// Converts JSON back to a GraphQL literal, for inlining argument values
/// into a synthesized document.
pub fn json_to_literal(value: &Json) -> AstValue<'static, String> {
    match value {
        Json::Null => AstValue::Null,
        Json::Bool(b) => AstValue::Boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64().filter(|i| i32::try_from(*i).is_ok()) {
                AstValue::Int(Number::from(i as i32))
            } else {
                AstValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => AstValue::String(s.clone()),
        Json::Array(items) => AstValue::List(items.iter().map(json_to_literal).collect()),
        Json::Object(fields) => AstValue::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), json_to_literal(value)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Operation access and synthesis.
// ---------------------------------------------------------------------------

/// Borrowed view of one operation definition, uniform across kinds.
pub struct OperationParts<'d> {
    pub kind: OperationKind,
    pub name: Option<&'d str>,
    pub variable_definitions: &'d [VariableDefinition<'static, String>],
    pub selection_set: &'d SelectionSet<'static, String>,
}

static NO_VARIABLES: [VariableDefinition<'static, String>; 0] = [];

pub fn operation_parts<'d>(op: &'d OperationDefinition<'static, String>) -> OperationParts<'d> {
    match op {
        OperationDefinition::SelectionSet(set) => OperationParts {
            kind: OperationKind::Query,
            name: None,
            variable_definitions: &NO_VARIABLES,
            selection_set: set,
        },
        OperationDefinition::Query(query) => OperationParts {
            kind: OperationKind::Query,
            name: query.name.as_deref(),
            variable_definitions: &query.variable_definitions,
            selection_set: &query.selection_set,
        },
        OperationDefinition::Mutation(mutation) => OperationParts {
            kind: OperationKind::Mutation,
            name: mutation.name.as_deref(),
            variable_definitions: &mutation.variable_definitions,
            selection_set: &mutation.selection_set,
        },
        OperationDefinition::Subscription(subscription) => OperationParts {
            kind: OperationKind::Subscription,
            name: subscription.name.as_deref(),
            variable_definitions: &subscription.variable_definitions,
            selection_set: &subscription.selection_set,
        },
    }
}

/// Finds the operation a request targets: by name when given, otherwise the
/// document's single operation.
pub fn find_operation<'d>(
    document: &'d Document<'static, String>,
    operation_name: Option<&str>,
) -> Option<&'d OperationDefinition<'static, String>> {
    let mut operations = document.definitions.iter().filter_map(|d| match d {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    });
    match operation_name {
        Some(wanted) => operations.find(|op| operation_parts(op).name == Some(wanted)),
        None => {
            let first = operations.next();
            if operations.next().is_some() {
                None
            } else {
                first
            }
        }
    }
}

pub fn fragment_definitions<'d>(
    document: &'d Document<'static, String>,
) -> Vec<&'d FragmentDefinition<'static, String>> {
    document
        .definitions
        .iter()
        .filter_map(|d| match d {
            Definition::Fragment(fragment) => Some(fragment),
            _ => None,
        })
        .collect()
}

pub fn make_operation(
    kind: OperationKind,
    variable_definitions: Vec<VariableDefinition<'static, String>>,
    selection_set: SelectionSet<'static, String>,
) -> OperationDefinition<'static, String> {
    match kind {
        OperationKind::Query => OperationDefinition::Query(Query {
            position: pos(),
            name: None,
            variable_definitions,
            directives: Vec::new(),
            selection_set,
        }),
        OperationKind::Mutation => OperationDefinition::Mutation(Mutation {
            position: pos(),
            name: None,
            variable_definitions,
            directives: Vec::new(),
            selection_set,
        }),
        OperationKind::Subscription => OperationDefinition::Subscription(Subscription {
            position: pos(),
            name: None,
            variable_definitions,
            directives: Vec::new(),
            selection_set,
        }),
    }
}

/// Builds the sub-operation document for a delegated call: one root field
/// carrying the delegating field's own selection set, the caller's variable
/// definitions, and every fragment in scope.
pub fn build_delegation_document(
    kind: OperationKind,
    field_name: &str,
    selection_set: SelectionSet<'static, String>,
    variable_definitions: Vec<VariableDefinition<'static, String>>,
    fragments: Vec<FragmentDefinition<'static, String>>,
) -> Document<'static, String> {
    let root_field = Field {
        position: pos(),
        alias: None,
        name: field_name.to_string(),
        arguments: Vec::new(),
        directives: Vec::new(),
        selection_set,
    };
    let root_set = SelectionSet {
        span: (pos(), pos()),
        items: vec![Selection::Field(root_field)],
    };
    let mut definitions = vec![Definition::Operation(make_operation(
        kind,
        variable_definitions,
        root_set,
    ))];
    definitions.extend(fragments.into_iter().map(Definition::Fragment));
    Document { definitions }
}

/// Returns a `__typename` field selection.
pub fn typename_field() -> Selection<'static, String> {
    Selection::Field(Field {
        position: pos(),
        alias: None,
        name: "__typename".to_string(),
        arguments: Vec::new(),
        directives: Vec::new(),
        selection_set: empty_selection_set(),
    })
}

/// True when the selection set already selects `__typename` directly.
pub fn selects_typename(set: &SelectionSet<'static, String>) -> bool {
    set.items.iter().any(|selection| {
        matches!(selection, Selection::Field(field) if field.name == "__typename")
    })
}
