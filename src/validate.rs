//! Static validation of an executable document against a schema graph:
//! enough to reject a delegated sub-document the target cannot execute
//! before any wire or resolver work happens.

use graphql_parser::query::{
    Definition, Document, Selection, SelectionSet, TypeCondition, Value as AstValue,
};
use std::collections::{HashMap, HashSet};

use crate::ast;
use crate::error::StitchError;
use crate::graph::{SchemaGraph, TypeNode};

struct Scope<'d> {
    schema: &'d SchemaGraph,
    fragments: HashMap<&'d str, &'d graphql_parser::query::FragmentDefinition<'static, String>>,
    variables: HashSet<&'d str>,
}

/// Validates the document: every field, argument and fragment condition must
/// exist in the schema, and every variable used must be declared. The first
/// violation aborts.
pub fn validate_document(
    schema: &SchemaGraph,
    document: &Document<'static, String>,
) -> Result<(), StitchError> {
    let mut scope = Scope {
        schema,
        fragments: HashMap::new(),
        variables: HashSet::new(),
    };

    for definition in &document.definitions {
        match definition {
            Definition::Fragment(fragment) => {
                scope.fragments.insert(fragment.name.as_str(), fragment);
            }
            Definition::Operation(op) => {
                for variable in ast::operation_parts(op).variable_definitions {
                    scope.variables.insert(variable.name.as_str());
                }
            }
        }
    }

    for definition in &document.definitions {
        match definition {
            Definition::Operation(op) => {
                let parts = ast::operation_parts(op);
                let root = schema.root_type(parts.kind).ok_or_else(|| {
                    StitchError::Validation(format!(
                        "schema does not support {} operations",
                        parts.kind
                    ))
                })?;
                validate_selection_set(&scope, root, parts.selection_set)?;
            }
            Definition::Fragment(fragment) => {
                let TypeCondition::On(condition) = &fragment.type_condition;
                require_composite(schema, condition)?;
                validate_selection_set(&scope, condition, &fragment.selection_set)?;
            }
        }
    }

    Ok(())
}

fn require_composite<'s>(schema: &'s SchemaGraph, name: &str) -> Result<&'s TypeNode, StitchError> {
    let node = schema
        .get_type(name)
        .ok_or_else(|| StitchError::Validation(format!("unknown type {}", name)))?;
    if !node.is_composite() {
        return Err(StitchError::Validation(format!(
            "type {} cannot be selected into",
            name
        )));
    }
    Ok(node)
}

fn validate_selection_set(
    scope: &Scope<'_>,
    parent_type: &str,
    selection_set: &SelectionSet<'static, String>,
) -> Result<(), StitchError> {
    let parent = require_composite(scope.schema, parent_type)?;

    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                if field.name == "__typename" {
                    continue;
                }
                let definition = parent.fields().and_then(|f| f.get(&field.name)).ok_or_else(
                    || {
                        StitchError::Validation(format!(
                            "field {} does not exist on type {}",
                            field.name, parent_type
                        ))
                    },
                )?;
                for (argument_name, argument_value) in &field.arguments {
                    if definition.argument(argument_name).is_none() {
                        return Err(StitchError::Validation(format!(
                            "unknown argument {} on field {}.{}",
                            argument_name, parent_type, field.name
                        )));
                    }
                    validate_variable_usage(scope, argument_value)?;
                }
                let return_type = definition.field_type.name().to_string();
                let is_composite = scope
                    .schema
                    .get_type(&return_type)
                    .map(TypeNode::is_composite)
                    .unwrap_or(false);
                if is_composite {
                    if field.selection_set.items.is_empty() {
                        return Err(StitchError::Validation(format!(
                            "field {}.{} of type {} requires a selection set",
                            parent_type, field.name, return_type
                        )));
                    }
                    validate_selection_set(scope, &return_type, &field.selection_set)?;
                } else if !field.selection_set.items.is_empty() {
                    return Err(StitchError::Validation(format!(
                        "field {}.{} of type {} cannot have a selection set",
                        parent_type, field.name, return_type
                    )));
                }
            }
            Selection::InlineFragment(inline) => {
                let condition = match &inline.type_condition {
                    Some(TypeCondition::On(name)) => name.as_str(),
                    None => parent_type,
                };
                require_composite(scope.schema, condition)?;
                validate_selection_set(scope, condition, &inline.selection_set)?;
            }
            Selection::FragmentSpread(spread) => {
                if !scope.fragments.contains_key(spread.fragment_name.as_str()) {
                    return Err(StitchError::Validation(format!(
                        "unknown fragment {}",
                        spread.fragment_name
                    )));
                }
            }
        }
    }

    Ok(())
}

fn validate_variable_usage(
    scope: &Scope<'_>,
    value: &AstValue<'static, String>,
) -> Result<(), StitchError> {
    match value {
        AstValue::Variable(name) => {
            if !scope.variables.contains(name.as_str()) {
                return Err(StitchError::Validation(format!(
                    "variable ${} is not defined",
                    name
                )));
            }
            Ok(())
        }
        AstValue::List(items) => {
            for item in items {
                validate_variable_usage(scope, item)?;
            }
            Ok(())
        }
        AstValue::Object(fields) => {
            for value in fields.values() {
                validate_variable_usage(scope, value)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
