//! Drops every selection, argument, variable and fragment in an outgoing
//! request that is not valid against the target schema, pruning selection
//! sets emptied by the filtering and the variables they stranded.

use graphql_parser::query::{
    Definition, Document, FragmentDefinition, Selection, SelectionSet, TypeCondition,
    Value as AstValue,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::ast;
use crate::error::StitchError;
use crate::graph::{SchemaGraph, TypeNode};
use crate::transforms::{Request, Transform};

pub struct FilterToSchema {
    target: Arc<SchemaGraph>,
}

impl FilterToSchema {
    pub fn new(target: Arc<SchemaGraph>) -> Self {
        FilterToSchema { target }
    }

    fn filter_selection_set(
        &self,
        parent_type: &str,
        selection_set: &SelectionSet<'static, String>,
        live_fragments: &HashSet<String>,
    ) -> SelectionSet<'static, String> {
        let mut filtered = ast::empty_selection_set();
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if field.name == "__typename" {
                        filtered.items.push(selection.clone());
                        continue;
                    }
                    let Some(definition) = self.target.field_def(parent_type, &field.name) else {
                        continue;
                    };
                    let mut kept = field.clone();
                    kept.arguments
                        .retain(|(name, _)| definition.argument(name).is_some());
                    let return_type = definition.field_type.name().to_string();
                    let is_composite = self
                        .target
                        .get_type(&return_type)
                        .map(TypeNode::is_composite)
                        .unwrap_or(false);
                    if is_composite {
                        kept.selection_set = self.filter_selection_set(
                            &return_type,
                            &field.selection_set,
                            live_fragments,
                        );
                        // A composite field with nothing left to select is
                        // itself invalid against the target.
                        if kept.selection_set.items.is_empty() {
                            continue;
                        }
                    } else {
                        kept.selection_set = ast::empty_selection_set();
                    }
                    filtered.items.push(Selection::Field(kept));
                }
                Selection::InlineFragment(inline) => {
                    let condition = match &inline.type_condition {
                        Some(TypeCondition::On(name)) => name.as_str(),
                        None => parent_type,
                    };
                    let valid_condition = self
                        .target
                        .get_type(condition)
                        .map(TypeNode::is_composite)
                        .unwrap_or(false);
                    if !valid_condition {
                        continue;
                    }
                    let mut kept = inline.clone();
                    kept.selection_set =
                        self.filter_selection_set(condition, &inline.selection_set, live_fragments);
                    if !kept.selection_set.items.is_empty() {
                        filtered.items.push(Selection::InlineFragment(kept));
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if live_fragments.contains(&spread.fragment_name) {
                        filtered.items.push(selection.clone());
                    }
                }
            }
        }
        filtered
    }
}

impl Transform for FilterToSchema {
    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        let mut fragments: IndexMap<String, FragmentDefinition<'static, String>> = IndexMap::new();
        let mut operations = Vec::new();
        for definition in request.document.definitions {
            match definition {
                Definition::Fragment(fragment) => {
                    fragments.insert(fragment.name.clone(), fragment);
                }
                Definition::Operation(op) => operations.push(op),
            }
        }

        // Fragments can invalidate each other: dropping one may empty a set
        // in another. Filter to a fixed point.
        loop {
            let live: HashSet<String> = fragments.keys().cloned().collect();
            let mut next = IndexMap::new();
            for (name, fragment) in &fragments {
                let TypeCondition::On(condition) = &fragment.type_condition;
                let valid = self
                    .target
                    .get_type(condition)
                    .map(TypeNode::is_composite)
                    .unwrap_or(false);
                if !valid {
                    continue;
                }
                let filtered_set =
                    self.filter_selection_set(condition, &fragment.selection_set, &live);
                if filtered_set.items.is_empty() {
                    continue;
                }
                let mut kept = fragment.clone();
                kept.selection_set = filtered_set;
                next.insert(name.clone(), kept);
            }
            let stable = next.len() == fragments.len();
            fragments = next;
            if stable {
                break;
            }
        }

        let live: HashSet<String> = fragments.keys().cloned().collect();
        let mut used_fragments = HashSet::new();
        let mut used_variables = HashSet::new();
        let mut kept_operations = Vec::new();

        for op in operations {
            let parts = ast::operation_parts(&op);
            let Some(root) = self.target.root_type(parts.kind).map(str::to_string) else {
                return Err(StitchError::Validation(format!(
                    "target schema does not support {} operations",
                    parts.kind
                )));
            };
            let filtered = self.filter_selection_set(&root, parts.selection_set, &live);
            collect_used(&filtered, &fragments, &mut used_fragments, &mut used_variables);

            let mut definitions = parts.variable_definitions.to_vec();
            let kind = parts.kind;
            drop(parts);
            definitions.retain(|d| used_variables.contains(&d.name));
            kept_operations.push(ast::make_operation(kind, definitions, filtered));
        }

        let mut definitions: Vec<Definition<'static, String>> = kept_operations
            .into_iter()
            .map(Definition::Operation)
            .collect();
        for (name, fragment) in fragments {
            if used_fragments.contains(&name) {
                definitions.push(Definition::Fragment(fragment));
            }
        }

        let mut variables = request.variables;
        variables.retain(|name, _| used_variables.contains(name));

        Ok(Request {
            document: Document { definitions },
            variables,
            operation_name: request.operation_name,
        })
    }
}

/// Records fragment spreads (transitively) and variable usages reachable
/// from a kept selection set.
fn collect_used(
    selection_set: &SelectionSet<'static, String>,
    fragments: &IndexMap<String, FragmentDefinition<'static, String>>,
    used_fragments: &mut HashSet<String>,
    used_variables: &mut HashSet<String>,
) {
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                for (_, value) in &field.arguments {
                    collect_variables(value, used_variables);
                }
                for directive in &field.directives {
                    for (_, value) in &directive.arguments {
                        collect_variables(value, used_variables);
                    }
                }
                collect_used(&field.selection_set, fragments, used_fragments, used_variables);
            }
            Selection::InlineFragment(inline) => {
                collect_used(&inline.selection_set, fragments, used_fragments, used_variables);
            }
            Selection::FragmentSpread(spread) => {
                if used_fragments.insert(spread.fragment_name.clone()) {
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        collect_used(
                            &fragment.selection_set,
                            fragments,
                            used_fragments,
                            used_variables,
                        );
                    }
                }
            }
        }
    }
}

fn collect_variables(value: &AstValue<'static, String>, used: &mut HashSet<String>) {
    match value {
        AstValue::Variable(name) => {
            used.insert(name.clone());
        }
        AstValue::List(items) => {
            for item in items {
                collect_variables(item, used);
            }
        }
        AstValue::Object(fields) => {
            for value in fields.values() {
                collect_variables(value, used);
            }
        }
        _ => {}
    }
}
