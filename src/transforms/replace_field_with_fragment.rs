//! Swaps configured fields in an outgoing request for inline fragments,
//! letting a merged field pull the extra selections its resolver needs from
//! the sub-schema (a key the caller never asked for, say).

use graphql_parser::query::{
    Definition, Document, InlineFragment, Selection, SelectionSet, TypeCondition,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast;
use crate::error::StitchError;
use crate::graph::SchemaGraph;
use crate::transforms::{Request, Transform};

pub struct ReplaceFieldWithFragment {
    target: Arc<SchemaGraph>,
    /// Keyed by (type name, field name).
    fragments: HashMap<(String, String), InlineFragment<'static, String>>,
}

impl ReplaceFieldWithFragment {
    pub fn new(
        target: Arc<SchemaGraph>,
        fragments: HashMap<(String, String), InlineFragment<'static, String>>,
    ) -> Self {
        ReplaceFieldWithFragment { target, fragments }
    }

    fn replace_in_set(
        &self,
        parent_type: &str,
        selection_set: &SelectionSet<'static, String>,
    ) -> SelectionSet<'static, String> {
        let mut replaced = ast::empty_selection_set();
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    let key = (parent_type.to_string(), field.name.clone());
                    if let Some(fragment) = self.fragments.get(&key) {
                        replaced
                            .items
                            .push(Selection::InlineFragment(fragment.clone()));
                        continue;
                    }
                    let mut kept = field.clone();
                    if let Some(definition) = self.target.field_def(parent_type, &field.name) {
                        let return_type = definition.field_type.name().to_string();
                        kept.selection_set =
                            self.replace_in_set(&return_type, &field.selection_set);
                    }
                    replaced.items.push(Selection::Field(kept));
                }
                Selection::InlineFragment(inline) => {
                    let condition = match &inline.type_condition {
                        Some(TypeCondition::On(name)) => name.as_str(),
                        None => parent_type,
                    };
                    let mut kept = inline.clone();
                    kept.selection_set = self.replace_in_set(condition, &inline.selection_set);
                    replaced.items.push(Selection::InlineFragment(kept));
                }
                Selection::FragmentSpread(_) => replaced.items.push(selection.clone()),
            }
        }
        replaced
    }
}

impl Transform for ReplaceFieldWithFragment {
    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        if self.fragments.is_empty() {
            return Ok(request);
        }

        let Request {
            document,
            variables,
            operation_name,
        } = request;
        let definitions = document
            .definitions
            .into_iter()
            .map(|definition| match definition {
                Definition::Operation(op) => {
                    let parts = ast::operation_parts(&op);
                    let kind = parts.kind;
                    let variable_definitions = parts.variable_definitions.to_vec();
                    let root = self
                        .target
                        .root_type(kind)
                        .unwrap_or_default()
                        .to_string();
                    let selection_set = self.replace_in_set(&root, parts.selection_set);
                    Definition::Operation(ast::make_operation(
                        kind,
                        variable_definitions,
                        selection_set,
                    ))
                }
                Definition::Fragment(fragment) => {
                    let TypeCondition::On(condition) = fragment.type_condition.clone();
                    let mut replaced = fragment;
                    replaced.selection_set =
                        self.replace_in_set(&condition, &replaced.selection_set);
                    Definition::Fragment(replaced)
                }
            })
            .collect();

        Ok(Request {
            document: Document { definitions },
            variables,
            operation_name,
        })
    }
}
