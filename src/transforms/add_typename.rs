//! Adds `__typename` to every selection set over an abstract type of the
//! target schema, so delegated results always carry the discriminator the
//! executor needs to resolve interfaces and unions.

use graphql_parser::query::{Definition, Document, Selection, SelectionSet, TypeCondition};
use std::sync::Arc;

use crate::ast;
use crate::error::StitchError;
use crate::graph::{SchemaGraph, TypeNode};
use crate::transforms::{Request, Transform};

pub struct AddTypenameToAbstract {
    target: Arc<SchemaGraph>,
}

impl AddTypenameToAbstract {
    pub fn new(target: Arc<SchemaGraph>) -> Self {
        AddTypenameToAbstract { target }
    }

    fn annotate_selection_set(
        &self,
        parent_type: &str,
        selection_set: &SelectionSet<'static, String>,
    ) -> SelectionSet<'static, String> {
        let mut annotated = ast::empty_selection_set();
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    let mut kept = field.clone();
                    if let Some(definition) = self.target.field_def(parent_type, &field.name) {
                        let return_type = definition.field_type.name().to_string();
                        kept.selection_set =
                            self.annotate_selection_set(&return_type, &field.selection_set);
                    }
                    annotated.items.push(Selection::Field(kept));
                }
                Selection::InlineFragment(inline) => {
                    let condition = match &inline.type_condition {
                        Some(TypeCondition::On(name)) => name.as_str(),
                        None => parent_type,
                    };
                    let mut kept = inline.clone();
                    kept.selection_set =
                        self.annotate_selection_set(condition, &inline.selection_set);
                    annotated.items.push(Selection::InlineFragment(kept));
                }
                Selection::FragmentSpread(_) => annotated.items.push(selection.clone()),
            }
        }
        let is_abstract = self
            .target
            .get_type(parent_type)
            .map(TypeNode::is_abstract)
            .unwrap_or(false);
        if is_abstract && !ast::selects_typename(&annotated) {
            annotated.items.push(ast::typename_field());
        }
        annotated
    }
}

impl Transform for AddTypenameToAbstract {
    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
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
                    let selection_set =
                        self.annotate_selection_set(&root, parts.selection_set);
                    Definition::Operation(ast::make_operation(
                        kind,
                        variable_definitions,
                        selection_set,
                    ))
                }
                Definition::Fragment(fragment) => {
                    let TypeCondition::On(condition) = fragment.type_condition.clone();
                    let mut annotated = fragment;
                    annotated.selection_set =
                        self.annotate_selection_set(&condition, &annotated.selection_set);
                    Definition::Fragment(annotated)
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
