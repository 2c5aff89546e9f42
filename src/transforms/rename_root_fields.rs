//! Renames root fields on the schema side and switches outgoing requests
//! back to the original names. The renamed name stays on as an alias so the
//! sub-result keys match what the caller selected.

use graphql_parser::query::{Definition, Document, Selection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ast;
use crate::error::StitchError;
use crate::graph::{FieldDef, SchemaGraph, TypeNode};
use crate::transforms::{Request, Transform};
use crate::visit::{visit_schema, SchemaVisitor, Specifier, VisitAction};
use crate::OperationKind;

type RootFieldRenamer = Arc<dyn Fn(OperationKind, &str, &FieldDef) -> Option<String> + Send + Sync>;

pub struct RenameRootFields {
    renamer: RootFieldRenamer,
    /// (operation, renamed) -> original, recorded at schema-transform time.
    reverse: Arc<Mutex<HashMap<(OperationKind, String), String>>>,
}

impl RenameRootFields {
    pub fn new(
        renamer: impl Fn(OperationKind, &str, &FieldDef) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        RenameRootFields {
            renamer: Arc::new(renamer),
            reverse: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Transform for RenameRootFields {
    fn transform_schema(&self, schema: SchemaGraph) -> Result<SchemaGraph, StitchError> {
        let renamer = self.renamer.clone();
        let reverse = self.reverse.clone();
        let mut visitor =
            SchemaVisitor::new().on_type(Specifier::RootObject, move |node, schema| {
                let operation = if schema.query_type.as_deref() == Some(node.name()) {
                    OperationKind::Query
                } else if schema.mutation_type.as_deref() == Some(node.name()) {
                    OperationKind::Mutation
                } else {
                    OperationKind::Subscription
                };
                let TypeNode::Object(object) = node else {
                    return VisitAction::Keep;
                };
                let mut renamed_any = false;
                let mut rebuilt = object.clone();
                rebuilt.fields = object
                    .fields
                    .iter()
                    .map(|(key, field)| {
                        let Some(renamed) = renamer(operation, key, field) else {
                            return (key.clone(), field.clone());
                        };
                        if renamed == *key {
                            return (key.clone(), field.clone());
                        }
                        renamed_any = true;
                        reverse
                            .lock()
                            .expect("rename map poisoned")
                            .insert((operation, renamed.clone()), key.clone());
                        let mut renamed_field = field.clone();
                        renamed_field.name = renamed.clone();
                        (renamed, renamed_field)
                    })
                    .collect();
                if renamed_any {
                    VisitAction::Replace(TypeNode::Object(rebuilt))
                } else {
                    VisitAction::Keep
                }
            })?;
        visit_schema(&schema, &mut visitor)
    }

    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        let reverse = self.reverse.lock().expect("rename map poisoned").clone();
        if reverse.is_empty() {
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
            .map(|definition| {
                let Definition::Operation(op) = definition else {
                    return definition;
                };
                let parts = ast::operation_parts(&op);
                let kind = parts.kind;
                let variable_definitions = parts.variable_definitions.to_vec();
                let mut selection_set = parts.selection_set.clone();
                drop(parts);
                for selection in &mut selection_set.items {
                    let Selection::Field(field) = selection else {
                        continue;
                    };
                    let Some(original) = reverse.get(&(kind, field.name.clone())) else {
                        continue;
                    };
                    if field.alias.is_none() {
                        field.alias = Some(field.name.clone());
                    }
                    field.name = original.clone();
                }
                Definition::Operation(ast::make_operation(
                    kind,
                    variable_definitions,
                    selection_set,
                ))
            })
            .collect();

        Ok(Request {
            document: Document { definitions },
            variables,
            operation_name,
        })
    }
}
