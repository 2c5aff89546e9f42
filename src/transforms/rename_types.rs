//! Renames named types on the schema side and undoes the rename on both
//! sides of delegation: type conditions and variable types in outgoing
//! requests switch back to the original names, and `__typename` values in
//! results switch forward to the renamed ones.

use graphql_parser::query::{
    Definition, Document, Selection, SelectionSet, Type as AstType, TypeCondition,
};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StitchError;
use crate::graph::{SchemaGraph, BUILTIN_SCALARS};
use crate::transforms::{Request, Transform};
use crate::visit::{visit_schema, SchemaVisitor, Specifier, VisitAction};

type Renamer = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct RenameTypes {
    renamer: Renamer,
    /// original -> renamed, recorded when the schema is transformed.
    forward: Arc<Mutex<HashMap<String, String>>>,
    /// renamed -> original.
    reverse: Arc<Mutex<HashMap<String, String>>>,
}

impl RenameTypes {
    pub fn new(renamer: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        RenameTypes {
            renamer: Arc::new(renamer),
            forward: Arc::new(Mutex::new(HashMap::new())),
            reverse: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_map(renames: HashMap<String, String>) -> Self {
        RenameTypes::new(move |name| renames.get(name).cloned())
    }
}

impl Transform for RenameTypes {
    fn transform_schema(&self, schema: SchemaGraph) -> Result<SchemaGraph, StitchError> {
        let renamer = self.renamer.clone();
        let forward = self.forward.clone();
        let reverse = self.reverse.clone();
        let mut visitor = SchemaVisitor::new().on_type(Specifier::Type, move |node, _| {
            if BUILTIN_SCALARS.contains(&node.name()) {
                return VisitAction::Keep;
            }
            let Some(renamed) = renamer(node.name()) else {
                return VisitAction::Keep;
            };
            if renamed == node.name() {
                return VisitAction::Keep;
            }
            forward
                .lock()
                .expect("rename map poisoned")
                .insert(node.name().to_string(), renamed.clone());
            reverse
                .lock()
                .expect("rename map poisoned")
                .insert(renamed.clone(), node.name().to_string());
            let mut replacement = node.clone();
            replacement.set_name(renamed);
            VisitAction::Replace(replacement)
        })?;
        visit_schema(&schema, &mut visitor)
    }

    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        let reverse = self.reverse.lock().expect("rename map poisoned").clone();
        if reverse.is_empty() {
            return Ok(request);
        }
        let original = |name: &str| reverse.get(name).cloned();

        let Request {
            document,
            variables,
            operation_name,
        } = request;
        let definitions = document
            .definitions
            .into_iter()
            .map(|definition| match definition {
                Definition::Operation(mut op) => {
                    use graphql_parser::query::OperationDefinition as Op;
                    match &mut op {
                        Op::SelectionSet(set) => rename_selection_set(set, &original),
                        Op::Query(query) => {
                            rename_variable_types(&mut query.variable_definitions, &original);
                            rename_selection_set(&mut query.selection_set, &original);
                        }
                        Op::Mutation(mutation) => {
                            rename_variable_types(&mut mutation.variable_definitions, &original);
                            rename_selection_set(&mut mutation.selection_set, &original);
                        }
                        Op::Subscription(subscription) => {
                            rename_variable_types(
                                &mut subscription.variable_definitions,
                                &original,
                            );
                            rename_selection_set(&mut subscription.selection_set, &original);
                        }
                    }
                    Definition::Operation(op)
                }
                Definition::Fragment(mut fragment) => {
                    let TypeCondition::On(condition) = &mut fragment.type_condition;
                    if let Some(name) = original(condition) {
                        *condition = name;
                    }
                    rename_selection_set(&mut fragment.selection_set, &original);
                    Definition::Fragment(fragment)
                }
            })
            .collect();

        Ok(Request {
            document: Document { definitions },
            variables,
            operation_name,
        })
    }

    fn transform_result(&self, mut result: Json) -> Result<Json, StitchError> {
        let forward = self.forward.lock().expect("rename map poisoned").clone();
        if !forward.is_empty() {
            rename_typenames(&mut result, &forward);
        }
        Ok(result)
    }
}

fn rename_selection_set(
    set: &mut SelectionSet<'static, String>,
    original: &dyn Fn(&str) -> Option<String>,
) {
    for selection in &mut set.items {
        match selection {
            Selection::Field(field) => rename_selection_set(&mut field.selection_set, original),
            Selection::InlineFragment(inline) => {
                if let Some(TypeCondition::On(condition)) = &mut inline.type_condition {
                    if let Some(name) = original(condition) {
                        *condition = name;
                    }
                }
                rename_selection_set(&mut inline.selection_set, original);
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

fn rename_variable_types(
    definitions: &mut [graphql_parser::query::VariableDefinition<'static, String>],
    original: &dyn Fn(&str) -> Option<String>,
) {
    fn rename_type(ty: &mut AstType<'static, String>, original: &dyn Fn(&str) -> Option<String>) {
        match ty {
            AstType::NamedType(name) => {
                if let Some(renamed) = original(name) {
                    *name = renamed;
                }
            }
            AstType::ListType(inner) | AstType::NonNullType(inner) => {
                rename_type(inner, original)
            }
        }
    }
    for definition in definitions {
        rename_type(&mut definition.var_type, original);
    }
}

fn rename_typenames(value: &mut Json, forward: &HashMap<String, String>) {
    match value {
        Json::Object(object) => {
            for (key, child) in object.iter_mut() {
                if key == "__typename" {
                    if let Some(renamed) = child.as_str().and_then(|name| forward.get(name)) {
                        *child = Json::String(renamed.clone());
                    }
                } else {
                    rename_typenames(child, forward);
                }
            }
        }
        Json::Array(items) => {
            for item in items {
                rename_typenames(item, forward);
            }
        }
        _ => {}
    }
}
