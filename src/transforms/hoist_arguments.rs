//! Attaches resolver-supplied argument values to the root fields of a
//! delegated document. Values travel as fresh variables rather than inlined
//! literals, so the printed document stays stable and scalar serialization
//! is left to the transport.

use graphql_parser::query::{
    Definition, Document, Selection, Value as AstValue, VariableDefinition,
};
use std::sync::Arc;

use crate::ast;
use crate::error::StitchError;
use crate::graph::SchemaGraph;
use crate::transforms::{Request, Transform};
use crate::JsonMap;

pub struct HoistArgumentsAsVariables {
    target: Arc<SchemaGraph>,
    args: JsonMap,
}

impl HoistArgumentsAsVariables {
    pub fn new(target: Arc<SchemaGraph>, args: JsonMap) -> Self {
        HoistArgumentsAsVariables { target, args }
    }
}

impl Transform for HoistArgumentsAsVariables {
    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        if self.args.is_empty() {
            return Ok(request);
        }

        let mut variables = request.variables;
        let mut counter = 0usize;

        let definitions = request
            .document
            .definitions
            .into_iter()
            .map(|definition| {
                let Definition::Operation(op) = definition else {
                    return Ok(definition);
                };
                let parts = ast::operation_parts(&op);
                let kind = parts.kind;
                let mut variable_definitions = parts.variable_definitions.to_vec();
                let mut selection_set = parts.selection_set.clone();
                drop(parts);

                let Some(root) = self.target.root_type(kind) else {
                    return Ok(Definition::Operation(op));
                };
                let root = root.to_string();

                for selection in &mut selection_set.items {
                    let Selection::Field(field) = selection else {
                        continue;
                    };
                    let Some(field_def) = self.target.field_def(&root, &field.name) else {
                        continue;
                    };
                    for (name, value) in &self.args {
                        let Some(argument) = field_def.argument(name) else {
                            continue;
                        };
                        let variable = format!("_v{}_{}", counter, name);
                        counter += 1;
                        variable_definitions.push(VariableDefinition {
                            position: ast::pos(),
                            name: variable.clone(),
                            var_type: argument.value_type.to_ast(),
                            default_value: None,
                        });
                        field
                            .arguments
                            .retain(|(existing, _)| existing != name);
                        field
                            .arguments
                            .push((name.clone(), AstValue::Variable(variable.clone())));
                        variables.insert(variable, value.clone());
                    }
                }

                Ok(Definition::Operation(ast::make_operation(
                    kind,
                    variable_definitions,
                    selection_set,
                )))
            })
            .collect::<Result<Vec<_>, StitchError>>()?;

        Ok(Request {
            document: Document { definitions },
            variables,
            operation_name: request.operation_name,
        })
    }
}
