//! Expands fragments conditioned on types the target schema does not treat
//! as abstract. A condition on such a type can never match in the target, so
//! it is replaced by one inline fragment per possible concrete type, and
//! `__typename` is added wherever the expansion happened so results can
//! still be discriminated.

use graphql_parser::query::{
    Definition, Document, FragmentDefinition, InlineFragment, Selection, SelectionSet,
    TypeCondition,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast;
use crate::error::StitchError;
use crate::graph::{SchemaGraph, TypeNode};
use crate::transforms::{Request, Transform};

pub struct ExpandAbstractTypes {
    /// Abstract type name in the delegating schema mapped to the possible
    /// concrete types that also exist in the target.
    expansions: HashMap<String, Vec<String>>,
    source: Arc<SchemaGraph>,
}

impl ExpandAbstractTypes {
    pub fn new(source: Arc<SchemaGraph>, target: Arc<SchemaGraph>) -> Self {
        let mut expansions = HashMap::new();
        for node in source.types.values() {
            if !node.is_abstract() {
                continue;
            }
            let abstract_in_target = target
                .get_type(node.name())
                .map(TypeNode::is_abstract)
                .unwrap_or(false);
            if abstract_in_target {
                continue;
            }
            let concrete: Vec<String> = source
                .possible_types(node.name())
                .into_iter()
                .filter(|name| matches!(target.get_type(name), Some(TypeNode::Object(_))))
                .collect();
            expansions.insert(node.name().to_string(), concrete);
        }
        ExpandAbstractTypes { expansions, source }
    }

    fn expand_selection_set(
        &self,
        parent_type: &str,
        selection_set: &SelectionSet<'static, String>,
        fragments: &HashMap<String, FragmentDefinition<'static, String>>,
    ) -> SelectionSet<'static, String> {
        let mut expanded = ast::empty_selection_set();
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    let mut kept = field.clone();
                    if let Some(definition) = self.source.field_def(parent_type, &field.name) {
                        let return_type = definition.field_type.name().to_string();
                        kept.selection_set = self.expand_selection_set(
                            &return_type,
                            &field.selection_set,
                            fragments,
                        );
                    }
                    expanded.items.push(Selection::Field(kept));
                }
                Selection::InlineFragment(inline) => {
                    let condition = match &inline.type_condition {
                        Some(TypeCondition::On(name)) => name.clone(),
                        None => parent_type.to_string(),
                    };
                    let inner =
                        self.expand_selection_set(&condition, &inline.selection_set, fragments);
                    match self.expansions.get(&condition) {
                        Some(concrete_types) => {
                            for concrete in concrete_types {
                                expanded.items.push(inline_on(concrete, inner.clone()));
                            }
                        }
                        None => {
                            let mut kept = inline.clone();
                            kept.selection_set = inner;
                            expanded.items.push(Selection::InlineFragment(kept));
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = fragments.get(&spread.fragment_name) else {
                        expanded.items.push(selection.clone());
                        continue;
                    };
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    match self.expansions.get(condition) {
                        Some(concrete_types) => {
                            let inner = self.expand_selection_set(
                                condition,
                                &fragment.selection_set,
                                fragments,
                            );
                            for concrete in concrete_types {
                                expanded.items.push(inline_on(concrete, inner.clone()));
                            }
                        }
                        None => expanded.items.push(selection.clone()),
                    }
                }
            }
        }
        // Expanded conditions need the concrete type name in the result.
        if self.expansions.contains_key(parent_type) && !ast::selects_typename(&expanded) {
            expanded.items.push(ast::typename_field());
        }
        expanded
    }
}

fn inline_on(condition: &str, selection_set: SelectionSet<'static, String>) -> Selection<'static, String> {
    Selection::InlineFragment(InlineFragment {
        position: ast::pos(),
        type_condition: Some(TypeCondition::On(condition.to_string())),
        directives: Vec::new(),
        selection_set,
    })
}

impl Transform for ExpandAbstractTypes {
    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        if self.expansions.is_empty() {
            return Ok(request);
        }

        let Request {
            document,
            variables,
            operation_name,
        } = request;
        let fragments: HashMap<String, FragmentDefinition<'static, String>> =
            ast::fragment_definitions(&document)
                .into_iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect();

        let definitions = document
            .definitions
            .into_iter()
            .map(|definition| match definition {
                Definition::Operation(op) => {
                    let parts = ast::operation_parts(&op);
                    let kind = parts.kind;
                    let variable_definitions = parts.variable_definitions.to_vec();
                    let root = self
                        .source
                        .root_type(kind)
                        .unwrap_or_default()
                        .to_string();
                    let selection_set =
                        self.expand_selection_set(&root, parts.selection_set, &fragments);
                    Definition::Operation(ast::make_operation(
                        kind,
                        variable_definitions,
                        selection_set,
                    ))
                }
                Definition::Fragment(fragment) => {
                    let TypeCondition::On(condition) = fragment.type_condition.clone();
                    let mut expanded = fragment;
                    expanded.selection_set =
                        self.expand_selection_set(&condition, &expanded.selection_set, &fragments);
                    Definition::Fragment(expanded)
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
