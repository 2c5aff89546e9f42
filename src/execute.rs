//! A selection-set executor over the owned schema graph. This is the
//! execution collaborator the stitching core invokes: it walks the chosen
//! operation, calls field resolvers (opaque async handles), and collects
//! errors with response paths. Default field resolution implements the
//! merged-resolver protocol by consulting the delegated-error channel on the
//! parent object.

use futures::future::BoxFuture;
use futures::FutureExt;
use graphql_parser::query::{
    Document, Field, FragmentDefinition, Selection, SelectionSet, TypeCondition,
    VariableDefinition,
};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::ast;
use crate::error::{GraphQLError, PathSegment};
use crate::error_channel;
use crate::graph::{FieldDef, SchemaGraph, TypeNode, TypeRef};
use crate::merge::MergeInfo;
use crate::{JsonMap, OperationKind};

pub type ResolverFuture = BoxFuture<'static, Result<Json, GraphQLError>>;

/// An opaque field resolver handle. The core installs, replaces or wraps
/// these wholesale; it never looks inside.
pub type Resolver = Arc<dyn Fn(ResolveParams) -> ResolverFuture + Send + Sync>;

/// Everything a resolver receives for one field.
#[derive(Clone)]
pub struct ResolveParams {
    pub parent: Json,
    pub args: JsonMap,
    pub info: ResolveInfo,
}

/// Execution info for the field being resolved: the calling field's
/// selection context that delegation reuses verbatim, plus the merge
/// context on merged schemas.
#[derive(Clone)]
pub struct ResolveInfo {
    pub field_name: String,
    pub parent_type: String,
    pub return_type: TypeRef,
    pub selection_set: SelectionSet<'static, String>,
    pub fragments: Vec<FragmentDefinition<'static, String>>,
    pub variable_definitions: Vec<VariableDefinition<'static, String>>,
    pub variable_values: JsonMap,
    pub operation: OperationKind,
    pub operation_name: Option<String>,
    pub path: Vec<PathSegment>,
    pub schema: Arc<SchemaGraph>,
    /// Unique per operation execution.
    pub execution_id: u64,
    pub merge_info: Option<Arc<MergeInfo>>,
}

/// The standard response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub data: Json,
    pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    pub fn from_error(error: GraphQLError) -> Self {
        ExecutionResult {
            data: Json::Null,
            errors: vec![error],
        }
    }

    pub fn to_json(&self) -> Json {
        let mut envelope = JsonMap::new();
        envelope.insert("data".to_string(), self.data.clone());
        if !self.errors.is_empty() {
            envelope.insert(
                "errors".to_string(),
                serde_json::to_value(&self.errors).unwrap_or(Json::Null),
            );
        }
        Json::Object(envelope)
    }

    pub fn from_json(envelope: Json) -> Self {
        let data = envelope.get("data").cloned().unwrap_or(Json::Null);
        let errors = envelope
            .get("errors")
            .cloned()
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default();
        ExecutionResult { data, errors }
    }
}

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

/// A token unique to one operation execution.
pub fn next_execution_id() -> u64 {
    NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone)]
struct ExecCtx {
    schema: Arc<SchemaGraph>,
    fragments: Arc<HashMap<String, FragmentDefinition<'static, String>>>,
    fragment_list: Arc<Vec<FragmentDefinition<'static, String>>>,
    variable_definitions: Arc<Vec<VariableDefinition<'static, String>>>,
    variables: Arc<JsonMap>,
    errors: Arc<Mutex<Vec<GraphQLError>>>,
    execution_id: u64,
    operation: OperationKind,
    operation_name: Option<String>,
}

impl ExecCtx {
    fn record(&self, error: GraphQLError) {
        self.errors.lock().expect("error sink poisoned").push(error);
    }
}

/// Executes a document against a schema. Queries and mutations only;
/// subscriptions fail fast.
pub async fn execute(
    schema: Arc<SchemaGraph>,
    document: &Document<'static, String>,
    operation_name: Option<&str>,
    root_value: Json,
    variables: JsonMap,
) -> ExecutionResult {
    let Some(operation) = ast::find_operation(document, operation_name) else {
        return ExecutionResult::from_error(GraphQLError::new(match operation_name {
            Some(name) => format!("unknown operation {}", name),
            None => "document must contain exactly one operation".to_string(),
        }));
    };
    let parts = ast::operation_parts(operation);

    if parts.kind == OperationKind::Subscription {
        return ExecutionResult::from_error(GraphQLError::new(
            "subscription execution is not supported",
        ));
    }

    let Some(root_type) = schema.root_type(parts.kind).map(str::to_string) else {
        return ExecutionResult::from_error(GraphQLError::new(format!(
            "schema does not support {} operations",
            parts.kind
        )));
    };

    let mut coerced = variables;
    for definition in parts.variable_definitions {
        if !coerced.contains_key(&definition.name) {
            if let Some(default) = &definition.default_value {
                coerced.insert(definition.name.clone(), ast::literal_to_json(default));
            }
        }
    }

    let fragment_list: Vec<FragmentDefinition<'static, String>> =
        ast::fragment_definitions(document)
            .into_iter()
            .cloned()
            .collect();
    let fragments: HashMap<String, FragmentDefinition<'static, String>> = fragment_list
        .iter()
        .map(|f| (f.name.clone(), f.clone()))
        .collect();

    let ctx = ExecCtx {
        schema,
        fragments: Arc::new(fragments),
        fragment_list: Arc::new(fragment_list),
        variable_definitions: Arc::new(parts.variable_definitions.to_vec()),
        variables: Arc::new(coerced),
        errors: Arc::new(Mutex::new(Vec::new())),
        execution_id: next_execution_id(),
        operation: parts.kind,
        operation_name: parts.name.map(str::to_string),
    };

    let data = execute_selection_set(
        ctx.clone(),
        root_type,
        parts.selection_set.clone(),
        root_value,
        Vec::new(),
    )
    .await;

    let errors = std::mem::take(&mut *ctx.errors.lock().expect("error sink poisoned"));
    ExecutionResult {
        data: Json::Object(data),
        errors,
    }
}

/// Evaluates `@skip` / `@include` on a selection.
fn should_include(
    directives: &[graphql_parser::query::Directive<'static, String>],
    variables: &JsonMap,
) -> bool {
    for directive in directives {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| ast::value_to_json(value, variables))
            .and_then(|v| v.as_bool())
            .unwrap_or(directive.name != "skip");
        match directive.name.as_str() {
            "skip" if condition => return false,
            "include" if !condition => return false,
            _ => {}
        }
    }
    true
}

/// Groups a selection set's fields by response key, spreading fragments
/// that apply to the concrete type.
fn collect_fields(
    ctx: &ExecCtx,
    type_name: &str,
    selection_set: &SelectionSet<'static, String>,
    grouped: &mut IndexMap<String, Vec<Field<'static, String>>>,
    visited_fragments: &mut HashSet<String>,
) {
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                if !should_include(&field.directives, &ctx.variables) {
                    continue;
                }
                let response_key = field.alias.clone().unwrap_or_else(|| field.name.clone());
                grouped.entry(response_key).or_default().push(field.clone());
            }
            Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, &ctx.variables) {
                    continue;
                }
                let applies = match &inline.type_condition {
                    Some(TypeCondition::On(condition)) => {
                        ctx.schema.type_applies(condition, type_name)
                    }
                    None => true,
                };
                if applies {
                    collect_fields(ctx, type_name, &inline.selection_set, grouped, visited_fragments);
                }
            }
            Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, &ctx.variables) {
                    continue;
                }
                if !visited_fragments.insert(spread.fragment_name.clone()) {
                    continue;
                }
                if let Some(fragment) = ctx.fragments.get(&spread.fragment_name) {
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    if ctx.schema.type_applies(condition, type_name) {
                        collect_fields(
                            ctx,
                            type_name,
                            &fragment.selection_set,
                            grouped,
                            visited_fragments,
                        );
                    }
                }
            }
        }
    }
}

fn build_arguments(ctx: &ExecCtx, definition: &FieldDef, field: &Field<'static, String>) -> JsonMap {
    let mut args = JsonMap::new();
    for argument in &definition.arguments {
        let supplied = field
            .arguments
            .iter()
            .find(|(name, _)| name == &argument.name)
            .map(|(_, value)| ast::value_to_json(value, &ctx.variables));
        match supplied {
            Some(value) => {
                args.insert(argument.name.clone(), value);
            }
            None => {
                if let Some(default) = &argument.default_value {
                    args.insert(argument.name.clone(), default.clone());
                }
            }
        }
    }
    args
}

fn execute_selection_set(
    ctx: ExecCtx,
    type_name: String,
    selection_set: SelectionSet<'static, String>,
    parent: Json,
    path: Vec<PathSegment>,
) -> BoxFuture<'static, JsonMap> {
    async move {
        let mut grouped = IndexMap::new();
        collect_fields(
            &ctx,
            &type_name,
            &selection_set,
            &mut grouped,
            &mut HashSet::new(),
        );

        let mut output = JsonMap::new();
        for (response_key, group) in grouped {
            let field = &group[0];
            let mut field_path = path.clone();
            field_path.push(PathSegment::Field(response_key.clone()));

            if field.name == "__typename" {
                output.insert(response_key, Json::String(type_name.clone()));
                continue;
            }

            let Some(definition) = ctx.schema.field_def(&type_name, &field.name).cloned() else {
                ctx.record(
                    GraphQLError::new(format!(
                        "cannot query field {} on type {}",
                        field.name, type_name
                    ))
                    .located(field_path),
                );
                output.insert(response_key, Json::Null);
                continue;
            };

            // Same response key selected more than once: execute against the
            // merged sub-selections.
            let mut merged_selections = ast::empty_selection_set();
            for selected in &group {
                merged_selections
                    .items
                    .extend(selected.selection_set.items.iter().cloned());
            }

            let args = build_arguments(&ctx, &definition, field);
            let info = ResolveInfo {
                field_name: field.name.clone(),
                parent_type: type_name.clone(),
                return_type: definition.field_type.clone(),
                selection_set: merged_selections.clone(),
                fragments: (*ctx.fragment_list).clone(),
                variable_definitions: (*ctx.variable_definitions).clone(),
                variable_values: (*ctx.variables).clone(),
                operation: ctx.operation,
                operation_name: ctx.operation_name.clone(),
                path: field_path.clone(),
                schema: ctx.schema.clone(),
                execution_id: ctx.execution_id,
                merge_info: ctx.schema.merge_info.clone(),
            };

            let resolved = match &definition.resolver {
                Some(resolver) => {
                    let params = ResolveParams {
                        parent: parent.clone(),
                        args,
                        info,
                    };
                    match resolver(params).await {
                        Ok(value) => Some(value),
                        Err(error) => {
                            let located = if error.path.is_empty() {
                                error.located(field_path.clone())
                            } else {
                                error
                            };
                            ctx.record(located);
                            None
                        }
                    }
                }
                None => match default_resolve(&parent, &response_key, &field.name, &field_path) {
                    Ok(value) => Some(value),
                    Err(error) => {
                        ctx.record(error);
                        None
                    }
                },
            };

            let completed = match resolved {
                Some(value) => {
                    complete_value(
                        ctx.clone(),
                        definition.field_type.clone(),
                        value,
                        merged_selections,
                        field_path,
                    )
                    .await
                }
                None => Json::Null,
            };
            output.insert(response_key, completed);
        }
        output
    }
    .boxed()
}

/// Default field resolution: property lookup on the parent object, plus the
/// merged-resolver protocol over the delegated-error channel.
fn default_resolve(
    parent: &Json,
    response_key: &str,
    field_name: &str,
    path: &[PathSegment],
) -> Result<Json, GraphQLError> {
    let Json::Object(object) = parent else {
        return Ok(Json::Null);
    };
    // Delegated sub-results key children by the outer response key, since
    // aliases travel with the sub-operation.
    let lookup_key = if object.contains_key(response_key) {
        response_key
    } else {
        field_name
    };
    let child = object.get(lookup_key).cloned().unwrap_or(Json::Null);
    error_channel::assign_child(object, lookup_key, child, path)
}

fn complete_value(
    ctx: ExecCtx,
    type_ref: TypeRef,
    value: Json,
    selection_set: SelectionSet<'static, String>,
    path: Vec<PathSegment>,
) -> BoxFuture<'static, Json> {
    async move {
        match type_ref {
            TypeRef::NonNull(inner) => {
                complete_value(ctx, *inner, value, selection_set, path).await
            }
            _ if value.is_null() => Json::Null,
            TypeRef::List(inner) => match value {
                Json::Array(elements) => {
                    let mut completed = Vec::with_capacity(elements.len());
                    for (index, element) in elements.into_iter().enumerate() {
                        let mut element_path = path.clone();
                        element_path.push(PathSegment::Index(index));
                        completed.push(
                            complete_value(
                                ctx.clone(),
                                (*inner).clone(),
                                element,
                                selection_set.clone(),
                                element_path,
                            )
                            .await,
                        );
                    }
                    Json::Array(completed)
                }
                _ => {
                    ctx.record(GraphQLError::new("expected a list value").located(path));
                    Json::Null
                }
            },
            TypeRef::Named(name) => match ctx.schema.get_type(&name) {
                // Built-in scalars may be absent from the type map.
                None | Some(TypeNode::Scalar(_)) => value,
                Some(TypeNode::Enum(enum_type)) => match enum_type.external_name(&value) {
                    Some(external) => Json::String(external.to_string()),
                    None => {
                        ctx.record(
                            GraphQLError::new(format!(
                                "value is not a member of enum {}",
                                name
                            ))
                            .located(path),
                        );
                        Json::Null
                    }
                },
                Some(TypeNode::InputObject(_)) => {
                    ctx.record(
                        GraphQLError::new(format!("input type {} cannot be output", name))
                            .located(path),
                    );
                    Json::Null
                }
                Some(TypeNode::Object(object)) => {
                    let concrete = object.name.clone();
                    Json::Object(
                        execute_selection_set(ctx, concrete, selection_set, value, path).await,
                    )
                }
                Some(TypeNode::Interface(_)) | Some(TypeNode::Union(_)) => {
                    let concrete = value
                        .get("__typename")
                        .and_then(Json::as_str)
                        .map(str::to_string);
                    match concrete {
                        Some(concrete) => Json::Object(
                            execute_selection_set(ctx, concrete, selection_set, value, path)
                                .await,
                        ),
                        None => {
                            ctx.record(
                                GraphQLError::new(format!(
                                    "cannot resolve concrete type for abstract type {}",
                                    name
                                ))
                                .located(path),
                            );
                            Json::Null
                        }
                    }
                }
            },
        }
    }
    .boxed()
}
