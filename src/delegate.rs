//! Delegation: re-issuing the field a resolver is serving as a root-field
//! operation against a target schema. The delegated document reuses the
//! calling field's selection set, variable definitions and fragments
//! verbatim; a transform chain then reshapes it for the target and folds the
//! response back into the value the outer executor expects.

use futures::FutureExt;
use graphql_parser::query::InlineFragment;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast;
use crate::error::{GraphQLError, StitchError};
use crate::execute::{self, ResolveInfo, ResolveParams, Resolver};
use crate::graph::{SchemaGraph, TypeNode};
use crate::transforms::{
    apply_request_transforms, apply_result_transforms, AddTypenameToAbstract,
    CheckResultAndHandleErrors, ConvertEnumResult, ExpandAbstractTypes, FilterToSchema,
    HoistArgumentsAsVariables, ReplaceFieldWithFragment, Request, Transform,
};
use crate::validate;
use crate::{GraphQLRequest, JsonMap, OperationKind};

/// One delegated call.
pub struct DelegateOptions {
    /// Target schema. A remote sub-schema ships the printed document through
    /// its executor; otherwise execution happens in-process.
    pub schema: Arc<SchemaGraph>,
    pub operation: OperationKind,
    /// Root field of the target schema to invoke.
    pub field_name: String,
    /// Argument values attached to the root field, as fresh variables.
    pub args: JsonMap,
    /// The calling field's execution info; its selection context is reused
    /// as the body of the delegated operation.
    pub info: ResolveInfo,
    pub transforms: Vec<Arc<dyn Transform>>,
    /// Field-to-fragment substitutions, keyed by (type name, field name).
    pub fragment_replacements: HashMap<(String, String), InlineFragment<'static, String>>,
    pub skip_validation: bool,
}

impl DelegateOptions {
    pub fn new(
        schema: Arc<SchemaGraph>,
        operation: OperationKind,
        field_name: impl Into<String>,
        args: JsonMap,
        info: ResolveInfo,
    ) -> Self {
        DelegateOptions {
            schema,
            operation,
            field_name: field_name.into(),
            args,
            info,
            transforms: Vec::new(),
            fragment_replacements: HashMap::new(),
            skip_validation: false,
        }
    }
}

/// Delegates the calling field to a target schema and returns the value for
/// the outer executor to complete. Failures surface as a response error
/// located at the calling field.
pub async fn delegate_to_schema(options: DelegateOptions) -> Result<Json, GraphQLError> {
    let path = options.info.path.clone();
    delegate(options).await.map_err(|e| e.into_graphql_error(path))
}

async fn delegate(options: DelegateOptions) -> Result<Json, StitchError> {
    let DelegateOptions {
        schema,
        operation,
        field_name,
        args,
        info,
        transforms,
        fragment_replacements,
        skip_validation,
    } = options;

    if operation == OperationKind::Subscription {
        return Err(StitchError::Validation(
            "subscription delegation is not supported".into(),
        ));
    }

    let document = ast::build_delegation_document(
        operation,
        &field_name,
        info.selection_set.clone(),
        info.variable_definitions.clone(),
        info.fragments.clone(),
    );

    // Caller-supplied transforms run first on the request and first on the
    // result, seeing the raw envelope before it is collapsed.
    let mut chain: Vec<Arc<dyn Transform>> = transforms;
    chain.push(Arc::new(ExpandAbstractTypes::new(
        info.schema.clone(),
        schema.clone(),
    )));
    if !fragment_replacements.is_empty() {
        chain.push(Arc::new(ReplaceFieldWithFragment::new(
            schema.clone(),
            fragment_replacements,
        )));
    }
    chain.push(Arc::new(HoistArgumentsAsVariables::new(
        schema.clone(),
        args,
    )));
    chain.push(Arc::new(FilterToSchema::new(schema.clone())));
    chain.push(Arc::new(AddTypenameToAbstract::new(schema.clone())));
    chain.push(Arc::new(CheckResultAndHandleErrors::new(
        info.path.clone(),
        field_name.clone(),
    )));
    let returns_enum = schema
        .root_type(operation)
        .and_then(|root| schema.field_def(root, &field_name))
        .map(|field| field.field_type.name().to_string())
        .and_then(|name| match schema.get_type(&name) {
            Some(TypeNode::Enum(enum_type)) => Some(enum_type.clone()),
            _ => None,
        });
    if let Some(enum_type) = returns_enum {
        chain.push(Arc::new(ConvertEnumResult::new(enum_type)));
    }

    let request = Request {
        document,
        variables: info.variable_values.clone(),
        operation_name: None,
    };
    let request = apply_request_transforms(request, &chain)?;

    if !skip_validation {
        validate::validate_document(&schema, &request.document)?;
    }

    tracing::debug!(
        execution_id = info.execution_id,
        field = %field_name,
        remote = schema.executor.is_some(),
        "delegating {}", operation
    );

    let envelope = match &schema.executor {
        Some(remote) => {
            let wire = GraphQLRequest {
                query: request.document.to_string(),
                variables: if request.variables.is_empty() {
                    None
                } else {
                    Some(Json::Object(request.variables.clone()))
                },
                operation_name: request.operation_name.clone(),
            };
            remote.execute_request(wire).await?
        }
        None => {
            execute::execute(
                schema.clone(),
                &request.document,
                request.operation_name.as_deref(),
                Json::Null,
                request.variables.clone(),
            )
            .await
            .to_json()
        }
    };

    apply_result_transforms(envelope, &chain)
}

/// The resolver installed on proxying root fields: delegates the field to
/// its origin schema, through the merge context when one is in scope.
pub fn default_delegating_resolver(
    target: Arc<SchemaGraph>,
    operation: OperationKind,
    field_name: String,
    transforms: Vec<Arc<dyn Transform>>,
) -> Resolver {
    Arc::new(move |params: ResolveParams| {
        let ResolveParams { args, info, .. } = params;
        let mut options =
            DelegateOptions::new(target.clone(), operation, field_name.clone(), args, info);
        options.transforms = transforms.clone();
        async move {
            match options.info.merge_info.clone() {
                Some(merge_info) => merge_info.delegate_to_schema(options).await,
                None => delegate_to_schema(options).await,
            }
        }
        .boxed()
    })
}
