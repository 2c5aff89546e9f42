//! The transform pipeline: a protocol of three optional capabilities and the
//! composition rules for applying stacks of transforms to schemas, outgoing
//! requests and incoming results.

pub mod add_typename;
pub mod check_result;
pub mod convert_enums;
pub mod expand_abstract_types;
pub mod filter_root_fields;
pub mod filter_to_schema;
pub mod hoist_arguments;
pub mod rename_root_fields;
pub mod rename_types;
pub mod replace_field_with_fragment;

pub use add_typename::AddTypenameToAbstract;
pub use check_result::CheckResultAndHandleErrors;
pub use convert_enums::ConvertEnumResult;
pub use expand_abstract_types::ExpandAbstractTypes;
pub use filter_root_fields::FilterRootFields;
pub use filter_to_schema::FilterToSchema;
pub use hoist_arguments::HoistArgumentsAsVariables;
pub use rename_root_fields::RenameRootFields;
pub use rename_types::RenameTypes;
pub use replace_field_with_fragment::ReplaceFieldWithFragment;

use graphql_parser::query::Document;
use serde_json::Value as Json;
use std::sync::Arc;

use crate::delegate;
use crate::error::StitchError;
use crate::graph::SchemaGraph;
use crate::graph::TypeNode;
use crate::{JsonMap, OperationKind};

/// An outgoing delegated request: the document plus its variable values.
#[derive(Debug, Clone)]
pub struct Request {
    pub document: Document<'static, String>,
    pub variables: JsonMap,
    pub operation_name: Option<String>,
}

/// One rewrite step. Every capability is optional; the default is a no-op
/// passthrough so a transform only implements the sides it distorts.
pub trait Transform: Send + Sync {
    fn transform_schema(&self, schema: SchemaGraph) -> Result<SchemaGraph, StitchError> {
        Ok(schema)
    }

    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        Ok(request)
    }

    fn transform_result(&self, result: Json) -> Result<Json, StitchError> {
        Ok(result)
    }
}

pub fn apply_schema_transforms(
    schema: SchemaGraph,
    transforms: &[Arc<dyn Transform>],
) -> Result<SchemaGraph, StitchError> {
    transforms
        .iter()
        .try_fold(schema, |schema, transform| transform.transform_schema(schema))
}

pub fn apply_request_transforms(
    request: Request,
    transforms: &[Arc<dyn Transform>],
) -> Result<Request, StitchError> {
    transforms
        .iter()
        .try_fold(request, |request, transform| {
            transform.transform_request(request)
        })
}

/// Result transforms fold in the declared order: within one delegated call
/// each transform's result side undoes exactly the distortion its own
/// request side introduced, in the same direction.
pub fn apply_result_transforms(
    result: Json,
    transforms: &[Arc<dyn Transform>],
) -> Result<Json, StitchError> {
    transforms
        .iter()
        .try_fold(result, |result, transform| transform.transform_result(result))
}

/// Several transforms collapsed into one. When chains nest, the chain
/// applied last to the request must be unwound first from the result, so a
/// composite reverses its result-processing order relative to its
/// schema/request order.
pub struct TransformChain {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new(transforms: Vec<Arc<dyn Transform>>) -> Self {
        TransformChain { transforms }
    }
}

impl Transform for TransformChain {
    fn transform_schema(&self, schema: SchemaGraph) -> Result<SchemaGraph, StitchError> {
        apply_schema_transforms(schema, &self.transforms)
    }

    fn transform_request(&self, request: Request) -> Result<Request, StitchError> {
        apply_request_transforms(request, &self.transforms)
    }

    fn transform_result(&self, result: Json) -> Result<Json, StitchError> {
        self.transforms
            .iter()
            .rev()
            .try_fold(result, |result, transform| transform.transform_result(result))
    }
}

/// Wraps a schema in a transform stack: the returned schema exposes the
/// transformed shape, and every root field proxies back to the original
/// schema through the same transforms. Wrapping a wrapped schema nests the
/// chains, which unwind in reverse on the result side.
pub fn transform_schema(
    original: Arc<SchemaGraph>,
    transforms: Vec<Arc<dyn Transform>>,
) -> Result<Arc<SchemaGraph>, StitchError> {
    let mut transformed = apply_schema_transforms((*original).clone(), &transforms)?;
    let chain: Arc<dyn Transform> = Arc::new(TransformChain::new(transforms));

    // The wrapper resolves everything below the roots by property lookup on
    // the delegated sub-results; the original's resolvers only run inside
    // the original schema.
    for node in transformed.types.values_mut() {
        if let Some(fields) = node.fields_mut() {
            for field in fields.values_mut() {
                field.resolver = None;
                field.subscribe = None;
            }
        }
    }

    for operation in [
        OperationKind::Query,
        OperationKind::Mutation,
        OperationKind::Subscription,
    ] {
        let Some(root_name) = transformed.root_type(operation).map(str::to_string) else {
            continue;
        };
        let Some(fields) = transformed
            .types
            .get_mut(&root_name)
            .and_then(TypeNode::fields_mut)
        else {
            continue;
        };
        for field in fields.values_mut() {
            field.resolver = Some(delegate::default_delegating_resolver(
                original.clone(),
                operation,
                field.name.clone(),
                vec![chain.clone()],
            ));
        }
    }

    Ok(Arc::new(transformed))
}
