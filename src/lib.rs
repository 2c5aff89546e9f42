pub mod ast;
pub mod delegate;
pub mod error;
pub mod error_channel;
pub mod execute;
pub mod graph;
pub mod merge;
pub mod remote;
pub mod transforms;
pub mod validate;
pub mod visit;

pub use delegate::{delegate_to_schema, DelegateOptions};
pub use error::{GraphQLError, PathSegment, StitchError};
pub use execute::{execute, ExecutionResult, ResolveInfo, ResolveParams, Resolver};
pub use graph::{FieldDef, SchemaGraph, TypeNode, TypeRef};
pub use merge::{merge_schemas, MergeInfo, MergeOptions, SchemaSource};
pub use remote::{make_remote_schema, HttpRemoteExecutor, RemoteExecutor};
pub use transforms::{transform_schema, Request, Transform, TransformChain};
pub use visit::{heal_schema, visit_schema, SchemaVisitor, Specifier, VisitAction};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type JsonMap = serde_json::Map<String, Value>;

/// The three GraphQL operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// The wire form of a GraphQL request, as shipped to remote sub-schemas.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}
