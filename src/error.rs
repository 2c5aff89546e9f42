use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// One segment of a GraphQL response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}

impl PathSegment {
    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            PathSegment::Field(name) => Some(name),
            PathSegment::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Field(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// A GraphQL response error: message, response path and optional structured
/// detail. `errors` carries underlying causes when several delegated errors
/// were collapsed into one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Relocates the error to the given response path.
    pub fn located(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// True when the error carries machine-readable detail that must survive
    /// re-attribution verbatim.
    pub fn has_structured_data(&self) -> bool {
        self.extensions.is_some() || self.errors.is_some()
    }

    /// Collapses the surviving errors of a delegated call into the single
    /// error surfaced at the delegating field. A lone structured error is
    /// preserved as-is (relocated); several errors are concatenated into one
    /// message with the originals attached as causes.
    pub fn from_delegated(mut errors: Vec<GraphQLError>, path: Vec<PathSegment>) -> Self {
        match errors.len() {
            0 => GraphQLError::new("delegated execution returned no data").located(path),
            1 => {
                let single = errors.pop().expect("length checked");
                if single.has_structured_data() {
                    single.located(path)
                } else {
                    GraphQLError::new(single.message).located(path)
                }
            }
            _ => {
                let message = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                GraphQLError {
                    message,
                    path,
                    extensions: None,
                    errors: Some(errors),
                }
            }
        }
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GraphQLError {}

/// Schema-build and delegation-machinery failures. Everything here except
/// `Delegation` is a configuration error raised while building or rewriting
/// a schema, never at request time.
#[derive(Debug, Error)]
pub enum StitchError {
    #[error("failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    #[error("invalid schema source: {0}")]
    InvalidSource(String),

    #[error("unknown type {0}")]
    UnknownType(String),

    #[error("duplicate type name {0} after rewrite")]
    DuplicateType(String),

    #[error("missing root type {0}")]
    MissingRootType(String),

    #[error("invalid visitor registration: {0}")]
    InvalidVisitor(String),

    #[error("document failed validation: {0}")]
    Validation(String),

    #[error("remote request failed: {0}")]
    Remote(String),

    #[error("delegated execution failed: {}", .0.message)]
    Delegation(GraphQLError),
}

impl StitchError {
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        StitchError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Converts a build/delegation failure into the response error surfaced
    /// at the delegating field.
    pub fn into_graphql_error(self, path: Vec<PathSegment>) -> GraphQLError {
        match self {
            StitchError::Delegation(err) => {
                if err.path.is_empty() {
                    err.located(path)
                } else {
                    err
                }
            }
            other => GraphQLError::new(other.to_string()).located(path),
        }
    }
}
