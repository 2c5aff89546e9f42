//! Collapses a delegated response envelope into the value of the delegated
//! root field. Errors belonging to the field itself are raised; errors on
//! its descendants ride back attached to the data through the in-band
//! channel, for re-attribution during outer completion.

use serde_json::Value as Json;

use crate::error::{GraphQLError, PathSegment, StitchError};
use crate::error_channel;
use crate::execute::ExecutionResult;
use crate::transforms::Transform;

pub struct CheckResultAndHandleErrors {
    /// The delegating field's position in the outer response.
    path: Vec<PathSegment>,
    /// Response key of the root field in the delegated document.
    response_key: String,
}

impl CheckResultAndHandleErrors {
    pub fn new(path: Vec<PathSegment>, response_key: impl Into<String>) -> Self {
        CheckResultAndHandleErrors {
            path,
            response_key: response_key.into(),
        }
    }
}

impl Transform for CheckResultAndHandleErrors {
    fn transform_result(&self, result: Json) -> Result<Json, StitchError> {
        let ExecutionResult { data, errors } = ExecutionResult::from_json(result);
        let mut value = data.get(&self.response_key).cloned().unwrap_or(Json::Null);

        if value.is_null() && !errors.is_empty() {
            return Err(StitchError::Delegation(GraphQLError::from_delegated(
                errors,
                self.path.clone(),
            )));
        }

        // Errors addressed to the field itself (or to no field at all) have
        // no descendant to ride on; they are raised even when data came back.
        let mut own = Vec::new();
        let mut relative = Vec::new();
        for error in errors {
            match error.path.first() {
                Some(PathSegment::Field(name)) if name == &self.response_key => {
                    if error.path.len() == 1 {
                        own.push(error);
                    } else {
                        relative.push(GraphQLError {
                            path: error.path[1..].to_vec(),
                            ..error
                        });
                    }
                }
                None => own.push(error),
                _ => relative.push(error),
            }
        }
        if !own.is_empty() {
            return Err(StitchError::Delegation(GraphQLError::from_delegated(
                own,
                self.path.clone(),
            )));
        }
        error_channel::annotate(&mut value, relative);
        Ok(value)
    }
}
