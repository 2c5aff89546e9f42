//! The in-band error side-channel. A delegated call's surviving errors ride
//! on the intermediate data objects under a reserved key, each entry
//! addressed by a path relative to the object it sits on. Default field
//! resolution consults the channel to re-attribute every error to the exact
//! field it belongs to in the outer response. The executor only copies
//! selected fields into the response, so the reserved key never leaks.

use serde_json::Value as Json;

use crate::error::{GraphQLError, PathSegment};
use crate::JsonMap;

/// Reserved key carrying channel entries on intermediate objects.
pub const ERRORS_KEY: &str = "__subschema_errors";

/// Attaches errors to a resolved value. Objects carry the list directly;
/// for lists the entries are partitioned by their leading index segment and
/// attached to the matching element.
pub fn annotate(value: &mut Json, errors: Vec<GraphQLError>) {
    if errors.is_empty() {
        return;
    }
    match value {
        Json::Object(object) => {
            let mut entries = take_errors(object);
            entries.extend(errors);
            object.insert(
                ERRORS_KEY.to_string(),
                serde_json::to_value(entries).unwrap_or(Json::Null),
            );
        }
        Json::Array(elements) => {
            for error in errors {
                let Some(index) = error.path.first().and_then(PathSegment::as_index) else {
                    tracing::warn!(
                        "dropping delegated error without list index: {}",
                        error.message
                    );
                    continue;
                };
                let Some(element) = elements.get_mut(index) else {
                    continue;
                };
                let stripped = GraphQLError {
                    path: error.path[1..].to_vec(),
                    ..error
                };
                annotate(element, vec![stripped]);
            }
        }
        _ => {
            // Scalar positions cannot carry a channel; their own errors are
            // raised by the parent before the value is reached.
            tracing::debug!("discarding {} error(s) on a scalar value", errors.len());
        }
    }
}

/// Removes and returns the channel entries stored on an object.
pub fn take_errors(object: &mut JsonMap) -> Vec<GraphQLError> {
    object
        .remove(ERRORS_KEY)
        .and_then(|raw| serde_json::from_value(raw).ok())
        .unwrap_or_default()
}

/// Reads the channel entries stored on an object without consuming them.
pub fn peek_errors(object: &JsonMap) -> Vec<GraphQLError> {
    object
        .get(ERRORS_KEY)
        .cloned()
        .and_then(|raw| serde_json::from_value(raw).ok())
        .unwrap_or_default()
}

/// The merged-resolver protocol: given the parent object's channel and the
/// child value just resolved for `field_name`, either raises the field's own
/// error (located at `path`, the field's position in the outer response) or
/// hands back the child with its descendants' errors re-attached.
pub fn assign_child(
    parent: &JsonMap,
    field_name: &str,
    mut child: Json,
    path: &[PathSegment],
) -> Result<Json, GraphQLError> {
    let entries = peek_errors(parent);
    if entries.is_empty() {
        return Ok(child);
    }

    let mut own = Vec::new();
    let mut descendants = Vec::new();
    for entry in entries {
        match entry.path.first() {
            Some(PathSegment::Field(name)) if name == field_name => {
                if entry.path.len() == 1 {
                    own.push(entry);
                } else {
                    descendants.push(GraphQLError {
                        path: entry.path[1..].to_vec(),
                        ..entry
                    });
                }
            }
            _ => {}
        }
    }

    if !own.is_empty() {
        return Err(GraphQLError::from_delegated(own, path.to_vec()));
    }

    annotate(&mut child, descendants);
    Ok(child)
}
