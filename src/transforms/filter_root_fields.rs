//! Removes root fields the wrapped schema should not expose. Healing after
//! the visit prunes any types that became unreachable with them.

use std::sync::Arc;

use crate::error::StitchError;
use crate::graph::{FieldDef, SchemaGraph, TypeNode};
use crate::transforms::Transform;
use crate::visit::{visit_schema, SchemaVisitor, Specifier, VisitAction};
use crate::OperationKind;

type RootFieldFilter = Arc<dyn Fn(OperationKind, &str, &FieldDef) -> bool + Send + Sync>;

pub struct FilterRootFields {
    filter: RootFieldFilter,
}

impl FilterRootFields {
    /// Keeps the root fields for which the filter returns true.
    pub fn new(
        filter: impl Fn(OperationKind, &str, &FieldDef) -> bool + Send + Sync + 'static,
    ) -> Self {
        FilterRootFields {
            filter: Arc::new(filter),
        }
    }
}

impl Transform for FilterRootFields {
    fn transform_schema(&self, schema: SchemaGraph) -> Result<SchemaGraph, StitchError> {
        let filter = self.filter.clone();
        let mut visitor =
            SchemaVisitor::new().on_type(Specifier::RootObject, move |node, schema| {
                let operation = if schema.query_type.as_deref() == Some(node.name()) {
                    OperationKind::Query
                } else if schema.mutation_type.as_deref() == Some(node.name()) {
                    OperationKind::Mutation
                } else {
                    OperationKind::Subscription
                };
                let TypeNode::Object(object) = node else {
                    return VisitAction::Keep;
                };
                let mut filtered = object.clone();
                filtered
                    .fields
                    .retain(|name, field| filter(operation, name, field));
                if filtered.fields.len() == object.fields.len() {
                    VisitAction::Keep
                } else {
                    VisitAction::Replace(TypeNode::Object(filtered))
                }
            })?;
        visit_schema(&schema, &mut visitor)
    }
}
