//! Maps delegated enum results back to resolver-internal values, for enums
//! whose values were declared with internal representations.

use serde_json::Value as Json;

use crate::error::StitchError;
use crate::graph::EnumType;
use crate::transforms::Transform;

pub struct ConvertEnumResult {
    enum_type: EnumType,
}

impl ConvertEnumResult {
    pub fn new(enum_type: EnumType) -> Self {
        ConvertEnumResult { enum_type }
    }

    fn convert(&self, value: Json) -> Json {
        match value {
            Json::Array(items) => {
                Json::Array(items.into_iter().map(|item| self.convert(item)).collect())
            }
            Json::String(name) => match self.enum_type.values.get(&name) {
                Some(def) => def.value.clone().unwrap_or(Json::String(name)),
                None => Json::String(name),
            },
            other => other,
        }
    }
}

impl Transform for ConvertEnumResult {
    fn transform_result(&self, result: Json) -> Result<Json, StitchError> {
        Ok(self.convert(result))
    }
}
