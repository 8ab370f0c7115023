//! The materialized value a record holds.

use crate::{error::Result, Error};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field name to JSON value. Ordered so that serialization is deterministic.
pub type State = BTreeMap<String, Value>;

/// Convert a JSON object into a [`State`].
///
/// Anything other than an object is rejected: a record versions a mapping of
/// fields, not a bare scalar or array.
pub fn state_from_value(value: Value) -> Result<State> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(State::new()),
        other => Err(Error::InvalidLogData(format!(
            "state must be an object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Convert a [`State`] back into a JSON object.
pub fn state_to_value(state: &State) -> Value {
    Value::Object(
        state
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
