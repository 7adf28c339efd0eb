//! Small builder helpers for the catalog tables a plugin declares at load
//! time. Plain constructor functions rather than a fluent builder type,
//! matching how the teacher's `Property`/`Message` constructors (`api_types.rs`)
//! stay close to plain data rather than wrapping everything in a builder.

use hearth_core::ids::{ActionTypeId, EventTypeId, ParamTypeId, StateTypeId};
use hearth_core::types::{ActionType, EventType, ParamType, StateType};
use hearth_core::value::{Value, ValueType};

pub fn bool_param(id: ParamTypeId, name: &str, display_name: &str, default: bool) -> ParamType {
    ParamType {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
        value_type: ValueType::Bool,
        default_value: Value::Bool(default),
        min_value: None,
        max_value: None,
        allowed_values: None,
        unit: None,
        read_only: false,
    }
}

pub fn int_param(id: ParamTypeId, name: &str, display_name: &str, default: i64, min: i64, max: i64) -> ParamType {
    ParamType {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
        value_type: ValueType::Int,
        default_value: Value::Int(default),
        min_value: Some(Value::Int(min)),
        max_value: Some(Value::Int(max)),
        allowed_values: None,
        unit: None,
        read_only: false,
    }
}

pub fn string_param(id: ParamTypeId, name: &str, display_name: &str, default: &str) -> ParamType {
    ParamType {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
        value_type: ValueType::String,
        default_value: Value::String(default.to_string()),
        min_value: None,
        max_value: None,
        allowed_values: None,
        unit: None,
        read_only: false,
    }
}

pub fn bool_state(id: StateTypeId, name: &str, display_name: &str, default: bool, writable: bool) -> StateType {
    StateType {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
        value_type: ValueType::Bool,
        default_value: Value::Bool(default),
        min_value: None,
        max_value: None,
        allowed_values: None,
        writable,
        cached: true,
        loggable: true,
        filter: None,
    }
}

pub fn double_state(id: StateTypeId, name: &str, display_name: &str, default: f64, min: f64, max: f64, writable: bool) -> StateType {
    StateType {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
        value_type: ValueType::Double,
        default_value: Value::Double(default),
        min_value: Some(Value::Double(min)),
        max_value: Some(Value::Double(max)),
        allowed_values: None,
        writable,
        cached: true,
        loggable: true,
        filter: None,
    }
}

pub fn event(id: EventTypeId, name: &str, display_name: &str, param_types: Vec<ParamType>) -> EventType {
    EventType { id, name: name.to_string(), display_name: display_name.to_string(), param_types }
}

pub fn action(id: ActionTypeId, name: &str, display_name: &str, param_types: Vec<ParamType>) -> ActionType {
    ActionType { id, name: name.to_string(), display_name: display_name.to_string(), param_types, browsable: false }
}
