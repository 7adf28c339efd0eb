use serde::{Deserialize, Serialize};

/// The value types a ParamType/StateType can carry (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    UInt,
    Double,
    String,
    Color,
    Time,
    Timestamp,
}

/// A concrete value. `Int`/`UInt`/`Double` are kept distinct so bounds/unit
/// validation in the Type Catalog can stay exact instead of coercing through
/// a single numeric representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    /// Stored as `#RRGGBB` / `#RRGGBBAA`.
    Color(String),
    /// Wall-clock time of day, minutes since midnight.
    Time(u32),
    /// Unix epoch milliseconds.
    Timestamp(i64),
}

impl Value {
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int(_) => Some(ValueType::Int),
            Value::UInt(_) => Some(ValueType::UInt),
            Value::Double(_) => Some(ValueType::Double),
            Value::String(_) => Some(ValueType::String),
            Value::Color(_) => Some(ValueType::Color),
            Value::Time(_) => Some(ValueType::Time),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
        }
    }

    /// Best-effort numeric view, used for analog IO propagation and bounds
    /// checks. Returns `None` for non-numeric value types.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Double(d) => Some(*d),
            Value::Time(t) => Some(*t as f64),
            Value::Timestamp(t) => Some(*t as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Re-creates a value of the same variant as `self` from a numeric
    /// result, rounding/truncating per the target's value type. Used by the
    /// IO Connection Engine when writing a mapped analog value out.
    pub fn with_f64(&self, v: f64) -> Value {
        match self {
            Value::Int(_) => Value::Int(v.round() as i64),
            Value::UInt(_) => Value::UInt(v.round().max(0.0) as u64),
            Value::Double(_) => Value::Double(v),
            Value::Time(_) => Value::Time(v.round().max(0.0) as u32),
            Value::Timestamp(_) => Value::Timestamp(v.round() as i64),
            other => other.clone(),
        }
    }
}
