use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ThingError;
use crate::ids::{IOConnectionId, StateTypeId, ThingId};
use crate::types::{IoClass, StateType};
use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IOConnection {
    pub id: IOConnectionId,
    pub input_thing_id: ThingId,
    pub input_state_type_id: StateTypeId,
    pub output_thing_id: ThingId,
    pub output_state_type_id: StateTypeId,
    pub inverted: bool,
}

/// Pipes one Thing's state into another's writable state (spec §4.8).
///
/// Grounded on the teacher's `EventMessage`-driven fan-out loop
/// (`events.rs`) for the "one change ripples to many listeners" shape, here
/// specialized to the digital/analog/opaque classification and value
/// remapping the IO connection spec calls for instead of raw event
/// forwarding.
pub struct IOConnectionEngine {
    connections: RwLock<HashMap<IOConnectionId, IOConnection>>,
    /// Monotonically increasing tick used to break propagation loops: a
    /// connection created by propagating tick N never re-fires within the
    /// same tick (spec §4.8 "must not loop indefinitely").
    tick: AtomicU64,
}

impl IOConnectionEngine {
    pub fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()), tick: AtomicU64::new(0) }
    }

    /// Validates `input` and `output` are IO-compatible (same class, and
    /// for analog both ends have finite bounds) before registering the
    /// connection (spec §4.8 "only created between compatible StateTypes").
    pub fn validate_compatible(input: &StateType, output: &StateType) -> Result<(), ThingError> {
        if !output.writable {
            return Err(ThingError::ParameterNotWritable);
        }
        match (input.io_class(), output.io_class()) {
            (IoClass::Digital, IoClass::Digital) => Ok(()),
            (IoClass::Analog, IoClass::Analog) => Ok(()),
            _ => Err(ThingError::InvalidParameter),
        }
    }

    pub async fn add(&self, connection: IOConnection) {
        self.connections.write().await.insert(connection.id, connection);
    }

    pub async fn remove(&self, id: IOConnectionId) -> Result<IOConnection, ThingError> {
        self.connections.write().await.remove(&id).ok_or(ThingError::ItemNotFound)
    }

    pub async fn all(&self) -> Vec<IOConnection> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn connections_from(&self, thing_id: ThingId, state_type_id: StateTypeId) -> Vec<IOConnection> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.input_thing_id == thing_id && c.input_state_type_id == state_type_id)
            .cloned()
            .collect()
    }

    /// Maps a digital input to its output value (spec §4.8: `inverted XOR
    /// input`).
    pub fn map_digital(connection: &IOConnection, input: bool) -> bool {
        connection.inverted ^ input
    }

    /// Maps an analog input to its output value: normalize `input` into
    /// `[0, 1]` against the input StateType's bounds (clipping out-of-range
    /// values), optionally invert, then scale into the output StateType's
    /// bounds (spec §4.8).
    pub fn map_analog(connection: &IOConnection, input_type: &StateType, output_type: &StateType, input: f64) -> Option<f64> {
        let in_min = input_type.min_value.as_ref()?.as_f64()?;
        let in_max = input_type.max_value.as_ref()?.as_f64()?;
        let out_min = output_type.min_value.as_ref()?.as_f64()?;
        let out_max = output_type.max_value.as_ref()?.as_f64()?;

        if (in_max - in_min).abs() < f64::EPSILON {
            return None;
        }

        let normalized = ((input - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
        let normalized = if connection.inverted { 1.0 - normalized } else { normalized };

        Some(out_min + normalized * (out_max - out_min))
    }

    /// Computes the value to write to `connection`'s output state given the
    /// new `input_value`, using `input_type`/`output_type` for
    /// classification and bounds. Returns `None` when the connection is not
    /// currently propagatable (e.g. a non-finite analog range).
    pub fn propagate_value(
        connection: &IOConnection,
        input_type: &StateType,
        output_type: &StateType,
        input_value: &Value,
    ) -> Option<Value> {
        match input_type.io_class() {
            IoClass::Digital => {
                let b = input_value.as_bool()?;
                Some(Value::Bool(Self::map_digital(connection, b)))
            }
            IoClass::Analog => {
                let f = input_value.as_f64()?;
                let mapped = Self::map_analog(connection, input_type, output_type, f)?;
                Some(output_type.default_value.with_f64(mapped))
            }
            IoClass::Opaque => None,
        }
    }

    pub fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IOConnectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StateTypeId;
    use crate::value::ValueType;

    fn bounded_state(min: f64, max: f64) -> StateType {
        StateType {
            id: StateTypeId::new(),
            name: "s".into(),
            display_name: "S".into(),
            value_type: ValueType::Double,
            default_value: Value::Double(0.0),
            min_value: Some(Value::Double(min)),
            max_value: Some(Value::Double(max)),
            allowed_values: None,
            writable: true,
            cached: true,
            loggable: false,
            filter: None,
        }
    }

    fn connection(inverted: bool) -> IOConnection {
        IOConnection {
            id: IOConnectionId::new(),
            input_thing_id: ThingId::new(),
            input_state_type_id: StateTypeId::new(),
            output_thing_id: ThingId::new(),
            output_state_type_id: StateTypeId::new(),
            inverted,
        }
    }

    #[test]
    fn digital_maps_directly() {
        let c = connection(false);
        assert!(IOConnectionEngine::map_digital(&c, true));
        assert!(!IOConnectionEngine::map_digital(&c, false));
    }

    #[test]
    fn digital_inverted_flips() {
        let c = connection(true);
        assert!(!IOConnectionEngine::map_digital(&c, true));
        assert!(IOConnectionEngine::map_digital(&c, false));
    }

    #[test]
    fn analog_maps_range_to_range() {
        // 0..3.3 volts mapped to -20..50 degrees.
        let input_type = bounded_state(0.0, 3.3);
        let output_type = bounded_state(-20.0, 50.0);
        let c = connection(false);

        let mapped = IOConnectionEngine::map_analog(&c, &input_type, &output_type, 1.65).unwrap();
        assert!((mapped - 15.0).abs() < 1e-9);
    }

    #[test]
    fn analog_clips_out_of_range_input() {
        let input_type = bounded_state(0.0, 3.3);
        let output_type = bounded_state(-20.0, 50.0);
        let c = connection(false);

        let mapped = IOConnectionEngine::map_analog(&c, &input_type, &output_type, 10.0).unwrap();
        assert!((mapped - 50.0).abs() < 1e-9);
    }

    #[test]
    fn analog_inverted_reverses_mapping() {
        let input_type = bounded_state(0.0, 3.3);
        let output_type = bounded_state(-20.0, 50.0);
        let c = connection(true);

        let mapped = IOConnectionEngine::map_analog(&c, &input_type, &output_type, 0.0).unwrap();
        assert!((mapped - 50.0).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_cross_class_connection() {
        let analog = bounded_state(0.0, 1.0);
        let mut digital = bounded_state(0.0, 1.0);
        digital.value_type = ValueType::Bool;
        let err = IOConnectionEngine::validate_compatible(&analog, &digital).unwrap_err();
        assert_eq!(err, ThingError::InvalidParameter);
    }

    #[test]
    fn validate_rejects_read_only_output() {
        let input_type = bounded_state(0.0, 1.0);
        let mut output_type = bounded_state(0.0, 1.0);
        output_type.writable = false;
        let err = IOConnectionEngine::validate_compatible(&input_type, &output_type).unwrap_err();
        assert_eq!(err, ThingError::ParameterNotWritable);
    }
}
