use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ThingError;
use crate::ids::{
    ActionTypeId, BrowserItemActionTypeId, EventTypeId, ParamTypeId, PluginId, StateTypeId,
    ThingClassId, ThingDescriptorId, ThingId, VendorId,
};
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub display_name: String,
}

/// Validates a candidate value against its declared bounds (spec §3 ParamType).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamType {
    pub id: ParamTypeId,
    pub name: String,
    pub display_name: String,
    pub value_type: ValueType,
    pub default_value: Value,
    pub min_value: Option<Value>,
    pub max_value: Option<Value>,
    pub allowed_values: Option<Vec<Value>>,
    pub unit: Option<String>,
    pub read_only: bool,
}

impl ParamType {
    /// Coerces/validates a candidate value. Returns the (possibly identical)
    /// normalized value, or `InvalidParameter` if it fails bounds/allowed-value
    /// checks, or value-type mismatch.
    pub fn validate(&self, candidate: &Value) -> Result<Value, ThingError> {
        if candidate.value_type() != Some(self.value_type) {
            return Err(ThingError::InvalidParameter);
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(candidate) {
                return Err(ThingError::InvalidParameter);
            }
        }

        if let (Some(min), Some(actual)) = (self.min_value.as_ref().and_then(Value::as_f64), candidate.as_f64()) {
            if actual < min {
                return Err(ThingError::InvalidParameter);
            }
        }
        if let (Some(max), Some(actual)) = (self.max_value.as_ref().and_then(Value::as_f64), candidate.as_f64()) {
            if actual > max {
                return Err(ThingError::InvalidParameter);
            }
        }

        Ok(candidate.clone())
    }
}

/// spec §3 StateType. A writable StateType implies a same-id ActionType and
/// a same-id change EventType (enforced by `ThingClass::synthesize`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateType {
    pub id: StateTypeId,
    pub name: String,
    pub display_name: String,
    pub value_type: ValueType,
    pub default_value: Value,
    pub min_value: Option<Value>,
    pub max_value: Option<Value>,
    pub allowed_values: Option<Vec<Value>>,
    pub writable: bool,
    pub cached: bool,
    pub loggable: bool,
    pub filter: Option<String>,
}

impl StateType {
    pub fn as_param_type(&self) -> ParamType {
        ParamType {
            id: ParamTypeId(self.id.0),
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            value_type: self.value_type,
            default_value: self.default_value.clone(),
            min_value: self.min_value.clone(),
            max_value: self.max_value.clone(),
            allowed_values: self.allowed_values.clone(),
            unit: None,
            read_only: !self.writable,
        }
    }

    /// spec §4.8: digital if bool, analog if numeric with finite bounds on
    /// both ends, opaque (never connectable) otherwise.
    pub fn io_class(&self) -> IoClass {
        match self.value_type {
            ValueType::Bool => IoClass::Digital,
            ValueType::Int | ValueType::UInt | ValueType::Double | ValueType::Time | ValueType::Timestamp => {
                if self.min_value.is_some() && self.max_value.is_some() {
                    IoClass::Analog
                } else {
                    IoClass::Opaque
                }
            }
            ValueType::String | ValueType::Color => IoClass::Opaque,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClass {
    Digital,
    Analog,
    Opaque,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    pub id: EventTypeId,
    pub name: String,
    pub display_name: String,
    pub param_types: Vec<ParamType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionType {
    pub id: ActionTypeId,
    pub name: String,
    pub display_name: String,
    pub param_types: Vec<ParamType>,
    pub browsable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserItemActionType {
    pub id: BrowserItemActionTypeId,
    pub name: String,
    pub display_name: String,
    pub param_types: Vec<ParamType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateMethod {
    JustAdd,
    Discovery,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupMethod {
    JustAdd,
    DisplayPin,
    EnterPin,
    PushButton,
    UserAndPassword,
    OAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingClass {
    pub id: ThingClassId,
    pub vendor_id: VendorId,
    pub plugin_id: PluginId,
    pub name: String,
    pub display_name: String,
    pub create_methods: Vec<CreateMethod>,
    pub setup_method: SetupMethod,
    /// Interfaces the plugin author *declares*; filtered down at
    /// registration time to those actually satisfied (spec §4.1).
    pub interfaces: Vec<String>,
    pub param_types: Vec<ParamType>,
    pub settings_types: Vec<ParamType>,
    pub discovery_param_types: Vec<ParamType>,
    pub pairing_info: Option<String>,
    pub state_types: Vec<StateType>,
    pub event_types: Vec<EventType>,
    pub action_types: Vec<ActionType>,
    pub browser_item_action_types: Vec<BrowserItemActionType>,
    pub browsable: bool,
    /// Whether things of this class may parent other things (spec §3 Thing
    /// invariant on `parentId`).
    pub can_have_children: bool,
}

impl ThingClass {
    /// Expands synthetic ActionTypes/EventTypes for every writable StateType,
    /// mutating the class in place. Idempotent: re-running does not duplicate
    /// an already-synthesized entry with the same id.
    pub fn synthesize_writable_states(&mut self) {
        for state in self.state_types.clone() {
            if !state.writable {
                continue;
            }

            let action_id = ActionTypeId(state.id.0);
            if !self.action_types.iter().any(|a| a.id == action_id) {
                self.action_types.push(ActionType {
                    id: action_id,
                    name: state.name.clone(),
                    display_name: state.display_name.clone(),
                    param_types: vec![state.as_param_type()],
                    browsable: false,
                });
            }

            let event_id = EventTypeId(state.id.0);
            if !self.event_types.iter().any(|e| e.id == event_id) {
                self.event_types.push(EventType {
                    id: event_id,
                    name: state.name.clone(),
                    display_name: state.display_name.clone(),
                    param_types: vec![state.as_param_type()],
                });
            }
        }
    }

    pub fn find_state_type(&self, id: StateTypeId) -> Option<&StateType> {
        self.state_types.iter().find(|s| s.id == id)
    }

    pub fn find_action_type(&self, id: ActionTypeId) -> Option<&ActionType> {
        self.action_types.iter().find(|a| a.id == id)
    }

    pub fn find_event_type(&self, id: EventTypeId) -> Option<&EventType> {
        self.event_types.iter().find(|e| e.id == id)
    }

    pub fn find_browser_item_action_type(&self, id: BrowserItemActionTypeId) -> Option<&BrowserItemActionType> {
        self.browser_item_action_types.iter().find(|a| a.id == id)
    }

    /// spec §4.1 `satisfiesInterfaces`: an interface is satisfied only if
    /// every state/event/action it implies is present. Interface definitions
    /// live outside the catalog (plugin-declared strings); here we only
    /// filter against a well-known set the core recognizes, dropping unknown
    /// ones with a warning at the call site.
    pub fn satisfied_interfaces(&self, known: &[(&str, &[&str])]) -> Vec<String> {
        let names: HashSet<&str> = self
            .state_types
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.action_types.iter().map(|a| a.name.as_str()))
            .chain(self.event_types.iter().map(|e| e.name.as_str()))
            .collect();

        self.interfaces
            .iter()
            .filter(|iface| {
                known
                    .iter()
                    .find(|(n, _)| n == iface)
                    .map(|(_, required)| required.iter().all(|r| names.contains(r)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub param_type_id: ParamTypeId,
    pub value: Value,
}

/// Ordered sequence of [`Param`] with unique `param_type_id`s (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamList(Vec<Param>);

impl ParamList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_params(params: Vec<Param>) -> Self {
        Self(params)
    }

    pub fn has(&self, id: ParamTypeId) -> bool {
        self.0.iter().any(|p| p.param_type_id == id)
    }

    pub fn value(&self, id: ParamTypeId) -> Option<&Value> {
        self.0.iter().find(|p| p.param_type_id == id).map(|p| &p.value)
    }

    pub fn set(&mut self, id: ParamTypeId, value: Value) {
        if let Some(p) = self.0.iter_mut().find(|p| p.param_type_id == id) {
            p.value = value;
        } else {
            self.0.push(Param { param_type_id: id, value });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Param> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingDescriptor {
    pub id: ThingDescriptorId,
    pub thing_class_id: ThingClassId,
    pub title: String,
    pub description: String,
    /// Set when this descriptor corresponds to an already-configured thing,
    /// enabling "reconfigure by discovery" (spec §3).
    pub thing_id: Option<ThingId>,
    pub params: ParamList,
}
