use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::ThingError;
use crate::ids::{ParamTypeId, PluginId, ThingClassId, VendorId};
use crate::types::{Param, ParamList, ThingClass, Vendor};

/// Interfaces the core itself knows how to check for satisfaction, each
/// paired with the StateType/ActionType/EventType names it requires. Plugin
/// authors may declare others; those are accepted but never auto-satisfied
/// and are dropped at registration time with a warning.
const KNOWN_INTERFACES: &[(&str, &[&str])] = &[
    ("power", &["power"]),
    ("brightness", &["brightness"]),
    ("color", &["color"]),
    ("colortemperature", &["colorTemperature"]),
    ("battery", &["batteryLevel", "batteryCritical"]),
    ("connected", &["connected"]),
    ("temperaturesensor", &["temperature"]),
    ("humiditysensor", &["humidity"]),
    ("closablesensor", &["closed"]),
    ("motiondetector", &["isPresent"]),
];

/// The Type Catalog: the append-mostly registry of Vendors and ThingClasses
/// contributed by plugins at load time (spec §4.1).
///
/// Grounded on the teacher's `DataStore` as the central shared-state registry
/// (`datastore.rs`), but holding typed catalog data instead of live plugin
/// handles.
pub struct TypeCatalog {
    vendors: RwLock<HashMap<VendorId, Vendor>>,
    thing_classes: RwLock<HashMap<ThingClassId, ThingClass>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self {
            vendors: RwLock::new(HashMap::new()),
            thing_classes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_vendor(&self, vendor: Vendor) {
        self.vendors.write().await.insert(vendor.id, vendor);
    }

    /// Registers a plugin's ThingClasses, synthesizing writable-state
    /// action/event pairs and filtering declared interfaces down to the
    /// ones actually satisfied (spec §4.1). A class naming a vendor that was
    /// never registered is dropped with a warning; a class id already
    /// present overwrites the earlier registration, also with a warning,
    /// since both indicate a misbehaving plugin rather than a state the
    /// catalog should silently paper over.
    pub async fn register_thing_classes(&self, plugin_id: PluginId, mut classes: Vec<ThingClass>) {
        let vendors = self.vendors.read().await;
        let mut guard = self.thing_classes.write().await;
        for mut class in classes.drain(..) {
            if !vendors.contains_key(&class.vendor_id) {
                log::warn!("dropping thing class {} ({}): vendor {} is not registered", class.id, class.name, class.vendor_id);
                continue;
            }
            if guard.contains_key(&class.id) {
                log::warn!("thing class {} ({}) registered more than once; overwriting the earlier registration", class.id, class.name);
            }
            class.plugin_id = plugin_id;
            class.synthesize_writable_states();
            class.interfaces = class.satisfied_interfaces(KNOWN_INTERFACES);
            guard.insert(class.id, class);
        }
    }

    pub async fn unregister_plugin(&self, plugin_id: PluginId) {
        self.thing_classes.write().await.retain(|_, c| c.plugin_id != plugin_id);
    }

    pub async fn vendors(&self) -> Vec<Vendor> {
        self.vendors.read().await.values().cloned().collect()
    }

    pub async fn thing_classes(&self) -> Vec<ThingClass> {
        self.thing_classes.read().await.values().cloned().collect()
    }

    pub async fn thing_classes_for_plugin(&self, plugin_id: PluginId) -> Vec<ThingClass> {
        self.thing_classes
            .read()
            .await
            .values()
            .filter(|c| c.plugin_id == plugin_id)
            .cloned()
            .collect()
    }

    pub async fn find_thing_class(&self, id: ThingClassId) -> Result<ThingClass, ThingError> {
        self.thing_classes
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ThingError::ThingClassNotFound)
    }

    /// Validates `params` against `param_types`: every non-defaulted,
    /// non-read-only type must be present, every present param must resolve
    /// to a known type and pass its bounds check, and no unknown
    /// `param_type_id` may appear (spec §4.1 "every Param ... must resolve").
    pub fn validate_params(param_types: &[crate::types::ParamType], params: &ParamList) -> Result<ParamList, ThingError> {
        let mut validated = ParamList::new();

        for pt in param_types {
            match params.value(pt.id) {
                Some(value) => {
                    let normalized = pt.validate(value)?;
                    validated.set(pt.id, normalized);
                }
                None => {
                    if pt.read_only {
                        return Err(ThingError::MissingParameter);
                    }
                    validated.set(pt.id, pt.default_value.clone());
                }
            }
        }

        for p in params.iter() {
            if !param_types.iter().any(|pt| pt.id == p.param_type_id) {
                return Err(ThingError::InvalidParameter);
            }
        }

        Ok(validated)
    }

    pub async fn validate_thing_params(&self, class_id: ThingClassId, params: &ParamList) -> Result<ParamList, ThingError> {
        let class = self.find_thing_class(class_id).await?;
        Self::validate_params(&class.param_types, params)
    }

    pub async fn validate_settings(&self, class_id: ThingClassId, settings: &ParamList) -> Result<ParamList, ThingError> {
        let class = self.find_thing_class(class_id).await?;
        Self::validate_params(&class.settings_types, settings)
    }

    /// Resolves a single writable param against a ThingClass's settings types,
    /// used by `editThing`-style partial updates.
    pub async fn validate_single_setting(
        &self,
        class_id: ThingClassId,
        param_type_id: ParamTypeId,
        value: &crate::value::Value,
    ) -> Result<Param, ThingError> {
        let class = self.find_thing_class(class_id).await?;
        let pt = class
            .settings_types
            .iter()
            .find(|pt| pt.id == param_type_id)
            .ok_or(ThingError::InvalidParameter)?;
        if pt.read_only {
            return Err(ThingError::ParameterNotWritable);
        }
        let value = pt.validate(value)?;
        Ok(Param { param_type_id, value })
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}
