use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ThingError;
use crate::ids::{PluginId, StateTypeId, ThingClassId, ThingId};
use crate::types::ParamList;
use crate::value::Value;

/// spec §3 Thing lifecycle status, `None` while setup is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupStatus {
    None,
    Complete,
    Failed,
    InProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing {
    pub id: ThingId,
    pub thing_class_id: ThingClassId,
    pub plugin_id: PluginId,
    pub name: String,
    pub params: ParamList,
    pub settings: ParamList,
    pub parent_id: Option<ThingId>,
    pub auto_created: bool,
    pub setup_status: SetupStatus,
    #[serde(default)]
    pub states: HashMap<StateTypeId, Value>,
}

impl Thing {
    pub fn state(&self, id: StateTypeId) -> Option<&Value> {
        self.states.get(&id)
    }

    pub fn set_state(&mut self, id: StateTypeId, value: Value) {
        self.states.insert(id, value);
    }
}

/// Keyed in-memory store of configured Things, persisted via
/// [`crate::persistence::ConfigStore`] by the owning [`crate::hub::Hub`].
///
/// Grounded on the teacher's `DataStore` plugin table (`datastore.rs`), here
/// specialized to the Thing data model instead of FFI plugin handles.
pub struct ThingStore {
    things: RwLock<HashMap<ThingId, Thing>>,
}

impl ThingStore {
    pub fn new() -> Self {
        Self {
            things: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, thing: Thing) {
        self.things.write().await.insert(thing.id, thing);
    }

    pub async fn get(&self, id: ThingId) -> Result<Thing, ThingError> {
        self.things.read().await.get(&id).cloned().ok_or(ThingError::ThingNotFound)
    }

    pub async fn remove(&self, id: ThingId) -> Result<Thing, ThingError> {
        self.things.write().await.remove(&id).ok_or(ThingError::ThingNotFound)
    }

    pub async fn all(&self) -> Vec<Thing> {
        self.things.read().await.values().cloned().collect()
    }

    pub async fn children_of(&self, id: ThingId) -> Vec<Thing> {
        self.things
            .read()
            .await
            .values()
            .filter(|t| t.parent_id == Some(id))
            .cloned()
            .collect()
    }

    pub async fn for_plugin(&self, plugin_id: PluginId) -> Vec<Thing> {
        self.things.read().await.values().filter(|t| t.plugin_id == plugin_id).cloned().collect()
    }

    pub async fn update<F>(&self, id: ThingId, f: F) -> Result<Thing, ThingError>
    where
        F: FnOnce(&mut Thing),
    {
        let mut guard = self.things.write().await;
        let thing = guard.get_mut(&id).ok_or(ThingError::ThingNotFound)?;
        f(thing);
        Ok(thing.clone())
    }

    pub async fn contains(&self, id: ThingId) -> bool {
        self.things.read().await.contains_key(&id)
    }
}

impl Default for ThingStore {
    fn default() -> Self {
        Self::new()
    }
}
