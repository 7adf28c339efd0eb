use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{BrowserItemActionTypeId, ThingId};

/// A single node in a Thing's browse tree (spec §3 BrowserItem).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserItem {
    pub thing_id: ThingId,
    pub id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub thumbnail: Option<String>,
    pub browsable: bool,
    pub executable: bool,
    pub disabled: bool,
    pub action_type_ids: Vec<BrowserItemActionTypeId>,
    /// Tag-based properties plugins attach to an item (e.g. `mediaIcon`),
    /// kept free-form rather than a fixed struct since the set of tags a
    /// plugin may want is open-ended.
    #[serde(default)]
    pub extended_properties: HashMap<String, String>,
}

impl BrowserItem {
    pub fn supports_action(&self, id: BrowserItemActionTypeId) -> bool {
        self.action_type_ids.contains(&id)
    }
}
