use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::catalog::TypeCatalog;
use crate::error::ThingError;
use crate::events::{EventBus, Notification};
use crate::ids::{ActionTypeId, BrowserItemActionTypeId, PairingTransactionId, PluginId, ThingClassId, ThingId};
use crate::info::{
    BrowseResultInfo, BrowserActionInfo, BrowserItemActionInfo, BrowserItemInfo, ThingActionInfo, ThingDiscoveryInfo,
    ThingPairingInfo, ThingSetupInfo,
};
use crate::pairing::PairingFsm;
use crate::persistence::ConfigStore;
use crate::plugin::{PluginCommand, PluginHandle};
use crate::rule_engine::{RemovePolicy, RemoveRequest, RuleEngineCollaborator};
use crate::thing::{SetupStatus, Thing, ThingStore};
use crate::types::{CreateMethod, ParamList, Vendor};

/// Owns the Thing add/reconfigure/edit/remove workflows (spec §4.2-§4.7),
/// coordinating the Type Catalog, Thing Store, plugin dispatch table,
/// pairing state machine and event bus.
///
/// Grounded on the teacher's `DataStore` as the single coordinator object
/// plugin requests flow through (`datastore.rs`), specialized from raw FFI
/// handle bookkeeping to the thing lifecycle operations this spec defines.
pub struct LifecycleEngine {
    catalog: Arc<TypeCatalog>,
    things: Arc<ThingStore>,
    plugins: RwLock<HashMap<PluginId, PluginHandle>>,
    pairing: Arc<PairingFsm>,
    events: Arc<EventBus>,
    rule_engine: Box<dyn RuleEngineCollaborator>,
    /// Keyed-by-thing-id backing store for the Thing Store (spec §6
    /// "Persisted state layout" item 1). Shared with [`crate::hub::Hub`] so
    /// both the lifecycle mutations here and state-value updates dispatched
    /// through the hub write to the same file.
    things_store: Arc<Mutex<ConfigStore<Thing>>>,
}

/// A plugin's public identity, as surfaced to callers listing loaded
/// plugins (spec §4.9 "GetPlugins").
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub id: PluginId,
    pub name: String,
    pub vendors: Vec<Vendor>,
}

impl LifecycleEngine {
    pub fn new(
        catalog: Arc<TypeCatalog>,
        things: Arc<ThingStore>,
        pairing: Arc<PairingFsm>,
        events: Arc<EventBus>,
        rule_engine: Box<dyn RuleEngineCollaborator>,
        things_store: Arc<Mutex<ConfigStore<Thing>>>,
    ) -> Self {
        Self {
            catalog,
            things,
            plugins: RwLock::new(HashMap::new()),
            pairing,
            events,
            rule_engine,
            things_store,
        }
    }

    /// Writes `thing` into the backing file, keyed by its id (spec §6).
    /// Failures surface as [`ThingError::HardwareFailure`], matching the
    /// convention [`crate::hub::Hub::add_io_connection`] uses for the same
    /// kind of infrastructure failure.
    pub(crate) async fn persist_thing(&self, thing: &Thing) -> Result<(), ThingError> {
        let mut store = self.things_store.lock().await;
        store.set(thing.id.to_string(), thing.clone());
        store.save().await.map_err(|_| ThingError::HardwareFailure)
    }

    async fn persist_remove(&self, id: ThingId) -> Result<(), ThingError> {
        let mut store = self.things_store.lock().await;
        store.remove(&id.to_string());
        store.save().await.map_err(|_| ThingError::HardwareFailure)
    }

    pub async fn register_plugin(&self, handle: PluginHandle) {
        let plugin_id = handle.id;
        for vendor in handle.vendors.clone() {
            self.catalog.register_vendor(vendor).await;
        }
        self.catalog.register_thing_classes(plugin_id, handle.thing_classes.clone()).await;
        self.plugins.write().await.insert(plugin_id, handle);
    }

    pub(crate) async fn dispatch(&self, plugin_id: PluginId, command: PluginCommand) -> Result<(), ThingError> {
        let guard = self.plugins.read().await;
        let handle = guard.get(&plugin_id).ok_or(ThingError::PluginNotFound)?;
        handle.dispatch(command).await
    }

    /// The plugins currently loaded (spec §4.9 "GetPlugins").
    pub async fn plugins(&self) -> Vec<PluginSummary> {
        self.plugins
            .read()
            .await
            .values()
            .map(|h| PluginSummary { id: h.id, name: h.name.clone(), vendors: h.vendors.clone() })
            .collect()
    }

    /// Dispatches `StartMonitoringAutoThings` to every loaded plugin (spec
    /// §4.3 "invoked once after initial thing revival").
    pub async fn start_monitoring_auto_things(&self) {
        let plugin_ids: Vec<PluginId> = self.plugins.read().await.keys().copied().collect();
        for plugin_id in plugin_ids {
            let _ = self.dispatch(plugin_id, PluginCommand::StartMonitoringAutoThings).await;
        }
    }

    /// spec §4.2 Discover: asks a plugin for ThingDescriptors of one class,
    /// marking any descriptor whose params match an existing Thing with its
    /// `thing_id` so callers can offer "reconfigure by discovery".
    pub async fn discover_things(&self, class_id: ThingClassId, params: ParamList, timeout: std::time::Duration) -> Result<Vec<crate::types::ThingDescriptor>, ThingError> {
        let class = self.catalog.find_thing_class(class_id).await?;
        if !class.create_methods.contains(&CreateMethod::Discovery) {
            return Err(ThingError::CreationMethodNotSupported);
        }
        let validated = TypeCatalog::validate_params(&class.discovery_param_types, &params)?;

        let info = ThingDiscoveryInfo::new();
        self.dispatch(class.plugin_id, PluginCommand::Discover { thing_class_id: class_id, params: validated, info: info.clone() }).await?;
        let mut descriptors = info.await_result(timeout).await?;

        let existing = self.things.for_plugin(class.plugin_id).await;
        for descriptor in descriptors.iter_mut() {
            if let Some(existing_thing) = existing.iter().find(|t| t.thing_class_id == descriptor.thing_class_id && Self::params_match(&t.params, &descriptor.params)) {
                descriptor.thing_id = Some(existing_thing.id);
            }
        }
        Ok(descriptors)
    }

    fn params_match(a: &ParamList, b: &ParamList) -> bool {
        a.iter().all(|p| b.value(p.param_type_id) == Some(&p.value)) && a.len() == b.len()
    }

    /// spec §4.3 Add: validates params, inserts the Thing in memory and runs
    /// setup. The thing only becomes visible (persisted, `ThingAdded`
    /// published) once setup actually succeeds; a setup failure drops it
    /// from the in-memory store entirely rather than leaving a `Failed`
    /// ghost behind.
    pub async fn add_thing(&self, class_id: ThingClassId, name: String, params: ParamList, parent_id: Option<ThingId>, timeout: std::time::Duration) -> Result<Thing, ThingError> {
        let class = self.catalog.find_thing_class(class_id).await?;
        if !class.create_methods.contains(&CreateMethod::JustAdd) {
            return Err(ThingError::CreationMethodNotSupported);
        }
        if let Some(parent_id) = parent_id {
            let parent = self.things.get(parent_id).await?;
            let parent_class = self.catalog.find_thing_class(parent.thing_class_id).await?;
            if !parent_class.can_have_children {
                return Err(ThingError::InvalidParameter);
            }
        }

        let validated_params = self.catalog.validate_thing_params(class_id, &params).await?;
        let validated_settings = self.catalog.validate_settings(class_id, &ParamList::new()).await?;

        let thing = Thing {
            id: ThingId::new(),
            thing_class_id: class_id,
            plugin_id: class.plugin_id,
            name,
            params: validated_params,
            settings: validated_settings,
            parent_id,
            auto_created: false,
            setup_status: SetupStatus::InProgress,
            states: HashMap::new(),
        };

        self.insert_and_setup(thing, timeout).await
    }

    /// Inserts `thing` in memory, dispatches `Setup`, and resolves to a
    /// persisted `Complete` thing on success or removes the thing again and
    /// returns the plugin's error on failure. Shared by `add_thing` and
    /// `confirm_pairing`'s tail.
    async fn insert_and_setup(&self, thing: Thing, timeout: std::time::Duration) -> Result<Thing, ThingError> {
        let thing_id = thing.id;
        let plugin_id = thing.plugin_id;
        self.things.insert(thing.clone()).await;

        let info = ThingSetupInfo::new();
        if let Err(e) = self.dispatch(plugin_id, PluginCommand::Setup { thing, info: info.clone() }).await {
            self.things.remove(thing_id).await.ok();
            return Err(e);
        }

        match info.await_result(timeout).await {
            Ok(()) => {
                let completed = self.things.update(thing_id, |t| t.setup_status = SetupStatus::Complete).await?;
                self.commit_new_thing(completed).await
            }
            Err(e) => {
                self.things.remove(thing_id).await.ok();
                Err(e)
            }
        }
    }

    /// Persists a thing whose setup already succeeded, publishes
    /// `ThingAdded`, and fires the plugin's `postSetupThing` notification
    /// (spec §4.3 "Add" tail). Rolls the in-memory insert back out if
    /// persistence itself fails.
    async fn commit_new_thing(&self, thing: Thing) -> Result<Thing, ThingError> {
        self.things.insert(thing.clone()).await;
        if let Err(e) = self.persist_thing(&thing).await {
            self.things.remove(thing.id).await.ok();
            return Err(e);
        }
        self.events.publish(Notification::ThingAdded { thing: thing.clone() });
        let _ = self.dispatch(thing.plugin_id, PluginCommand::PostSetup { thing: thing.clone() }).await;
        Ok(thing)
    }

    /// spec §4.5 "auto-thing appeared": a plugin materializes a thing of a
    /// `CreateMethod::Auto` class on its own initiative, already configured
    /// and requiring no setup round-trip.
    pub async fn add_auto_thing(
        &self,
        plugin_id: PluginId,
        class_id: ThingClassId,
        name: String,
        params: ParamList,
        parent_id: Option<ThingId>,
    ) -> Result<Thing, ThingError> {
        let class = self.catalog.find_thing_class(class_id).await?;
        if class.plugin_id != plugin_id {
            return Err(ThingError::PluginNotFound);
        }
        if !class.create_methods.contains(&CreateMethod::Auto) {
            return Err(ThingError::CreationMethodNotSupported);
        }
        let validated_params = self.catalog.validate_thing_params(class_id, &params).await?;

        let thing = Thing {
            id: ThingId::new(),
            thing_class_id: class_id,
            plugin_id,
            name,
            params: validated_params,
            settings: ParamList::new(),
            parent_id,
            auto_created: true,
            setup_status: SetupStatus::Complete,
            states: HashMap::new(),
        };
        self.commit_new_thing(thing).await
    }

    /// Adds a Thing discovered via `discover_things`, by resolving the
    /// descriptor's own params.
    pub async fn add_thing_from_descriptor(&self, descriptor: crate::types::ThingDescriptor, name: String, parent_id: Option<ThingId>, timeout: std::time::Duration) -> Result<Thing, ThingError> {
        self.add_thing(descriptor.thing_class_id, name, descriptor.params, parent_id, timeout).await
    }

    /// spec §4.2/§4.3 Pair: begins a pairing transaction for a thing class
    /// that requires interactive setup (DisplayPin/EnterPin/PushButton/
    /// UserAndPassword/OAuth).
    pub async fn pair_thing(&self, class_id: ThingClassId, params: ParamList, timeout: std::time::Duration) -> Result<(PairingTransactionId, Option<String>), ThingError> {
        let class = self.catalog.find_thing_class(class_id).await?;
        if class.setup_method == crate::types::SetupMethod::JustAdd {
            return Err(ThingError::SetupMethodNotSupported);
        }
        let validated = self.catalog.validate_thing_params(class_id, &params).await?;

        let transaction_id = self.pairing.begin(class_id, class.plugin_id, validated.clone(), class.pairing_info.clone()).await;
        let info = ThingPairingInfo::new();
        self.dispatch(class.plugin_id, PluginCommand::Pair { transaction_id, thing_class_id: class_id, params: validated, info: info.clone() }).await?;
        self.pairing.mark_awaiting_confirmation(transaction_id).await?;

        // Pair only confirms the plugin accepted the request; the actual
        // thing materializes on `confirm_pairing`.
        let _ = info.await_result(timeout).await;
        Ok((transaction_id, class.pairing_info.clone()))
    }

    /// spec §4.5 Confirm: completes a pairing transaction with the
    /// user-supplied secret (PIN, password, OAuth code), materializing the
    /// paired Thing on success. A transaction already swept to `Expired`
    /// rejects with `AuthenticationFailure` rather than `Aborted`, since the
    /// caller's secret genuinely can no longer be accepted, as opposed to the
    /// transaction simply being in the wrong state to confirm at all.
    pub async fn confirm_pairing(&self, transaction_id: PairingTransactionId, secret: String, name: String, timeout: std::time::Duration) -> Result<Thing, ThingError> {
        let transaction = self.pairing.get(transaction_id).await?;
        match transaction.state {
            crate::pairing::PairingState::AwaitingConfirmation => {}
            crate::pairing::PairingState::Expired => return Err(ThingError::AuthenticationFailure),
            _ => return Err(ThingError::Aborted),
        }

        let info = ThingPairingInfo::new();
        self.dispatch(transaction.plugin_id, PluginCommand::ConfirmPairing { transaction_id, secret, info: info.clone() }).await?;
        let result = info.await_result(timeout).await;

        self.pairing.terminate(transaction_id, result.is_ok()).await?;

        let pairing_result = result?;
        let class = self.catalog.find_thing_class(transaction.thing_class_id).await?;
        let mut thing = pairing_result.thing;
        thing.id = ThingId::new();
        thing.thing_class_id = transaction.thing_class_id;
        thing.plugin_id = class.plugin_id;
        thing.name = name;
        thing.setup_status = SetupStatus::Complete;

        // The plugin's ConfirmPairing response already represents a fully
        // set-up thing, so this proceeds straight to AddThing's tail instead
        // of dispatching another Setup call.
        self.commit_new_thing(thing).await
    }

    /// spec §4.6 Reconfigure: tears the thing's current configuration down,
    /// applies the new params, runs setup, and persists only on success;
    /// a setup failure reverts the thing back to its previous params
    /// instead of leaving it stuck `InProgress`.
    pub async fn reconfigure_thing(&self, thing_id: ThingId, params: ParamList, timeout: std::time::Duration) -> Result<Thing, ThingError> {
        let previous = self.things.get(thing_id).await?;
        let validated = self.catalog.validate_thing_params(previous.thing_class_id, &params).await?;

        let _ = self.dispatch(previous.plugin_id, PluginCommand::ThingRemoved { thing: previous.clone() }).await;

        let updated = self
            .things
            .update(thing_id, |t| {
                t.params = validated;
                t.setup_status = SetupStatus::InProgress;
            })
            .await?;

        let info = ThingSetupInfo::new();
        if let Err(e) = self.dispatch(updated.plugin_id, PluginCommand::Setup { thing: updated.clone(), info: info.clone() }).await {
            self.revert_reconfigure(thing_id, &previous).await;
            return Err(e);
        }

        match info.await_result(timeout).await {
            Ok(()) => {
                let completed = self.things.update(thing_id, |t| t.setup_status = SetupStatus::Complete).await?;
                self.persist_thing(&completed).await?;
                self.events.publish(Notification::ThingChanged { thing: completed.clone() });
                Ok(completed)
            }
            Err(e) => {
                self.revert_reconfigure(thing_id, &previous).await;
                Err(e)
            }
        }
    }

    async fn revert_reconfigure(&self, thing_id: ThingId, previous: &Thing) {
        if let Ok(reverted) = self
            .things
            .update(thing_id, |t| {
                t.params = previous.params.clone();
                t.setup_status = previous.setup_status;
            })
            .await
        {
            self.events.publish(Notification::ThingChanged { thing: reverted });
        }
    }

    /// spec §4.6 Edit: renames a Thing. Unlike `reconfigure_thing`, this
    /// never re-runs plugin setup.
    pub async fn rename_thing(&self, thing_id: ThingId, name: String) -> Result<Thing, ThingError> {
        let updated = self.things.update(thing_id, |t| t.name = name.clone()).await?;
        self.persist_thing(&updated).await?;
        self.events.publish(Notification::ThingChanged { thing: updated.clone() });
        Ok(updated)
    }

    /// Updates a single writable setting without re-running plugin setup,
    /// used for settings distinct from the thing's name (spec §3 Thing
    /// `settings`).
    pub async fn edit_thing_setting(&self, thing_id: ThingId, param_type_id: crate::ids::ParamTypeId, value: crate::value::Value) -> Result<Thing, ThingError> {
        let thing = self.things.get(thing_id).await?;
        let setting = self.catalog.validate_single_setting(thing.thing_class_id, param_type_id, &value).await?;
        let updated = self.things.update(thing_id, |t| t.settings.set(setting.param_type_id, setting.value.clone())).await?;
        self.persist_thing(&updated).await?;
        self.events.publish(Notification::ThingSettingChanged { thing_id, setting });
        Ok(updated)
    }

    /// spec §4.4 ExecuteAction: validates the action's params against its
    /// ActionType and dispatches it to the owning plugin.
    pub async fn execute_action(&self, thing_id: ThingId, action_type_id: ActionTypeId, params: ParamList, timeout: std::time::Duration) -> Result<(), ThingError> {
        let thing = self.things.get(thing_id).await?;
        let class = self.catalog.find_thing_class(thing.thing_class_id).await?;
        let action_type = class.find_action_type(action_type_id).ok_or(ThingError::ActionTypeNotFound)?;
        let validated = TypeCatalog::validate_params(&action_type.param_types, &params)?;

        let info = ThingActionInfo::new();
        self.dispatch(thing.plugin_id, PluginCommand::Action { thing, action_type_id, params: validated, info: info.clone() }).await?;
        info.await_result(timeout).await
    }

    /// spec §4.3 browseThing: lists (or descends into) a Thing's browse
    /// tree.
    pub async fn browse_thing(&self, thing_id: ThingId, item_id: Option<String>, timeout: std::time::Duration) -> Result<Vec<crate::browser::BrowserItem>, ThingError> {
        let thing = self.things.get(thing_id).await?;
        let info = BrowseResultInfo::new();
        self.dispatch(thing.plugin_id, PluginCommand::Browse { thing, item_id, info: info.clone() }).await?;
        info.await_result(timeout).await
    }

    /// spec §4.3 browserItem: resolves a single browse-tree node by id.
    pub async fn browser_item(&self, thing_id: ThingId, item_id: String, timeout: std::time::Duration) -> Result<crate::browser::BrowserItem, ThingError> {
        let thing = self.things.get(thing_id).await?;
        let info = BrowserItemInfo::new();
        self.dispatch(thing.plugin_id, PluginCommand::BrowserItem { thing, item_id, info: info.clone() }).await?;
        info.await_result(timeout).await
    }

    /// spec §4.3 executeBrowserItem: executes a browse-tree node directly.
    pub async fn execute_browser_item(&self, thing_id: ThingId, item_id: String, timeout: std::time::Duration) -> Result<(), ThingError> {
        let thing = self.things.get(thing_id).await?;
        let info = BrowserActionInfo::new();
        self.dispatch(thing.plugin_id, PluginCommand::ExecuteBrowserItem { thing, item_id, info: info.clone() }).await?;
        info.await_result(timeout).await
    }

    /// spec §4.3 executeBrowserItemAction: runs one of a browse-tree node's
    /// declared BrowserItemActionTypes with params.
    pub async fn execute_browser_item_action(
        &self,
        thing_id: ThingId,
        action_type_id: BrowserItemActionTypeId,
        item_id: String,
        params: ParamList,
        timeout: std::time::Duration,
    ) -> Result<(), ThingError> {
        let thing = self.things.get(thing_id).await?;
        let class = self.catalog.find_thing_class(thing.thing_class_id).await?;
        let action_type = class.find_browser_item_action_type(action_type_id).ok_or(ThingError::ActionTypeNotFound)?;
        let validated = TypeCatalog::validate_params(&action_type.param_types, &params)?;

        let info = BrowserItemActionInfo::new();
        self.dispatch(thing.plugin_id, PluginCommand::BrowserItemAction { thing, action_type_id, item_id, params: validated, info: info.clone() }).await?;
        info.await_result(timeout).await
    }

    /// spec §4.7 Remove: consults the rule engine collaborator for the thing
    /// and every child it cascades to, rejecting unless `policy` resolves
    /// every dependent rule it reports, then informs the owning plugin.
    pub async fn remove_thing(&self, thing_id: ThingId, policy: &RemovePolicy) -> Result<(), ThingError> {
        let thing = self.things.get(thing_id).await?;

        if thing.parent_id.is_some() {
            // A child cannot be removed directly; only its parent's removal
            // cascades to it (spec §3 Thing invariant).
            return Err(ThingError::ThingIsChild);
        }

        let children = self.things.children_of(thing_id).await;

        self.check_dependent_rules(RemoveRequest::Thing(thing_id), policy)?;
        for child in &children {
            self.check_dependent_rules(RemoveRequest::CascadedChild(child.id), policy)?;
        }

        self.rule_engine.apply_resolutions(RemoveRequest::Thing(thing_id), policy);
        for child in &children {
            self.rule_engine.apply_resolutions(RemoveRequest::CascadedChild(child.id), policy);
        }

        for child in children {
            self.remove_thing_unchecked(child).await?;
        }

        self.remove_thing_unchecked(thing).await
    }

    fn check_dependent_rules(&self, request: RemoveRequest, policy: &RemovePolicy) -> Result<(), ThingError> {
        let dependents = self.rule_engine.dependent_rules(request);
        if dependents.iter().any(|id| policy.resolution(*id).is_none()) {
            return Err(ThingError::ThingInUse);
        }
        Ok(())
    }

    async fn remove_thing_unchecked(&self, thing: Thing) -> Result<(), ThingError> {
        let removed = self.things.remove(thing.id).await?;
        self.persist_remove(removed.id).await?;
        let _ = self.dispatch(removed.plugin_id, PluginCommand::ThingRemoved { thing: removed.clone() }).await;
        self.events.publish(Notification::ThingRemoved { thing_id: removed.id });
        Ok(())
    }

    pub fn things(&self) -> &Arc<ThingStore> {
        &self.things
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullHistoryLogger;
    use crate::ids::{StateTypeId, VendorId};
    use crate::plugin::{spawn_plugin, IntegrationPlugin, PluginContext};
    use crate::types::{CreateMethod, SetupMethod, StateType, ThingClass, Vendor};
    use crate::value::{Value, ValueType};
    use async_trait::async_trait;

    struct AlwaysSucceedsPlugin;

    #[async_trait]
    impl IntegrationPlugin for AlwaysSucceedsPlugin {
        fn name(&self) -> &str {
            "always-succeeds"
        }
        fn vendors(&self) -> Vec<Vendor> {
            vec![]
        }
        fn thing_classes(&self) -> Vec<ThingClass> {
            vec![]
        }
        async fn init(&self, _ctx: PluginContext) -> Result<(), ThingError> {
            Ok(())
        }
        async fn discover_things(&self, _c: ThingClassId, _p: ParamList, info: ThingDiscoveryInfo) {
            info.finish(Ok(vec![])).await;
        }
        async fn setup_thing(&self, _thing: Thing, info: ThingSetupInfo) {
            info.finish(Ok(())).await;
        }
        async fn execute_action(&self, _t: Thing, _a: ActionTypeId, _p: ParamList, info: ThingActionInfo) {
            info.finish(Ok(())).await;
        }
        async fn pair_thing(&self, _tx: PairingTransactionId, _c: ThingClassId, _p: ParamList, info: ThingPairingInfo) {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
        }
        async fn confirm_pairing(&self, _tx: PairingTransactionId, _s: String, info: ThingPairingInfo) {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
        }
        async fn browse(&self, _t: Thing, _i: Option<String>, info: BrowseResultInfo) {
            info.finish(Ok(vec![])).await;
        }
        async fn execute_browser_item(&self, _t: Thing, _i: String, info: BrowserActionInfo) {
            info.finish(Ok(())).await;
        }
        async fn execute_browser_item_action(&self, _t: Thing, _a: BrowserItemActionTypeId, _i: String, _p: ParamList, info: BrowserItemActionInfo) {
            info.finish(Ok(())).await;
        }
        async fn thing_removed(&self, _thing: Thing) {}
    }

    async fn setup_engine() -> (LifecycleEngine, ThingClassId) {
        let (engine, class_id, _) = setup_engine_with_store_path().await;
        (engine, class_id)
    }

    async fn setup_engine_with_store_path() -> (LifecycleEngine, ThingClassId, std::path::PathBuf) {
        let catalog = Arc::new(TypeCatalog::new());
        let things = Arc::new(ThingStore::new());
        let pairing = Arc::new(PairingFsm::new(std::time::Duration::from_secs(300)));
        let events = Arc::new(EventBus::new(Box::new(NullHistoryLogger)));
        let store_path = std::env::temp_dir().join(format!("hearth-lifecycle-test-{}.json", uuid::Uuid::new_v4()));
        let things_store = Arc::new(Mutex::new(ConfigStore::load(&store_path).await.unwrap()));
        let engine = LifecycleEngine::new(catalog, things, pairing, events, Box::new(crate::rule_engine::CascadeRuleEngine), things_store);

        let vendor_id = VendorId::new();
        engine.catalog().register_vendor(Vendor { id: vendor_id, name: "v".into(), display_name: "V".into() }).await;

        let handle = spawn_plugin(Arc::new(AlwaysSucceedsPlugin));
        let plugin_id = handle.id;

        let class = ThingClass {
            id: ThingClassId::new(),
            vendor_id,
            plugin_id,
            name: "mockDevice".into(),
            display_name: "Mock Device".into(),
            create_methods: vec![CreateMethod::JustAdd],
            setup_method: SetupMethod::JustAdd,
            interfaces: vec![],
            param_types: vec![],
            settings_types: vec![],
            discovery_param_types: vec![],
            pairing_info: None,
            state_types: vec![StateType {
                id: StateTypeId::new(),
                name: "power".into(),
                display_name: "Power".into(),
                value_type: ValueType::Bool,
                default_value: Value::Bool(false),
                min_value: None,
                max_value: None,
                allowed_values: None,
                writable: true,
                cached: true,
                loggable: true,
                filter: None,
            }],
            event_types: vec![],
            action_types: vec![],
            browser_item_action_types: vec![],
            browsable: false,
            can_have_children: true,
        };
        let class_id = class.id;
        engine.catalog().register_thing_classes(plugin_id, vec![class]).await;
        engine.plugins.write().await.insert(plugin_id, handle);

        (engine, class_id, store_path)
    }

    #[tokio::test]
    async fn add_thing_completes_setup() {
        let (engine, class_id) = setup_engine().await;
        let thing = engine
            .add_thing(class_id, "Lamp".into(), ParamList::new(), None, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(thing.setup_status, SetupStatus::Complete);
    }

    #[tokio::test]
    async fn remove_child_directly_is_rejected() {
        let (engine, class_id) = setup_engine().await;
        let parent = engine.add_thing(class_id, "Hub".into(), ParamList::new(), None, std::time::Duration::from_secs(1)).await.unwrap();
        let child = engine.add_thing(class_id, "Bulb".into(), ParamList::new(), Some(parent.id), std::time::Duration::from_secs(1)).await.unwrap();

        let err = engine.remove_thing(child.id, &RemovePolicy::new()).await.unwrap_err();
        assert_eq!(err, ThingError::ThingIsChild);
    }

    #[tokio::test]
    async fn remove_parent_cascades_to_children() {
        let (engine, class_id) = setup_engine().await;
        let parent = engine.add_thing(class_id, "Hub".into(), ParamList::new(), None, std::time::Duration::from_secs(1)).await.unwrap();
        let child = engine.add_thing(class_id, "Bulb".into(), ParamList::new(), Some(parent.id), std::time::Duration::from_secs(1)).await.unwrap();

        engine.remove_thing(parent.id, &RemovePolicy::new()).await.unwrap();
        assert_eq!(engine.things().get(child.id).await.unwrap_err(), ThingError::ThingNotFound);
    }

    #[tokio::test]
    async fn added_thing_survives_a_reload_of_the_backing_store() {
        let (engine, class_id, store_path) = setup_engine_with_store_path().await;
        let thing = engine.add_thing(class_id, "Lamp".into(), ParamList::new(), None, std::time::Duration::from_secs(1)).await.unwrap();

        let reloaded: ConfigStore<Thing> = ConfigStore::load(&store_path).await.unwrap();
        let persisted = reloaded.get(&thing.id.to_string()).expect("thing was persisted");
        assert_eq!(persisted.id, thing.id);
        assert_eq!(persisted.setup_status, SetupStatus::Complete);

        tokio::fs::remove_file(&store_path).await.ok();
    }

    #[tokio::test]
    async fn removed_thing_is_dropped_from_the_backing_store() {
        let (engine, class_id, store_path) = setup_engine_with_store_path().await;
        let thing = engine.add_thing(class_id, "Lamp".into(), ParamList::new(), None, std::time::Duration::from_secs(1)).await.unwrap();

        engine.remove_thing(thing.id, &RemovePolicy::new()).await.unwrap();

        let reloaded: ConfigStore<Thing> = ConfigStore::load(&store_path).await.unwrap();
        assert!(reloaded.get(&thing.id.to_string()).is_none());

        tokio::fs::remove_file(&store_path).await.ok();
    }

    #[tokio::test]
    async fn remove_is_rejected_when_a_dependent_rule_is_unresolved() {
        struct OneRuleDependsOnEverything(crate::ids::RuleId);
        impl RuleEngineCollaborator for OneRuleDependsOnEverything {
            fn dependent_rules(&self, _request: RemoveRequest) -> Vec<crate::ids::RuleId> {
                vec![self.0]
            }
        }

        let catalog = Arc::new(TypeCatalog::new());
        let things = Arc::new(ThingStore::new());
        let pairing = Arc::new(PairingFsm::new(std::time::Duration::from_secs(300)));
        let events = Arc::new(EventBus::new(Box::new(NullHistoryLogger)));
        let store_path = std::env::temp_dir().join(format!("hearth-lifecycle-test-{}.json", uuid::Uuid::new_v4()));
        let things_store = Arc::new(Mutex::new(ConfigStore::load(&store_path).await.unwrap()));
        let rule_id = crate::ids::RuleId::new();
        let engine = LifecycleEngine::new(catalog, things, pairing, events, Box::new(OneRuleDependsOnEverything(rule_id)), things_store);

        let vendor_id = VendorId::new();
        engine.catalog().register_vendor(Vendor { id: vendor_id, name: "v".into(), display_name: "V".into() }).await;
        let handle = spawn_plugin(Arc::new(AlwaysSucceedsPlugin));
        let plugin_id = handle.id;
        let class = ThingClass {
            id: ThingClassId::new(),
            vendor_id,
            plugin_id,
            name: "mockDevice".into(),
            display_name: "Mock Device".into(),
            create_methods: vec![CreateMethod::JustAdd],
            setup_method: SetupMethod::JustAdd,
            interfaces: vec![],
            param_types: vec![],
            settings_types: vec![],
            discovery_param_types: vec![],
            pairing_info: None,
            state_types: vec![],
            event_types: vec![],
            action_types: vec![],
            browser_item_action_types: vec![],
            browsable: false,
            can_have_children: false,
        };
        let class_id = class.id;
        engine.catalog().register_thing_classes(plugin_id, vec![class]).await;
        engine.plugins.write().await.insert(plugin_id, handle);

        let thing = engine.add_thing(class_id, "Lamp".into(), ParamList::new(), None, std::time::Duration::from_secs(1)).await.unwrap();

        let err = engine.remove_thing(thing.id, &RemovePolicy::new()).await.unwrap_err();
        assert_eq!(err, ThingError::ThingInUse);

        let policy = RemovePolicy::new().resolve(rule_id, crate::rule_engine::RuleResolution::Cascade);
        engine.remove_thing(thing.id, &policy).await.unwrap();

        tokio::fs::remove_file(&store_path).await.ok();
    }

    struct AutoChildPlugin {
        vendor_id: VendorId,
        parent_class_id: ThingClassId,
        child_class_id: ThingClassId,
        ctx: std::sync::OnceLock<PluginContext>,
    }

    impl AutoChildPlugin {
        fn new(vendor_id: VendorId, parent_class_id: ThingClassId, child_class_id: ThingClassId) -> Self {
            Self { vendor_id, parent_class_id, child_class_id, ctx: std::sync::OnceLock::new() }
        }

        fn class(&self, id: ThingClassId, create_method: CreateMethod, can_have_children: bool) -> ThingClass {
            ThingClass {
                id,
                vendor_id: self.vendor_id,
                plugin_id: PluginId::nil(),
                name: "autoChildTest".into(),
                display_name: "Auto Child Test".into(),
                create_methods: vec![create_method],
                setup_method: SetupMethod::JustAdd,
                interfaces: vec![],
                param_types: vec![],
                settings_types: vec![],
                discovery_param_types: vec![],
                pairing_info: None,
                state_types: vec![],
                event_types: vec![],
                action_types: vec![],
                browser_item_action_types: vec![],
                browsable: false,
                can_have_children,
            }
        }
    }

    #[async_trait]
    impl IntegrationPlugin for AutoChildPlugin {
        fn name(&self) -> &str {
            "auto-child"
        }
        fn vendors(&self) -> Vec<Vendor> {
            vec![]
        }
        fn thing_classes(&self) -> Vec<ThingClass> {
            vec![
                self.class(self.parent_class_id, CreateMethod::JustAdd, true),
                self.class(self.child_class_id, CreateMethod::Auto, false),
            ]
        }
        async fn init(&self, ctx: PluginContext) -> Result<(), ThingError> {
            let _ = self.ctx.set(ctx);
            Ok(())
        }
        async fn discover_things(&self, _c: ThingClassId, _p: ParamList, info: ThingDiscoveryInfo) {
            info.finish(Ok(vec![])).await;
        }
        async fn setup_thing(&self, thing: Thing, info: ThingSetupInfo) {
            info.finish(Ok(())).await;
            if thing.thing_class_id == self.parent_class_id {
                if let Some(ctx) = self.ctx.get().cloned() {
                    let child_class_id = self.child_class_id;
                    let parent_id = thing.id;
                    tokio::spawn(async move {
                        let _ = ctx.add_auto_thing(child_class_id, "Child".into(), ParamList::new(), Some(parent_id)).await;
                    });
                }
            }
        }
        async fn execute_action(&self, _t: Thing, _a: ActionTypeId, _p: ParamList, info: ThingActionInfo) {
            info.finish(Ok(())).await;
        }
        async fn pair_thing(&self, _tx: PairingTransactionId, _c: ThingClassId, _p: ParamList, info: ThingPairingInfo) {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
        }
        async fn confirm_pairing(&self, _tx: PairingTransactionId, _s: String, info: ThingPairingInfo) {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
        }
        async fn browse(&self, _t: Thing, _i: Option<String>, info: BrowseResultInfo) {
            info.finish(Ok(vec![])).await;
        }
        async fn execute_browser_item(&self, _t: Thing, _i: String, info: BrowserActionInfo) {
            info.finish(Ok(())).await;
        }
        async fn execute_browser_item_action(&self, _t: Thing, _a: BrowserItemActionTypeId, _i: String, _p: ParamList, info: BrowserItemActionInfo) {
            info.finish(Ok(())).await;
        }
        async fn thing_removed(&self, _thing: Thing) {}
    }

    #[tokio::test]
    async fn setting_up_a_parent_spawns_its_auto_child() {
        let catalog = Arc::new(TypeCatalog::new());
        let things = Arc::new(ThingStore::new());
        let pairing = Arc::new(PairingFsm::new(std::time::Duration::from_secs(300)));
        let events = Arc::new(EventBus::new(Box::new(NullHistoryLogger)));
        let store_path = std::env::temp_dir().join(format!("hearth-lifecycle-test-{}.json", uuid::Uuid::new_v4()));
        let things_store = Arc::new(Mutex::new(ConfigStore::load(&store_path).await.unwrap()));
        let engine = Arc::new(LifecycleEngine::new(
            catalog,
            things,
            pairing,
            events.clone(),
            Box::new(crate::rule_engine::CascadeRuleEngine),
            things_store,
        ));

        let vendor_id = VendorId::new();
        engine.catalog().register_vendor(Vendor { id: vendor_id, name: "v".into(), display_name: "V".into() }).await;

        let parent_class_id = ThingClassId::new();
        let child_class_id = ThingClassId::new();
        let plugin = Arc::new(AutoChildPlugin::new(vendor_id, parent_class_id, child_class_id));
        let handle = spawn_plugin(plugin.clone());
        let plugin_id = handle.id;

        let ctx = PluginContext { plugin_id, events, lifecycle: Arc::downgrade(&engine), hub: std::sync::Weak::new() };
        plugin.init(ctx).await.unwrap();
        engine.register_plugin(handle).await;

        let parent = engine.add_thing(parent_class_id, "Hub".into(), ParamList::new(), None, std::time::Duration::from_secs(1)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let children = engine.things().children_of(parent.id).await;
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].thing_class_id, child_class_id);

        tokio::fs::remove_file(&store_path).await.ok();
    }
}
