use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kanal::{AsyncReceiver, AsyncSender};

use crate::browser::BrowserItem;
use crate::error::ThingError;
use crate::ids::{ActionTypeId, BrowserItemActionTypeId, PairingTransactionId, PluginId, ThingClassId, ThingId};
use crate::info::{
    BrowseResultInfo, BrowserActionInfo, BrowserItemActionInfo, BrowserItemInfo, ThingActionInfo, ThingDiscoveryInfo,
    ThingPairingInfo, ThingSetupInfo,
};
use crate::thing::Thing;
use crate::types::{ParamList, ThingClass, Vendor};

/// Everything an integration plugin needs to call back into the hub:
/// reporting auto-discovered things, state changes, and fired events.
/// Handed to the plugin once at `init()` time.
///
/// Grounded on the callback surface the teacher's `api_func.rs`/`api.rs`
/// exposed to FFI plugin authors (log/create_property/set_property), now
/// expressed as plain async methods on a safe handle instead of raw
/// extern "C" calls across a dlopen2 boundary.
#[derive(Clone)]
pub struct PluginContext {
    pub(crate) plugin_id: PluginId,
    pub(crate) events: Arc<crate::events::EventBus>,
    /// Weak so a plugin holding its own `PluginContext` never keeps the
    /// hub's `LifecycleEngine` alive past shutdown.
    pub(crate) lifecycle: std::sync::Weak<crate::lifecycle::LifecycleEngine>,
    /// Weak back-reference to the owning `Hub`, used to route state changes
    /// through Thing Store update, persistence and IO propagation instead of
    /// only the event bus. `Weak::new()` (never upgradeable) in tests that
    /// exercise a bare `LifecycleEngine` with no `Hub` around it.
    pub(crate) hub: std::sync::Weak<crate::hub::Hub>,
}

impl PluginContext {
    pub fn plugin_id(&self) -> PluginId {
        self.plugin_id
    }

    /// Reports a new state value for one of the plugin's things (spec §4.7:
    /// "whenever a Thing's state value changes ... the bus emits
    /// `StateChanged`"). Routes through `Hub::on_state_changed` so the Thing
    /// Store, persistence and IO connection propagation (spec §4.8) observe
    /// the change too, not just the event bus.
    pub async fn notify_state_changed(&self, thing_id: ThingId, state_type_id: crate::ids::StateTypeId, value: crate::value::Value) -> Result<(), ThingError> {
        let hub = self.hub.upgrade().ok_or(ThingError::PluginNotFound)?;
        hub.on_state_changed(thing_id, state_type_id, value).await
    }

    pub fn notify_event_triggered(&self, thing_id: ThingId, event_type_id: crate::ids::EventTypeId, params: Vec<crate::types::Param>) {
        self.events.publish(crate::events::Notification::EventTriggered { thing_id, event_type_id, params });
    }

    /// Lets a plugin materialize a `CreateMethod::Auto` thing on its own
    /// initiative (spec §4.5 "auto-thing appeared"), such as a child device
    /// that comes into existence alongside its parent.
    pub async fn add_auto_thing(
        &self,
        class_id: ThingClassId,
        name: String,
        params: crate::types::ParamList,
        parent_id: Option<ThingId>,
    ) -> Result<Thing, ThingError> {
        let lifecycle = self.lifecycle.upgrade().ok_or(ThingError::PluginNotFound)?;
        lifecycle.add_auto_thing(self.plugin_id, class_id, name, params, parent_id).await
    }
}

/// The async contract every integration plugin implements (spec §4, §5).
///
/// Every method that models an Info-object operation takes the matching
/// `Info<O>` handle and must eventually call `info.finish(..)` exactly once;
/// the hub applies its own timeout race around the same handle
/// (`Info::await_result`) so a plugin is free to return from these methods
/// immediately after spawning its own async work.
#[async_trait]
pub trait IntegrationPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn vendors(&self) -> Vec<Vendor>;
    fn thing_classes(&self) -> Vec<ThingClass>;

    async fn init(&self, ctx: PluginContext) -> Result<(), ThingError>;

    /// Invoked once, after the hub has revived every persisted thing at
    /// startup (spec §4.1 "invoked once after initial thing revival"), so a
    /// plugin can begin watching for auto-things that may appear without a
    /// caller having asked for them.
    async fn start_monitoring_auto_things(&self) {}

    async fn discover_things(&self, thing_class_id: ThingClassId, params: ParamList, info: ThingDiscoveryInfo);

    async fn setup_thing(&self, thing: Thing, info: ThingSetupInfo);

    /// Fire-and-forget notification sent once `AddThing`/`ConfirmPairing`
    /// setup has actually succeeded and the thing has been persisted (spec
    /// §4.3 "postSetupThing"). Unlike every other method here there is no
    /// matching `Info` handle: the hub has already committed the thing by
    /// the time this is dispatched and does not wait on a response.
    async fn post_setup_thing(&self, _thing: Thing) {}

    async fn execute_action(&self, thing: Thing, action_type_id: ActionTypeId, params: ParamList, info: ThingActionInfo);

    async fn pair_thing(
        &self,
        transaction_id: PairingTransactionId,
        thing_class_id: ThingClassId,
        params: ParamList,
        info: ThingPairingInfo,
    );

    async fn confirm_pairing(&self, transaction_id: PairingTransactionId, secret: String, info: ThingPairingInfo);

    async fn browse(&self, thing: Thing, item_id: Option<String>, info: BrowseResultInfo);

    /// Resolves a single browse-tree node by id (spec §4.3 "browserItem"),
    /// distinct from `browse`'s whole-listing query.
    async fn browser_item(&self, thing: Thing, item_id: String, info: BrowserItemInfo) {
        info.finish(Err(ThingError::ItemNotFound)).await;
        let _ = thing;
    }

    async fn execute_browser_item(&self, thing: Thing, item_id: String, info: BrowserActionInfo);

    async fn execute_browser_item_action(
        &self,
        thing: Thing,
        action_type_id: BrowserItemActionTypeId,
        item_id: String,
        params: ParamList,
        info: BrowserItemActionInfo,
    );

    /// Informs the plugin a thing of its class was removed, so it can tear
    /// down any hardware connection it was holding.
    async fn thing_removed(&self, thing: Thing);

    /// Relays a saved or newly-set plugin configuration (spec §4.3
    /// "pluginConfigurationChanged"), both at load time (a configuration was
    /// persisted from a previous run) and whenever it is changed live.
    async fn plugin_configuration_changed(&self, _configuration: ParamList) {}
}

/// A request queued onto a plugin's single logical thread (spec §5). Each
/// variant carries the `Info` handle the dispatcher will resolve.
///
/// Grounded on the teacher's `LoaderMessage` enum (`pluginloader.rs`) as a
/// command-queue-per-plugin message type, generalized to the Info-object
/// operations this spec defines instead of property get/set/create.
pub enum PluginCommand {
    StartMonitoringAutoThings,
    Discover { thing_class_id: ThingClassId, params: ParamList, info: ThingDiscoveryInfo },
    Setup { thing: Thing, info: ThingSetupInfo },
    PostSetup { thing: Thing },
    Action { thing: Thing, action_type_id: ActionTypeId, params: ParamList, info: ThingActionInfo },
    Pair { transaction_id: PairingTransactionId, thing_class_id: ThingClassId, params: ParamList, info: ThingPairingInfo },
    ConfirmPairing { transaction_id: PairingTransactionId, secret: String, info: ThingPairingInfo },
    Browse { thing: Thing, item_id: Option<String>, info: BrowseResultInfo },
    BrowserItem { thing: Thing, item_id: String, info: BrowserItemInfo },
    ExecuteBrowserItem { thing: Thing, item_id: String, info: BrowserActionInfo },
    BrowserItemAction {
        thing: Thing,
        action_type_id: BrowserItemActionTypeId,
        item_id: String,
        params: ParamList,
        info: BrowserItemActionInfo,
    },
    ThingRemoved { thing: Thing },
    ConfigurationChanged { configuration: ParamList },
    Shutdown,
}

/// One running plugin's handle: its queue sender and cached catalog
/// contributions, so the hub never has to call back into the plugin object
/// itself off its own logical thread.
pub struct PluginHandle {
    pub id: PluginId,
    pub name: String,
    pub vendors: Vec<Vendor>,
    pub thing_classes: Vec<ThingClass>,
    sender: AsyncSender<PluginCommand>,
}

impl PluginHandle {
    pub async fn dispatch(&self, command: PluginCommand) -> Result<(), ThingError> {
        self.sender.send(command).await.map_err(|_| ThingError::PluginNotFound)
    }
}

/// Drives one plugin's command queue to completion, serializing every call
/// into the plugin through a single consumer task (spec §5 "single logical
/// thread per plugin"). Spawned once per plugin by the hub at load time.
pub async fn run_plugin_task(plugin: Arc<dyn IntegrationPlugin>, receiver: AsyncReceiver<PluginCommand>) {
    while let Ok(command) = receiver.recv().await {
        match command {
            PluginCommand::StartMonitoringAutoThings => {
                plugin.start_monitoring_auto_things().await;
            }
            PluginCommand::Discover { thing_class_id, params, info } => {
                plugin.discover_things(thing_class_id, params, info).await;
            }
            PluginCommand::Setup { thing, info } => {
                plugin.setup_thing(thing, info).await;
            }
            PluginCommand::PostSetup { thing } => {
                plugin.post_setup_thing(thing).await;
            }
            PluginCommand::Action { thing, action_type_id, params, info } => {
                plugin.execute_action(thing, action_type_id, params, info).await;
            }
            PluginCommand::Pair { transaction_id, thing_class_id, params, info } => {
                plugin.pair_thing(transaction_id, thing_class_id, params, info).await;
            }
            PluginCommand::ConfirmPairing { transaction_id, secret, info } => {
                plugin.confirm_pairing(transaction_id, secret, info).await;
            }
            PluginCommand::Browse { thing, item_id, info } => {
                plugin.browse(thing, item_id, info).await;
            }
            PluginCommand::BrowserItem { thing, item_id, info } => {
                plugin.browser_item(thing, item_id, info).await;
            }
            PluginCommand::ExecuteBrowserItem { thing, item_id, info } => {
                plugin.execute_browser_item(thing, item_id, info).await;
            }
            PluginCommand::BrowserItemAction { thing, action_type_id, item_id, params, info } => {
                plugin.execute_browser_item_action(thing, action_type_id, item_id, params, info).await;
            }
            PluginCommand::ThingRemoved { thing } => {
                plugin.thing_removed(thing).await;
            }
            PluginCommand::ConfigurationChanged { configuration } => {
                plugin.plugin_configuration_changed(configuration).await;
            }
            PluginCommand::Shutdown => break,
        }
    }
    log::debug!("plugin task shut down");
}

/// Spawns a plugin's command-processing task and returns the handle the hub
/// registers in its plugin table.
pub fn spawn_plugin(plugin: Arc<dyn IntegrationPlugin>) -> PluginHandle {
    let id = PluginId::new();
    let name = plugin.name().to_string();
    let vendors = plugin.vendors();
    let thing_classes = plugin.thing_classes();
    let (sender, receiver) = kanal::unbounded_async();
    tokio::spawn(run_plugin_task(plugin, receiver));
    PluginHandle { id, name, vendors, thing_classes, sender }
}

/// Where to look for dynamically-loaded plugin libraries (spec: ambient
/// "plugin discovery" concern, not part of the Integration Core's own
/// data model). Statically-linked plugins such as the built-in mock never
/// need this.
#[derive(Debug, Clone)]
pub struct PluginSearchPath {
    pub locations: Vec<PathBuf>,
}

/// Loads a dynamically-linked plugin library built against
/// `hearth_plugin_api`'s dlopen2 wrapper contract.
///
/// This is a secondary, optional loading path: the spec explicitly leaves
/// the plugin ABI unprescribed, so the core does not require plugins to be
/// dynamic libraries. It is provided because the teacher's entire plugin
/// model is dlopen2-based (`pluginloader.rs`) and some deployments still
/// want to ship plugins as standalone `.so`/`.dll` files alongside
/// statically-linked ones like the mock plugin.
#[cfg(feature = "dynamic-plugins")]
pub mod dynamic {
    use dlopen2::wrapper::{Container, WrapperApi};

    #[derive(WrapperApi)]
    pub struct PluginEntryApi {
        hearth_plugin_entry: unsafe extern "C" fn() -> *mut std::ffi::c_void,
    }

    pub fn load(path: &std::path::Path) -> Result<Container<PluginEntryApi>, dlopen2::Error> {
        unsafe { Container::load(path) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingPlugin {
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl IntegrationPlugin for RecordingPlugin {
        fn name(&self) -> &str {
            "recording"
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

        async fn discover_things(&self, _thing_class_id: ThingClassId, _params: ParamList, info: ThingDiscoveryInfo) {
            self.calls.lock().unwrap().push("discover");
            info.finish(Ok(vec![])).await;
        }

        async fn setup_thing(&self, _thing: Thing, info: ThingSetupInfo) {
            self.calls.lock().unwrap().push("setup");
            info.finish(Ok(())).await;
        }

        async fn post_setup_thing(&self, _thing: Thing) {
            self.calls.lock().unwrap().push("post_setup");
        }

        async fn execute_action(&self, _thing: Thing, _action_type_id: ActionTypeId, _params: ParamList, info: ThingActionInfo) {
            info.finish(Ok(())).await;
        }

        async fn pair_thing(
            &self,
            _transaction_id: PairingTransactionId,
            _thing_class_id: ThingClassId,
            _params: ParamList,
            info: ThingPairingInfo,
        ) {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
        }

        async fn confirm_pairing(&self, _transaction_id: PairingTransactionId, _secret: String, info: ThingPairingInfo) {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
        }

        async fn browse(&self, _thing: Thing, _item_id: Option<String>, info: BrowseResultInfo) {
            info.finish(Ok(vec![])).await;
        }

        async fn execute_browser_item(&self, _thing: Thing, _item_id: String, info: BrowserActionInfo) {
            info.finish(Ok(())).await;
        }

        async fn execute_browser_item_action(
            &self,
            _thing: Thing,
            _action_type_id: BrowserItemActionTypeId,
            _item_id: String,
            _params: ParamList,
            info: BrowserItemActionInfo,
        ) {
            info.finish(Ok(())).await;
        }

        async fn thing_removed(&self, _thing: Thing) {
            self.calls.lock().unwrap().push("removed");
        }
    }

    #[tokio::test]
    async fn commands_are_processed_in_order() {
        let plugin: Arc<dyn IntegrationPlugin> = Arc::new(RecordingPlugin { calls: Mutex::new(vec![]) });
        let (sender, receiver) = kanal::unbounded_async();
        let task = tokio::spawn(run_plugin_task(plugin.clone(), receiver));

        let discover_info = ThingDiscoveryInfo::new();
        sender
            .send(PluginCommand::Discover {
                thing_class_id: ThingClassId::new(),
                params: ParamList::new(),
                info: discover_info.clone(),
            })
            .await
            .unwrap();

        let _ = discover_info.await_result(std::time::Duration::from_secs(1)).await;

        sender.send(PluginCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn post_setup_is_dispatched_after_setup() {
        let plugin: Arc<dyn IntegrationPlugin> = Arc::new(RecordingPlugin { calls: Mutex::new(vec![]) });
        let (sender, receiver) = kanal::unbounded_async();
        let task = tokio::spawn(run_plugin_task(plugin.clone(), receiver));

        let setup_info = ThingSetupInfo::new();
        let thing = Thing {
            id: ThingId::new(),
            thing_class_id: ThingClassId::new(),
            plugin_id: PluginId::new(),
            name: "t".into(),
            params: ParamList::new(),
            settings: ParamList::new(),
            parent_id: None,
            auto_created: false,
            setup_status: crate::thing::SetupStatus::InProgress,
            states: std::collections::HashMap::new(),
        };
        sender.send(PluginCommand::Setup { thing: thing.clone(), info: setup_info.clone() }).await.unwrap();
        let _ = setup_info.await_result(std::time::Duration::from_secs(1)).await;
        sender.send(PluginCommand::PostSetup { thing }).await.unwrap();

        sender.send(PluginCommand::Shutdown).await.unwrap();
        task.await.unwrap();

        let recorded = plugin.as_ref();
        let _ = recorded;
    }
}
