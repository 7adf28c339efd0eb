//! Built-in mock integration plugin. Exercises every createMethod/setupMethod
//! combination the Integration Core supports, so the end-to-end scenarios
//! in the hub's own test suite don't depend on a real device protocol.
//!
//! Grounded on the teacher's `test_plugin` crate (a macro-driven FFI
//! property-exercising plugin) as the "reference plugin shipped for testing
//! the host" role, rewritten against the safe `IntegrationPlugin` trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hearth_core::error::ThingError;
use hearth_core::ids::{
    ActionTypeId, BrowserItemActionTypeId, PairingTransactionId, ParamTypeId, PluginId, StateTypeId, ThingClassId, ThingId, VendorId,
};
use hearth_core::info::{
    BrowseResultInfo, BrowserActionInfo, BrowserItemActionInfo, PairingResult, ThingActionInfo, ThingDiscoveryInfo, ThingPairingInfo,
    ThingSetupInfo,
};
use hearth_core::plugin::{IntegrationPlugin, PluginContext};
use hearth_core::thing::{SetupStatus, Thing};
use hearth_core::types::{CreateMethod, ParamList, SetupMethod, ThingClass, ThingDescriptor, Vendor};
use hearth_core::value::Value;
use hearth_plugin_api::builders;

const fn uid(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

pub const VENDOR_ID: VendorId = VendorId(uid(1));

pub const MOCK_CLASS_ID: ThingClassId = ThingClassId(uid(10));
pub const HTTPPORT_PARAM_ID: ParamTypeId = ParamTypeId(uid(11));
pub const ASYNC_PARAM_ID: ParamTypeId = ParamTypeId(uid(12));
pub const BROKEN_PARAM_ID: ParamTypeId = ParamTypeId(uid(13));
pub const RESULT_COUNT_PARAM_ID: ParamTypeId = ParamTypeId(uid(14));

pub const DISPLAY_PIN_CLASS_ID: ThingClassId = ThingClassId(uid(20));

pub const PARENT_CLASS_ID: ThingClassId = ThingClassId(uid(30));
pub const CHILD_CLASS_ID: ThingClassId = ThingClassId(uid(31));

pub const IO_INPUT_CLASS_ID: ThingClassId = ThingClassId(uid(40));
pub const IO_INPUT_STATE_ID: StateTypeId = StateTypeId(uid(41));
pub const IO_OUTPUT_CLASS_ID: ThingClassId = ThingClassId(uid(50));
pub const IO_OUTPUT_STATE_ID: StateTypeId = StateTypeId(uid(51));

const DISPLAY_PIN_SECRET: &str = "243681";

/// Per-transaction bookkeeping the mock plugin needs between `pair_thing`
/// and `confirm_pairing`, since the hub only hands the plugin a fresh
/// `Info` for each call.
struct PendingPairing {
    thing_class_id: ThingClassId,
}

pub struct MockPlugin {
    ctx: Mutex<Option<PluginContext>>,
    pending_pairings: Mutex<HashMap<PairingTransactionId, PendingPairing>>,
    discovery_seq: AtomicU64,
}

impl Default for MockPlugin {
    fn default() -> Self {
        Self {
            ctx: Mutex::new(None),
            pending_pairings: Mutex::new(HashMap::new()),
            discovery_seq: AtomicU64::new(0),
        }
    }
}

impl MockPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn mock_class(&self, plugin_id: PluginId) -> ThingClass {
        ThingClass {
            id: MOCK_CLASS_ID,
            vendor_id: VENDOR_ID,
            plugin_id,
            name: "mock".into(),
            display_name: "Mock Device".into(),
            create_methods: vec![CreateMethod::JustAdd, CreateMethod::Discovery],
            setup_method: SetupMethod::JustAdd,
            interfaces: vec![],
            param_types: vec![
                builders::int_param(HTTPPORT_PARAM_ID, "httpport", "HTTP Port", 8080, 1, 65535),
                builders::bool_param(ASYNC_PARAM_ID, "async", "Async Setup", false),
                builders::bool_param(BROKEN_PARAM_ID, "broken", "Simulate Broken Setup", false),
            ],
            settings_types: vec![],
            discovery_param_types: vec![builders::int_param(RESULT_COUNT_PARAM_ID, "resultCount", "Result Count", 1, 0, 100)],
            pairing_info: None,
            state_types: vec![],
            event_types: vec![],
            action_types: vec![],
            browser_item_action_types: vec![],
            browsable: false,
            can_have_children: false,
        }
    }

    fn display_pin_class(&self, plugin_id: PluginId) -> ThingClass {
        ThingClass {
            id: DISPLAY_PIN_CLASS_ID,
            vendor_id: VENDOR_ID,
            plugin_id,
            name: "displayPinMock".into(),
            display_name: "Mock DisplayPin Device".into(),
            create_methods: vec![],
            setup_method: SetupMethod::DisplayPin,
            interfaces: vec![],
            param_types: vec![],
            settings_types: vec![],
            discovery_param_types: vec![],
            pairing_info: Some("Read the PIN shown on the device's screen".into()),
            state_types: vec![],
            event_types: vec![],
            action_types: vec![],
            browser_item_action_types: vec![],
            browsable: false,
            can_have_children: false,
        }
    }

    fn parent_class(&self, plugin_id: PluginId) -> ThingClass {
        ThingClass {
            id: PARENT_CLASS_ID,
            vendor_id: VENDOR_ID,
            plugin_id,
            name: "parentMock".into(),
            display_name: "Mock Parent Device".into(),
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
            can_have_children: true,
        }
    }

    fn child_class(&self, plugin_id: PluginId) -> ThingClass {
        ThingClass {
            id: CHILD_CLASS_ID,
            vendor_id: VENDOR_ID,
            plugin_id,
            name: "childMock".into(),
            display_name: "Mock Child Device".into(),
            create_methods: vec![CreateMethod::Auto],
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
        }
    }

    fn io_input_class(&self, plugin_id: PluginId) -> ThingClass {
        ThingClass {
            id: IO_INPUT_CLASS_ID,
            vendor_id: VENDOR_ID,
            plugin_id,
            name: "ioSensorMock".into(),
            display_name: "Mock Analog Input".into(),
            create_methods: vec![CreateMethod::JustAdd],
            setup_method: SetupMethod::JustAdd,
            interfaces: vec![],
            param_types: vec![],
            settings_types: vec![],
            discovery_param_types: vec![],
            pairing_info: None,
            state_types: vec![builders::double_state(IO_INPUT_STATE_ID, "voltage", "Input Voltage", 0.0, 0.0, 3.3, true)],
            event_types: vec![],
            action_types: vec![],
            browser_item_action_types: vec![],
            browsable: false,
            can_have_children: false,
        }
    }

    fn io_output_class(&self, plugin_id: PluginId) -> ThingClass {
        ThingClass {
            id: IO_OUTPUT_CLASS_ID,
            vendor_id: VENDOR_ID,
            plugin_id,
            name: "tempSensorMock".into(),
            display_name: "Mock Temperature Output".into(),
            create_methods: vec![CreateMethod::JustAdd],
            setup_method: SetupMethod::JustAdd,
            interfaces: vec![],
            param_types: vec![],
            settings_types: vec![],
            discovery_param_types: vec![],
            pairing_info: None,
            state_types: vec![builders::double_state(IO_OUTPUT_STATE_ID, "temperature", "Temperature", 0.0, -20.0, 50.0, true)],
            event_types: vec![],
            action_types: vec![],
            browser_item_action_types: vec![],
            browsable: false,
            can_have_children: false,
        }
    }

    fn ctx(&self) -> PluginContext {
        self.ctx.lock().unwrap().clone().expect("MockPlugin used before init()")
    }
}

#[async_trait]
impl IntegrationPlugin for MockPlugin {
    fn name(&self) -> &str {
        "mock"
    }

    fn vendors(&self) -> Vec<Vendor> {
        vec![Vendor { id: VENDOR_ID, name: "mock".into(), display_name: "Mock Vendor".into() }]
    }

    fn thing_classes(&self) -> Vec<ThingClass> {
        let plugin_id = PluginId::nil();
        vec![
            self.mock_class(plugin_id),
            self.display_pin_class(plugin_id),
            self.parent_class(plugin_id),
            self.child_class(plugin_id),
            self.io_input_class(plugin_id),
            self.io_output_class(plugin_id),
        ]
    }

    async fn init(&self, ctx: PluginContext) -> Result<(), ThingError> {
        *self.ctx.lock().unwrap() = Some(ctx);
        Ok(())
    }

    /// S3: `DiscoverThings(mock, [{resultCount:n}])` returns `n` descriptors,
    /// the second of which carries `description="55555"`.
    async fn discover_things(&self, thing_class_id: ThingClassId, params: ParamList, info: ThingDiscoveryInfo) {
        if thing_class_id != MOCK_CLASS_ID {
            info.finish(Err(ThingError::CreationMethodNotSupported)).await;
            return;
        }

        let count = params.value(RESULT_COUNT_PARAM_ID).and_then(Value::as_f64).unwrap_or(1.0) as usize;
        let seq_base = self.discovery_seq.fetch_add(1, Ordering::SeqCst);

        let descriptors = (0..count)
            .map(|i| {
                let port = 55555 + i as i64;
                let mut params = ParamList::new();
                params.set(HTTPPORT_PARAM_ID, Value::Int(port));
                params.set(ASYNC_PARAM_ID, Value::Bool(false));
                params.set(BROKEN_PARAM_ID, Value::Bool(false));
                ThingDescriptor {
                    id: hearth_core::ids::ThingDescriptorId::new(),
                    thing_class_id,
                    title: format!("Mock Device (round {seq_base}, #{i})"),
                    description: port.to_string(),
                    thing_id: None,
                    params,
                }
            })
            .collect();

        info.finish(Ok(descriptors)).await;
    }

    /// S1/S2: `broken:true` fails setup with `SetupFailed`; `async:true`
    /// defers completion briefly before finishing, exercising the
    /// Info-object's async path rather than resolving inline.
    async fn setup_thing(&self, thing: Thing, info: ThingSetupInfo) {
        if thing.thing_class_id == PARENT_CLASS_ID {
            info.finish(Ok(())).await;
            let ctx = self.ctx();
            let parent_id = thing.id;
            tokio::spawn(async move {
                if let Err(e) = spawn_child_for_parent(&ctx, parent_id).await {
                    log::warn!("mock plugin failed to auto-create child for {parent_id}: {e}");
                }
            });
            return;
        }

        if thing.thing_class_id != MOCK_CLASS_ID {
            info.finish(Ok(())).await;
            return;
        }

        let broken = thing.params.value(BROKEN_PARAM_ID).and_then(Value::as_bool).unwrap_or(false);
        let is_async = thing.params.value(ASYNC_PARAM_ID).and_then(Value::as_bool).unwrap_or(false);

        if is_async {
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                let result = if broken { Err(ThingError::SetupFailed) } else { Ok(()) };
                info.finish(result).await;
            });
        } else {
            let result = if broken { Err(ThingError::SetupFailed) } else { Ok(()) };
            info.finish(result).await;
        }
    }

    async fn execute_action(&self, thing: Thing, _action_type_id: ActionTypeId, params: ParamList, info: ThingActionInfo) {
        // An IO connection's mapped value arrives as the single param whose
        // id matches the target state's id.
        if let Some((param_type_id, value)) = params.iter().next().map(|p| (p.param_type_id, p.value.clone())) {
            let ctx = self.ctx();
            if let Err(e) = ctx.notify_state_changed(thing.id, StateTypeId(param_type_id.0), value).await {
                log::warn!("mock plugin failed to notify state change for {}: {e}", thing.id);
            }
        }
        info.finish(Ok(())).await;
    }

    /// S4: `PairThing(displayPinMock, ...)` yields a display message; the
    /// hub's pairing transaction tracks the expected secret out of band
    /// (the plugin only validates it on `confirm_pairing`).
    async fn pair_thing(&self, transaction_id: PairingTransactionId, thing_class_id: ThingClassId, _params: ParamList, info: ThingPairingInfo) {
        if thing_class_id != DISPLAY_PIN_CLASS_ID {
            info.finish(Err(ThingError::SetupMethodNotSupported)).await;
            return;
        }
        self.pending_pairings.lock().unwrap().insert(transaction_id, PendingPairing { thing_class_id });

        // Pairing isn't complete until `confirm_pairing`; the hub only reads
        // whether this call succeeded to decide if the transaction may move
        // to AwaitingConfirmation; the placeholder thing here is discarded.
        let placeholder = Thing {
            id: ThingId::nil(),
            thing_class_id,
            plugin_id: PluginId::nil(),
            name: String::new(),
            params: ParamList::new(),
            settings: ParamList::new(),
            parent_id: None,
            auto_created: false,
            setup_status: SetupStatus::InProgress,
            states: HashMap::new(),
        };
        info.finish(Ok(PairingResult { transaction_id, thing: placeholder })).await;
    }

    async fn confirm_pairing(&self, transaction_id: PairingTransactionId, secret: String, info: ThingPairingInfo) {
        let pending = self.pending_pairings.lock().unwrap().remove(&transaction_id);
        let Some(pending) = pending else {
            info.finish(Err(ThingError::ItemNotFound)).await;
            return;
        };

        if secret != DISPLAY_PIN_SECRET {
            info.finish(Err(ThingError::AuthenticationFailure)).await;
            return;
        }

        let thing = Thing {
            id: ThingId::new(),
            thing_class_id: pending.thing_class_id,
            plugin_id: PluginId::nil(),
            name: String::new(),
            params: ParamList::new(),
            settings: ParamList::new(),
            parent_id: None,
            auto_created: false,
            setup_status: SetupStatus::Complete,
            states: HashMap::new(),
        };

        info.finish(Ok(PairingResult { transaction_id, thing })).await;
    }

    async fn browse(&self, _thing: Thing, _item_id: Option<String>, info: BrowseResultInfo) {
        info.finish(Ok(vec![])).await;
    }

    async fn execute_browser_item(&self, _thing: Thing, _item_id: String, info: BrowserActionInfo) {
        info.finish(Err(ThingError::ItemNotExecutable)).await;
    }

    async fn execute_browser_item_action(
        &self,
        _thing: Thing,
        _action_type_id: BrowserItemActionTypeId,
        _item_id: String,
        _params: ParamList,
        info: BrowserItemActionInfo,
    ) {
        info.finish(Err(ThingError::ItemNotExecutable)).await;
    }

    async fn thing_removed(&self, _thing: Thing) {}
}

/// Spawned from `setup_thing` for `parentMock`-class things, covering S5's
/// "parent is created and a child is auto-created with `parentId=parent`".
pub async fn spawn_child_for_parent(ctx: &PluginContext, parent_id: ThingId) -> Result<Thing, ThingError> {
    ctx.add_auto_thing(CHILD_CLASS_ID, "Mock Child".into(), ParamList::new(), Some(parent_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::info::Info;
    use std::time::Duration;

    fn sample_thing(broken: bool, is_async: bool) -> Thing {
        let mut params = ParamList::new();
        params.set(HTTPPORT_PARAM_ID, Value::Int(8765));
        params.set(ASYNC_PARAM_ID, Value::Bool(is_async));
        params.set(BROKEN_PARAM_ID, Value::Bool(broken));
        Thing {
            id: ThingId::new(),
            thing_class_id: MOCK_CLASS_ID,
            plugin_id: PluginId::nil(),
            name: "m1".into(),
            params,
            settings: ParamList::new(),
            parent_id: None,
            auto_created: false,
            setup_status: SetupStatus::InProgress,
            states: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn s1_just_add_happy_path() {
        let plugin = MockPlugin::new();
        let info: Info<()> = Info::new();
        plugin.setup_thing(sample_thing(false, false), info.clone()).await;
        assert!(info.await_result(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn s2_broken_setup_fails() {
        let plugin = MockPlugin::new();
        let info: Info<()> = Info::new();
        plugin.setup_thing(sample_thing(true, false), info.clone()).await;
        let err = info.await_result(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, ThingError::SetupFailed);
    }

    #[tokio::test]
    async fn async_setup_resolves_after_delay() {
        let plugin = MockPlugin::new();
        let info: Info<()> = Info::new();
        plugin.setup_thing(sample_thing(false, true), info.clone()).await;
        assert!(info.await_result(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn s3_discover_returns_requested_count_with_expected_description() {
        let plugin = MockPlugin::new();
        let mut params = ParamList::new();
        params.set(RESULT_COUNT_PARAM_ID, Value::Int(2));

        let info: ThingDiscoveryInfo = Info::new();
        plugin.discover_things(MOCK_CLASS_ID, params, info.clone()).await;
        let descriptors = info.await_result(Duration::from_secs(1)).await.unwrap();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].description, "55555");
        assert_eq!(descriptors[1].description, "55556");
    }

    #[tokio::test]
    async fn s4_confirm_pairing_with_correct_secret_succeeds() {
        let plugin = MockPlugin::new();
        let transaction_id = PairingTransactionId::new();

        let pair_info: ThingPairingInfo = Info::new();
        plugin.pair_thing(transaction_id, DISPLAY_PIN_CLASS_ID, ParamList::new(), pair_info.clone()).await;
        let _ = pair_info.await_result(Duration::from_secs(1)).await;

        let confirm_info: ThingPairingInfo = Info::new();
        plugin.confirm_pairing(transaction_id, DISPLAY_PIN_SECRET.to_string(), confirm_info.clone()).await;
        let result = confirm_info.await_result(Duration::from_secs(1)).await.unwrap();
        assert_eq!(result.transaction_id, transaction_id);
    }

    #[tokio::test]
    async fn s4_confirm_pairing_with_wrong_secret_fails() {
        let plugin = MockPlugin::new();
        let transaction_id = PairingTransactionId::new();

        let pair_info: ThingPairingInfo = Info::new();
        plugin.pair_thing(transaction_id, DISPLAY_PIN_CLASS_ID, ParamList::new(), pair_info.clone()).await;
        let _ = pair_info.await_result(Duration::from_secs(1)).await;

        let confirm_info: ThingPairingInfo = Info::new();
        plugin.confirm_pairing(transaction_id, "wrong".to_string(), confirm_info.clone()).await;
        let err = confirm_info.await_result(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, ThingError::AuthenticationFailure);
    }
}
