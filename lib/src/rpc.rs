use std::sync::Arc;
use std::time::Duration;

use hearth_rpc_spec::{NotificationEnvelope, RequestEnvelope, ResponseEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ThingError;
use crate::hub::Hub;
use crate::ids::{
    BrowserItemActionTypeId, IOConnectionId, PairingTransactionId, ParamTypeId, PluginId, RuleId, StateTypeId, ThingClassId, ThingId,
};
use crate::io::IOConnection;
use crate::rule_engine::{RemovePolicy, RuleResolution};
use crate::types::{Param, ParamList};
use crate::value::Value;

/// A JSON-RPC request in the "Integrations" namespace (spec §6). The wire
/// method name is `Integrations.<Method>`; callers outside this crate strip
/// that prefix before matching on [`IntegrationsMethod`].
pub type RpcRequest = RequestEnvelope;

/// Every immediate (synchronous) response carries the request id and a
/// `NoError`/specific `thingError`; async operations additionally emit a
/// second, terminal response reusing the same id once their [`crate::info::Info`]
/// resolves (spec §6).
pub struct RpcResponse {
    pub id: u64,
    pub params: RpcResponseParams,
}

impl From<RpcResponse> for ResponseEnvelope {
    fn from(response: RpcResponse) -> Self {
        ResponseEnvelope {
            id: response.id,
            params: serde_json::to_value(&response.params).unwrap_or(Json::Null),
        }
    }
}

/// Wraps a [`crate::events::Notification`] already serialized to JSON into
/// the transport-agnostic envelope, tagging it with its notification name
/// for dispatch on the client side.
pub fn notification_envelope(name: &str, params: Json) -> NotificationEnvelope {
    NotificationEnvelope { notification: name.to_string(), params }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponseParams {
    pub thing_error: String,
    #[serde(flatten)]
    pub data: Option<Json>,
}

impl RpcResponseParams {
    pub fn ok(data: Option<Json>) -> Self {
        Self { thing_error: ThingError::NoError.as_wire_str().to_string(), data }
    }

    pub fn error(err: ThingError) -> Self {
        Self { thing_error: err.as_wire_str().to_string(), data: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverThingsParams {
    pub thing_class_id: ThingClassId,
    #[serde(default)]
    pub discovery_params: Vec<WireParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddThingParams {
    pub thing_class_id: ThingClassId,
    pub name: String,
    #[serde(default)]
    pub thing_params: Vec<WireParam>,
    #[serde(default)]
    pub parent_id: Option<ThingId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigureThingParams {
    pub thing_id: ThingId,
    #[serde(default)]
    pub thing_params: Vec<WireParam>,
}

/// EditThing renames a Thing; it never touches setting values (spec §4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditThingParams {
    pub thing_id: ThingId,
    pub name: String,
}

/// Updates a single writable setting, distinct from `EditThing`'s rename.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetThingSettingsParams {
    pub thing_id: ThingId,
    pub param_type_id: ParamTypeId,
    pub value: Value,
}

/// One caller decision for a rule reported as dependent on the thing being
/// removed (spec §4.6 RemovePolicy).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum RuleResolutionWire {
    Cascade { rule_id: RuleId },
    UpdateRule { rule_id: RuleId, replacement_rule_id: RuleId },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveThingParams {
    pub thing_id: ThingId,
    #[serde(default)]
    pub resolutions: Vec<RuleResolutionWire>,
}

/// Builds a [`RemovePolicy`] from the wire-supplied per-rule resolutions.
pub fn remove_policy_from_wire(resolutions: Vec<RuleResolutionWire>) -> RemovePolicy {
    resolutions.into_iter().fold(RemovePolicy::new(), |policy, r| match r {
        RuleResolutionWire::Cascade { rule_id } => policy.resolve(rule_id, RuleResolution::Cascade),
        RuleResolutionWire::UpdateRule { rule_id, replacement_rule_id } => policy.resolve(rule_id, RuleResolution::UpdateRule(replacement_rule_id)),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteActionParams {
    pub thing_id: ThingId,
    pub action_type_id: crate::ids::ActionTypeId,
    #[serde(default)]
    pub params: Vec<WireParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairThingParams {
    pub thing_class_id: ThingClassId,
    #[serde(default)]
    pub params: Vec<WireParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPairingParams {
    pub pairing_transaction_id: PairingTransactionId,
    pub secret: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireParam {
    pub param_type_id: ParamTypeId,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingClassIdParams {
    pub thing_class_id: ThingClassId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginIdParams {
    pub plugin_id: PluginId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPluginConfigurationParams {
    pub plugin_id: PluginId,
    #[serde(default)]
    pub configuration: Vec<WireParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStateValueParams {
    pub thing_id: ThingId,
    pub state_type_id: StateTypeId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStateValuesParams {
    pub thing_id: ThingId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBrowserItemParams {
    pub thing_id: ThingId,
    pub item_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBrowserItemParams {
    pub thing_id: ThingId,
    pub item_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBrowserItemActionParams {
    pub thing_id: ThingId,
    pub action_type_id: BrowserItemActionTypeId,
    pub item_id: String,
    #[serde(default)]
    pub params: Vec<WireParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddIOConnectionParams {
    pub input_thing_id: ThingId,
    pub input_state_type_id: StateTypeId,
    pub output_thing_id: ThingId,
    pub output_state_type_id: StateTypeId,
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveIOConnectionParams {
    pub io_connection_id: IOConnectionId,
}

pub fn params_from_wire(wire: Vec<WireParam>) -> ParamList {
    let mut list = ParamList::new();
    for p in wire {
        list.set(p.param_type_id, p.value);
    }
    list
}

/// The set of methods the "Integrations" namespace exposes (spec §6). Kept
/// as a typed enum rather than a raw string match so that a transport
/// adapter built outside this crate has an exhaustive list to dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationsMethod {
    GetVendors,
    GetThingClasses,
    GetThings,
    GetPlugins,
    GetPluginConfiguration,
    SetPluginConfiguration,
    GetEventTypes,
    GetActionTypes,
    GetStateTypes,
    GetStateValue,
    GetStateValues,
    DiscoverThings,
    AddThing,
    AddThingFromDiscovery,
    ReconfigureThing,
    EditThing,
    SetThingSettings,
    RemoveThing,
    ExecuteAction,
    PairThing,
    ConfirmPairing,
    GetIOConnections,
    AddIOConnection,
    RemoveIOConnection,
    BrowseThing,
    GetBrowserItem,
    ExecuteBrowserItem,
    ExecuteBrowserItemAction,
}

impl IntegrationsMethod {
    pub fn from_wire_name(name: &str) -> Option<Self> {
        let stripped = name.strip_prefix("Integrations.")?;
        Some(match stripped {
            "GetVendors" => Self::GetVendors,
            "GetThingClasses" => Self::GetThingClasses,
            "GetThings" => Self::GetThings,
            "GetPlugins" => Self::GetPlugins,
            "GetPluginConfiguration" => Self::GetPluginConfiguration,
            "SetPluginConfiguration" => Self::SetPluginConfiguration,
            "GetEventTypes" => Self::GetEventTypes,
            "GetActionTypes" => Self::GetActionTypes,
            "GetStateTypes" => Self::GetStateTypes,
            "GetStateValue" => Self::GetStateValue,
            "GetStateValues" => Self::GetStateValues,
            "DiscoverThings" => Self::DiscoverThings,
            "AddThing" => Self::AddThing,
            "AddThingFromDiscovery" => Self::AddThingFromDiscovery,
            "ReconfigureThing" => Self::ReconfigureThing,
            "EditThing" => Self::EditThing,
            "SetThingSettings" => Self::SetThingSettings,
            "RemoveThing" => Self::RemoveThing,
            "ExecuteAction" => Self::ExecuteAction,
            "PairThing" => Self::PairThing,
            "ConfirmPairing" => Self::ConfirmPairing,
            "GetIOConnections" => Self::GetIOConnections,
            "AddIOConnection" => Self::AddIOConnection,
            "RemoveIOConnection" => Self::RemoveIOConnection,
            "BrowseThing" => Self::BrowseThing,
            "GetBrowserItem" => Self::GetBrowserItem,
            "ExecuteBrowserItem" => Self::ExecuteBrowserItem,
            "ExecuteBrowserItemAction" => Self::ExecuteBrowserItemAction,
            _ => return None,
        })
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::GetVendors => "Integrations.GetVendors",
            Self::GetThingClasses => "Integrations.GetThingClasses",
            Self::GetThings => "Integrations.GetThings",
            Self::GetPlugins => "Integrations.GetPlugins",
            Self::GetPluginConfiguration => "Integrations.GetPluginConfiguration",
            Self::SetPluginConfiguration => "Integrations.SetPluginConfiguration",
            Self::GetEventTypes => "Integrations.GetEventTypes",
            Self::GetActionTypes => "Integrations.GetActionTypes",
            Self::GetStateTypes => "Integrations.GetStateTypes",
            Self::GetStateValue => "Integrations.GetStateValue",
            Self::GetStateValues => "Integrations.GetStateValues",
            Self::DiscoverThings => "Integrations.DiscoverThings",
            Self::AddThing => "Integrations.AddThing",
            Self::AddThingFromDiscovery => "Integrations.AddThingFromDiscovery",
            Self::ReconfigureThing => "Integrations.ReconfigureThing",
            Self::EditThing => "Integrations.EditThing",
            Self::SetThingSettings => "Integrations.SetThingSettings",
            Self::RemoveThing => "Integrations.RemoveThing",
            Self::ExecuteAction => "Integrations.ExecuteAction",
            Self::PairThing => "Integrations.PairThing",
            Self::ConfirmPairing => "Integrations.ConfirmPairing",
            Self::GetIOConnections => "Integrations.GetIOConnections",
            Self::AddIOConnection => "Integrations.AddIOConnection",
            Self::RemoveIOConnection => "Integrations.RemoveIOConnection",
            Self::BrowseThing => "Integrations.BrowseThing",
            Self::GetBrowserItem => "Integrations.GetBrowserItem",
            Self::ExecuteBrowserItem => "Integrations.ExecuteBrowserItem",
            Self::ExecuteBrowserItemAction => "Integrations.ExecuteBrowserItemAction",
        }
    }

    /// Whether this method resolves immediately (a plain query/mutation) or
    /// goes through the Info-object async protocol and gets a second,
    /// terminal response later (spec §6).
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Self::DiscoverThings
                | Self::AddThing
                | Self::AddThingFromDiscovery
                | Self::ReconfigureThing
                | Self::ExecuteAction
                | Self::PairThing
                | Self::ConfirmPairing
                | Self::BrowseThing
                | Self::GetBrowserItem
                | Self::ExecuteBrowserItem
                | Self::ExecuteBrowserItemAction
        )
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: Json) -> Result<T, ThingError> {
    serde_json::from_value(params).map_err(|_| ThingError::InvalidParameter)
}

fn to_json<T: Serialize>(value: &T) -> Option<Json> {
    serde_json::to_value(value).ok()
}

/// Routes one `Integrations.*` request to its `Hub`/`LifecycleEngine` call,
/// turning the result into an immediate [`RpcResponse`] (spec §6). Async
/// methods (see [`IntegrationsMethod::is_async`]) return their terminal
/// result the same way once their `Info` resolves; the transport layer is
/// responsible for emitting that as a second response reusing `id`.
pub async fn dispatch(hub: &Arc<Hub>, id: u64, method: IntegrationsMethod, params: Json, timeout: Duration) -> RpcResponse {
    let params = match route(hub, method, params, timeout).await {
        Ok(data) => RpcResponseParams::ok(data),
        Err(e) => RpcResponseParams::error(e),
    };
    RpcResponse { id, params }
}

async fn route(hub: &Arc<Hub>, method: IntegrationsMethod, params: Json, timeout: Duration) -> Result<Option<Json>, ThingError> {
    match method {
        IntegrationsMethod::GetVendors => Ok(to_json(&hub.catalog.vendors().await)),
        IntegrationsMethod::GetThingClasses => Ok(to_json(&hub.catalog.thing_classes().await)),
        IntegrationsMethod::GetThings => Ok(to_json(&hub.things.all().await)),
        IntegrationsMethod::GetPlugins => Ok(to_json(&hub.lifecycle.plugins().await)),

        IntegrationsMethod::GetPluginConfiguration => {
            let p: PluginIdParams = parse(params)?;
            Ok(to_json(&hub.plugin_configuration(p.plugin_id).await.unwrap_or_default()))
        }
        IntegrationsMethod::SetPluginConfiguration => {
            let p: SetPluginConfigurationParams = parse(params)?;
            let configuration: Vec<Param> = p.configuration.into_iter().map(|w| Param { param_type_id: w.param_type_id, value: w.value }).collect();
            hub.set_plugin_configuration(p.plugin_id, configuration).await?;
            Ok(None)
        }

        IntegrationsMethod::GetEventTypes => {
            let p: ThingClassIdParams = parse(params)?;
            let class = hub.catalog.find_thing_class(p.thing_class_id).await?;
            Ok(to_json(&class.event_types))
        }
        IntegrationsMethod::GetActionTypes => {
            let p: ThingClassIdParams = parse(params)?;
            let class = hub.catalog.find_thing_class(p.thing_class_id).await?;
            Ok(to_json(&class.action_types))
        }
        IntegrationsMethod::GetStateTypes => {
            let p: ThingClassIdParams = parse(params)?;
            let class = hub.catalog.find_thing_class(p.thing_class_id).await?;
            Ok(to_json(&class.state_types))
        }

        IntegrationsMethod::GetStateValue => {
            let p: GetStateValueParams = parse(params)?;
            let thing = hub.things.get(p.thing_id).await?;
            let value = thing.state(p.state_type_id).cloned().ok_or(ThingError::StateTypeNotFound)?;
            Ok(to_json(&value))
        }
        IntegrationsMethod::GetStateValues => {
            let p: GetStateValuesParams = parse(params)?;
            let thing = hub.things.get(p.thing_id).await?;
            Ok(to_json(&thing.states))
        }

        IntegrationsMethod::DiscoverThings => {
            let p: DiscoverThingsParams = parse(params)?;
            let descriptors = hub.lifecycle.discover_things(p.thing_class_id, params_from_wire(p.discovery_params), timeout).await?;
            Ok(to_json(&descriptors))
        }
        IntegrationsMethod::AddThing => {
            let p: AddThingParams = parse(params)?;
            let thing = hub.lifecycle.add_thing(p.thing_class_id, p.name, params_from_wire(p.thing_params), p.parent_id, timeout).await?;
            Ok(to_json(&thing))
        }
        IntegrationsMethod::AddThingFromDiscovery => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct AddThingFromDiscoveryParams {
                thing_class_id: ThingClassId,
                name: String,
                #[serde(default)]
                discovery_params: Vec<WireParam>,
                #[serde(default)]
                parent_id: Option<ThingId>,
            }
            let p: AddThingFromDiscoveryParams = parse(params)?;
            let thing = hub.lifecycle.add_thing(p.thing_class_id, p.name, params_from_wire(p.discovery_params), p.parent_id, timeout).await?;
            Ok(to_json(&thing))
        }
        IntegrationsMethod::ReconfigureThing => {
            let p: ReconfigureThingParams = parse(params)?;
            let thing = hub.lifecycle.reconfigure_thing(p.thing_id, params_from_wire(p.thing_params), timeout).await?;
            Ok(to_json(&thing))
        }
        IntegrationsMethod::EditThing => {
            let p: EditThingParams = parse(params)?;
            let thing = hub.lifecycle.rename_thing(p.thing_id, p.name).await?;
            Ok(to_json(&thing))
        }
        IntegrationsMethod::SetThingSettings => {
            let p: SetThingSettingsParams = parse(params)?;
            let thing = hub.lifecycle.edit_thing_setting(p.thing_id, p.param_type_id, p.value).await?;
            Ok(to_json(&thing))
        }
        IntegrationsMethod::RemoveThing => {
            let p: RemoveThingParams = parse(params)?;
            let policy = remove_policy_from_wire(p.resolutions);
            hub.lifecycle.remove_thing(p.thing_id, &policy).await?;
            Ok(None)
        }
        IntegrationsMethod::ExecuteAction => {
            let p: ExecuteActionParams = parse(params)?;
            hub.lifecycle.execute_action(p.thing_id, p.action_type_id, params_from_wire(p.params), timeout).await?;
            Ok(None)
        }

        IntegrationsMethod::PairThing => {
            let p: PairThingParams = parse(params)?;
            let (transaction_id, pairing_info) = hub.lifecycle.pair_thing(p.thing_class_id, params_from_wire(p.params), timeout).await?;
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct PairThingResult {
                pairing_transaction_id: PairingTransactionId,
                pairing_info: Option<String>,
            }
            Ok(to_json(&PairThingResult { pairing_transaction_id: transaction_id, pairing_info }))
        }
        IntegrationsMethod::ConfirmPairing => {
            let p: ConfirmPairingParams = parse(params)?;
            let thing = hub.lifecycle.confirm_pairing(p.pairing_transaction_id, p.secret, p.name, timeout).await?;
            Ok(to_json(&thing))
        }

        IntegrationsMethod::GetIOConnections => Ok(to_json(&hub.io.all().await)),
        IntegrationsMethod::AddIOConnection => {
            let p: AddIOConnectionParams = parse(params)?;
            let connection = IOConnection {
                id: IOConnectionId::new(),
                input_thing_id: p.input_thing_id,
                input_state_type_id: p.input_state_type_id,
                output_thing_id: p.output_thing_id,
                output_state_type_id: p.output_state_type_id,
                inverted: p.inverted,
            };
            hub.add_io_connection(connection).await?;
            Ok(None)
        }
        IntegrationsMethod::RemoveIOConnection => {
            let p: RemoveIOConnectionParams = parse(params)?;
            hub.remove_io_connection(p.io_connection_id).await?;
            Ok(None)
        }

        IntegrationsMethod::BrowseThing => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct BrowseThingParams {
                thing_id: ThingId,
                #[serde(default)]
                item_id: Option<String>,
            }
            let p: BrowseThingParams = parse(params)?;
            let items = hub.lifecycle.browse_thing(p.thing_id, p.item_id, timeout).await?;
            Ok(to_json(&items))
        }
        IntegrationsMethod::GetBrowserItem => {
            let p: GetBrowserItemParams = parse(params)?;
            let item = hub.lifecycle.browser_item(p.thing_id, p.item_id, timeout).await?;
            Ok(to_json(&item))
        }
        IntegrationsMethod::ExecuteBrowserItem => {
            let p: ExecuteBrowserItemParams = parse(params)?;
            hub.lifecycle.execute_browser_item(p.thing_id, p.item_id, timeout).await?;
            Ok(None)
        }
        IntegrationsMethod::ExecuteBrowserItemAction => {
            let p: ExecuteBrowserItemActionParams = parse(params)?;
            hub.lifecycle
                .execute_browser_item_action(p.thing_id, p.action_type_id, p.item_id, params_from_wire(p.params), timeout)
                .await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_roundtrips() {
        for method in [
            IntegrationsMethod::GetThings,
            IntegrationsMethod::AddThing,
            IntegrationsMethod::ExecuteAction,
            IntegrationsMethod::PairThing,
            IntegrationsMethod::GetPlugins,
            IntegrationsMethod::SetThingSettings,
            IntegrationsMethod::GetBrowserItem,
            IntegrationsMethod::ExecuteBrowserItem,
            IntegrationsMethod::ExecuteBrowserItemAction,
        ] {
            let name = method.wire_name();
            assert_eq!(IntegrationsMethod::from_wire_name(name), Some(method));
        }
    }

    #[test]
    fn unknown_method_name_is_none() {
        assert_eq!(IntegrationsMethod::from_wire_name("Integrations.Bogus"), None);
    }

    #[test]
    fn async_methods_are_flagged() {
        assert!(IntegrationsMethod::AddThing.is_async());
        assert!(!IntegrationsMethod::GetThings.is_async());
        assert!(IntegrationsMethod::ExecuteBrowserItem.is_async());
        assert!(!IntegrationsMethod::SetThingSettings.is_async());
    }

    #[test]
    fn remove_policy_from_wire_builds_expected_resolutions() {
        let rule_a = RuleId::new();
        let rule_b = RuleId::new();
        let replacement = RuleId::new();
        let policy = remove_policy_from_wire(vec![
            RuleResolutionWire::Cascade { rule_id: rule_a },
            RuleResolutionWire::UpdateRule { rule_id: rule_b, replacement_rule_id: replacement },
        ]);

        assert_eq!(policy.resolution(rule_a), Some(RuleResolution::Cascade));
        assert_eq!(policy.resolution(rule_b), Some(RuleResolution::UpdateRule(replacement)));
    }
}
