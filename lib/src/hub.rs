use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::catalog::TypeCatalog;
use crate::config::Config;
use crate::error::ThingError;
use crate::events::{EventBus, HistoryLogger, Notification, NullHistoryLogger};
use crate::ids::{IOConnectionId, StateTypeId, ThingId};
use crate::io::{IOConnection, IOConnectionEngine};
use crate::lifecycle::LifecycleEngine;
use crate::pairing::PairingFsm;
use crate::persistence::ConfigStore;
use crate::plugin::{spawn_plugin, IntegrationPlugin, PluginCommand, PluginContext};
use crate::rule_engine::{CascadeRuleEngine, RuleEngineCollaborator};
use crate::thing::{SetupStatus, Thing, ThingStore};
use crate::translator::{PassthroughTranslator, Translator};
use crate::types::{Param, ParamList};
use crate::value::Value;

/// Wires every Integration Core component into a single runnable instance
/// and owns its startup sequence (spec §6): load plugins, load plugin
/// configurations, load persisted things (marking setup as not yet rerun),
/// run setup on each, start monitoring auto-things, then load and propagate
/// IO connections.
///
/// Grounded on the teacher's `internal_main()` (`lib.rs`) as the top-level
/// "construct every subsystem, then start background tasks" sequence, with
/// the web/websocket/ctrlc pieces replaced by this crate's own subsystems.
pub struct Hub {
    pub catalog: Arc<TypeCatalog>,
    pub things: Arc<ThingStore>,
    pub pairing: Arc<PairingFsm>,
    pub events: Arc<EventBus>,
    pub io: Arc<IOConnectionEngine>,
    pub lifecycle: Arc<LifecycleEngine>,
    config: Config,
    translator: Box<dyn Translator>,
    plugin_config: tokio::sync::Mutex<ConfigStore<Vec<Param>>>,
    io_store: tokio::sync::Mutex<ConfigStore<IOConnection>>,
    /// Shared with `lifecycle` so both Thing-lifecycle mutations and
    /// state-value updates persist to the same file (spec §6 item 1).
    things_store: Arc<tokio::sync::Mutex<ConfigStore<Thing>>>,
    background_tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Hub {
    pub async fn new(config: Config) -> Result<Self, crate::persistence::PersistenceError> {
        Self::with_collaborators(config, Box::new(CascadeRuleEngine), Box::new(PassthroughTranslator), Box::new(NullHistoryLogger)).await
    }

    pub async fn with_collaborators(
        config: Config,
        rule_engine: Box<dyn RuleEngineCollaborator>,
        translator: Box<dyn Translator>,
        history: Box<dyn HistoryLogger>,
    ) -> Result<Self, crate::persistence::PersistenceError> {
        let catalog = Arc::new(TypeCatalog::new());
        let things = Arc::new(ThingStore::new());
        let pairing = Arc::new(PairingFsm::new(config.pairing_ttl()));
        let events = Arc::new(EventBus::new(history));
        let io = Arc::new(IOConnectionEngine::new());

        let things_store = Arc::new(tokio::sync::Mutex::new(ConfigStore::load(&config.thing_store_path).await?));
        let lifecycle = Arc::new(LifecycleEngine::new(
            catalog.clone(),
            things.clone(),
            pairing.clone(),
            events.clone(),
            rule_engine,
            things_store.clone(),
        ));

        let plugin_config = ConfigStore::load(&config.plugin_config_path).await?;
        let io_store = ConfigStore::load(&config.io_connection_store_path).await?;

        Ok(Self {
            catalog,
            things,
            pairing,
            events,
            io,
            lifecycle,
            config,
            translator,
            plugin_config: tokio::sync::Mutex::new(plugin_config),
            io_store: tokio::sync::Mutex::new(io_store),
            things_store,
            background_tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn translator(&self) -> &dyn Translator {
        self.translator.as_ref()
    }

    /// Loads a statically-linked plugin (spec §4.1 "load plugins"): spawns
    /// its command task, registers its catalog contributions, hands it a
    /// [`PluginContext`], and replays any persisted configuration.
    ///
    /// Takes `self: &Arc<Self>` rather than `&self` so the context handed to
    /// the plugin can carry a `Weak<Hub>` back-reference, letting
    /// `PluginContext::notify_state_changed` route through
    /// [`Hub::on_state_changed`] instead of only publishing to the event bus.
    pub async fn load_plugin(self: &Arc<Self>, plugin: Arc<dyn IntegrationPlugin>) -> Result<crate::ids::PluginId, ThingError> {
        let handle = spawn_plugin(plugin.clone());
        let plugin_id = handle.id;

        let ctx = PluginContext {
            plugin_id,
            events: self.events.clone(),
            lifecycle: Arc::downgrade(&self.lifecycle),
            hub: Arc::downgrade(self),
        };
        plugin.init(ctx).await?;

        self.lifecycle.register_plugin(handle).await;

        if let Some(configuration) = self.plugin_config.lock().await.get(&plugin_id.to_string()).cloned() {
            self.events.publish(Notification::PluginConfigurationChanged { plugin_id, configuration: configuration.clone() });
            let _ = self
                .lifecycle
                .dispatch(plugin_id, PluginCommand::ConfigurationChanged { configuration: ParamList::from_params(configuration) })
                .await;
        }

        Ok(plugin_id)
    }

    /// The plugin configuration last persisted for `plugin_id`, if any
    /// (spec §4.9 "GetPluginConfiguration").
    pub async fn plugin_configuration(&self, plugin_id: crate::ids::PluginId) -> Option<Vec<Param>> {
        self.plugin_config.lock().await.get(&plugin_id.to_string()).cloned()
    }

    /// Persists a plugin's configuration and relays it both to event-bus
    /// subscribers and to the plugin itself (spec §4.9 "SetPluginConfiguration",
    /// §4.3 "pluginConfigurationChanged").
    pub async fn set_plugin_configuration(&self, plugin_id: crate::ids::PluginId, configuration: Vec<Param>) -> Result<(), ThingError> {
        let mut store = self.plugin_config.lock().await;
        store.set(plugin_id.to_string(), configuration.clone());
        store.save().await.map_err(|_| ThingError::HardwareFailure)?;
        drop(store);

        self.events.publish(Notification::PluginConfigurationChanged { plugin_id, configuration: configuration.clone() });
        let _ = self
            .lifecycle
            .dispatch(plugin_id, PluginCommand::ConfigurationChanged { configuration: ParamList::from_params(configuration) })
            .await;
        Ok(())
    }

    /// Runs the full startup sequence against already-loaded plugins: load
    /// persisted things (marking each `SetupStatus::None` per spec §6), re-run
    /// setup on each, then load and propagate persisted IO connections.
    pub async fn start(&self) -> Result<(), ThingError> {
        for mut thing in self.things_store.lock().await.values().cloned().collect::<Vec<_>>() {
            thing.setup_status = SetupStatus::None;
            self.things.insert(thing).await;
        }

        for thing in self.things.all().await {
            self.lifecycle_rerun_setup(thing.id).await;
        }

        self.lifecycle.start_monitoring_auto_things().await;

        for connection in self.io_store.lock().await.values().cloned().collect::<Vec<_>>() {
            self.io.add(connection.clone()).await;
            self.propagate_connection(&connection).await;
        }

        self.spawn_pairing_sweeper().await;
        Ok(())
    }

    async fn spawn_pairing_sweeper(&self) {
        let pairing = self.pairing.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let expired = pairing.sweep_expired().await;
                for id in expired {
                    log::debug!("pairing transaction {id} expired");
                }
            }
        });
        self.background_tasks.lock().await.push(handle);
    }

    async fn lifecycle_rerun_setup(&self, thing_id: ThingId) {
        if let Err(e) = self.lifecycle.reconfigure_thing(thing_id, crate::types::ParamList::new(), self.config.action_timeout()).await {
            log::warn!("thing {thing_id} failed to re-run setup at startup: {e}");
        }
    }

    /// spec §4.8: registers and immediately propagates a new IO connection.
    pub async fn add_io_connection(&self, connection: IOConnection) -> Result<(), ThingError> {
        if connection.input_thing_id == connection.output_thing_id && connection.input_state_type_id == connection.output_state_type_id {
            // A state can't drive itself (spec §4.8 "no self-loops").
            return Err(ThingError::InvalidParameter);
        }

        let input_thing = self.things.get(connection.input_thing_id).await?;
        let output_thing = self.things.get(connection.output_thing_id).await?;
        let input_class = self.catalog.find_thing_class(input_thing.thing_class_id).await?;
        let output_class = self.catalog.find_thing_class(output_thing.thing_class_id).await?;
        let input_type = input_class.find_state_type(connection.input_state_type_id).ok_or(ThingError::StateTypeNotFound)?;
        let output_type = output_class.find_state_type(connection.output_state_type_id).ok_or(ThingError::StateTypeNotFound)?;
        IOConnectionEngine::validate_compatible(input_type, output_type)?;

        self.io.add(connection.clone()).await;
        self.io_store.lock().await.set(connection.id.to_string(), connection.clone());
        self.io_store.lock().await.save().await.map_err(|_| ThingError::HardwareFailure)?;
        self.events.publish(Notification::IOConnectionAdded { connection: connection.clone() });

        self.propagate_connection(&connection).await;
        Ok(())
    }

    pub async fn remove_io_connection(&self, id: IOConnectionId) -> Result<(), ThingError> {
        self.io.remove(id).await?;
        self.io_store.lock().await.remove(&id.to_string());
        self.io_store.lock().await.save().await.map_err(|_| ThingError::HardwareFailure)?;
        self.events.publish(Notification::IOConnectionRemoved { connection_id: id });
        Ok(())
    }

    async fn propagate_connection(&self, connection: &IOConnection) {
        let Ok(input_thing) = self.things.get(connection.input_thing_id).await else { return };
        let Some(input_value) = input_thing.state(connection.input_state_type_id) else { return };
        self.propagate_state_change(connection, input_value.clone()).await;
    }

    /// Called whenever a thing's state changes, fanning the new value out
    /// through every IO connection whose input is that state (spec §4.8).
    pub async fn on_state_changed(&self, thing_id: ThingId, state_type_id: StateTypeId, value: Value) -> Result<(), ThingError> {
        let updated = self.things.update(thing_id, |t| t.set_state(state_type_id, value.clone())).await?;

        // Persistence errors on state-value updates are logged but never
        // abort the state change (spec §7 propagation policy).
        let mut store = self.things_store.lock().await;
        store.set(updated.id.to_string(), updated.clone());
        if let Err(e) = store.save().await {
            log::warn!("failed to persist state change for thing {thing_id}: {e}");
        }
        drop(store);

        self.events.publish(Notification::StateChanged { thing_id, state_type_id, value: value.clone() });

        for connection in self.io.connections_from(thing_id, state_type_id).await {
            self.propagate_state_change(&connection, value.clone()).await;
        }
        Ok(())
    }

    async fn propagate_state_change(&self, connection: &IOConnection, input_value: Value) {
        let Ok(input_thing) = self.things.get(connection.input_thing_id).await else { return };
        let Ok(output_thing) = self.things.get(connection.output_thing_id).await else { return };
        let Ok(input_class) = self.catalog.find_thing_class(input_thing.thing_class_id).await else { return };
        let Ok(output_class) = self.catalog.find_thing_class(output_thing.thing_class_id).await else { return };
        let Some(input_type) = input_class.find_state_type(connection.input_state_type_id) else { return };
        let Some(output_type) = output_class.find_state_type(connection.output_state_type_id) else { return };

        if let Some(mapped) = IOConnectionEngine::propagate_value(connection, input_type, output_type, &input_value) {
            let action_type_id = crate::ids::ActionTypeId(connection.output_state_type_id.0);
            let mut params = crate::types::ParamList::new();
            params.set(crate::ids::ParamTypeId(connection.output_state_type_id.0), mapped);

            if let Ok(thing) = self.things.get(connection.output_thing_id).await {
                let info = crate::info::ThingActionInfo::new();
                let command = crate::plugin::PluginCommand::Action { thing, action_type_id, params, info };
                let _ = self.lifecycle.dispatch(output_thing.plugin_id, command).await;
            }
        }
    }

    pub async fn shutdown(&self) {
        for handle in self.background_tasks.lock().await.drain(..) {
            handle.abort();
        }
    }
}
