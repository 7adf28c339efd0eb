use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ids::{IOConnectionId, PluginId, StateTypeId, ThingId};
use crate::thing::Thing;
use crate::types::Param;
use crate::value::Value;

/// Unsolicited notifications the JSON-RPC facade fans out to subscribers
/// (spec §6). Grounded on the teacher's `EventMessage` enum (`events.rs`) as
/// an enumerated, channel-carried notification type, generalized from a
/// single `Trigger` variant to every notification kind the facade emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notification", content = "params")]
pub enum Notification {
    ThingAdded { thing: Thing },
    ThingChanged { thing: Thing },
    ThingRemoved { thing_id: ThingId },
    ThingSettingChanged { thing_id: ThingId, setting: Param },
    StateChanged { thing_id: ThingId, state_type_id: StateTypeId, value: Value },
    EventTriggered { thing_id: ThingId, event_type_id: crate::ids::EventTypeId, params: Vec<Param> },
    PluginConfigurationChanged { plugin_id: PluginId, configuration: Vec<Param> },
    IOConnectionAdded { connection: crate::io::IOConnection },
    IOConnectionRemoved { connection_id: IOConnectionId },
}

/// External collaborator for persisting state/event history (spec §1). The
/// core never reads history back; it only reports. Default is a no-op,
/// mirroring the passthrough style of [`crate::translator::Translator`].
pub trait HistoryLogger: Send + Sync {
    fn log_state_change(&self, _thing_id: ThingId, _state_type_id: StateTypeId, _value: &Value) {}
    fn log_event(&self, _thing_id: ThingId, _event_type_id: crate::ids::EventTypeId, _params: &[Param]) {}
}

pub struct NullHistoryLogger;
impl HistoryLogger for NullHistoryLogger {}

const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// Broadcasts [`Notification`]s to every JSON-RPC facade subscriber and
/// forwards loggable ones to a [`HistoryLogger`].
///
/// Unlike the teacher's single-consumer-per-event kanal channel
/// (`events.rs`), RPC subscribers are transient connections that all need
/// the same stream, so this uses `tokio::sync::broadcast` instead.
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
    history: Box<dyn HistoryLogger>,
}

impl EventBus {
    pub fn new(history: Box<dyn HistoryLogger>) -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self { sender, history }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publishes a notification. Lagging subscribers silently miss messages
    /// (broadcast's documented behavior); a slow RPC client is not allowed to
    /// back-pressure the hub.
    pub fn publish(&self, notification: Notification) {
        if let Notification::StateChanged { thing_id, state_type_id, value } = &notification {
            self.history.log_state_change(*thing_id, *state_type_id, value);
        }
        if let Notification::EventTriggered { thing_id, event_type_id, params } = &notification {
            self.history.log_event(*thing_id, *event_type_id, params);
        }
        let _ = self.sender.send(notification);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Box::new(NullHistoryLogger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let thing_id = ThingId::new();
        bus.publish(Notification::ThingRemoved { thing_id });

        match rx.recv().await.unwrap() {
            Notification::ThingRemoved { thing_id: id } => assert_eq!(id, thing_id),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::default();
        bus.publish(Notification::ThingRemoved { thing_id: ThingId::new() });
    }
}
