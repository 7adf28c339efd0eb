//! Transport-agnostic JSON-RPC envelope shared between the Integration Core
//! and any client binding built against it.
//!
//! Kept as its own crate, separate from `hearth_core`, so a thin client
//! (or a future transport adapter) can depend on the wire shapes alone
//! without pulling in the whole plugin-hosting/lifecycle engine.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A single JSON-RPC call. The method name carries its own namespace
/// (`"Integrations.AddThing"`); this crate does not interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Json,
}

/// A JSON-RPC response. Async methods produce two of these sharing the same
/// `id`: an immediate acknowledgement and a later terminal response once
/// the underlying operation resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub params: Json,
}

/// An unsolicited server-to-client push, carrying its own notification name
/// instead of an `id` (spec: ThingAdded/ThingChanged/StateChanged/...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub notification: String,
    pub params: Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_roundtrips_through_json() {
        let req = RequestEnvelope { id: 7, method: "Integrations.GetThings".into(), params: Json::Null };
        let encoded = serde_json::to_string(&req).unwrap();
        let decoded: RequestEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.method, "Integrations.GetThings");
    }

    #[test]
    fn notification_envelope_roundtrips_through_json() {
        let note = NotificationEnvelope { notification: "ThingRemoved".into(), params: serde_json::json!({"thingId": "abc"}) };
        let encoded = serde_json::to_string(&note).unwrap();
        let decoded: NotificationEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.notification, "ThingRemoved");
    }
}
