use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ThingError;
use crate::ids::{PairingTransactionId, PluginId, ThingClassId};
use crate::types::ParamList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingState {
    Created,
    AwaitingConfirmation,
    Confirmed,
    Failed,
    Expired,
}

#[derive(Debug, Clone)]
pub struct PairingTransaction {
    pub id: PairingTransactionId,
    pub thing_class_id: ThingClassId,
    pub plugin_id: PluginId,
    pub params: ParamList,
    pub state: PairingState,
    pub pairing_info: Option<String>,
    created_at: Instant,
}

/// Tracks in-flight pairing handshakes (spec §4.5): `Created` ->
/// `AwaitingConfirmation` -> `{Confirmed|Failed|Expired}`. A transaction
/// that a plugin never confirms is swept by `sweep_expired` once its TTL
/// elapses.
///
/// Grounded on the teacher's handle-keyed table pattern in `DataStore`
/// (`datastore.rs`), here keyed by [`PairingTransactionId`] with explicit
/// state instead of an implicit plugin-side connection handle.
pub struct PairingFsm {
    transactions: RwLock<HashMap<PairingTransactionId, PairingTransaction>>,
    ttl: Duration,
}

impl PairingFsm {
    pub fn new(ttl: Duration) -> Self {
        Self { transactions: RwLock::new(HashMap::new()), ttl }
    }

    pub async fn begin(&self, thing_class_id: ThingClassId, plugin_id: PluginId, params: ParamList, pairing_info: Option<String>) -> PairingTransactionId {
        let id = PairingTransactionId::new();
        let transaction = PairingTransaction {
            id,
            thing_class_id,
            plugin_id,
            params,
            state: PairingState::Created,
            pairing_info,
            created_at: Instant::now(),
        };
        self.transactions.write().await.insert(id, transaction);
        id
    }

    pub async fn mark_awaiting_confirmation(&self, id: PairingTransactionId) -> Result<(), ThingError> {
        let mut guard = self.transactions.write().await;
        let t = guard.get_mut(&id).ok_or(ThingError::ItemNotFound)?;
        if t.state != PairingState::Created {
            return Err(ThingError::Aborted);
        }
        t.state = PairingState::AwaitingConfirmation;
        Ok(())
    }

    pub async fn get(&self, id: PairingTransactionId) -> Result<PairingTransaction, ThingError> {
        self.transactions.read().await.get(&id).cloned().ok_or(ThingError::ItemNotFound)
    }

    /// Terminates a transaction as `Confirmed` or `Failed`. A transaction
    /// already terminal (including one already swept to `Expired`) rejects
    /// a late confirmation, since the thing's fate was already decided.
    pub async fn terminate(&self, id: PairingTransactionId, confirmed: bool) -> Result<PairingTransaction, ThingError> {
        let mut guard = self.transactions.write().await;
        let t = guard.get_mut(&id).ok_or(ThingError::ItemNotFound)?;
        if matches!(t.state, PairingState::Confirmed | PairingState::Failed | PairingState::Expired) {
            return Err(ThingError::Aborted);
        }
        t.state = if confirmed { PairingState::Confirmed } else { PairingState::Failed };
        Ok(t.clone())
    }

    /// Marks every transaction past its TTL as `Expired`, returning the ids
    /// swept this pass. Intended to be called periodically from a
    /// background task (spec §4.5 "TTL >= 5 minutes").
    pub async fn sweep_expired(&self) -> Vec<PairingTransactionId> {
        let mut guard = self.transactions.write().await;
        let mut expired = Vec::new();
        for (id, t) in guard.iter_mut() {
            if matches!(t.state, PairingState::Confirmed | PairingState::Failed | PairingState::Expired) {
                continue;
            }
            if t.created_at.elapsed() >= self.ttl {
                t.state = PairingState::Expired;
                expired.push(*id);
            }
        }
        expired
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_happy_path() {
        let fsm = PairingFsm::new(Duration::from_secs(300));
        let id = fsm.begin(ThingClassId::new(), PluginId::new(), ParamList::new(), Some("243681".into())).await;
        fsm.mark_awaiting_confirmation(id).await.unwrap();
        let t = fsm.terminate(id, true).await.unwrap();
        assert_eq!(t.state, PairingState::Confirmed);
    }

    #[tokio::test]
    async fn double_terminate_is_rejected() {
        let fsm = PairingFsm::new(Duration::from_secs(300));
        let id = fsm.begin(ThingClassId::new(), PluginId::new(), ParamList::new(), None).await;
        fsm.terminate(id, false).await.unwrap();
        let err = fsm.terminate(id, true).await.unwrap_err();
        assert_eq!(err, ThingError::Aborted);
    }

    #[tokio::test]
    async fn sweep_expires_stale_transactions() {
        let fsm = PairingFsm::new(Duration::from_millis(10));
        let id = fsm.begin(ThingClassId::new(), PluginId::new(), ParamList::new(), None).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = fsm.sweep_expired().await;
        assert_eq!(expired, vec![id]);

        let err = fsm.terminate(id, true).await.unwrap_err();
        assert_eq!(err, ThingError::Aborted);
    }

    #[tokio::test]
    async fn sweep_ignores_already_terminal_transactions() {
        let fsm = PairingFsm::new(Duration::from_millis(10));
        let id = fsm.begin(ThingClassId::new(), PluginId::new(), ParamList::new(), None).await;
        fsm.terminate(id, true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = fsm.sweep_expired().await;
        assert!(expired.is_empty());
    }
}
