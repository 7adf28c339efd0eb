use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;

use crate::browser::BrowserItem;
use crate::error::ThingError;
use crate::ids::{PairingTransactionId, ThingDescriptorId};
use crate::thing::Thing;
use crate::types::ThingDescriptor;

/// Shared state behind an [`Info`] handle. Exactly one of `finish`'s callers
/// wins the race to set `result`; every other caller (including a timed-out
/// `await_result`) observes a no-op (spec §4.4, §5, §8 "Timeout+finish
/// race").
struct InfoShared<O> {
    finished: AtomicBool,
    result: Mutex<Option<Result<O, ThingError>>>,
    notify: Notify,
}

impl<O> InfoShared<O> {
    fn new() -> Self {
        Self {
            finished: AtomicBool::new(false),
            result: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

/// A single in-flight async plugin operation (Discover/Pair/Setup/Action/
/// Browse/BrowserAction/BrowserItemAction). Grounded on the teacher's
/// request/response handshake in `pluginloader.rs`'s `LoaderMessage` loop,
/// but expressed as a reusable struct instead of one bespoke channel pair
/// per operation kind.
pub struct Info<O> {
    shared: Arc<InfoShared<O>>,
}

impl<O> Clone for Info<O> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<O> Info<O> {
    pub fn new() -> Self {
        Self { shared: Arc::new(InfoShared::new()) }
    }

    /// Resolves the operation. Only the first call has any effect; later
    /// calls (a plugin finishing after the hub already timed it out, or a
    /// plugin finishing twice) are logged and dropped.
    pub async fn finish(&self, result: Result<O, ThingError>) {
        if self.shared.finished.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            log::warn!("Info object finished more than once; ignoring the later result");
            return;
        }
        *self.shared.result.lock().await = Some(result);
        self.shared.notify.notify_waiters();
    }

    /// Awaits the result, racing the plugin's completion against `timeout`.
    /// If the timeout wins the race, this also finishes the Info with
    /// `ThingError::Timeout` so a subsequently-arriving plugin completion is
    /// discarded rather than silently overwriting an already-returned error.
    pub async fn await_result(&self, timeout: Duration) -> Result<O, ThingError> {
        // Register as a waiter before checking `finished` so a finish() that
        // lands between the check and the select below is never missed.
        let notified = self.shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.shared.finished.load(Ordering::SeqCst) {
            return self.take_result().await;
        }

        tokio::select! {
            _ = notified => {
                self.take_result().await
            }
            _ = sleep(timeout) => {
                if self.shared.finished.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                    Err(ThingError::Timeout)
                } else {
                    // finish() won the race concurrently with our sleep elapsing.
                    self.take_result().await
                }
            }
        }
    }

    async fn take_result(&self) -> Result<O, ThingError> {
        self.shared
            .result
            .lock()
            .await
            .take()
            .unwrap_or(Err(ThingError::Timeout))
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }
}

impl<O> Default for Info<O> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ThingDiscoveryInfo = Info<Vec<ThingDescriptor>>;
pub type ThingPairingInfo = Info<PairingResult>;
pub type ThingSetupInfo = Info<()>;
pub type ThingActionInfo = Info<()>;
pub type BrowseResultInfo = Info<Vec<BrowserItem>>;
pub type BrowserItemInfo = Info<BrowserItem>;
pub type BrowserActionInfo = Info<()>;
pub type BrowserItemActionInfo = Info<()>;

/// Outcome of the pairing handshake's final plugin confirmation step.
#[derive(Debug, Clone)]
pub struct PairingResult {
    pub transaction_id: PairingTransactionId,
    pub thing: Thing,
}

/// Placeholder referenced by descriptor-driven discovery results before a
/// Thing has been materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRef(pub ThingDescriptorId);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn finish_then_await_returns_value() {
        let info: Info<u32> = Info::new();
        info.finish(Ok(42)).await;
        let result = info.await_result(Duration::from_secs(5)).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn concurrent_finish_delivers_to_waiter() {
        let info: Info<u32> = Info::new();
        let waiter = info.clone();
        let handle = tokio::spawn(async move { waiter.await_result(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        info.finish(Ok(7)).await;

        assert_eq!(handle.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn timeout_wins_when_plugin_never_finishes() {
        let info: Info<u32> = Info::new();
        let result = info.await_result(Duration::from_millis(20)).await;
        assert_eq!(result.unwrap_err(), ThingError::Timeout);
        assert!(info.is_finished());
    }

    #[tokio::test]
    async fn double_finish_keeps_first_result() {
        let info: Info<u32> = Info::new();
        info.finish(Ok(1)).await;
        info.finish(Ok(2)).await;
        assert_eq!(info.await_result(Duration::from_secs(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn late_finish_after_timeout_is_dropped() {
        let info: Info<u32> = Info::new();
        let result = info.await_result(Duration::from_millis(20)).await;
        assert_eq!(result.unwrap_err(), ThingError::Timeout);

        // A plugin that completes after the hub already timed it out must
        // not be observable: this finish() is a no-op.
        info.finish(Ok(99)).await;
        assert!(info.is_finished());
    }
}
