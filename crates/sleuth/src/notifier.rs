//! Edge-triggered availability notifications.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::MutexGuard;

/// Signals waiters that newly-joined peers may have satisfied a pending
/// requirement.
///
/// Publishing is allowed only while a waiter has armed the notifier;
/// unarmed publishes are dropped outright, neither buffered nor blocking.
/// A waiter re-checks its condition after every signal, so coalescing
/// signals while one is already pending loses nothing.
pub(crate) struct Notifier {
    active: Mutex<bool>,
    signals: Sender<()>,
    waiter: AsyncMutex<Receiver<()>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (signals, receiver) = mpsc::channel(1);
        Self {
            active: Mutex::new(false),
            signals,
            waiter: AsyncMutex::new(receiver),
        }
    }

    /// Publishes a signal if a waiter is armed.
    pub fn notify(&self) {
        if !*self.active.lock().unwrap() {
            return;
        }
        match self.signals.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {}
        }
    }

    pub fn activate(&self) {
        *self.active.lock().unwrap() = true;
    }

    pub fn deactivate(&self) {
        *self.active.lock().unwrap() = false;
    }

    /// Acquires the waiter side. Holding the guard serializes concurrent
    /// waiters; signals are consumed through it.
    pub async fn waiter(&self) -> MutexGuard<'_, Receiver<()>> {
        self.waiter.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_unarmed_is_dropped() {
        let notifier = Notifier::new();
        notifier.notify();
        notifier.activate();
        let mut waiter = notifier.waiter().await;
        assert!(waiter.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_armed_signals_waiter() {
        let notifier = Notifier::new();
        notifier.activate();
        notifier.notify();
        let mut waiter = notifier.waiter().await;
        assert!(waiter.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_notify_saturated_does_not_block() {
        let notifier = Notifier::new();
        notifier.activate();
        notifier.notify();
        notifier.notify();
        notifier.notify();
        let mut waiter = notifier.waiter().await;
        assert!(waiter.try_recv().is_ok());
        // Extra signals were coalesced, not queued.
        assert!(waiter.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deactivate_drops_later_notifies() {
        let notifier = Notifier::new();
        notifier.activate();
        notifier.deactivate();
        notifier.notify();
        let mut waiter = notifier.waiter().await;
        assert!(waiter.try_recv().is_err());
    }
}
