//! The pending-call table.

use std::collections::HashMap;
use std::sync::Mutex;

use http::Response;
use sleuth_common::{codes, Error, Result};
use tokio::sync::oneshot;

/// What a caller receives through its slot: the response, or `None` when
/// the call timed out.
pub(crate) type Delivery = Option<Response<Vec<u8>>>;

/// Correlation handle → single-shot delivery slot.
///
/// Exactly one producer publishes into each slot: whichever of the
/// dispatcher (response arrived) and the timer (deadline passed) removes
/// the sender from the table under the lock owns delivery. The loser finds
/// the handle gone and does nothing.
pub(crate) struct PendingCalls {
    slots: Mutex<HashMap<String, oneshot::Sender<Delivery>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the delivery slot for a newly issued call.
    pub fn register(&self, handle: String, slot: oneshot::Sender<Delivery>) {
        self.slots.lock().unwrap().insert(handle, slot);
    }

    /// Routes a response to the caller awaiting `handle`. Fails with
    /// `ERR_RECV` (921) if no such call is outstanding, which is the normal
    /// fate of responses that lost the race against their timeout.
    pub fn deliver(&self, handle: &str, response: Response<Vec<u8>>) -> Result<()> {
        let slot = self.slots.lock().unwrap().remove(handle);
        match slot {
            Some(slot) => {
                // The caller may have given up; delivery to a dropped
                // receiver is a no-op.
                let _ = slot.send(Some(response));
                Ok(())
            }
            None => Err(Error::new(
                codes::ERR_RECV,
                format!("unknown handle {handle}"),
            )),
        }
    }

    /// Delivers the timeout sentinel if the call is still outstanding.
    pub fn expire(&self, handle: &str) {
        if let Some(slot) = self.slots.lock().unwrap().remove(handle) {
            let _ = slot.send(None);
        }
    }

    /// Drops every outstanding slot, waking each caller with a closed
    /// channel. Used when the client shuts down.
    pub fn clear(&self) {
        self.slots.lock().unwrap().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}
