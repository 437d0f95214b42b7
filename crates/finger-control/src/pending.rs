use std::sync::{Arc, Mutex, PoisonError};

/// Single-slot hand-off for the latest external state string.
///
/// Writers overwrite whatever is waiting; the control loop takes at most one value
/// per tick. Clones share the slot.
#[derive(Clone, Debug, Default)]
pub struct PendingState {
    slot: Arc<Mutex<Option<String>>>,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending value. Returns the value it displaced, if any.
    pub fn publish(&self, state: impl Into<String>) -> Option<String> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.replace(state.into())
    }

    pub fn take(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Put back a value whose command could not be written. A newer value that
    /// arrived in the meantime wins and `state` is dropped.
    pub fn requeue(&self, state: impl Into<String>) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(state.into());
        true
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
