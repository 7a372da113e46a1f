use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::token::ActionToken;

/// Single slot handing the action token from a completed step-up
/// verification to the one request that spends it.
///
/// Only the coordinator writes here, immediately before running the guarded
/// operation, and clears it again once the operation settles. The outbound
/// transport reads the slot when attaching the proof header.
#[derive(Debug, Default)]
pub struct ActionTokenChannel {
    slot: Mutex<Option<ActionToken>>,
}

impl ActionTokenChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh token. Any leftover value is replaced; a stale proof
    /// must never outlive the verification that produced it.
    pub fn set(&self, token: ActionToken) {
        *lock(&self.slot) = Some(token);
    }

    /// Empties the slot. Safe to call when already empty.
    pub fn clear(&self) {
        *lock(&self.slot) = None;
    }

    /// Current token, if a verified operation is running.
    #[must_use]
    pub fn current(&self) -> Option<ActionToken> {
        lock(&self.slot).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
