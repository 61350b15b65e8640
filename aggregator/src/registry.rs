//! Registry of in-flight tasks.
//!
//! Each request hash maps to a slot: a lock guarding the mailbox of the task currently
//! serving that request (or nothing, once the task has retired). The registry lock is
//! only held to look up, insert, or remove a slot; the task's own state is reached
//! through the slot lock.

use crate::{task::Mailbox, types::RequestHash};
use async_lock::Mutex as AsyncMutex;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Per-task lock, holding the task's mailbox while the task is collecting.
pub type Slot = Arc<AsyncMutex<Option<Mailbox>>>;

/// Maps request hashes to the [Slot] of the task serving them.
#[derive(Clone, Default)]
pub struct Registry {
    slots: Arc<Mutex<HashMap<RequestHash, Slot>>>,
}

impl Registry {
    /// Returns the slot for `hash`, creating an empty one if none exists.
    pub fn get_or_create(&self, hash: RequestHash) -> Slot {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(hash).or_default().clone()
    }

    /// Returns the slot for `hash`, if any.
    pub fn get(&self, hash: &RequestHash) -> Option<Slot> {
        self.slots.lock().unwrap().get(hash).cloned()
    }

    /// Returns true if `slot` is still the registered slot for `hash`.
    pub fn is_current(&self, hash: &RequestHash, slot: &Slot) -> bool {
        self.slots
            .lock()
            .unwrap()
            .get(hash)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Removes `slot` from the registry (if it is still the registered slot for `hash`).
    pub fn remove(&self, hash: &RequestHash, slot: &Slot) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match slots.get(hash) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                slots.remove(hash);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, hash: &RequestHash) -> bool {
        self.slots.lock().unwrap().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}
