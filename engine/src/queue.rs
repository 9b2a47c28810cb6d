//! Pending action queue.
//!
//! One ordered list per temporary id. Every enqueue pushes the list's deadline
//! out by the TTL; a list whose deadline passes is dropped without replay.

use crate::{
    action::{PendingAction, QueuedAction},
    allocator::is_temporary,
    EntityId, Timestamp,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct PendingList {
    actions: Vec<QueuedAction>,
    expires_at: Timestamp,
}

/// Deferred mutations keyed by temporary id.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    lists: HashMap<EntityId, PendingList>,
    ttl: u64,
}

impl ActionQueue {
    /// Create a queue whose lists live for `ttl` milliseconds after their last enqueue.
    pub fn new(ttl: u64) -> Self {
        Self {
            lists: HashMap::new(),
            ttl,
        }
    }

    /// Start an empty list for a freshly inserted temp id.
    ///
    /// Does nothing if a list already exists.
    pub fn open(&mut self, temp_id: EntityId, now: Timestamp) {
        let ttl = self.ttl;
        self.lists.entry(temp_id).or_insert_with(|| PendingList {
            actions: Vec::new(),
            expires_at: now.saturating_add(ttl),
        });
    }

    /// Append `action` to the list for `temp_id` and reset its TTL.
    ///
    /// Returns `false` when `temp_id` is not a temporary id.
    pub fn enqueue(&mut self, temp_id: EntityId, action: PendingAction, now: Timestamp) -> bool {
        if !is_temporary(temp_id) {
            return false;
        }
        let expires_at = now.saturating_add(self.ttl);
        let list = self.lists.entry(temp_id).or_insert_with(|| PendingList {
            actions: Vec::new(),
            expires_at,
        });
        list.actions.push(QueuedAction {
            action,
            enqueued_at: now,
        });
        list.expires_at = expires_at;
        true
    }

    /// Discard the list for `temp_id` without replay.
    pub fn cancel(&mut self, temp_id: EntityId) -> usize {
        self.lists
            .remove(&temp_id)
            .map(|list| list.actions.len())
            .unwrap_or(0)
    }

    /// Remove and return the ordered list, or nothing if absent or expired.
    pub fn drain(&mut self, temp_id: EntityId, now: Timestamp) -> Vec<QueuedAction> {
        match self.lists.remove(&temp_id) {
            Some(list) if list.expires_at > now => list.actions,
            Some(list) => {
                tracing::debug!(
                    temp_id,
                    dropped = list.actions.len(),
                    "Pending action list expired before reconciliation"
                );
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Drop every list whose TTL has elapsed. Returns how many actions were lost.
    pub fn expire(&mut self, now: Timestamp) -> usize {
        let mut dropped = 0;
        self.lists.retain(|temp_id, list| {
            if list.expires_at > now {
                return true;
            }
            if !list.actions.is_empty() {
                tracing::debug!(
                    temp_id = *temp_id,
                    dropped = list.actions.len(),
                    "Abandoning expired pending actions"
                );
            }
            dropped += list.actions.len();
            false
        });
        dropped
    }

    /// Number of actions waiting for `temp_id`.
    pub fn pending_for(&self, temp_id: EntityId) -> usize {
        self.lists
            .get(&temp_id)
            .map(|list| list.actions.len())
            .unwrap_or(0)
    }

    /// Whether a list exists for `temp_id`.
    pub fn contains(&self, temp_id: EntityId) -> bool {
        self.lists.contains_key(&temp_id)
    }

    /// Number of open lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
