//! Suppression of pushes that echo mutations this client already applied.
//!
//! A create request carries a correlation token. The server echoes the token
//! in its `create` push, so whichever of (response, push) arrives first
//! reconciles and the other one is recognized here and dropped.

use crate::{notification::NotificationKind, CorrelationToken, EntityId, Notification, Timestamp};
use std::collections::HashMap;

/// What to do with an incoming push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushVerdict {
    /// The push confirms one of our pending creations.
    Reconcile { temp_id: EntityId, real_id: EntityId },
    /// Already handled through the other path.
    Duplicate,
    /// Not ours; apply it by kind.
    Dispatch,
}

/// Token bookkeeping with expiring entries.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    /// token -> (temp id, deadline)
    pending: HashMap<CorrelationToken, (EntityId, Timestamp)>,
    /// token -> deadline
    processed: HashMap<CorrelationToken, Timestamp>,
    ttl: u64,
}

impl Deduplicator {
    pub fn new(ttl: u64) -> Self {
        Self {
            pending: HashMap::new(),
            processed: HashMap::new(),
            ttl,
        }
    }

    /// Remember that `token` belongs to the creation of `temp_id`.
    pub fn register(&mut self, token: CorrelationToken, temp_id: EntityId, now: Timestamp) {
        self.pending.insert(token, (temp_id, now.saturating_add(self.ttl)));
    }

    /// Temp id a live token maps to.
    pub fn temp_for(&self, token: CorrelationToken, now: Timestamp) -> Option<EntityId> {
        self.pending
            .get(&token)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(temp, _)| *temp)
    }

    /// The creation was reconciled: drop the mapping and remember the token.
    pub fn settle(&mut self, token: CorrelationToken, now: Timestamp) {
        self.pending.remove(&token);
        self.processed.insert(token, now.saturating_add(self.ttl));
    }

    /// The creation failed: forget the token entirely.
    pub fn forget(&mut self, token: CorrelationToken) {
        self.pending.remove(&token);
        self.processed.remove(&token);
    }

    pub fn is_processed(&self, token: CorrelationToken, now: Timestamp) -> bool {
        self.processed.get(&token).is_some_and(|deadline| *deadline > now)
    }

    /// Decide how to handle `push`.
    pub fn classify(&mut self, push: &Notification, now: Timestamp) -> PushVerdict {
        let Some(token) = push.client_tmp_id else {
            return PushVerdict::Dispatch;
        };

        if let Some(temp_id) = self.temp_for(token, now) {
            if push.kind() == NotificationKind::Create {
                if let Some(real_id) = push.id.filter(|id| *id > 0) {
                    self.settle(token, now);
                    return PushVerdict::Reconcile { temp_id, real_id };
                }
            }
        }

        if self.is_processed(token, now) {
            return PushVerdict::Duplicate;
        }

        PushVerdict::Dispatch
    }

    /// Drop expired entries.
    pub fn expire(&mut self, now: Timestamp) {
        self.pending.retain(|_, (_, deadline)| *deadline > now);
        self.processed.retain(|_, deadline| *deadline > now);
    }

    /// Number of creations still waiting for confirmation.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
