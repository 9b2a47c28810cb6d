//! Reconciliation of optimistic entities with server-assigned ids.
//!
//! When a creation is confirmed (by the create response or by the echoed
//! push, whichever comes first) the temporary id is swapped for the real one
//! everywhere the store refers to it. The queued actions are handed back to
//! the caller for replay. When a creation fails, [`Store::rollback`] undoes
//! the optimistic insert exactly.

use crate::{
    action::QueuedAction,
    cache::swap_id,
    store::{IndexKey, InsertedInto, Store},
    Entity, EntityId, Timestamp,
};
use tracing::{debug, info};

/// Result of [`Store::reconcile_created`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub real_id: EntityId,
    /// Actions queued behind the temp id, in enqueue order.
    pub replay: Vec<QueuedAction>,
    /// The temp entity was already gone; nothing was migrated.
    pub already_settled: bool,
}

impl Store {
    /// Swap `temp_id` for `real_id` in the entity map and every index.
    ///
    /// Reconciling a temp id that no longer exists (already reconciled, or
    /// dropped with a deleted ancestor) only clears what is left of its
    /// bookkeeping, so the second of (response, push) does nothing. Without
    /// a temp id, `real_id` gets at least a placeholder entry.
    pub fn reconcile_created(
        &mut self,
        real_id: EntityId,
        temp_id: Option<EntityId>,
        now: Timestamp,
    ) -> Reconciled {
        let Some(temp) = temp_id.and_then(|t| self.entities.remove(&t)) else {
            match temp_id {
                Some(temp) => {
                    self.discard_pending(temp, now);
                }
                None => {
                    self.entities
                        .entry(real_id)
                        .or_insert_with(|| Entity::placeholder(real_id, now));
                }
            }
            return Reconciled {
                real_id,
                replay: Vec::new(),
                already_settled: true,
            };
        };
        let temp_id = temp.id;

        // Fields a push already wrote under the real id are newer than ours.
        let merged = match self.entities.remove(&real_id) {
            Some(mut existing) if !existing.content.is_empty() => {
                existing.confirm(real_id);
                existing
            }
            _ => {
                let mut confirmed = temp;
                confirmed.confirm(real_id);
                confirmed
            }
        };
        let parent_id = merged.parent_id;
        self.entities.insert(real_id, merged);

        let mode = self.sort_mode;
        if swap_id(&mut self.top_level, temp_id, real_id) {
            mode.sort(&self.entities, &mut self.top_level);
        }
        if let Some(parent) = parent_id {
            if let Some(list) = self.replies.get_mut(&parent) {
                if swap_id(list, temp_id, real_id) {
                    mode.sort(&self.entities, list);
                }
            }
        }
        for page in self.cache.replace_id(temp_id, real_id) {
            if let Some(cached) = self.cache.get_mut(page) {
                mode.sort(&self.entities, &mut cached.ids);
            }
        }

        self.rekey_children(temp_id, real_id);

        if self.replying_to == Some(temp_id) {
            self.replying_to = Some(real_id);
        }
        if self.editing == Some(temp_id) {
            self.editing = Some(real_id);
        }

        self.temp_to_real
            .insert(temp_id, (real_id, now.saturating_add(self.config.id_mapping_ttl)));
        let replay = self.queue.drain(temp_id, now);

        if let Some(undo) = self.undo.remove(&temp_id) {
            self.dedup.settle(undo.token, now);
        }

        info!(temp_id, real_id, queued = replay.len(), "reconciled");
        Reconciled {
            real_id,
            replay,
            already_settled: false,
        }
    }

    /// Drop the undo record, token and queued actions of an optimistic
    /// entity that left the store without being reconciled. The token is
    /// settled so a late echo of the creation is ignored.
    pub(crate) fn discard_pending(&mut self, temp_id: EntityId, now: Timestamp) -> usize {
        if let Some(undo) = self.undo.remove(&temp_id) {
            self.dedup.settle(undo.token, now);
        }
        let dropped = self.queue.cancel(temp_id);
        if dropped > 0 {
            debug!(temp_id, dropped, "discarded queued actions");
        }
        dropped
    }

    /// Move replies keyed by a temp parent over to its real id.
    fn rekey_children(&mut self, temp_id: EntityId, real_id: EntityId) {
        if let Some(children) = self.replies.remove(&temp_id) {
            for child in &children {
                if let Some(entity) = self.entities.get_mut(child) {
                    entity.parent_id = Some(real_id);
                }
                if let Some(undo) = self.undo.get_mut(child) {
                    undo.inserted_into = InsertedInto::Replies { parent_id: real_id };
                }
            }
            let list = self.replies.entry(real_id).or_default();
            for child in children {
                if !list.contains(&child) {
                    list.push(child);
                }
            }
            self.sort_mode.sort(&self.entities, list);
        }
        if let Some(meta) = self.replies_meta.remove(&temp_id) {
            self.replies_meta.insert(real_id, meta);
        }
        if self.replies_visible.remove(&temp_id) {
            self.replies_visible.insert(real_id);
        }
        if let Some(due) = self.resort_due.remove(&IndexKey::Replies(temp_id)) {
            self.resort_due.insert(IndexKey::Replies(real_id), due);
        }
    }

    /// Undo an optimistic insert after its creation failed.
    ///
    /// Queued actions are discarded without replay. Replies created under
    /// the entity in the meantime are rolled back with it.
    pub fn rollback(&mut self, temp_id: EntityId) -> bool {
        let Some(entity) = self.entities.remove(&temp_id) else {
            return false;
        };

        match self.undo.remove(&temp_id) {
            Some(undo) => {
                match undo.inserted_into {
                    InsertedInto::Replies { parent_id } => {
                        if let Some(list) = self.replies.get_mut(&parent_id) {
                            list.retain(|id| *id != temp_id);
                        }
                        if let (Some(parent), Some(count)) =
                            (self.entities.get_mut(&parent_id), undo.parent_child_count)
                        {
                            parent.child_count = count;
                        }
                    }
                    InsertedInto::TopLevel => self.top_level.retain(|id| *id != temp_id),
                    InsertedInto::CachedPage { .. } => {}
                }
                self.dedup.forget(undo.token);
            }
            None => {
                if let Some(list) = entity.parent_id.and_then(|p| self.replies.get_mut(&p)) {
                    list.retain(|id| *id != temp_id);
                }
                self.top_level.retain(|id| *id != temp_id);
            }
        }
        self.cache.remove_id(temp_id);

        let dropped = self.queue.cancel(temp_id);
        if self.replying_to == Some(temp_id) {
            self.replying_to = None;
        }
        if self.editing == Some(temp_id) {
            self.editing = None;
        }

        if let Some(children) = self.replies.remove(&temp_id) {
            for child in children {
                self.rollback(child);
            }
        }
        self.replies_meta.remove(&temp_id);
        self.replies_visible.remove(&temp_id);

        debug!(temp_id, dropped, "rolled back");
        true
    }
}
