//! Store - the in-memory state container.
//!
//! The Store owns the entity map and every index that refers to it: the
//! visible top-level list, per-parent reply lists and the page cache. It also
//! owns the bookkeeping of in-flight creations (undo records, the pending
//! action queue, correlation tokens and the temp -> real map).
//!
//! Every method is a synchronous critical section. Nothing here awaits;
//! [`crate::Synchronizer`] drives the remote calls and feeds results back in.

use crate::{
    action::{CreateRequest, PendingAction, ThreadRef},
    allocator::{is_temporary, IdentityAllocator},
    cache::PageCache,
    config::SyncConfig,
    dedup::{Deduplicator, PushVerdict},
    error::Result,
    notification::NotificationKind,
    queue::ActionQueue,
    remote::Page,
    sort::SortMode,
    validation::{ContentPolicy, Viewer},
    CorrelationToken, Entity, EntityId, EntityPatch, Error, Notification, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// An ordered list of ids the store keeps sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKey {
    TopLevel,
    Replies(EntityId),
}

/// Where an optimistic entity was inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsertedInto {
    TopLevel,
    Replies { parent_id: EntityId },
    CachedPage { page: usize },
}

/// What rollback needs to undo an optimistic insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRecord {
    pub inserted_into: InsertedInto,
    /// Parent's child count before the insert (replies only)
    pub parent_child_count: Option<u32>,
    pub token: CorrelationToken,
}

/// An optimistic creation waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub temp_id: EntityId,
    pub token: CorrelationToken,
    pub request: CreateRequest,
    /// The parent is itself temporary; the request was queued on it instead
    /// of being sent now.
    pub deferred: bool,
}

/// Paging state of one reply list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepliesMeta {
    pub page: usize,
    pub has_more: bool,
    pub loading: bool,
}

/// One line of the flattened reply tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRow {
    pub id: EntityId,
    pub depth: usize,
}

/// A transient message for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }
}

/// Result of feeding a push into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Confirms a pending creation; the caller must reconcile and replay.
    Reconcile { temp_id: EntityId, real_id: EntityId },
    /// Echo of something already applied.
    Duplicate,
    Applied,
    /// The visible page emptied; the caller should load `page`.
    Reload { page: usize },
    /// Malformed, unknown or about an entity we do not hold.
    Ignored,
}

/// In-memory state of one comment thread.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) config: SyncConfig,
    pub(crate) thread: ThreadRef,
    pub(crate) viewer: Viewer,
    pub(crate) policy: ContentPolicy,
    pub(crate) allocator: IdentityAllocator,

    pub(crate) entities: HashMap<EntityId, Entity>,
    pub(crate) top_level: Vec<EntityId>,
    pub(crate) replies: HashMap<EntityId, Vec<EntityId>>,
    pub(crate) replies_meta: HashMap<EntityId, RepliesMeta>,
    pub(crate) replies_visible: HashSet<EntityId>,
    pub(crate) cache: PageCache,

    pub(crate) page: usize,
    pub(crate) has_more: bool,
    pub(crate) max_page: usize,
    pub(crate) sort_mode: SortMode,

    pub(crate) undo: HashMap<EntityId, UndoRecord>,
    pub(crate) queue: ActionQueue,
    pub(crate) dedup: Deduplicator,
    /// temp id -> (real id, deadline)
    pub(crate) temp_to_real: HashMap<EntityId, (EntityId, Timestamp)>,
    /// Debounced re-sorts, keyed by list
    pub(crate) resort_due: HashMap<IndexKey, Timestamp>,

    pub(crate) replying_to: Option<EntityId>,
    pub(crate) editing: Option<EntityId>,
    pub(crate) notices: Vec<Notice>,
}

impl Store {
    /// Create an empty store for `thread` as seen by `viewer`.
    pub fn new(thread: ThreadRef, viewer: Viewer, config: SyncConfig) -> Self {
        Self {
            policy: ContentPolicy::new(config.max_content_len),
            allocator: IdentityAllocator::new(),
            entities: HashMap::new(),
            top_level: Vec::new(),
            replies: HashMap::new(),
            replies_meta: HashMap::new(),
            replies_visible: HashSet::new(),
            cache: PageCache::new(config.page_cache_ttl),
            page: 0,
            has_more: false,
            max_page: 1,
            sort_mode: SortMode::default(),
            undo: HashMap::new(),
            queue: ActionQueue::new(config.action_queue_ttl),
            dedup: Deduplicator::new(config.token_ttl),
            temp_to_real: HashMap::new(),
            resort_due: HashMap::new(),
            replying_to: None,
            editing: None,
            notices: Vec::new(),
            config,
            thread,
            viewer,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn thread(&self) -> &ThreadRef {
        &self.thread
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn policy(&self) -> &ContentPolicy {
        &self.policy
    }

    pub fn set_reserved_words(&mut self, words: Vec<String>) {
        self.policy.set_reserved_words(words);
    }

    /// Get an entity by id.
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Number of entities in the map.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Visible top-level ids, in display order.
    pub fn top_level(&self) -> &[EntityId] {
        &self.top_level
    }

    /// Loaded replies of `parent`, in display order.
    pub fn replies(&self, parent: EntityId) -> &[EntityId] {
        self.replies.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn replies_meta(&self, parent: EntityId) -> Option<&RepliesMeta> {
        self.replies_meta.get(&parent)
    }

    pub fn replies_visible(&self, parent: EntityId) -> bool {
        self.replies_visible.contains(&parent)
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    /// Current top-level page (zero-based).
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Number of top-level pages reported by the server.
    pub fn max_page(&self) -> usize {
        self.max_page
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn undo_record(&self, temp_id: EntityId) -> Option<&UndoRecord> {
        self.undo.get(&temp_id)
    }

    /// Number of actions queued behind `temp_id`.
    pub fn pending_actions(&self, temp_id: EntityId) -> usize {
        self.queue.pending_for(temp_id)
    }

    /// Whether a debounced re-sort of `key` is waiting.
    pub fn resort_scheduled(&self, key: IndexKey) -> bool {
        self.resort_due.contains_key(&key)
    }

    /// Follow a recently reconciled temp id to its real id.
    pub fn resolve(&self, id: EntityId) -> EntityId {
        if !is_temporary(id) || self.entities.contains_key(&id) {
            return id;
        }
        self.temp_to_real
            .get(&id)
            .map(|(real, _)| *real)
            .unwrap_or(id)
    }

    pub fn replying_to(&self) -> Option<EntityId> {
        self.replying_to
    }

    pub fn editing(&self) -> Option<EntityId> {
        self.editing
    }

    /// Depth-annotated flattening of the visible tree.
    pub fn thread_rows(&self) -> Vec<ThreadRow> {
        let mut rows = Vec::new();
        self.collect_rows(&self.top_level, 0, &mut rows);
        rows
    }

    fn collect_rows(&self, ids: &[EntityId], depth: usize, rows: &mut Vec<ThreadRow>) {
        for &id in ids {
            rows.push(ThreadRow { id, depth });
            if self.replies_visible.contains(&id) {
                self.collect_rows(self.replies(id), depth + 1, rows);
            }
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    /// Remove and return queued notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Apply every deadline that has passed. Returns `true` if a visible
    /// list was re-sorted.
    pub fn sweep(&mut self, now: Timestamp) -> bool {
        let expired = self.queue.expire(now);
        if expired > 0 {
            debug!(expired, "dropped expired action queues");
        }
        self.dedup.expire(now);
        self.temp_to_real.retain(|_, (_, deadline)| *deadline > now);

        let due: Vec<IndexKey> = self
            .resort_due
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in &due {
            self.resort_due.remove(key);
            self.resort(*key);
        }
        !due.is_empty()
    }

    /// Re-sort `key` once the debounce window passes. Rescheduling pushes
    /// the deadline out.
    pub fn schedule_resort(&mut self, key: IndexKey, now: Timestamp) {
        self.resort_due
            .insert(key, now.saturating_add(self.config.resort_debounce));
    }

    fn resort(&mut self, key: IndexKey) {
        let mode = self.sort_mode;
        match key {
            IndexKey::TopLevel => {
                mode.sort(&self.entities, &mut self.top_level);
                if let Some(cached) = self.cache.get_mut(self.page) {
                    mode.sort(&self.entities, &mut cached.ids);
                }
            }
            IndexKey::Replies(parent) => {
                if let Some(list) = self.replies.get_mut(&parent) {
                    mode.sort(&self.entities, list);
                }
            }
        }
    }

    /// Switch the sort policy and re-sort every loaded list immediately.
    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
        mode.sort(&self.entities, &mut self.top_level);
        for list in self.replies.values_mut() {
            mode.sort(&self.entities, list);
        }
        for (_, cached) in self.cache.pages_mut() {
            mode.sort(&self.entities, &mut cached.ids);
        }
        self.resort_due.clear();
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn check_create(&self, content: &str) -> Result<()> {
        self.policy.check_create(&self.viewer, content)
    }

    /// Check an edit and return the id to act on.
    pub fn check_edit(&self, id: EntityId, content: &str) -> Result<EntityId> {
        let id = self.resolve(id);
        let entity = self.entities.get(&id).ok_or(Error::EntityNotFound(id))?;
        self.policy.check_edit(&self.viewer, entity, content)?;
        Ok(id)
    }

    /// Check a deletion and return the id to act on.
    pub fn check_delete(&self, id: EntityId) -> Result<EntityId> {
        let id = self.resolve(id);
        let entity = self.entities.get(&id).ok_or(Error::EntityNotFound(id))?;
        self.policy.check_delete(&self.viewer, entity)?;
        Ok(id)
    }

    // ========================================================================
    // Optimistic mutations
    // ========================================================================

    /// Insert an optimistic comment and record how to undo it.
    ///
    /// A top-level comment goes to the visible list and the first page's
    /// cache, unless the first page is shown and full, in which case it is
    /// appended to the last cached page after it. A reply is
    /// prepended to its parent's list and bumps the parent's child count.
    pub fn insert_optimistic(
        &mut self,
        content: &str,
        parent_id: Option<EntityId>,
        now: Timestamp,
    ) -> PendingCreate {
        let parent_id = parent_id.map(|p| self.resolve(p));
        let temp_id = self.allocator.allocate(now);
        let token = self.allocator.token(now);
        let content = content.trim();

        let entity = Entity::optimistic(
            temp_id,
            content,
            Some(self.viewer.author()),
            parent_id,
            now,
        );
        self.entities.insert(temp_id, entity);
        self.queue.open(temp_id, now);

        let (inserted_into, parent_child_count) = match parent_id {
            Some(parent) => {
                self.replies.entry(parent).or_default().insert(0, temp_id);
                self.replies_visible.insert(parent);
                let previous = self.entities.get_mut(&parent).map(|p| {
                    let previous = p.child_count;
                    p.child_count += 1;
                    previous
                });
                (InsertedInto::Replies { parent_id: parent }, previous)
            }
            None => {
                let first_page_full = self.page == 0
                    && self
                        .cache
                        .get(0)
                        .is_some_and(|p| p.ids.len() >= self.config.page_size);
                if first_page_full {
                    // A page that was never fetched is created unfetched, so
                    // showing it loads the server rows and keeps the insert.
                    let page = self.cache.last_page().filter(|p| *p > 0).unwrap_or(1);
                    self.cache.local_entry(page).ids.push(temp_id);
                    (InsertedInto::CachedPage { page }, None)
                } else {
                    self.top_level.push(temp_id);
                    if let Some(cached) = self.cache.get_mut(0) {
                        cached.ids.push(temp_id);
                    }
                    (InsertedInto::TopLevel, None)
                }
            }
        };

        self.undo.insert(
            temp_id,
            UndoRecord {
                inserted_into,
                parent_child_count,
                token,
            },
        );
        self.dedup.register(token, temp_id, now);

        let request = CreateRequest::new(&self.thread, content, parent_id);
        let deferred = parent_id.is_some_and(is_temporary);
        if let Some(parent) = parent_id.filter(|p| is_temporary(*p)) {
            self.queue.enqueue(
                parent,
                PendingAction::NestedCreation {
                    request: request.clone(),
                    child_temp_id: temp_id,
                    token,
                },
                now,
            );
        }

        debug!(temp_id, ?parent_id, deferred, "optimistic insert");
        PendingCreate {
            temp_id,
            token,
            request,
            deferred,
        }
    }

    /// Queue `action` behind the creation of `temp_id`.
    ///
    /// Fails for an id that is not a live optimistic entity.
    pub fn enqueue(&mut self, temp_id: EntityId, action: PendingAction, now: Timestamp) -> bool {
        if !self.entities.contains_key(&temp_id) {
            return false;
        }
        self.queue.enqueue(temp_id, action, now)
    }

    /// Take an entity out of every index but keep it in the map.
    ///
    /// Used when deleting an entity that is still being created: the server
    /// copy is removed by a queued action once the id is known.
    pub fn hide(&mut self, id: EntityId) -> bool {
        let Some(parent) = self.entities.get(&id).map(|e| e.parent_id) else {
            return false;
        };
        if let Some(list) = parent.and_then(|p| self.replies.get_mut(&p)) {
            list.retain(|c| *c != id);
        }
        self.top_level.retain(|c| *c != id);
        self.cache.remove_id(id);
        self.clear_ui_state(id);
        true
    }

    // ========================================================================
    // Server state
    // ========================================================================

    /// Feed a live notification into the store.
    pub fn handle_push(&mut self, push: &Notification, now: Timestamp) -> PushOutcome {
        match self.dedup.classify(push, now) {
            PushVerdict::Reconcile { temp_id, real_id } => {
                return PushOutcome::Reconcile { temp_id, real_id };
            }
            PushVerdict::Duplicate => {
                debug!(kind = %push.kind, id = ?push.id, "duplicate push");
                return PushOutcome::Duplicate;
            }
            PushVerdict::Dispatch => {}
        }

        let kind = push.kind();
        if kind == NotificationKind::Unknown {
            warn!(kind = %push.kind, "ignoring push of unknown kind");
            return PushOutcome::Ignored;
        }
        let id = match push.require_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "ignoring push");
                return PushOutcome::Ignored;
            }
        };

        let applied = match kind {
            NotificationKind::Create => {
                self.upsert_pushed(push, now);
                true
            }
            NotificationKind::Update => self.apply_update(id, &push.patch()),
            NotificationKind::ParentUpdate => match push.child_count {
                Some(count) => self.apply_parent_update(id, count),
                None => {
                    warn!(id, "parent_update without child_count");
                    false
                }
            },
            NotificationKind::Delete => {
                if let Some(page) = self.apply_delete(id, push.parent_id, now) {
                    return PushOutcome::Reload { page };
                }
                true
            }
            NotificationKind::LikeToggle => match push.like_count {
                Some(count) => self.apply_like_count(id, push.parent_id, count, now),
                None => {
                    warn!(id, "like_toggle without like_count");
                    false
                }
            },
            NotificationKind::Unknown => false,
        };

        if applied {
            PushOutcome::Applied
        } else {
            PushOutcome::Ignored
        }
    }

    fn upsert_pushed(&mut self, push: &Notification, now: Timestamp) {
        let entity = match push.to_entity(now) {
            Ok(entity) => entity,
            Err(e) => {
                warn!(error = %e, "ignoring create push");
                return;
            }
        };
        let id = entity.id;
        if let Some(existing) = self.entities.get_mut(&id) {
            existing.apply(&push.patch());
            return;
        }

        let parent_id = entity.parent_id;
        self.entities.insert(id, entity);
        let mode = self.sort_mode;
        match parent_id {
            Some(parent) => {
                let list = self.replies.entry(parent).or_default();
                if !list.contains(&id) {
                    list.insert(0, id);
                    mode.sort(&self.entities, list);
                }
            }
            None => {
                if !self.top_level.contains(&id) {
                    self.top_level.push(id);
                    mode.sort(&self.entities, &mut self.top_level);
                }
                if let Some(cached) = self.cache.get_mut(0) {
                    if !cached.ids.contains(&id) {
                        cached.ids.push(id);
                        mode.sort(&self.entities, &mut cached.ids);
                    }
                }
            }
        }
    }

    /// Merge `patch` into an existing entity.
    pub fn apply_update(&mut self, id: EntityId, patch: &EntityPatch) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn apply_parent_update(&mut self, id: EntityId, child_count: u32) -> bool {
        self.apply_update(id, &EntityPatch::child_count(child_count))
    }

    /// Set a like count. A visible entity gets its list re-sorted after the
    /// debounce window.
    pub fn apply_like_count(
        &mut self,
        id: EntityId,
        parent_hint: Option<EntityId>,
        like_count: u32,
        now: Timestamp,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        entity.like_count = like_count;
        let parent = parent_hint.or(entity.parent_id);

        if self.top_level.contains(&id) {
            self.schedule_resort(IndexKey::TopLevel, now);
        } else if let Some(parent) = parent {
            if self.replies_visible.contains(&parent) && self.replies(parent).contains(&id) {
                self.schedule_resort(IndexKey::Replies(parent), now);
            }
        }
        true
    }

    /// Remove an entity, its replies and every reference to it.
    ///
    /// Returns the page to reload when this emptied a non-first page.
    pub fn apply_delete(
        &mut self,
        id: EntityId,
        parent_hint: Option<EntityId>,
        now: Timestamp,
    ) -> Option<usize> {
        let removed = self.remove_subtree(id, now);
        let parent = parent_hint.or(removed.as_ref().and_then(|e| e.parent_id));
        self.clear_ui_state(id);
        self.cache.remove_id(id);

        if let Some(parent) = parent {
            let mut listed = false;
            if let Some(list) = self.replies.get_mut(&parent) {
                let before = list.len();
                list.retain(|c| *c != id);
                listed = list.len() != before;
                if list.is_empty() {
                    self.replies_visible.remove(&parent);
                    self.replies_meta.insert(parent, RepliesMeta::default());
                }
            }
            if removed.is_some() || listed {
                if let Some(p) = self.entities.get_mut(&parent) {
                    p.child_count = p.child_count.saturating_sub(1);
                }
            }
            self.top_level.retain(|c| *c != id);
            return None;
        }

        let before = self.top_level.len();
        self.top_level.retain(|c| *c != id);
        if before > 0 && self.top_level.is_empty() && self.page > 0 {
            return Some(self.page - 1);
        }
        None
    }

    /// Optimistic replies under `id` go with it, along with their undo
    /// records, tokens and queued actions.
    fn remove_subtree(&mut self, id: EntityId, now: Timestamp) -> Option<Entity> {
        let entity = self.entities.remove(&id);
        if let Some(children) = self.replies.remove(&id) {
            for child in children {
                self.remove_subtree(child, now);
                self.clear_ui_state(child);
            }
        }
        if is_temporary(id) {
            self.discard_pending(id, now);
        }
        self.replies_meta.remove(&id);
        self.replies_visible.remove(&id);
        self.resort_due.remove(&IndexKey::Replies(id));
        entity
    }

    fn clear_ui_state(&mut self, id: EntityId) {
        if self.replying_to == Some(id) {
            self.replying_to = None;
        }
        if self.editing == Some(id) {
            self.editing = None;
        }
    }

    // ========================================================================
    // Paging
    // ========================================================================

    /// Show a cached page if it is still fresh.
    pub fn show_cached_page(&mut self, page: usize, now: Timestamp) -> bool {
        let Some(cached) = self.cache.fresh(page, now) else {
            return false;
        };
        self.top_level = cached
            .ids
            .iter()
            .copied()
            .filter(|id| self.entities.contains_key(id))
            .collect();
        self.has_more = cached.has_more;
        self.page = page;
        true
    }

    /// Install a top-level page fetched from the server and cache its ids.
    ///
    /// Optimistic inserts the previous copy of the page held are kept.
    pub fn apply_page(&mut self, page: usize, fetched: Page, now: Timestamp) {
        let mut ids = Vec::with_capacity(fetched.comments.len());
        for entity in fetched.comments {
            ids.push(entity.id);
            self.entities.insert(entity.id, entity);
        }
        if let Some(previous) = self.cache.get(page) {
            let pending: Vec<EntityId> = previous
                .ids
                .iter()
                .copied()
                .filter(|id| is_temporary(*id) && self.entities.contains_key(id))
                .filter(|id| !ids.contains(id))
                .collect();
            ids.extend(pending);
        }
        self.sort_mode.sort(&self.entities, &mut ids);

        let page_size = self.config.page_size.max(1) as u64;
        self.max_page = fetched.total_count.div_ceil(page_size).max(1) as usize;
        self.has_more = fetched.has_more;
        self.page = page;
        self.cache.put(page, ids.clone(), fetched.has_more, now);
        self.top_level = ids;
    }

    /// Mark replies of `parent` as loading. Returns the page to fetch, or
    /// `None` if a load is already running.
    pub fn begin_replies_load(&mut self, parent: EntityId) -> Option<usize> {
        let meta = self.replies_meta.get(&parent).copied();
        if meta.is_some_and(|m| m.loading) {
            return None;
        }
        let page = match meta {
            Some(m) if self.replies.contains_key(&parent) => m.page + 1,
            _ => 0,
        };
        self.replies_meta.entry(parent).or_default().loading = true;
        Some(page)
    }

    /// Install a fetched reply page. The first page replaces the loaded list
    /// but keeps optimistic replies still in flight.
    pub fn apply_replies(&mut self, parent: EntityId, page: usize, fetched: Page) {
        let mut ids = Vec::with_capacity(fetched.comments.len());
        for entity in fetched.comments {
            ids.push(entity.id);
            self.entities.insert(entity.id, entity);
        }

        let list = self.replies.entry(parent).or_default();
        if page == 0 {
            list.retain(|id| is_temporary(*id));
        }
        for id in ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        self.sort_mode.sort(&self.entities, list);

        self.replies_meta.insert(
            parent,
            RepliesMeta {
                page,
                has_more: fetched.has_more,
                loading: false,
            },
        );
        self.replies_visible.insert(parent);
    }

    pub fn fail_replies_load(&mut self, parent: EntityId) {
        if let Some(meta) = self.replies_meta.get_mut(&parent) {
            meta.loading = false;
        }
    }

    pub fn set_replies_visible(&mut self, parent: EntityId, visible: bool) {
        if visible {
            self.replies_visible.insert(parent);
        } else {
            self.replies_visible.remove(&parent);
        }
    }

    /// Whether replies of `parent` were fetched at least once.
    pub fn replies_loaded(&self, parent: EntityId) -> bool {
        self.replies_meta.contains_key(&parent) && self.replies.contains_key(&parent)
    }

    // ========================================================================
    // Reply / edit state
    // ========================================================================

    pub fn start_reply(&mut self, id: EntityId) {
        self.replying_to = Some(self.resolve(id));
        self.editing = None;
    }

    pub fn cancel_reply(&mut self) {
        self.replying_to = None;
    }

    pub fn start_editing(&mut self, id: EntityId) {
        self.editing = Some(self.resolve(id));
        self.replying_to = None;
    }

    pub fn cancel_editing(&mut self) {
        self.editing = None;
    }
}
