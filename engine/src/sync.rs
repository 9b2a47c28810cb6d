//! The optimistic mutation synchronizer.
//!
//! [`Synchronizer`] owns a [`Store`] and a [`RemoteService`]. Each user
//! action runs a short synchronous section on the store (validation and the
//! optimistic write), awaits the remote call with the lock released, then
//! feeds the result back in. Subscribers are told about every change through
//! a revision stream.

use crate::{
    action::{PendingAction, TOGGLE_LIKE},
    allocator::is_temporary,
    clock::{Clock, SystemClock},
    error::Result,
    remote::{RemoteError, RemoteService},
    sort::SortMode,
    store::{Notice, PendingCreate, PushOutcome, Store, ThreadRow},
    Entity, EntityId, EntityPatch, Error, Notification, Timestamp,
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    future::BoxFuture,
    Stream, StreamExt,
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tracing::{debug, info, warn};

/// Drives optimistic mutations against a remote service.
pub struct Synchronizer<R: RemoteService> {
    store: Mutex<Store>,
    remote: R,
    clock: Arc<dyn Clock>,
    revision: AtomicU64,
    subscribers: Mutex<Vec<UnboundedSender<u64>>>,
}

impl<R: RemoteService> Synchronizer<R> {
    /// Wrap `store`, reading time from the system clock.
    pub fn new(remote: R, store: Store) -> Self {
        Self {
            store: Mutex::new(store),
            remote,
            clock: Arc::new(SystemClock),
            revision: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Read time from `clock` instead.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `f` against the store without notifying subscribers.
    pub fn read<T>(&self, f: impl FnOnce(&Store) -> T) -> T {
        f(&*self.lock())
    }

    /// Run a mutating section: apply due timers, run `f`, then bump the
    /// revision. The lock is released before returning.
    fn mutate<T>(&self, f: impl FnOnce(&mut Store, Timestamp) -> T) -> T {
        let now = self.now();
        let out = {
            let mut store = self.lock();
            store.sweep(now);
            f(&mut *store, now)
        };
        self.notify();
        out
    }

    fn notify(&self) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.unbounded_send(revision).is_ok());
    }

    /// Current revision. Increases after every mutating section.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Stream of revisions, one item per mutating section.
    pub fn subscribe(&self) -> UnboundedReceiver<u64> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Apply due timers (queue expiry, token windows, debounced re-sorts).
    /// Hosts call this periodically.
    pub fn tick(&self) {
        let now = self.now();
        let resorted = self.lock().sweep(now);
        if resorted {
            self.notify();
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Fetch the reserved word list and the first page.
    pub async fn start(&self) -> Result<()> {
        match self.remote.reserved_words().await {
            Ok(words) => {
                debug!(count = words.len(), "loaded reserved words");
                self.mutate(|store, _| store.set_reserved_words(words));
            }
            Err(e) => warn!(error = %e, "could not load reserved words"),
        }
        self.load_page(0).await
    }

    /// Show top-level page `page`, from the cache when fresh. A page that
    /// comes back empty falls back to the page before it.
    pub async fn load_page(&self, page: usize) -> Result<()> {
        let mut page = page;
        loop {
            if self.mutate(|store, now| store.show_cached_page(page, now)) {
                debug!(page, "page served from cache");
                return Ok(());
            }

            let (thread, size) = self.read(|s| (s.thread().clone(), s.config().page_size));
            let fetched = match self.remote.top_level_page(&thread, size, page * size).await {
                Ok(fetched) => fetched,
                Err(e) => return Err(self.report(e.into())),
            };
            if fetched.comments.is_empty() && page > 0 {
                page -= 1;
                continue;
            }

            self.mutate(|store, now| store.apply_page(page, fetched, now));
            return Ok(());
        }
    }

    /// Fetch the next page of replies of `parent`.
    pub async fn load_replies(&self, parent: EntityId) -> Result<()> {
        let parent = self.read(|s| s.resolve(parent));
        if is_temporary(parent) {
            self.mutate(|store, _| store.set_replies_visible(parent, true));
            return Ok(());
        }
        let Some(page) = self.mutate(|store, _| store.begin_replies_load(parent)) else {
            return Ok(());
        };

        let size = self.read(|s| s.config().replies_page_size);
        match self.remote.replies_page(parent, size, page * size).await {
            Ok(fetched) => {
                self.mutate(|store, _| store.apply_replies(parent, page, fetched));
                Ok(())
            }
            Err(e) => {
                self.mutate(|store, _| store.fail_replies_load(parent));
                Err(self.report(e.into()))
            }
        }
    }

    /// Hide visible replies, show loaded ones, or load the first page.
    pub async fn toggle_replies(&self, parent: EntityId) -> Result<()> {
        let parent = self.read(|s| s.resolve(parent));
        let (visible, loaded) = self.read(|s| (s.replies_visible(parent), s.replies_loaded(parent)));
        if visible {
            self.mutate(|store, _| store.set_replies_visible(parent, false));
        } else if loaded {
            self.mutate(|store, _| store.set_replies_visible(parent, true));
        } else {
            self.load_replies(parent).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a comment. While replying it becomes a reply to that comment.
    ///
    /// Returns the real id, or the temp id when the creation is queued
    /// behind a parent that is itself still being created.
    pub async fn create(&self, content: &str) -> Result<EntityId> {
        let parent = self.read(|s| s.replying_to());
        let pending = self.begin_create(content, parent)?;
        self.complete_create(pending).await
    }

    pub async fn create_top_level(&self, content: &str) -> Result<EntityId> {
        let pending = self.begin_create(content, None)?;
        self.complete_create(pending).await
    }

    pub async fn create_reply(&self, parent: EntityId, content: &str) -> Result<EntityId> {
        let pending = self.begin_create(content, Some(parent))?;
        self.complete_create(pending).await
    }

    /// Validate and insert optimistically. Nothing is sent yet.
    pub fn begin_create(&self, content: &str, parent: Option<EntityId>) -> Result<PendingCreate> {
        self.mutate(|store, now| {
            if let Err(e) = store.check_create(content) {
                report_to(store, &e);
                return Err(e);
            }
            let pending = store.insert_optimistic(content, parent, now);
            store.cancel_reply();
            Ok(pending)
        })
    }

    /// Send a creation started by [`Synchronizer::begin_create`] and
    /// reconcile or roll back with the outcome.
    pub async fn complete_create(&self, pending: PendingCreate) -> Result<EntityId> {
        if pending.deferred {
            return Ok(pending.temp_id);
        }
        let temp_id = pending.temp_id;
        match self.remote.create(&pending.request, pending.token).await {
            Ok(created) => match created.id() {
                Some(real_id) => {
                    self.reconcile(real_id, Some(temp_id)).await;
                    Ok(real_id)
                }
                None => {
                    self.fail_create(temp_id);
                    Err(self.report(
                        RemoteError::UnexpectedResponse("create returned no id".into()).into(),
                    ))
                }
            },
            Err(e) => {
                self.fail_create(temp_id);
                Err(self.report(e.into()))
            }
        }
    }

    fn fail_create(&self, temp_id: EntityId) {
        warn!(temp_id, "create failed, rolling back");
        self.mutate(|store, _| store.rollback(temp_id));
    }

    /// Reconcile `temp_id` with `real_id` and replay its queued actions.
    ///
    /// Returns `false` when the temp id had already been reconciled.
    pub async fn reconcile(&self, real_id: EntityId, temp_id: Option<EntityId>) -> bool {
        self.reconcile_boxed(real_id, temp_id).await
    }

    fn reconcile_boxed(&self, real_id: EntityId, temp_id: Option<EntityId>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let reconciled = self.mutate(|store, now| store.reconcile_created(real_id, temp_id, now));
            for queued in reconciled.replay {
                let kind = queued.action.kind();
                if let Err(e) = self.replay(real_id, queued.action).await {
                    warn!(real_id, action = kind, error = %e, "replay failed");
                }
            }
            !reconciled.already_settled
        })
    }

    async fn replay(&self, real_id: EntityId, action: PendingAction) -> Result<()> {
        debug!(real_id, action = action.kind(), "replaying");
        match action {
            PendingAction::ContentUpdate { fields } => {
                self.remote.write(real_id, &fields).await?;
                self.mutate(|store, _| store.apply_update(real_id, &fields));
            }
            PendingAction::Removal { parent_id } => {
                self.remote.remove(real_id).await?;
                let reload = self.mutate(|store, now| {
                    let parent = parent_id.map(|p| store.resolve(p));
                    store.apply_delete(real_id, parent, now)
                });
                if let Some(page) = reload {
                    self.load_page(page).await?;
                }
            }
            PendingAction::RemoteCall { method, args } => {
                let args = args.unwrap_or_else(|| json!([real_id]));
                let result = self.remote.call(&method, args).await?;
                self.apply_call_result(real_id, &method, &result);
            }
            PendingAction::NestedCreation {
                mut request,
                child_temp_id,
                token,
            } => {
                request.parent_id = Some(real_id);
                let created = match self.remote.create(&request, token).await {
                    Ok(created) => created,
                    Err(e) => {
                        self.fail_create(child_temp_id);
                        return Err(self.report(e.into()));
                    }
                };
                match created.id() {
                    Some(child_id) => {
                        self.reconcile_boxed(child_id, Some(child_temp_id)).await;
                    }
                    None => {
                        self.fail_create(child_temp_id);
                        return Err(RemoteError::UnexpectedResponse(
                            "create returned no id".into(),
                        )
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_call_result(&self, id: EntityId, method: &str, result: &Value) {
        if method != TOGGLE_LIKE {
            return;
        }
        if let Some(count) = result.get("count").and_then(Value::as_u64) {
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            self.mutate(|store, now| store.apply_like_count(id, None, count, now));
        }
    }

    // ========================================================================
    // Mutations of existing comments
    // ========================================================================

    /// Flip the viewer's like. Queued while the comment is still being created.
    pub async fn toggle_like(&self, id: EntityId) -> Result<()> {
        let id = self.read(|s| s.resolve(id));
        if is_temporary(id) {
            self.enqueue_action(id, PendingAction::toggle_like());
            return Ok(());
        }
        let result = match self.remote.call(TOGGLE_LIKE, json!([id])).await {
            Ok(result) => result,
            Err(e) => return Err(self.report(e.into())),
        };
        self.apply_call_result(id, TOGGLE_LIKE, &result);
        Ok(())
    }

    /// Save an edit. On a temporary comment the edit is shown at once and
    /// written after reconciliation.
    pub async fn save_edit(&self, id: EntityId, content: &str) -> Result<()> {
        let id = self.mutate(|store, _| {
            store.check_edit(id, content).inspect_err(|e| report_to(store, e))
        })?;
        let patch = EntityPatch::content(content.trim());

        if is_temporary(id) {
            self.mutate(|store, now| {
                store.apply_update(id, &patch);
                store.enqueue(id, PendingAction::ContentUpdate { fields: patch.clone() }, now);
                store.cancel_editing();
            });
            return Ok(());
        }

        if let Err(e) = self.remote.write(id, &patch).await {
            return Err(self.report(e.into()));
        }
        self.mutate(|store, _| {
            store.apply_update(id, &patch);
            store.cancel_editing();
        });
        Ok(())
    }

    /// Delete a comment. A temporary comment disappears at once and is
    /// deleted on the server after reconciliation.
    pub async fn delete_entity(&self, id: EntityId) -> Result<()> {
        let id = self.mutate(|store, _| store.check_delete(id).inspect_err(|e| report_to(store, e)))?;

        if is_temporary(id) {
            self.mutate(|store, now| {
                let parent_id = store.get_entity(id).and_then(|e| e.parent_id);
                store.hide(id);
                store.enqueue(id, PendingAction::Removal { parent_id }, now);
            });
            return Ok(());
        }

        if let Err(e) = self.remote.remove(id).await {
            return Err(self.report(e.into()));
        }
        let reload = self.mutate(|store, now| store.apply_delete(id, None, now));
        if let Some(page) = reload {
            self.load_page(page).await?;
        }
        Ok(())
    }

    pub fn set_sort_mode(&self, mode: SortMode) {
        info!(%mode, "sort mode changed");
        self.mutate(|store, _| store.set_sort_mode(mode));
    }

    /// Queue `action` behind the creation of `temp_id`. Returns `false` for
    /// ids that are not temporary.
    pub fn enqueue_action(&self, temp_id: EntityId, action: PendingAction) -> bool {
        self.mutate(|store, now| store.enqueue(temp_id, action, now))
    }

    // ========================================================================
    // Live notifications
    // ========================================================================

    /// Apply one push.
    pub async fn handle_push(&self, push: Notification) -> PushOutcome {
        let outcome = self.mutate(|store, now| store.handle_push(&push, now));
        match outcome {
            PushOutcome::Reconcile { temp_id, real_id } => {
                self.reconcile(real_id, Some(temp_id)).await;
            }
            PushOutcome::Reload { page } => {
                if let Err(e) = self.load_page(page).await {
                    warn!(page, error = %e, "reload after delete failed");
                }
            }
            _ => {}
        }
        outcome
    }

    /// Apply one raw JSON push. Malformed payloads are logged and dropped.
    pub async fn handle_push_json(&self, raw: &Value) -> PushOutcome {
        match Notification::from_json(raw) {
            Ok(push) => self.handle_push(push).await,
            Err(e) => {
                warn!(error = %e, "dropping push");
                PushOutcome::Ignored
            }
        }
    }

    /// Apply pushes until the stream ends.
    pub async fn consume<S>(&self, pushes: S)
    where
        S: Stream<Item = Notification>,
    {
        let mut pushes = std::pin::pin!(pushes);
        while let Some(push) = pushes.next().await {
            self.handle_push(push).await;
        }
    }

    // ========================================================================
    // UI
    // ========================================================================

    /// Copy of an entity.
    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.read(|s| s.get_entity(id).cloned())
    }

    pub fn top_level(&self) -> Vec<EntityId> {
        self.read(|s| s.top_level().to_vec())
    }

    pub fn replies(&self, parent: EntityId) -> Vec<EntityId> {
        self.read(|s| s.replies(parent).to_vec())
    }

    pub fn thread_rows(&self) -> Vec<ThreadRow> {
        self.read(Store::thread_rows)
    }

    pub fn start_reply(&self, id: EntityId) {
        self.mutate(|store, _| store.start_reply(id));
    }

    pub fn cancel_reply(&self) {
        self.mutate(|store, _| store.cancel_reply());
    }

    pub fn start_editing(&self, id: EntityId) {
        self.mutate(|store, _| store.start_editing(id));
    }

    pub fn cancel_editing(&self) {
        self.mutate(|store, _| store.cancel_editing());
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.lock().take_notices()
    }

    /// Queue a notice for `error` and hand it back.
    fn report(&self, error: Error) -> Error {
        self.mutate(|store, _| report_to(store, &error));
        error
    }
}

/// Empty content is dropped silently; everything else is shown.
fn report_to(store: &mut Store, error: &Error) {
    if *error != Error::EmptyContent {
        store.push_notice(Notice::error(error.to_string()));
    }
}
