//! End-to-end scenarios for threadline-engine
//!
//! These drive a [`Synchronizer`] against a scripted in-memory remote and a
//! manual clock, interleaving responses and pushes by hand.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use threadline_engine::{
    CorrelationToken, CreateRequest, Created, Entity, EntityId, EntityPatch, Error, ManualClock,
    Notification, Page, PendingAction, PushOutcome, RemoteError, RemoteService, Removed, SortMode,
    Store, SyncConfig, Synchronizer, ThreadRef, Viewer,
};

// ============================================================================
// Scripted remote
// ============================================================================

#[derive(Default)]
struct RemoteState {
    next_id: EntityId,
    calls: Vec<String>,
    fail_creates: bool,
    /// Calls starting with any of these prefixes are rejected
    fail_calls: Vec<String>,
    likes: HashMap<EntityId, u32>,
    top_level: Vec<Entity>,
    replies: HashMap<EntityId, Vec<Entity>>,
    reserved: Vec<String>,
    last_create: Option<CreateRequest>,
}

#[derive(Default)]
struct ScriptedRemote {
    state: Mutex<RemoteState>,
}

impl ScriptedRemote {
    fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().next_id = 42;
        remote
    }

    fn with_top_level(self, comments: Vec<Entity>) -> Self {
        self.state.lock().unwrap().top_level = comments;
        self
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn fail_calls_starting_with(&self, prefix: &str) {
        self.state.lock().unwrap().fail_calls.push(prefix.to_string());
    }

    /// Record `call` and reject it if it was scripted to fail.
    fn attempt(&self, call: String) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let fails = state.fail_calls.iter().any(|p| call.starts_with(p.as_str()));
        state.calls.push(call.clone());
        if fails {
            return Err(RemoteError::Rejected(format!("{call} refused")));
        }
        Ok(())
    }
}

fn page_slice(all: &[Entity], limit: usize, offset: usize) -> Page {
    Page {
        comments: all.iter().skip(offset).take(limit).cloned().collect(),
        has_more: offset + limit < all.len(),
        total_count: all.len() as u64,
    }
}

impl RemoteService for ScriptedRemote {
    async fn create(
        &self,
        request: &CreateRequest,
        _token: CorrelationToken,
    ) -> Result<Created, RemoteError> {
        self.record(format!("create {} parent={:?}", request.content, request.parent_id));
        let mut state = self.state.lock().unwrap();
        if state.fail_creates {
            return Err(RemoteError::Rejected("creation disabled".into()));
        }
        state.last_create = Some(request.clone());
        let id = state.next_id;
        state.next_id += 1;
        Ok(Created::Ids(vec![id]))
    }

    async fn write(&self, id: EntityId, fields: &EntityPatch) -> Result<(), RemoteError> {
        self.attempt(format!(
            "write {id} {}",
            fields.content.clone().unwrap_or_default()
        ))
    }

    async fn remove(&self, id: EntityId) -> Result<Removed, RemoteError> {
        self.attempt(format!("remove {id}"))?;
        Ok(Removed::Record { deleted_id: id })
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, RemoteError> {
        self.attempt(format!("call {method} {args}"))?;
        let id = args[0].as_i64().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        let count = state.likes.entry(id).or_default();
        *count += 1;
        Ok(json!({"count": *count, "liked": true}))
    }

    async fn top_level_page(
        &self,
        _thread: &ThreadRef,
        limit: usize,
        offset: usize,
    ) -> Result<Page, RemoteError> {
        self.record(format!("page {offset}"));
        Ok(page_slice(&self.state.lock().unwrap().top_level, limit, offset))
    }

    async fn replies_page(
        &self,
        parent: EntityId,
        limit: usize,
        offset: usize,
    ) -> Result<Page, RemoteError> {
        self.record(format!("replies {parent} {offset}"));
        let state = self.state.lock().unwrap();
        let all = state.replies.get(&parent).cloned().unwrap_or_default();
        Ok(page_slice(&all, limit, offset))
    }

    async fn reserved_words(&self) -> Result<Vec<String>, RemoteError> {
        Ok(self.state.lock().unwrap().reserved.clone())
    }
}

const START: u64 = 1_706_745_600_000;

fn setup(remote: ScriptedRemote) -> (Synchronizer<Arc<ScriptedRemote>>, Arc<ScriptedRemote>, Arc<ManualClock>) {
    let remote = Arc::new(remote);
    let clock = Arc::new(ManualClock::new(START));
    let store = Store::new(
        ThreadRef::new("realty.listing", 7),
        Viewer::user(1, "Ann"),
        SyncConfig::default(),
    );
    let sync = Synchronizer::new(remote.clone(), store).with_clock(clock.clone());
    (sync, remote, clock)
}

fn count_of(ids: &[EntityId], id: EntityId) -> usize {
    ids.iter().filter(|x| **x == id).count()
}

// ============================================================================
// Queued actions
// ============================================================================

#[tokio::test]
async fn like_while_create_in_flight_is_replayed_on_real_id() {
    let (sync, remote, _clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    let temp = pending.temp_id;
    assert!(temp < 0);
    assert_eq!(sync.top_level(), vec![temp]);

    sync.toggle_like(temp).await.unwrap();
    assert_eq!(sync.read(|s| s.pending_actions(temp)), 1);
    assert!(remote.calls().is_empty());

    let id = sync.complete_create(pending).await.unwrap();
    assert_eq!(id, 42);
    assert_eq!(
        remote.calls(),
        vec!["create Hello parent=None", "call toggle_like [42]"]
    );

    let entity = sync.get_entity(42).unwrap();
    assert_eq!(entity.like_count, 1);
    assert!(!entity.pending && !entity.temp);
    assert!(sync.get_entity(temp).is_none());
    assert_eq!(sync.top_level(), vec![42]);
}

#[tokio::test]
async fn edit_then_delete_replays_in_order() {
    let (sync, remote, _clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    let temp = pending.temp_id;
    sync.save_edit(temp, "A").await.unwrap();
    assert_eq!(sync.get_entity(temp).unwrap().content, "A");

    sync.delete_entity(temp).await.unwrap();
    assert!(sync.top_level().is_empty());

    sync.complete_create(pending).await.unwrap();
    assert_eq!(
        remote.calls(),
        vec!["create Hello parent=None", "write 42 A", "remove 42"]
    );
    assert!(sync.get_entity(42).is_none());
    assert!(sync.get_entity(temp).is_none());
    assert!(sync.top_level().is_empty());
}

#[tokio::test]
async fn expired_queue_is_dropped_silently() {
    let (sync, remote, clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    sync.toggle_like(pending.temp_id).await.unwrap();

    clock.advance(120_001);
    sync.tick();
    assert_eq!(sync.read(|s| s.pending_actions(pending.temp_id)), 0);

    sync.complete_create(pending).await.unwrap();
    assert_eq!(remote.calls(), vec!["create Hello parent=None"]);
    assert_eq!(sync.get_entity(42).unwrap().like_count, 0);
}

#[tokio::test]
async fn failed_replay_does_not_stop_later_actions() {
    let (sync, remote, _clock) = setup(ScriptedRemote::new());
    remote.fail_calls_starting_with("write");

    let pending = sync.begin_create("Hello", None).unwrap();
    let temp = pending.temp_id;
    sync.save_edit(temp, "A").await.unwrap();
    sync.toggle_like(temp).await.unwrap();

    sync.complete_create(pending).await.unwrap();
    assert_eq!(
        remote.calls(),
        vec!["create Hello parent=None", "write 42 A", "call toggle_like [42]"]
    );
    assert_eq!(sync.get_entity(42).unwrap().like_count, 1);
    assert_eq!(sync.read(|s| s.pending_actions(temp)), 0);
}

#[tokio::test]
async fn failed_like_replay_still_deletes() {
    let (sync, remote, _clock) = setup(ScriptedRemote::new());
    remote.fail_calls_starting_with("call toggle_like");

    let pending = sync.begin_create("Hello", None).unwrap();
    let temp = pending.temp_id;
    sync.toggle_like(temp).await.unwrap();
    sync.delete_entity(temp).await.unwrap();

    sync.complete_create(pending).await.unwrap();
    assert_eq!(
        remote.calls(),
        vec!["create Hello parent=None", "call toggle_like [42]", "remove 42"]
    );
    assert!(sync.get_entity(42).is_none());
    assert!(sync.top_level().is_empty());
}

#[tokio::test]
async fn enqueue_on_real_id_is_ignored() {
    let (sync, _remote, _clock) = setup(ScriptedRemote::new());
    assert!(!sync.enqueue_action(42, PendingAction::toggle_like()));
}

#[tokio::test]
async fn recently_reconciled_temp_id_is_redirected() {
    let (sync, remote, clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    let temp = pending.temp_id;
    sync.complete_create(pending).await.unwrap();

    clock.advance(4_000);
    sync.toggle_like(temp).await.unwrap();
    assert_eq!(remote.calls().last().unwrap(), "call toggle_like [42]");
    assert_eq!(sync.get_entity(42).unwrap().like_count, 1);
}

// ============================================================================
// Push / response races
// ============================================================================

#[tokio::test]
async fn push_before_response_reconciles_once() {
    let (sync, _remote, _clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    let temp = pending.temp_id;
    sync.enqueue_action(temp, PendingAction::edit("Hello!"));

    let echo = Notification::created(&Entity::new(42, "Hello", START), Some(pending.token));
    assert_eq!(
        sync.handle_push(echo).await,
        PushOutcome::Reconcile {
            temp_id: temp,
            real_id: 42
        }
    );
    assert_eq!(sync.get_entity(42).unwrap().content, "Hello!");

    let id = sync.complete_create(pending).await.unwrap();
    assert_eq!(id, 42);
    assert_eq!(count_of(&sync.top_level(), 42), 1);
    assert_eq!(sync.read(|s| s.len()), 1);
}

#[tokio::test]
async fn response_before_push_marks_push_duplicate() {
    let (sync, _remote, _clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    let token = pending.token;
    sync.complete_create(pending).await.unwrap();

    let echo = Notification::created(&Entity::new(42, "Hello", START), Some(token));
    assert_eq!(sync.handle_push(echo).await, PushOutcome::Duplicate);
    assert_eq!(count_of(&sync.top_level(), 42), 1);
    assert_eq!(sync.read(|s| s.len()), 1);
}

#[tokio::test]
async fn late_push_after_token_window_merges_without_duplicate() {
    let (sync, _remote, clock) = setup(ScriptedRemote::new());

    let pending = sync.begin_create("Hello", None).unwrap();
    let token = pending.token;
    sync.complete_create(pending).await.unwrap();

    clock.advance(6_000);
    let echo = Notification::created(&Entity::new(42, "Hello", START).with_likes(2), Some(token));
    assert_eq!(sync.handle_push(echo).await, PushOutcome::Applied);
    assert_eq!(count_of(&sync.top_level(), 42), 1);
    assert_eq!(sync.get_entity(42).unwrap().like_count, 2);
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn failed_reply_restores_parent_count() {
    let parent = Entity {
        child_count: 3,
        ..Entity::new(1, "parent", 100)
    };
    let (sync, remote, _clock) = setup(ScriptedRemote::new().with_top_level(vec![parent]));
    sync.start().await.unwrap();
    remote.state.lock().unwrap().fail_creates = true;

    let err = sync.create_reply(1, "reply").await.unwrap_err();
    assert_eq!(
        err,
        Error::Remote(RemoteError::Rejected("creation disabled".into()))
    );
    assert_eq!(sync.get_entity(1).unwrap().child_count, 3);
    assert!(sync.replies(1).is_empty());
    assert_eq!(sync.read(|s| s.len()), 1);

    let notices = sync.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.contains("creation disabled"));
}

// ============================================================================
// Nested creation
// ============================================================================

#[tokio::test]
async fn reply_to_temporary_parent_is_created_after_parent() {
    let (sync, remote, _clock) = setup(ScriptedRemote::new());

    let parent = sync.begin_create("parent", None).unwrap();
    let parent_temp = parent.temp_id;
    let child_temp = sync.create_reply(parent_temp, "child").await.unwrap();
    assert!(child_temp < 0);
    assert_eq!(sync.replies(parent_temp), vec![child_temp]);

    sync.complete_create(parent).await.unwrap();
    assert_eq!(
        remote.calls(),
        vec!["create parent parent=None", "create child parent=Some(42)"]
    );
    assert_eq!(sync.replies(42), vec![43]);
    assert_eq!(sync.get_entity(43).unwrap().parent_id, Some(42));
    assert_eq!(sync.get_entity(42).unwrap().child_count, 1);
    assert!(sync.get_entity(child_temp).is_none());

    let rows = sync.thread_rows();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[1].id, rows[1].depth), (43, 1));
}

// ============================================================================
// Sorting
// ============================================================================

#[tokio::test]
async fn switching_sort_mode_needs_no_server_call() {
    let b = Entity::new(2, "B", 10).with_likes(5);
    let a = Entity::new(1, "A", 5).with_likes(2);
    let (sync, remote, _clock) = setup(ScriptedRemote::new().with_top_level(vec![b, a]));
    sync.start().await.unwrap();
    assert_eq!(sync.top_level(), vec![2, 1]);
    let calls = remote.calls().len();

    sync.set_sort_mode(SortMode::Oldest);
    assert_eq!(sync.top_level(), vec![1, 2]);
    assert_eq!(remote.calls().len(), calls);
}

#[tokio::test]
async fn like_push_resorts_after_debounce() {
    let a = Entity::new(1, "A", 5).with_likes(1);
    let b = Entity::new(2, "B", 10);
    let (sync, _remote, clock) = setup(ScriptedRemote::new().with_top_level(vec![a, b]));
    sync.start().await.unwrap();
    assert_eq!(sync.top_level(), vec![1, 2]);

    sync.handle_push(Notification::like_toggled(2, None, 5)).await;
    assert_eq!(sync.top_level(), vec![1, 2]);

    clock.advance(1_999);
    sync.tick();
    assert_eq!(sync.top_level(), vec![1, 2]);

    clock.advance(1);
    sync.tick();
    assert_eq!(sync.top_level(), vec![2, 1]);
}

// ============================================================================
// Pushes
// ============================================================================

#[tokio::test]
async fn malformed_pushes_are_dropped() {
    let (sync, _remote, _clock) = setup(ScriptedRemote::new());

    assert_eq!(
        sync.handle_push_json(&json!({"type": "create"})).await,
        PushOutcome::Ignored
    );
    assert_eq!(
        sync.handle_push_json(&json!({"id": "nope"})).await,
        PushOutcome::Ignored
    );
    assert_eq!(
        sync.handle_push_json(&json!({"type": "archive", "id": 5})).await,
        PushOutcome::Ignored
    );
    assert!(sync.read(|s| s.is_empty()));
}

#[tokio::test]
async fn consume_applies_a_stream_of_pushes() {
    let (sync, _remote, _clock) = setup(ScriptedRemote::new());
    let mut revisions = sync.subscribe();

    let pushes = futures::stream::iter(vec![
        Notification::created(&Entity::new(7, "first", 1), None),
        Notification::created(&Entity::new(8, "second", 2), None),
        Notification::deleted(7, None),
    ]);
    sync.consume(pushes).await;

    assert_eq!(sync.top_level(), vec![8]);
    assert_eq!(sync.revision(), 3);
    assert_eq!(revisions.try_next().unwrap(), Some(1));
}

#[tokio::test]
async fn deleting_a_reply_via_push_collapses_empty_list() {
    let parent = Entity {
        child_count: 1,
        ..Entity::new(1, "parent", 100)
    };
    let remote = ScriptedRemote::new().with_top_level(vec![parent]);
    remote
        .state
        .lock()
        .unwrap()
        .replies
        .insert(1, vec![Entity::new(10, "only reply", 200).with_parent(1)]);
    let (sync, _remote, _clock) = setup(remote);
    sync.start().await.unwrap();
    sync.toggle_replies(1).await.unwrap();
    sync.start_reply(10);

    sync.handle_push(Notification::deleted(10, Some(1))).await;
    assert_eq!(sync.read(|s| s.replying_to()), None);
    assert!(!sync.read(|s| s.replies_visible(1)));
    assert_eq!(sync.get_entity(1).unwrap().child_count, 0);
}

// ============================================================================
// Paging
// ============================================================================

#[tokio::test]
async fn empty_page_walks_down_to_last_non_empty_page() {
    let comments = (1..=10).map(|i| Entity::new(i, "c", i as u64)).collect();
    let (sync, remote, _clock) = setup(ScriptedRemote::new().with_top_level(comments));

    sync.load_page(2).await.unwrap();
    assert_eq!(remote.calls(), vec!["page 20", "page 10", "page 0"]);
    assert_eq!(sync.read(|s| s.page()), 0);
    assert_eq!(sync.top_level().len(), 10);
}

#[tokio::test]
async fn insert_past_full_first_page_still_fetches_next_page() {
    let comments = (1..=15).map(|i| Entity::new(i, "c", i as u64)).collect();
    let (sync, remote, _clock) = setup(ScriptedRemote::new().with_top_level(comments));
    sync.load_page(0).await.unwrap();

    let pending = sync.begin_create("mine", None).unwrap();
    let temp = pending.temp_id;
    assert_eq!(sync.top_level().len(), 10);
    assert!(!sync.top_level().contains(&temp));

    sync.load_page(1).await.unwrap();
    assert_eq!(remote.calls(), vec!["page 0", "page 10"]);
    let shown = sync.top_level();
    assert_eq!(shown.len(), 6);
    assert_eq!(count_of(&shown, temp), 1);

    sync.complete_create(pending).await.unwrap();
    let shown = sync.top_level();
    assert_eq!(count_of(&shown, 42), 1);
    assert!(!shown.contains(&temp));
}

#[tokio::test]
async fn insert_held_in_unshown_page_reconciles_there() {
    let comments = (1..=10).map(|i| Entity::new(i, "c", i as u64)).collect();
    let (sync, _remote, _clock) = setup(ScriptedRemote::new().with_top_level(comments));
    sync.load_page(0).await.unwrap();

    let pending = sync.begin_create("mine", None).unwrap();
    let temp = pending.temp_id;
    let held = |sync: &Synchronizer<Arc<ScriptedRemote>>| {
        sync.read(|s| s.cache().get(1).map(|p| p.ids.clone()))
    };
    assert_eq!(held(&sync), Some(vec![temp]));

    sync.complete_create(pending).await.unwrap();
    assert_eq!(held(&sync), Some(vec![42]));
    assert!(!sync.top_level().contains(&42));
    assert!(sync.read(|s| s.undo_record(temp).is_none()));
    let entity = sync.get_entity(42).unwrap();
    assert!(!entity.pending && !entity.temp);
}

#[tokio::test]
async fn failed_insert_in_unshown_page_is_rolled_back() {
    let comments = (1..=15).map(|i| Entity::new(i, "c", i as u64)).collect();
    let (sync, remote, _clock) = setup(ScriptedRemote::new().with_top_level(comments));
    sync.load_page(0).await.unwrap();
    remote.state.lock().unwrap().fail_creates = true;

    let pending = sync.begin_create("mine", None).unwrap();
    let temp = pending.temp_id;
    assert!(sync.complete_create(pending).await.is_err());

    assert!(sync.get_entity(temp).is_none());
    assert!(sync.read(|s| s.cache().get(1).is_none()));
    assert!(sync.read(|s| s.undo_record(temp).is_none()));
    assert_eq!(sync.top_level().len(), 10);

    sync.load_page(1).await.unwrap();
    assert_eq!(remote.calls().last().unwrap(), "page 10");
    assert_eq!(sync.top_level().len(), 5);
}

#[tokio::test]
async fn fresh_page_is_served_from_cache() {
    let (sync, remote, clock) = setup(ScriptedRemote::new().with_top_level(vec![Entity::new(1, "c", 1)]));
    sync.load_page(0).await.unwrap();
    sync.load_page(0).await.unwrap();
    assert_eq!(remote.calls(), vec!["page 0"]);

    clock.advance(30_000);
    sync.load_page(0).await.unwrap();
    assert_eq!(remote.calls(), vec!["page 0", "page 0"]);
}

#[tokio::test]
async fn replies_load_in_pages_and_toggle_without_refetch() {
    let remote = ScriptedRemote::new().with_top_level(vec![Entity::new(1, "parent", 1)]);
    let replies = (10..17)
        .map(|i| Entity::new(i, "r", i as u64).with_parent(1))
        .collect();
    remote.state.lock().unwrap().replies.insert(1, replies);
    let (sync, remote, _clock) = setup(remote);
    sync.start().await.unwrap();

    sync.toggle_replies(1).await.unwrap();
    assert_eq!(sync.replies(1).len(), 5);
    assert!(sync.read(|s| s.replies_meta(1).unwrap().has_more));

    sync.load_replies(1).await.unwrap();
    assert_eq!(sync.replies(1).len(), 7);
    assert!(!sync.read(|s| s.replies_meta(1).unwrap().has_more));

    sync.toggle_replies(1).await.unwrap();
    assert_eq!(sync.thread_rows().len(), 1);
    sync.toggle_replies(1).await.unwrap();
    assert_eq!(sync.thread_rows().len(), 8);
    assert_eq!(
        remote.calls(),
        vec!["page 0", "replies 1 0", "replies 1 5"]
    );
}

// ============================================================================
// Policy
// ============================================================================

#[tokio::test]
async fn reserved_words_from_remote_block_creation() {
    let remote = ScriptedRemote::new();
    remote.state.lock().unwrap().reserved = vec!["Casino".into()];
    let (sync, remote, _clock) = setup(remote);
    sync.start().await.unwrap();

    let err = sync.create_top_level("best casino in town").await.unwrap_err();
    assert_eq!(err, Error::ReservedWord("casino".into()));
    assert_eq!(remote.calls(), vec!["page 0"]);
    assert_eq!(sync.take_notices().len(), 1);
}

#[tokio::test]
async fn editing_someone_elses_comment_is_refused() {
    let theirs = Entity::new(5, "theirs", 1).with_author(threadline_engine::Author::new(2, "Bob"));
    let (sync, remote, _clock) = setup(ScriptedRemote::new().with_top_level(vec![theirs]));
    sync.start().await.unwrap();

    assert!(matches!(
        sync.save_edit(5, "mine now").await,
        Err(Error::NotPermitted(_))
    ));
    assert!(matches!(sync.delete_entity(5).await, Err(Error::NotPermitted(_))));
    assert_eq!(remote.calls(), vec!["page 0"]);
    assert_eq!(sync.get_entity(5).unwrap().content, "theirs");
}
