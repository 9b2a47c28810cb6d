//! Comment handlers - persist changes and notify thread subscribers.

use crate::db::{self, NewComment};
use crate::error::{AppError, Result};
use crate::AppState;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use threadline_engine::{
    ContentPolicy, CorrelationToken, CreateRequest, Entity, EntityId, EntityPatch, Notification,
    Page, ThreadRef, Viewer, TOGGLE_LIKE,
};

/// Default and maximum page sizes.
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

/// Request body for comment creation.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(flatten)]
    pub comment: CreateRequest,
    /// Correlation token echoed in the `create` notification
    #[serde(default)]
    pub client_tmp_id: Option<CorrelationToken>,
}

/// Response for comment deletion.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted_id: EntityId,
}

/// Body of a generic action call.
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub args: Value,
}

/// Pagination parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Clamped `(limit, offset)`.
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Policy built from configuration alone; checked before any query runs.
fn config_policy(state: &AppState) -> ContentPolicy {
    ContentPolicy::new(state.config.max_content_len)
        .with_reserved_words(&state.config.reserved_words)
}

/// Full policy including the stored reserved words.
async fn content_policy(state: &AppState) -> Result<ContentPolicy> {
    let words = handle_reserved_words(state).await?;
    Ok(ContentPolicy::new(state.config.max_content_len).with_reserved_words(words))
}

fn notify(state: &AppState, thread: &ThreadRef, notification: Notification) {
    let sent = state
        .conn_manager
        .broadcast(&thread.channel(), notification.into());
    tracing::trace!(channel = %thread.channel(), sent, "Notified subscribers");
}

/// Recount a parent's replies and tell subscribers.
async fn publish_child_count(state: &AppState, thread: &ThreadRef, parent_id: EntityId) -> Result<()> {
    let count = db::refresh_child_count(&state.pool, parent_id).await?;
    notify(
        state,
        thread,
        Notification::parent_updated(parent_id, u32::try_from(count).unwrap_or_default()),
    );
    Ok(())
}

async fn load(state: &AppState, id: EntityId) -> Result<db::StoredComment> {
    db::get_comment(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("comment {id}")))
}

/// Create a comment or reply.
pub async fn handle_create(
    state: &AppState,
    viewer: &Viewer,
    request: CreateCommentRequest,
) -> Result<Entity> {
    let CreateCommentRequest {
        comment,
        client_tmp_id,
    } = request;

    config_policy(state).check_create(viewer, &comment.content)?;

    let mut thread = ThreadRef::new(comment.res_model.clone(), comment.res_id);
    if let Some(parent_id) = comment.parent_id {
        let parent = load(state, parent_id).await?;
        // An unset thread on a reply means "same as the parent".
        if thread.res_model.is_empty() {
            thread = parent.thread();
        } else if parent.thread() != thread {
            return Err(AppError::BadRequest(
                "reply must belong to the parent's thread".into(),
            ));
        }
    } else if thread.res_model.is_empty() {
        return Err(AppError::BadRequest("res_model is required".into()));
    }

    content_policy(state).await?.check(&comment.content)?;

    let stored = db::insert_comment(
        &state.pool,
        NewComment {
            thread: &thread,
            parent_id: comment.parent_id,
            author: &viewer.author(),
            content: &comment.content,
            created_at: now_millis(),
        },
    )
    .await?;
    let entity = stored.to_entity();

    tracing::info!(id = entity.id, thread = %thread.channel(), token = ?client_tmp_id, "Comment created");

    notify(state, &thread, Notification::created(&entity, client_tmp_id));
    if let Some(parent_id) = entity.parent_id {
        publish_child_count(state, &thread, parent_id).await?;
    }

    Ok(entity)
}

/// Edit a comment's content. Only the author may edit.
pub async fn handle_edit(
    state: &AppState,
    viewer: &Viewer,
    id: EntityId,
    patch: EntityPatch,
) -> Result<Entity> {
    let Some(content) = patch.content else {
        return Err(AppError::BadRequest("only content can be edited".into()));
    };

    let stored = load(state, id).await?;
    content_policy(state)
        .await?
        .check_edit(viewer, &stored.to_entity(), &content)?;

    let updated = db::update_content(&state.pool, id, &content)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("comment {id}")))?;
    let entity = updated.to_entity();

    tracing::info!(id, "Comment edited");
    notify(state, &updated.thread(), Notification::updated(&entity));

    Ok(entity)
}

/// Delete a comment and its replies.
pub async fn handle_delete(state: &AppState, viewer: &Viewer, id: EntityId) -> Result<DeleteResponse> {
    let stored = load(state, id).await?;
    config_policy(state).check_delete(viewer, &stored.to_entity())?;

    if !db::delete_comment(&state.pool, id).await? {
        return Err(AppError::NotFound(format!("comment {id}")));
    }

    let thread = stored.thread();
    tracing::info!(id, thread = %thread.channel(), "Comment deleted");

    notify(state, &thread, Notification::deleted(id, stored.parent_id));
    if let Some(parent_id) = stored.parent_id {
        publish_child_count(state, &thread, parent_id).await?;
    }

    Ok(DeleteResponse { deleted_id: id })
}

/// Run a named action against a comment.
pub async fn handle_action(
    state: &AppState,
    viewer: &Viewer,
    id: EntityId,
    method: &str,
    request: ActionRequest,
) -> Result<Value> {
    if method != TOGGLE_LIKE {
        return Err(AppError::BadRequest(format!("unknown method: {method}")));
    }
    if let Some(target) = request.args.get(0).and_then(Value::as_i64) {
        if target != id {
            return Err(AppError::BadRequest(format!(
                "{method}: argument {target} does not match comment {id}"
            )));
        }
    }
    if !viewer.is_user {
        return Err(threadline_engine::Error::NotPermitted("only participants can like".into()).into());
    }

    let stored = load(state, id).await?;
    let (count, liked) = db::toggle_like(&state.pool, id, viewer.id).await?;

    tracing::debug!(id, user = viewer.id, liked, count, "Like toggled");
    notify(
        state,
        &stored.thread(),
        Notification::like_toggled(id, stored.parent_id, u32::try_from(count).unwrap_or_default()),
    );

    Ok(json!({ "count": count, "liked": liked }))
}

fn page(rows: Vec<db::StoredComment>, total: i64, offset: i64) -> Page {
    let has_more = offset + (rows.len() as i64) < total;
    Page {
        comments: rows.iter().map(db::StoredComment::to_entity).collect(),
        has_more,
        total_count: u64::try_from(total).unwrap_or_default(),
    }
}

/// Top-level comments of a thread.
pub async fn handle_thread_page(state: &AppState, thread: &ThreadRef, query: PageQuery) -> Result<Page> {
    let (limit, offset) = query.bounds();
    let rows = db::list_top_level(&state.pool, thread, limit, offset).await?;
    let total = db::count_top_level(&state.pool, thread).await?;
    Ok(page(rows, total, offset))
}

/// Direct replies of a comment.
pub async fn handle_replies_page(state: &AppState, parent_id: EntityId, query: PageQuery) -> Result<Page> {
    let (limit, offset) = query.bounds();
    let rows = db::list_replies(&state.pool, parent_id, limit, offset).await?;
    let total = db::count_replies(&state.pool, parent_id).await?;
    Ok(page(rows, total, offset))
}

/// Configured and stored reserved words, sorted and without duplicates.
pub async fn handle_reserved_words(state: &AppState) -> Result<Vec<String>> {
    let mut words = db::get_reserved_words(&state.pool).await?;
    words.extend(state.config.reserved_words.iter().cloned());
    words.sort();
    words.dedup();
    Ok(words)
}
