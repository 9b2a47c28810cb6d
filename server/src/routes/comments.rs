//! Comment endpoint routes.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::Value;
use threadline_engine::{Entity, EntityId, EntityPatch, Page, ThreadRef};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_action, handle_create, handle_delete, handle_edit, handle_reserved_words,
    handle_replies_page, handle_thread_page, ActionRequest, CreateCommentRequest, DeleteResponse,
    PageQuery,
};
use crate::AppState;

/// Create comment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_handler))
        .route("/comments/{id}", patch(edit_handler).delete(delete_handler))
        .route("/comments/{id}/actions/{method}", post(action_handler))
        .route("/comments/{id}/replies", get(replies_handler))
        .route("/threads/{res_model}/{res_id}/comments", get(thread_handler))
        .route("/policy/reserved-words", get(reserved_words_handler))
}

/// POST /comments - Create a comment or reply.
async fn create_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateCommentRequest>,
) -> Result<Json<Entity>> {
    let entity = handle_create(&state, &auth.viewer, request).await?;
    Ok(Json(entity))
}

/// PATCH /comments/{id} - Edit a comment.
async fn edit_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<EntityId>,
    Json(patch): Json<EntityPatch>,
) -> Result<Json<Entity>> {
    let entity = handle_edit(&state, &auth.viewer, id, patch).await?;
    Ok(Json(entity))
}

/// DELETE /comments/{id} - Delete a comment and its replies.
async fn delete_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<EntityId>,
) -> Result<Json<DeleteResponse>> {
    let response = handle_delete(&state, &auth.viewer, id).await?;
    Ok(Json(response))
}

/// POST /comments/{id}/actions/{method} - Run a named action.
async fn action_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, method)): Path<(EntityId, String)>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<Value>> {
    let result = handle_action(&state, &auth.viewer, id, &method, request).await?;
    Ok(Json(result))
}

/// GET /comments/{id}/replies - One page of replies.
async fn replies_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<EntityId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page>> {
    let page = handle_replies_page(&state, id, query).await?;
    Ok(Json(page))
}

/// GET /threads/{res_model}/{res_id}/comments - One page of top-level comments.
async fn thread_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((res_model, res_id)): Path<(String, i64)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page>> {
    let thread = ThreadRef::new(res_model, res_id);
    let page = handle_thread_page(&state, &thread, query).await?;
    Ok(Json(page))
}

/// GET /policy/reserved-words - Words comments may not contain.
async fn reserved_words_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<String>>> {
    let words = handle_reserved_words(&state).await?;
    Ok(Json(words))
}
