//! Deferred mutations queued against temporary ids.
//!
//! While an entity only exists locally, mutations the user makes to it cannot
//! be sent to the server yet. They are expressed as [`PendingAction`]s and
//! replayed against the real id once the entity is reconciled.

use crate::{entity::EntityPatch, CorrelationToken, EntityId, Timestamp};
use serde::{Deserialize, Serialize};

/// Remote method that flips the caller's like on a comment.
pub const TOGGLE_LIKE: &str = "toggle_like";

/// The discussion a comment belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    /// Kind of the commented resource, e.g. `"listing"`
    pub res_model: String,
    /// Id of the commented resource
    pub res_id: i64,
}

impl ThreadRef {
    pub fn new(res_model: impl Into<String>, res_id: i64) -> Self {
        Self {
            res_model: res_model.into(),
            res_id,
        }
    }

    /// Name of the push channel carrying this thread's notifications.
    pub fn channel(&self) -> String {
        format!("comments_{}_{}", self.res_model, self.res_id)
    }
}

/// Payload of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub content: String,
    pub res_model: String,
    pub res_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
}

impl CreateRequest {
    /// Create a request for a comment in `thread`.
    pub fn new(thread: &ThreadRef, content: impl Into<String>, parent_id: Option<EntityId>) -> Self {
        Self {
            content: content.into(),
            res_model: thread.res_model.clone(),
            res_id: thread.res_id,
            parent_id,
        }
    }
}

/// A mutation waiting for its target to receive a real id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
    /// Write fields to the entity.
    ContentUpdate { fields: EntityPatch },
    /// Delete the entity.
    Removal {
        #[serde(default)]
        parent_id: Option<EntityId>,
    },
    /// Invoke a remote method. `args` defaults to `[real_id]`.
    RemoteCall {
        method: String,
        #[serde(default)]
        args: Option<serde_json::Value>,
    },
    /// Create a reply under the entity once it exists on the server.
    NestedCreation {
        request: CreateRequest,
        child_temp_id: EntityId,
        token: CorrelationToken,
    },
}

impl PendingAction {
    /// Queue a content edit.
    pub fn edit(content: impl Into<String>) -> Self {
        PendingAction::ContentUpdate {
            fields: EntityPatch::content(content),
        }
    }

    /// Queue a like toggle.
    pub fn toggle_like() -> Self {
        PendingAction::RemoteCall {
            method: TOGGLE_LIKE.to_string(),
            args: None,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::ContentUpdate { .. } => "content_update",
            PendingAction::Removal { .. } => "removal",
            PendingAction::RemoteCall { .. } => "remote_call",
            PendingAction::NestedCreation { .. } => "nested_creation",
        }
    }
}

/// An action together with the time it was queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub action: PendingAction,
    pub enqueued_at: Timestamp,
}
