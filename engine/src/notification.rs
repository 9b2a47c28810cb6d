//! Live push notifications.
//!
//! The server pushes one JSON object per change:
//! `{"type": ..., "id": ..., "parent_id"?: ..., "client_tmp_id"?: ..., ...fields}`.
//! The `type` is kept as a string on the wire so that unknown kinds still
//! parse and can be logged and skipped.

use crate::{
    entity::{Author, Entity, EntityPatch},
    error::Result,
    CorrelationToken, EntityId, Error, Timestamp,
};
use serde::{Deserialize, Serialize};

/// What a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Create,
    Update,
    Delete,
    ParentUpdate,
    LikeToggle,
    Unknown,
}

impl NotificationKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "create" => NotificationKind::Create,
            "update" => NotificationKind::Update,
            "delete" => NotificationKind::Delete,
            "parent_update" => NotificationKind::ParentUpdate,
            "like_toggle" => NotificationKind::LikeToggle,
            _ => NotificationKind::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NotificationKind::Create => "create",
            NotificationKind::Update => "update",
            NotificationKind::Delete => "delete",
            NotificationKind::ParentUpdate => "parent_update",
            NotificationKind::LikeToggle => "like_toggle",
            NotificationKind::Unknown => "unknown",
        }
    }
}

/// A push message as delivered by the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    /// Correlation token echoed from the create request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_tmp_id: Option<CorrelationToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<u32>,
}

impl Notification {
    fn bare(kind: NotificationKind, id: EntityId) -> Self {
        Self {
            kind: kind.name().to_string(),
            id: Some(id),
            parent_id: None,
            client_tmp_id: None,
            content: None,
            author: None,
            created_at: None,
            like_count: None,
            child_count: None,
        }
    }

    /// A `create` push for a freshly stored entity.
    pub fn created(entity: &Entity, token: Option<CorrelationToken>) -> Self {
        Self {
            parent_id: entity.parent_id,
            client_tmp_id: token,
            content: Some(entity.content.clone()),
            author: entity.author.clone(),
            created_at: Some(entity.created_at),
            like_count: Some(entity.like_count),
            child_count: Some(entity.child_count),
            ..Self::bare(NotificationKind::Create, entity.id)
        }
    }

    /// An `update` push carrying the entity's current fields.
    pub fn updated(entity: &Entity) -> Self {
        Self {
            kind: NotificationKind::Update.name().to_string(),
            client_tmp_id: None,
            ..Self::created(entity, None)
        }
    }

    /// A `delete` push.
    pub fn deleted(id: EntityId, parent_id: Option<EntityId>) -> Self {
        Self {
            parent_id,
            ..Self::bare(NotificationKind::Delete, id)
        }
    }

    /// A `parent_update` push with the parent's new reply count.
    pub fn parent_updated(parent_id: EntityId, child_count: u32) -> Self {
        Self {
            child_count: Some(child_count),
            ..Self::bare(NotificationKind::ParentUpdate, parent_id)
        }
    }

    /// A `like_toggle` push.
    pub fn like_toggled(id: EntityId, parent_id: Option<EntityId>, like_count: u32) -> Self {
        Self {
            parent_id,
            like_count: Some(like_count),
            ..Self::bare(NotificationKind::LikeToggle, id)
        }
    }

    /// Attach a correlation token.
    pub fn with_token(mut self, token: CorrelationToken) -> Self {
        self.client_tmp_id = Some(token);
        self
    }

    /// Parse a raw JSON push.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedNotification(e.to_string()))
    }

    pub fn kind(&self) -> NotificationKind {
        NotificationKind::from_name(&self.kind)
    }

    /// The subject id, or an error if the push did not carry one.
    pub fn require_id(&self) -> Result<EntityId> {
        self.id
            .ok_or_else(|| Error::MalformedNotification(format!("'{}' without id", self.kind)))
    }

    /// Fields carried by the push, as a patch.
    pub fn patch(&self) -> EntityPatch {
        EntityPatch {
            content: self.content.clone(),
            author: self.author.clone(),
            created_at: self.created_at,
            like_count: self.like_count,
            child_count: self.child_count,
            parent_id: self.parent_id,
        }
    }

    /// Build a full entity from a `create` push.
    pub fn to_entity(&self, now: Timestamp) -> Result<Entity> {
        let id = self.require_id()?;
        let mut entity = Entity::placeholder(id, self.created_at.unwrap_or(now));
        entity.apply(&self.patch());
        Ok(entity)
    }
}
