//! Entity types: the comments held in the entity map.

use crate::{allocator::is_temporary, EntityId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Reference to the user who wrote an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
}

impl Author {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A comment, the single canonical copy kept in the entity map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Positive once persisted, negative while optimistic
    pub id: EntityId,
    /// Comment text
    #[serde(default)]
    pub content: String,
    /// Author reference (absent on placeholders)
    #[serde(default)]
    pub author: Option<Author>,
    /// Creation time (milliseconds since epoch)
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub child_count: u32,
    /// Parent comment, `None` for top-level comments
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    /// Awaiting server confirmation
    #[serde(default)]
    pub pending: bool,
    /// Identifier is a temporary one
    #[serde(default)]
    pub temp: bool,
}

impl Entity {
    /// Create a confirmed entity as received from the server.
    pub fn new(id: EntityId, content: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id,
            content: content.into(),
            author: None,
            created_at,
            like_count: 0,
            child_count: 0,
            parent_id: None,
            pending: false,
            temp: false,
        }
    }

    /// Create an optimistic entity under a temporary id.
    pub fn optimistic(
        temp_id: EntityId,
        content: impl Into<String>,
        author: Option<Author>,
        parent_id: Option<EntityId>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            author,
            parent_id,
            pending: true,
            temp: true,
            ..Self::new(temp_id, content, created_at)
        }
    }

    /// Minimal stand-in for an entity the server created but we know nothing about yet.
    pub fn placeholder(id: EntityId, created_at: Timestamp) -> Self {
        Self::new(id, "", created_at)
    }

    /// Set the author.
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// Set the parent.
    pub fn with_parent(mut self, parent_id: EntityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the like count.
    pub fn with_likes(mut self, like_count: u32) -> Self {
        self.like_count = like_count;
        self
    }

    /// Whether the identifier is still a temporary one.
    pub fn is_temporary(&self) -> bool {
        self.temp || is_temporary(self.id)
    }

    /// Whether `user` wrote this entity.
    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.author.as_ref().is_some_and(|a| a.id == user)
    }

    /// Merge the present fields of `patch` into this entity.
    pub fn apply(&mut self, patch: &EntityPatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(author) = &patch.author {
            self.author = Some(author.clone());
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
        if let Some(like_count) = patch.like_count {
            self.like_count = like_count;
        }
        if let Some(child_count) = patch.child_count {
            self.child_count = child_count;
        }
        if let Some(parent_id) = patch.parent_id {
            self.parent_id = Some(parent_id);
        }
    }

    /// Take over the server id and clear the optimistic flags.
    pub fn confirm(&mut self, id: EntityId) {
        self.id = id;
        self.pending = false;
        self.temp = false;
    }
}

/// A partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPatch {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
}

impl EntityPatch {
    /// Patch that only replaces the content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Patch that only replaces the like count.
    pub fn like_count(like_count: u32) -> Self {
        Self {
            like_count: Some(like_count),
            ..Self::default()
        }
    }

    /// Patch that only replaces the child count.
    pub fn child_count(child_count: u32) -> Self {
        Self {
            child_count: Some(child_count),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
