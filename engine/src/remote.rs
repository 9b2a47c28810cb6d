//! The remote data service the synchronizer talks to.
//!
//! The engine never does IO itself. Hosts plug in an implementation of
//! [`RemoteService`] (the `http` feature ships one backed by `reqwest`).

use crate::{CorrelationToken, CreateRequest, Entity, EntityId, EntityPatch, ThreadRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a [`RemoteService`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result of a create call. Servers answer with a bare id, a one-element
/// id list or the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Created {
    Id(EntityId),
    Ids(Vec<EntityId>),
    Record(Box<Entity>),
}

impl Created {
    /// The server-assigned id, if the response carried one.
    pub fn id(&self) -> Option<EntityId> {
        match self {
            Created::Id(id) => Some(*id),
            Created::Ids(ids) => ids.first().copied(),
            Created::Record(entity) => Some(entity.id),
        }
        .filter(|id| *id > 0)
    }
}

/// Result of a remove call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Removed {
    Id(EntityId),
    Record { deleted_id: EntityId },
}

impl Removed {
    pub fn id(&self) -> EntityId {
        match self {
            Removed::Id(id) | Removed::Record { deleted_id: id } => *id,
        }
    }
}

/// One page of comments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub comments: Vec<Entity>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub total_count: u64,
}

/// Operations the synchronizer needs from the server.
pub trait RemoteService: Send + Sync {
    /// Create a comment. The token must be echoed in the resulting push.
    fn create(
        &self,
        request: &CreateRequest,
        token: CorrelationToken,
    ) -> impl Future<Output = Result<Created, RemoteError>> + Send;

    /// Write changed fields of a persisted comment.
    fn write(
        &self,
        id: EntityId,
        fields: &EntityPatch,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Delete a persisted comment.
    fn remove(&self, id: EntityId) -> impl Future<Output = Result<Removed, RemoteError>> + Send;

    /// Invoke a named server method. `args` is a JSON array whose first
    /// element is the subject id.
    fn call(&self, method: &str, args: Value)
        -> impl Future<Output = Result<Value, RemoteError>> + Send;

    /// Top-level comments of a thread.
    fn top_level_page(
        &self,
        thread: &ThreadRef,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Page, RemoteError>> + Send;

    /// Replies of one comment.
    fn replies_page(
        &self,
        parent: EntityId,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Page, RemoteError>> + Send;

    /// Words comments may not contain.
    fn reserved_words(&self) -> impl Future<Output = Result<Vec<String>, RemoteError>> + Send;
}

impl<R: RemoteService> RemoteService for Arc<R> {
    fn create(
        &self,
        request: &CreateRequest,
        token: CorrelationToken,
    ) -> impl Future<Output = Result<Created, RemoteError>> + Send {
        (**self).create(request, token)
    }

    fn write(
        &self,
        id: EntityId,
        fields: &EntityPatch,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send {
        (**self).write(id, fields)
    }

    fn remove(&self, id: EntityId) -> impl Future<Output = Result<Removed, RemoteError>> + Send {
        (**self).remove(id)
    }

    fn call(
        &self,
        method: &str,
        args: Value,
    ) -> impl Future<Output = Result<Value, RemoteError>> + Send {
        (**self).call(method, args)
    }

    fn top_level_page(
        &self,
        thread: &ThreadRef,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Page, RemoteError>> + Send {
        (**self).top_level_page(thread, limit, offset)
    }

    fn replies_page(
        &self,
        parent: EntityId,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Page, RemoteError>> + Send {
        (**self).replies_page(parent, limit, offset)
    }

    fn reserved_words(&self) -> impl Future<Output = Result<Vec<String>, RemoteError>> + Send {
        (**self).reserved_words()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_accepts_every_shape() {
        let bare: Created = serde_json::from_value(json!(42)).unwrap();
        let list: Created = serde_json::from_value(json!([42])).unwrap();
        let record: Created = serde_json::from_value(json!({"id": 42, "content": "hi"})).unwrap();

        assert_eq!(bare.id(), Some(42));
        assert_eq!(list.id(), Some(42));
        assert_eq!(record.id(), Some(42));
    }

    #[test]
    fn created_without_usable_id() {
        let empty: Created = serde_json::from_value(json!([])).unwrap();
        assert_eq!(empty.id(), None);
        assert_eq!(Created::Id(-3).id(), None);
    }

    #[test]
    fn removed_shapes() {
        let bare: Removed = serde_json::from_value(json!(9)).unwrap();
        let record: Removed = serde_json::from_value(json!({"deleted_id": 9})).unwrap();
        assert_eq!(bare.id(), 9);
        assert_eq!(record.id(), 9);
    }

    #[test]
    fn page_defaults_missing_fields() {
        let page: Page = serde_json::from_value(json!({"comments": []})).unwrap();
        assert!(!page.has_more);
        assert_eq!(page.total_count, 0);
    }
}
