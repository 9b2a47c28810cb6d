//! # Threadline Engine
//!
//! Optimistic mutation synchronization for threaded comments.
//!
//! A comment written by the user appears immediately under a temporary id,
//! while the create request is in flight. Whatever the user does to it in
//! the meantime (edit, like, reply, delete) is queued and replayed once the
//! server has assigned the real id. A failed creation is rolled back exactly,
//! and live pushes that echo the client's own mutations are recognized and
//! dropped.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine talks to the server only through [`RemoteService`]
//! - **No runtime**: timers are deadlines applied by [`Store::sweep`]; time is
//!   read through an injected [`Clock`]
//! - **One copy per entity**: index lists hold ids, the entity map holds data
//!
//! ## Core Concepts
//!
//! ### Temporary ids
//!
//! [`IdentityAllocator`] mints strictly negative ids. Server ids are positive,
//! so the sign alone tells whether an entity is confirmed.
//!
//! ### Pending actions
//!
//! Mutations of a temporary entity become [`PendingAction`]s in an
//! [`ActionQueue`] keyed by the temp id. The queue expires two minutes after
//! its last enqueue.
//!
//! ### Reconciliation
//!
//! [`Store::reconcile_created`] swaps the temp id for the real one in every
//! index and hands back the queued actions; [`Synchronizer`] replays them in
//! order. [`Store::rollback`] undoes an optimistic insert.
//!
//! ### Deduplication
//!
//! Create requests carry a [`CorrelationToken`] that the server echoes in its
//! `create` push. [`Deduplicator`] makes the first of (response, push)
//! reconcile and the second a no-op.
//!
//! ## Quick Start
//!
//! ```rust
//! use threadline_engine::{Entity, Page, Store, SyncConfig, ThreadRef, Viewer};
//!
//! let mut store = Store::new(
//!     ThreadRef::new("listing", 7),
//!     Viewer::user(1, "Ann"),
//!     SyncConfig::default(),
//! );
//! store.apply_page(
//!     0,
//!     Page {
//!         comments: vec![Entity::new(1, "First!", 1_000)],
//!         has_more: false,
//!         total_count: 1,
//!     },
//!     1_000,
//! );
//!
//! // Optimistic insert under a temporary id.
//! let pending = store.insert_optimistic("Hello", None, 2_000);
//! assert!(pending.temp_id < 0);
//!
//! // The server answered with id 42.
//! let reconciled = store.reconcile_created(42, Some(pending.temp_id), 2_100);
//! assert!(reconciled.replay.is_empty());
//! assert!(store.top_level().contains(&42));
//! assert!(store.get_entity(pending.temp_id).is_none());
//! ```

use serde::{Deserialize, Serialize};

pub mod action;
pub mod allocator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod entity;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod notification;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod sort;
pub mod store;
pub mod sync;
pub mod validation;

// Re-export main types at crate root
pub use action::{CreateRequest, PendingAction, QueuedAction, ThreadRef, TOGGLE_LIKE};
pub use allocator::{is_temporary, IdentityAllocator};
pub use cache::{CachedPage, PageCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use dedup::{Deduplicator, PushVerdict};
pub use entity::{Author, Entity, EntityPatch};
pub use error::{Error, Result};
#[cfg(feature = "http")]
pub use http::HttpRemote;
pub use notification::{Notification, NotificationKind};
pub use queue::ActionQueue;
pub use reconcile::Reconciled;
pub use remote::{Created, Page, RemoteError, RemoteService, Removed};
pub use sort::SortMode;
pub use store::{
    IndexKey, InsertedInto, Notice, PendingCreate, PushOutcome, RepliesMeta, Store, ThreadRow,
    UndoRecord,
};
pub use sync::Synchronizer;
pub use validation::{ContentPolicy, Viewer};

/// Type aliases for clarity
pub type EntityId = i64;
pub type UserId = i64;
pub type Timestamp = u64;

/// Client value attached to a create request and echoed by the server's push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(pub i64);

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
