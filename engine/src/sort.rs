//! Sort policies for index lists.
//!
//! Every policy is a total order: ties on the primary key fall through to a
//! secondary key and finally to the id, so re-sorting is deterministic.

use crate::{entity::Entity, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Ordering applied to top-level, reply and cached page lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMode {
    /// Like count desc, then newest first, then id desc (default)
    #[default]
    #[serde(rename = "like")]
    Likes,
    /// Creation time desc, then like count desc, then id desc
    #[serde(rename = "date_desc")]
    Newest,
    /// Creation time asc, then like count desc, then id asc
    #[serde(rename = "date_asc")]
    Oldest,
}

impl SortMode {
    /// Parse a mode name, falling back to [`SortMode::Likes`] for anything unknown.
    pub fn parse_lenient(name: &str) -> Self {
        match name {
            "date_desc" => SortMode::Newest,
            "date_asc" => SortMode::Oldest,
            _ => SortMode::Likes,
        }
    }

    /// Compare two ids by the fields of their entities.
    pub fn compare(
        self,
        entities: &HashMap<EntityId, Entity>,
        a: EntityId,
        b: EntityId,
    ) -> Ordering {
        let (la, ta) = keys(entities, a);
        let (lb, tb) = keys(entities, b);
        match self {
            SortMode::Likes => lb.cmp(&la).then(tb.cmp(&ta)).then(b.cmp(&a)),
            SortMode::Newest => tb.cmp(&ta).then(lb.cmp(&la)).then(b.cmp(&a)),
            SortMode::Oldest => ta.cmp(&tb).then(lb.cmp(&la)).then(a.cmp(&b)),
        }
    }

    /// Sort `ids` in place.
    pub fn sort(self, entities: &HashMap<EntityId, Entity>, ids: &mut [EntityId]) {
        ids.sort_by(|a, b| self.compare(entities, *a, *b));
    }

    /// Return a sorted copy of `ids`.
    pub fn sorted(self, entities: &HashMap<EntityId, Entity>, ids: &[EntityId]) -> Vec<EntityId> {
        let mut out = ids.to_vec();
        self.sort(entities, &mut out);
        out
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortMode::Likes => write!(f, "like"),
            SortMode::Newest => write!(f, "date_desc"),
            SortMode::Oldest => write!(f, "date_asc"),
        }
    }
}

// Entities missing from the map sort as if they had no likes and time zero.
fn keys(entities: &HashMap<EntityId, Entity>, id: EntityId) -> (u32, Timestamp) {
    entities
        .get(&id)
        .map(|e| (e.like_count, e.created_at))
        .unwrap_or((0, 0))
}
