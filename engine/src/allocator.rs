//! Temporary identity allocation for not-yet-persisted entities.
//!
//! Server ids are positive, so every id handed out here is strictly negative.
//! Ids combine the current time with a counter so that a store rebuilt from
//! the same session state does not reuse ids it handed out earlier.

use crate::{CorrelationToken, EntityId, Timestamp};

/// Mints locally-unique negative identifiers.
///
/// Ordering rules:
/// 1. Magnitude is `now * 1000 + counter`
/// 2. Magnitude never decreases, even if the clock goes backwards
///
/// This makes every result pairwise distinct for the allocator's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAllocator {
    /// Monotonically increasing counter
    counter: u64,
    /// Magnitude of the last id handed out
    last: i64,
}

impl IdentityAllocator {
    /// Create a fresh allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new temporary entity id.
    pub fn allocate(&mut self, now: Timestamp) -> EntityId {
        self.counter += 1;
        let millis = i64::try_from(now).unwrap_or(i64::MAX / 1000);
        let candidate = millis
            .saturating_mul(1000)
            .saturating_add(self.counter as i64);
        let magnitude = candidate.max(self.last.saturating_add(1));
        self.last = magnitude;
        -magnitude
    }

    /// Allocate a correlation token for a create request.
    pub fn token(&mut self, now: Timestamp) -> CorrelationToken {
        CorrelationToken(self.allocate(now))
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter
    }
}

/// Whether `id` was minted locally and has not been confirmed by the server.
pub fn is_temporary(id: EntityId) -> bool {
    id < 0
}
