//! Client-side cache of top-level pages.
//!
//! Pages hold ids only; the entity map stays the single copy of the data.
//! Stale pages are kept (optimistic inserts may live in them) but are not
//! served by [`PageCache::fresh`].

use crate::{EntityId, Timestamp};
use std::collections::BTreeMap;

/// One cached page of top-level ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub ids: Vec<EntityId>,
    pub has_more: bool,
    /// When the page was fetched. `None` for a page that so far only holds
    /// local inserts; it is fetched the first time it is shown.
    pub stored_at: Option<Timestamp>,
}

/// Top-level pages keyed by page number.
#[derive(Debug, Clone)]
pub struct PageCache {
    pages: BTreeMap<usize, CachedPage>,
    ttl: u64,
}

impl PageCache {
    pub fn new(ttl: u64) -> Self {
        Self {
            pages: BTreeMap::new(),
            ttl,
        }
    }

    /// Store a page, replacing any previous copy.
    pub fn put(&mut self, page: usize, ids: Vec<EntityId>, has_more: bool, now: Timestamp) {
        self.pages.insert(
            page,
            CachedPage {
                ids,
                has_more,
                stored_at: Some(now),
            },
        );
    }

    /// A page that is still within its TTL.
    pub fn fresh(&self, page: usize, now: Timestamp) -> Option<&CachedPage> {
        self.pages
            .get(&page)
            .filter(|p| p.stored_at.is_some_and(|at| now.saturating_sub(at) < self.ttl))
    }

    /// A page regardless of age.
    pub fn get(&self, page: usize) -> Option<&CachedPage> {
        self.pages.get(&page)
    }

    pub fn get_mut(&mut self, page: usize) -> Option<&mut CachedPage> {
        self.pages.get_mut(&page)
    }

    /// The page, created unfetched if it was not cached.
    pub fn local_entry(&mut self, page: usize) -> &mut CachedPage {
        self.pages.entry(page).or_insert_with(|| CachedPage {
            ids: Vec::new(),
            has_more: true,
            stored_at: None,
        })
    }

    /// Highest cached page number.
    pub fn last_page(&self) -> Option<usize> {
        self.pages.keys().next_back().copied()
    }

    /// Page holding `id`, if any.
    pub fn page_of(&self, id: EntityId) -> Option<usize> {
        self.pages
            .iter()
            .find(|(_, p)| p.ids.contains(&id))
            .map(|(page, _)| *page)
    }

    /// Replace `old` by `new` in place in every page. Returns the touched pages.
    ///
    /// A page that already lists `new` just loses `old`, so no id appears twice.
    pub fn replace_id(&mut self, old: EntityId, new: EntityId) -> Vec<usize> {
        let mut touched = Vec::new();
        for (page, cached) in self.pages.iter_mut() {
            if swap_id(&mut cached.ids, old, new) {
                touched.push(*page);
            }
        }
        touched
    }

    /// Remove `id` from every page, dropping pages that become empty.
    pub fn remove_id(&mut self, id: EntityId) {
        self.pages.retain(|_, cached| {
            let before = cached.ids.len();
            cached.ids.retain(|x| *x != id);
            !(cached.ids.is_empty() && before > 0)
        });
    }

    pub fn pages_mut(&mut self) -> impl Iterator<Item = (&usize, &mut CachedPage)> {
        self.pages.iter_mut()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Replace `old` by `new` at the same position, or drop `old` when `new` is
/// already listed. Returns whether `old` was present.
pub fn swap_id(ids: &mut Vec<EntityId>, old: EntityId, new: EntityId) -> bool {
    let Some(pos) = ids.iter().position(|id| *id == old) else {
        return false;
    };
    if ids.contains(&new) {
        ids.remove(pos);
    } else {
        ids[pos] = new;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: u64 = 30_000;

    #[test]
    fn fresh_respects_ttl() {
        let mut cache = PageCache::new(TTL);
        cache.put(0, vec![1, 2], true, 1000);
        assert!(cache.fresh(0, 1000 + TTL - 1).is_some());
        assert!(cache.fresh(0, 1000 + TTL).is_none());
        assert!(cache.get(0).is_some());
    }

    #[test]
    fn local_pages_are_never_fresh() {
        let mut cache = PageCache::new(TTL);
        cache.local_entry(1).ids.push(-7);
        assert!(cache.fresh(1, 0).is_none());
        assert_eq!(cache.get(1).unwrap().ids, vec![-7]);

        cache.put(1, vec![3, -7], false, 10);
        assert!(cache.fresh(1, 10).is_some());
        cache.local_entry(1).ids.push(-8);
        assert_eq!(cache.get(1).unwrap().ids, vec![3, -7, -8]);
    }

    #[test]
    fn replace_id_in_place() {
        let mut cache = PageCache::new(TTL);
        cache.put(0, vec![1, 2], true, 0);
        cache.put(3, vec![5, -7, 6], false, 0);
        assert_eq!(cache.replace_id(-7, 42), vec![3]);
        assert_eq!(cache.get(3).unwrap().ids, vec![5, 42, 6]);
        assert!(cache.replace_id(-7, 42).is_empty());
    }

    #[test]
    fn replace_id_never_duplicates() {
        let mut cache = PageCache::new(TTL);
        cache.put(0, vec![42, -7, 3], true, 0);
        assert_eq!(cache.replace_id(-7, 42), vec![0]);
        assert_eq!(cache.get(0).unwrap().ids, vec![42, 3]);
    }

    #[test]
    fn remove_id_drops_emptied_pages() {
        let mut cache = PageCache::new(TTL);
        cache.put(0, vec![1, 2], true, 0);
        cache.put(1, vec![3], false, 0);
        cache.remove_id(3);
        assert!(cache.get(1).is_none());
        cache.remove_id(1);
        assert_eq!(cache.get(0).unwrap().ids, vec![2]);
    }

    #[test]
    fn last_page_and_lookup() {
        let mut cache = PageCache::new(TTL);
        assert_eq!(cache.last_page(), None);
        cache.put(0, vec![1], true, 0);
        cache.put(2, vec![9], false, 0);
        assert_eq!(cache.last_page(), Some(2));
        assert_eq!(cache.page_of(9), Some(2));
        assert_eq!(cache.page_of(4), None);
    }
}
