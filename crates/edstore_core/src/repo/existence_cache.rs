//! Process-wide set of alias ids known to exist.
//!
//! # Responsibility
//! - Let reference validation skip the alias table for ids it has already
//!   confirmed.
//!
//! # Invariants
//! - Not authoritative: a miss always falls back to the backing store, a hit
//!   is trusted.
//! - Mutated only by committed units of work (see `UnitOfWork::commit`).

use crate::model::identity::MeadowlarkId;
use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct ExistenceCache {
    ids: DashSet<MeadowlarkId>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &MeadowlarkId) -> bool {
        self.ids.contains(id)
    }

    /// Splits `candidates` into `(hits, misses)`, keeping input order.
    pub fn partition<'a, I>(&self, candidates: I) -> (Vec<MeadowlarkId>, Vec<MeadowlarkId>)
    where
        I: IntoIterator<Item = &'a MeadowlarkId>,
    {
        candidates
            .into_iter()
            .cloned()
            .partition(|id| self.ids.contains(id))
    }

    pub fn insert_all<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a MeadowlarkId>,
    {
        for id in ids {
            self.ids.insert(id.clone());
        }
    }

    pub fn evict_all<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a MeadowlarkId>,
    {
        for id in ids {
            self.ids.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ExistenceCache;
    use crate::model::identity::MeadowlarkId;

    fn ids(values: &[&str]) -> Vec<MeadowlarkId> {
        values.iter().map(|value| MeadowlarkId::new(*value)).collect()
    }

    #[test]
    fn partition_separates_hits_from_misses() {
        let cache = ExistenceCache::new();
        cache.insert_all(&ids(&["a", "c"]));

        let (hits, misses) = cache.partition(&ids(&["a", "b", "c", "d"]));
        assert_eq!(hits, ids(&["a", "c"]));
        assert_eq!(misses, ids(&["b", "d"]));
    }

    #[test]
    fn eviction_turns_hits_into_misses() {
        let cache = ExistenceCache::new();
        cache.insert_all(&ids(&["a", "b"]));
        cache.evict_all(&ids(&["a", "never-cached"]));

        assert!(!cache.contains(&MeadowlarkId::new("a")));
        assert!(cache.contains(&MeadowlarkId::new("b")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_writers_do_not_lose_entries() {
        let cache = std::sync::Arc::new(ExistenceCache::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let cache = std::sync::Arc::clone(&cache);
                std::thread::spawn(move || {
                    let own: Vec<_> = (0..100)
                        .map(|n| MeadowlarkId::new(format!("{worker}-{n}")))
                        .collect();
                    cache.insert_all(&own);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
