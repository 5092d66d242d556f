//! One transaction plus the row locks and cache changes that belong to it.
//!
//! # Responsibility
//! - Open a `BEGIN IMMEDIATE` transaction on a pooled connection.
//! - Track row locks taken by the transaction and release them on finish.
//! - Stage existence cache changes and apply them only after commit.
//!
//! # Invariants
//! - Every started unit of work ends in exactly one commit or rollback.
//! - Cache changes are applied after a successful commit and before the row
//!   locks are released; a rollback discards them.

use super::document_repo::{RepoError, RepoResult};
use super::existence_cache::ExistenceCache;
use crate::db::row_locks::{LockMode, RowKey, RowLockSet, RowLockTable};
use crate::model::identity::{IdentityHasher, MeadowlarkId};
use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::Arc;

/// Shared collaborators every protocol needs.
pub(crate) struct ProtocolContext<'a> {
    pub hasher: &'a dyn IdentityHasher,
    pub cache: &'a ExistenceCache,
    pub row_locks: &'a Arc<RowLockTable>,
}

/// How a protocol wants its unit of work to end.
pub(crate) enum Finish<T> {
    Commit(T),
    Rollback(T),
}

pub(crate) struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    locks: RowLockSet,
    cache: &'conn ExistenceCache,
    confirmed: Vec<MeadowlarkId>,
    evicted: Vec<MeadowlarkId>,
}

impl<'conn> UnitOfWork<'conn> {
    fn begin(
        conn: &'conn mut Connection,
        row_locks: &Arc<RowLockTable>,
        cache: &'conn ExistenceCache,
    ) -> RepoResult<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Self {
            tx,
            locks: row_locks.begin(),
            cache,
            confirmed: Vec::new(),
            evicted: Vec::new(),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    /// Locks every row in `keys` without waiting, or fails with `RowLocked`.
    pub fn lock_rows(&mut self, keys: &[RowKey], mode: LockMode) -> RepoResult<()> {
        self.locks.try_lock(keys, mode).map_err(RepoError::RowLocked)
    }

    /// Records ids confirmed to exist by a backing store lookup.
    pub fn confirm_existing<'a>(&mut self, ids: impl IntoIterator<Item = &'a MeadowlarkId>) {
        self.confirmed.extend(ids.into_iter().cloned());
    }

    /// Records ids that stop existing once this unit of work commits.
    pub fn evict_on_commit<'a>(&mut self, ids: impl IntoIterator<Item = &'a MeadowlarkId>) {
        self.evicted.extend(ids.into_iter().cloned());
    }

    fn commit(mut self) -> RepoResult<()> {
        self.tx.commit()?;
        self.cache.insert_all(&self.confirmed);
        self.cache.evict_all(&self.evicted);
        self.locks.release_all();
        Ok(())
    }

    fn rollback(mut self) -> RepoResult<()> {
        let result = self.tx.rollback();
        self.locks.release_all();
        result.map_err(RepoError::from)
    }
}

/// Runs `body` inside one unit of work and finishes it as `body` decides.
///
/// An `Err` from `body` rolls back before the error is returned.
pub(crate) fn run_in_unit_of_work<T, F>(
    conn: &mut Connection,
    ctx: &ProtocolContext<'_>,
    trace_id: &str,
    body: F,
) -> RepoResult<T>
where
    F: FnOnce(&mut UnitOfWork<'_>) -> RepoResult<Finish<T>>,
{
    let mut uow = UnitOfWork::begin(conn, ctx.row_locks, ctx.cache)?;
    match body(&mut uow) {
        Ok(Finish::Commit(value)) => {
            uow.commit()?;
            Ok(value)
        }
        Ok(Finish::Rollback(value)) => {
            uow.rollback()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback() {
                warn!(
                    "event=uow_rollback module=repo status=error trace_id={} error={}",
                    trace_id, rollback_err
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{run_in_unit_of_work, Finish, ProtocolContext};
    use crate::db::migrations::apply_migrations;
    use crate::db::open_connection_in_memory;
    use crate::db::row_locks::{LockMode, RowKey, RowLockTable};
    use crate::model::identity::{DocumentIdentity, IdentityHasher, MeadowlarkId};
    use crate::repo::document_repo::RepoError;
    use crate::repo::existence_cache::ExistenceCache;
    use std::sync::Arc;

    struct NameHasher;

    impl IdentityHasher for NameHasher {
        fn meadowlark_id(&self, _: &str, resource_name: &str, _: &DocumentIdentity) -> MeadowlarkId {
            MeadowlarkId::new(resource_name)
        }
    }

    fn key(id: &str) -> RowKey {
        RowKey::new(MeadowlarkId::new(id), MeadowlarkId::new(id))
    }

    #[test]
    fn commit_applies_staged_cache_changes_and_releases_locks() {
        let mut conn = open_connection_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        let locks = Arc::new(RowLockTable::new());
        let cache = ExistenceCache::new();
        cache.insert_all(&[MeadowlarkId::new("gone")]);
        let ctx = ProtocolContext {
            hasher: &NameHasher,
            cache: &cache,
            row_locks: &locks,
        };

        run_in_unit_of_work(&mut conn, &ctx, "t-1", |uow| {
            uow.lock_rows(&[key("kept")], LockMode::Share)?;
            uow.confirm_existing(&[MeadowlarkId::new("kept")]);
            uow.evict_on_commit(&[MeadowlarkId::new("gone")]);
            assert!(!cache.contains(&MeadowlarkId::new("kept")));
            assert_eq!(locks.locked_row_count(), 1);
            Ok(Finish::Commit(()))
        })
        .unwrap();

        assert!(cache.contains(&MeadowlarkId::new("kept")));
        assert!(!cache.contains(&MeadowlarkId::new("gone")));
        assert_eq!(locks.locked_row_count(), 0);
    }

    #[test]
    fn rollback_and_errors_discard_staged_cache_changes() {
        let mut conn = open_connection_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        let locks = Arc::new(RowLockTable::new());
        let cache = ExistenceCache::new();
        let ctx = ProtocolContext {
            hasher: &NameHasher,
            cache: &cache,
            row_locks: &locks,
        };

        run_in_unit_of_work(&mut conn, &ctx, "t-2", |uow| {
            uow.confirm_existing(&[MeadowlarkId::new("a")]);
            Ok(Finish::Rollback(()))
        })
        .unwrap();

        let failed: Result<(), RepoError> = run_in_unit_of_work(&mut conn, &ctx, "t-3", |uow| {
            uow.lock_rows(&[key("b")], LockMode::Update)?;
            uow.confirm_existing(&[MeadowlarkId::new("b")]);
            Err(RepoError::InvalidData("boom".to_string()))
        });

        assert!(failed.is_err());
        assert!(cache.is_empty());
        assert_eq!(locks.locked_row_count(), 0);
    }
}
