//! Non-blocking row locks over alias rows.
//!
//! # Responsibility
//! - Provide `FOR SHARE NOWAIT` / `FOR UPDATE NOWAIT` semantics on top of SQLite,
//!   which only locks at database granularity.
//! - Detect "reference X" vs "delete X" races between units of work.
//!
//! # Invariants
//! - Acquisition never waits: an incompatible lock held by another owner fails
//!   immediately with `LockConflict`.
//! - Acquisition is all-or-nothing for the requested row set.
//! - Locks live until the owning `RowLockSet` is dropped.

use crate::model::identity::MeadowlarkId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies one alias row: the owning document and the alias it claims.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub meadowlark_id: MeadowlarkId,
    pub alias_meadowlark_id: MeadowlarkId,
}

impl RowKey {
    pub fn new(meadowlark_id: MeadowlarkId, alias_meadowlark_id: MeadowlarkId) -> Self {
        Self {
            meadowlark_id,
            alias_meadowlark_id,
        }
    }
}

/// Requested lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Compatible with other `Share` holders; used while validating references.
    Share,
    /// Exclusive; used by delete to claim the rows it removes.
    Update,
}

/// A requested row is held incompatibly by another owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    pub row: RowKey,
    pub requested: LockMode,
}

impl Display for LockConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not obtain {:?} lock on alias row ({}, {})",
            self.requested, self.row.meadowlark_id, self.row.alias_meadowlark_id
        )
    }
}

impl Error for LockConflict {}

#[derive(Debug)]
enum RowLock {
    Shared(HashSet<u64>),
    Exclusive(u64),
}

/// Process-wide lock table for one database.
#[derive(Debug, Default)]
pub struct RowLockTable {
    rows: Mutex<HashMap<RowKey, RowLock>>,
    next_owner: AtomicU64,
}

impl RowLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an empty lock set owned by a fresh unit of work.
    pub fn begin(self: &Arc<Self>) -> RowLockSet {
        let owner = self.next_owner.fetch_add(1, Ordering::Relaxed) + 1;
        RowLockSet {
            table: Arc::clone(self),
            owner,
            held: Vec::new(),
        }
    }

    /// Number of rows currently locked by anyone.
    pub fn locked_row_count(&self) -> usize {
        self.rows.lock().len()
    }

    fn try_acquire(&self, owner: u64, keys: &[RowKey], mode: LockMode) -> Result<(), LockConflict> {
        let mut rows = self.rows.lock();

        for key in keys {
            let compatible = match (rows.get(key), mode) {
                (None, _) => true,
                (Some(RowLock::Exclusive(holder)), _) => *holder == owner,
                (Some(RowLock::Shared(_)), LockMode::Share) => true,
                (Some(RowLock::Shared(holders)), LockMode::Update) => {
                    holders.iter().all(|holder| *holder == owner)
                }
            };
            if !compatible {
                return Err(LockConflict {
                    row: key.clone(),
                    requested: mode,
                });
            }
        }

        for key in keys {
            match mode {
                LockMode::Update => {
                    rows.insert(key.clone(), RowLock::Exclusive(owner));
                }
                LockMode::Share => match rows.get_mut(key) {
                    Some(RowLock::Shared(holders)) => {
                        holders.insert(owner);
                    }
                    // Already exclusive for this owner; keep the stronger lock.
                    Some(RowLock::Exclusive(_)) => {}
                    None => {
                        rows.insert(key.clone(), RowLock::Shared(HashSet::from([owner])));
                    }
                },
            }
        }
        Ok(())
    }

    fn release(&self, owner: u64, keys: &[RowKey]) {
        let mut rows = self.rows.lock();
        for key in keys {
            let now_free = match rows.get_mut(key) {
                Some(RowLock::Exclusive(holder)) => *holder == owner,
                Some(RowLock::Shared(holders)) => {
                    holders.remove(&owner);
                    holders.is_empty()
                }
                None => false,
            };
            if now_free {
                rows.remove(key);
            }
        }
    }
}

/// Locks held by one unit of work; released on drop.
#[derive(Debug)]
pub struct RowLockSet {
    table: Arc<RowLockTable>,
    owner: u64,
    held: Vec<RowKey>,
}

impl RowLockSet {
    /// Locks every row in `keys` or none of them.
    pub fn try_lock(&mut self, keys: &[RowKey], mode: LockMode) -> Result<(), LockConflict> {
        if keys.is_empty() {
            return Ok(());
        }
        self.table.try_acquire(self.owner, keys, mode)?;
        for key in keys {
            if !self.held.contains(key) {
                self.held.push(key.clone());
            }
        }
        Ok(())
    }

    pub fn held(&self) -> &[RowKey] {
        &self.held
    }

    /// Releases every held row immediately.
    pub fn release_all(&mut self) {
        if self.held.is_empty() {
            return;
        }
        self.table.release(self.owner, &self.held);
        self.held.clear();
    }
}

impl Drop for RowLockSet {
    fn drop(&mut self) {
        self.release_all();
    }
}
