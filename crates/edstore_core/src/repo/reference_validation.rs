//! Existence checks for the outbound references of a document being written.
//!
//! # Responsibility
//! - Report every referenced identity that does not exist in the store.
//! - Share-lock the alias rows that prove a reference target exists, so a
//!   concurrent delete of that target fails fast instead of racing.
//!
//! # Invariants
//! - Lookups go through the alias table, so a superclass identity resolves to
//!   the subclass document that claims it.
//! - Cache hits are trusted and not locked; only misses reach the store.
//! - Confirmed ids enter the existence cache only when the enclosing unit of
//!   work commits.

use super::document_repo::RepoResult;
use super::statements::find_aliases_by_alias_ids;
use super::unit_of_work::{ProtocolContext, UnitOfWork};
use crate::db::row_locks::LockMode;
use crate::model::document::{DocumentInfo, DocumentReference, MissingIdentity};
use crate::model::identity::MeadowlarkId;
use log::debug;
use std::collections::HashSet;

/// Distinct reference targets of a document, in body order.
pub(crate) struct ReferenceTargets<'a> {
    targets: Vec<(MeadowlarkId, &'a DocumentReference)>,
}

impl<'a> ReferenceTargets<'a> {
    pub fn of(ctx: &ProtocolContext<'_>, document_info: &'a DocumentInfo) -> Self {
        let mut seen = HashSet::new();
        let targets = document_info
            .all_references()
            .map(|reference| (ctx.hasher.reference_id(reference), reference))
            .filter(|(id, _)| seen.insert(id.clone()))
            .collect();
        Self { targets }
    }

    pub fn ids(&self) -> Vec<MeadowlarkId> {
        self.targets.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Returns the targets of `references` that do not exist, empty when all do.
pub(crate) fn find_missing_references(
    uow: &mut UnitOfWork<'_>,
    ctx: &ProtocolContext<'_>,
    references: &ReferenceTargets<'_>,
    trace_id: &str,
) -> RepoResult<Vec<MissingIdentity>> {
    if references.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = references.ids();
    let (hits, misses) = ctx.cache.partition(&candidates);

    let mut confirmed: HashSet<MeadowlarkId> = hits.into_iter().collect();
    if !misses.is_empty() {
        let rows = find_aliases_by_alias_ids(uow.conn(), &misses)?;
        let keys: Vec<_> = rows.iter().map(|row| row.row_key()).collect();
        uow.lock_rows(&keys, LockMode::Share)?;

        let found: Vec<MeadowlarkId> = rows
            .into_iter()
            .map(|row| row.alias_meadowlark_id)
            .collect();
        uow.confirm_existing(&found);
        confirmed.extend(found);
    }

    let missing: Vec<MissingIdentity> = references
        .targets
        .iter()
        .filter(|(id, _)| !confirmed.contains(id))
        .map(|(_, reference)| MissingIdentity {
            resource_name: reference.resource_name.clone(),
            identity: reference.document_identity.clone(),
        })
        .collect();

    debug!(
        "event=reference_validation module=repo status=ok trace_id={} candidates={} cache_misses={} missing={}",
        trace_id,
        candidates.len(),
        misses.len(),
        missing.len()
    );
    Ok(missing)
}
