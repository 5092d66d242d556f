//! Delete of a document addressed by `DocumentUuid`.
//!
//! # Responsibility
//! - Claim the target's alias rows, optionally refuse while other documents
//!   reference any of its aliases, then remove the document, its outbound
//!   references and its aliases.
//!
//! # Invariants
//! - The alias rows are update-locked before anything is read about
//!   referrers; a concurrent validator holding a share lock makes this fail
//!   fast with a retryable conflict.
//! - With checking disabled, reference rows owned by other documents that
//!   point at any alias of the target are removed with it; the referring
//!   documents themselves are untouched.

use super::document_repo::{RepoError, RepoResult};
use super::statements::{
    delete_aliases_by_meadowlark_id, delete_document_by_document_uuid,
    delete_outbound_references, delete_references_to, find_aliases_by_document_uuid,
    find_blocking_documents, find_referring_parents,
};
use super::unit_of_work::{run_in_unit_of_work, Finish, ProtocolContext};
use crate::db::row_locks::LockMode;
use crate::model::identity::MeadowlarkId;
use crate::model::outcome::DeleteResult;
use crate::model::request::DeleteRequest;
use log::debug;
use rusqlite::Connection;

pub(crate) fn delete_document_by_id(
    conn: &mut Connection,
    ctx: &ProtocolContext<'_>,
    request: &DeleteRequest,
) -> RepoResult<DeleteResult> {
    let trace_id = request.trace_id.as_str();

    let outcome = run_in_unit_of_work(conn, ctx, trace_id, |uow| {
        let aliases = find_aliases_by_document_uuid(uow.conn(), request.document_uuid)?;
        let Some(meadowlark_id) = aliases.first().map(|row| row.meadowlark_id.clone()) else {
            return Ok(Finish::Rollback(DeleteResult::DeleteFailureNotExists));
        };
        let keys: Vec<_> = aliases.iter().map(|row| row.row_key()).collect();
        uow.lock_rows(&keys, LockMode::Update)?;

        let alias_ids: Vec<MeadowlarkId> = aliases
            .into_iter()
            .map(|row| row.alias_meadowlark_id)
            .collect();

        if request.validate_no_references_to_document {
            let parents = find_referring_parents(uow.conn(), &alias_ids, &meadowlark_id)?;
            if !parents.is_empty() {
                let blocking_documents = find_blocking_documents(uow.conn(), &parents)?;
                debug!(
                    "event=document_delete module=repo status=rejected trace_id={} reason=referenced referrers={}",
                    trace_id,
                    parents.len()
                );
                return Ok(Finish::Rollback(DeleteResult::DeleteFailureReference {
                    blocking_documents,
                }));
            }
        }

        if delete_document_by_document_uuid(uow.conn(), request.document_uuid)? == 0 {
            return Err(RepoError::InvalidData(format!(
                "alias rows exist for document_uuid `{}` without a document row",
                request.document_uuid
            )));
        }
        delete_outbound_references(uow.conn(), &meadowlark_id)?;
        let orphaned = delete_references_to(uow.conn(), &alias_ids)?;
        if orphaned > 0 {
            debug!(
                "event=document_delete module=repo status=ok trace_id={} removed_inbound_references={}",
                trace_id, orphaned
            );
        }
        delete_aliases_by_meadowlark_id(uow.conn(), &meadowlark_id)?;
        uow.evict_on_commit(&alias_ids);

        Ok(Finish::Commit(DeleteResult::DeleteSuccess))
    });

    match outcome {
        Ok(result) => Ok(result),
        Err(err) => match err.write_conflict() {
            Some(conflict) => Ok(DeleteResult::DeleteFailureWriteConflict(conflict)),
            None => Err(err),
        },
    }
}
