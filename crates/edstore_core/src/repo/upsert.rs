//! Insert-or-update keyed by `MeadowlarkId`.
//!
//! # Responsibility
//! - Decide the insert or update branch from the stored row, then validate
//!   references, check staleness and superclass ownership, and write the
//!   document, its aliases and its references in one unit of work.
//!
//! # Invariants
//! - `created_by` / `created_at` are written once, on the insert branch.
//! - An update-branch request whose timestamp is not strictly newer than
//!   the stored `last_modified_at` never writes.
//! - A superclass alias owned by another document is a conflict, never an
//!   overwrite.

use super::document_repo::RepoResult;
use super::reference_validation::{find_missing_references, ReferenceTargets};
use super::statements::{find_document_by_meadowlark_id, insert_document, update_document};
use super::unit_of_work::{run_in_unit_of_work, Finish, ProtocolContext};
use super::writes::{find_alias_conflicts, replace_aliases, replace_references};
use crate::model::alias::AliasSet;
use crate::model::document::StoredDocument;
use crate::model::outcome::{UpsertResult, WriteConflict};
use crate::model::request::UpsertRequest;
use log::debug;
use rusqlite::Connection;
use uuid::Uuid;

pub(crate) fn upsert_document(
    conn: &mut Connection,
    ctx: &ProtocolContext<'_>,
    request: &UpsertRequest,
) -> RepoResult<UpsertResult> {
    let trace_id = request.trace_id.as_str();
    let mut is_insert = true;

    let outcome = run_in_unit_of_work(conn, ctx, trace_id, |uow| {
        let existing = find_document_by_meadowlark_id(uow.conn(), &request.meadowlark_id)?;
        is_insert = existing.is_none();

        let references = ReferenceTargets::of(ctx, &request.document_info);
        if request.validate_document_references_exist {
            let failures = find_missing_references(uow, ctx, &references, trace_id)?;
            if !failures.is_empty() {
                debug!(
                    "event=document_upsert module=repo status=rejected trace_id={} reason=missing_references count={}",
                    trace_id,
                    failures.len()
                );
                return Ok(Finish::Rollback(if is_insert {
                    UpsertResult::InsertFailureReference { failures }
                } else {
                    UpsertResult::UpdateFailureReference { failures }
                }));
            }
        }

        if let Some(stored) = &existing {
            let request_timestamp = request.document_info.request_timestamp;
            if stored.last_modified_at >= request_timestamp {
                return Ok(Finish::Rollback(UpsertResult::UpdateFailureWriteConflict(
                    WriteConflict::StaleRequest {
                        stored_last_modified_at: stored.last_modified_at,
                        request_timestamp,
                    },
                )));
            }
        }

        let document_uuid = existing
            .as_ref()
            .map_or_else(Uuid::new_v4, |stored| stored.document_uuid);
        let superclass_id = request
            .document_info
            .superclass_info
            .as_ref()
            .map(|superclass| ctx.hasher.superclass_id(superclass));
        let aliases =
            AliasSet::for_document(document_uuid, &request.meadowlark_id, superclass_id.as_ref());

        if let Some(superclass_alias) = aliases.superclass_alias() {
            let blocking_documents =
                find_alias_conflicts(uow, document_uuid, &[superclass_alias.clone()])?;
            if !blocking_documents.is_empty() {
                return Ok(Finish::Rollback(if is_insert {
                    UpsertResult::InsertFailureConflict { blocking_documents }
                } else {
                    UpsertResult::UpdateFailureConflict { blocking_documents }
                }));
            }
        }

        let document = StoredDocument {
            meadowlark_id: request.meadowlark_id.clone(),
            document_uuid,
            document_identity: request.document_info.document_identity.clone(),
            project_name: request.resource_info.project_name.clone(),
            resource_name: request.resource_info.resource_name.clone(),
            resource_version: request.resource_info.resource_version.clone(),
            is_descriptor: request.resource_info.is_descriptor,
            validated: request.validate_document_references_exist,
            created_by: existing.as_ref().map_or_else(
                || Some(request.security.client_id.clone()),
                |stored| stored.created_by.clone(),
            ),
            created_at: existing
                .as_ref()
                .map_or(request.document_info.request_timestamp, |stored| stored.created_at),
            last_modified_at: request.document_info.request_timestamp,
            edfi_doc: request.edfi_doc.clone(),
        };
        if is_insert {
            insert_document(uow.conn(), &document)?;
        } else {
            update_document(uow.conn(), &document)?;
        }

        replace_aliases(uow, &request.meadowlark_id, &aliases)?;
        replace_references(
            uow,
            &request.meadowlark_id,
            &request.meadowlark_id,
            &references.ids(),
        )?;

        Ok(Finish::Commit(if is_insert {
            UpsertResult::InsertSuccess { document_uuid }
        } else {
            UpsertResult::UpdateSuccess { document_uuid }
        }))
    });

    match outcome {
        Ok(result) => Ok(result),
        Err(err) => match err.write_conflict() {
            Some(conflict) if is_insert => Ok(UpsertResult::InsertFailureWriteConflict(conflict)),
            Some(conflict) => Ok(UpsertResult::UpdateFailureWriteConflict(conflict)),
            None => Err(err),
        },
    }
}
