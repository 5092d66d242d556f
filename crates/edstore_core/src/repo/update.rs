//! Replace of an existing document addressed by `DocumentUuid`.
//!
//! # Responsibility
//! - Run the upsert update branch against a document that must already exist,
//!   including identity changes when the resource allows them.
//!
//! # Invariants
//! - An identity change on a resource without `allow_identity_updates` is
//!   rejected before any write.
//! - On an identity change, the alias swap, the document row update and the
//!   reference replacement commit together.

use super::document_repo::RepoResult;
use super::reference_validation::{find_missing_references, ReferenceTargets};
use super::statements::{find_document_by_document_uuid, update_document};
use super::unit_of_work::{run_in_unit_of_work, Finish, ProtocolContext};
use super::writes::{find_alias_conflicts, replace_aliases, replace_references};
use crate::model::alias::AliasSet;
use crate::model::document::StoredDocument;
use crate::model::outcome::{UpdateResult, WriteConflict};
use crate::model::request::UpdateRequest;
use log::debug;
use rusqlite::Connection;

pub(crate) fn update_document_by_id(
    conn: &mut Connection,
    ctx: &ProtocolContext<'_>,
    request: &UpdateRequest,
) -> RepoResult<UpdateResult> {
    let trace_id = request.trace_id.as_str();

    let outcome = run_in_unit_of_work(conn, ctx, trace_id, |uow| {
        let Some(stored) = find_document_by_document_uuid(uow.conn(), request.document_uuid)? else {
            return Ok(Finish::Rollback(UpdateResult::UpdateFailureNotExists));
        };

        let request_timestamp = request.document_info.request_timestamp;
        if stored.last_modified_at >= request_timestamp {
            return Ok(Finish::Rollback(UpdateResult::UpdateFailureWriteConflict(
                WriteConflict::StaleRequest {
                    stored_last_modified_at: stored.last_modified_at,
                    request_timestamp,
                },
            )));
        }

        let identity_changed = stored.meadowlark_id != request.meadowlark_id;
        if identity_changed && !request.resource_info.allow_identity_updates {
            debug!(
                "event=document_update module=repo status=rejected trace_id={} reason=immutable_identity",
                trace_id
            );
            return Ok(Finish::Rollback(UpdateResult::UpdateFailureImmutableIdentity));
        }

        let references = ReferenceTargets::of(ctx, &request.document_info);
        if request.validate_document_references_exist {
            let failures = find_missing_references(uow, ctx, &references, trace_id)?;
            if !failures.is_empty() {
                return Ok(Finish::Rollback(UpdateResult::UpdateFailureReference {
                    failures,
                }));
            }
        }

        let superclass_id = request
            .document_info
            .superclass_info
            .as_ref()
            .map(|superclass| ctx.hasher.superclass_id(superclass));
        let aliases = AliasSet::for_document(
            stored.document_uuid,
            &request.meadowlark_id,
            superclass_id.as_ref(),
        );

        // A changed identity claims a new self alias as well as the superclass one.
        let claimed: Vec<_> = aliases
            .alias_ids()
            .filter(|alias| identity_changed || **alias != request.meadowlark_id)
            .cloned()
            .collect();
        if !claimed.is_empty() {
            let blocking_documents = find_alias_conflicts(uow, stored.document_uuid, &claimed)?;
            if !blocking_documents.is_empty() {
                return Ok(Finish::Rollback(UpdateResult::UpdateFailureConflict {
                    blocking_documents,
                }));
            }
        }

        let previous_id = stored.meadowlark_id.clone();
        let document = StoredDocument {
            meadowlark_id: request.meadowlark_id.clone(),
            document_identity: request.document_info.document_identity.clone(),
            project_name: request.resource_info.project_name.clone(),
            resource_name: request.resource_info.resource_name.clone(),
            resource_version: request.resource_info.resource_version.clone(),
            is_descriptor: request.resource_info.is_descriptor,
            validated: request.validate_document_references_exist,
            last_modified_at: request_timestamp,
            edfi_doc: request.edfi_doc.clone(),
            ..stored
        };
        update_document(uow.conn(), &document)?;

        replace_aliases(uow, &previous_id, &aliases)?;
        replace_references(
            uow,
            &previous_id,
            &request.meadowlark_id,
            &references.ids(),
        )?;

        Ok(Finish::Commit(UpdateResult::UpdateSuccess {
            document_uuid: document.document_uuid,
        }))
    });

    match outcome {
        Ok(result) => Ok(result),
        Err(err) => match err.write_conflict() {
            Some(conflict) => Ok(UpdateResult::UpdateFailureWriteConflict(conflict)),
            None => Err(err),
        },
    }
}
