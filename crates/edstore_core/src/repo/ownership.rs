//! Ownership gate consulted before a mutation or read is handled.
//!
//! # Responsibility
//! - Compare the recorded creator of the targeted document with the
//!   requesting client.
//!
//! # Invariants
//! - Read-only; never part of the mutation's unit of work.
//! - Absence of the target is `NotApplicable`, not a denial.

use super::document_repo::RepoResult;
use super::statements::{find_created_by_document_uuid, find_created_by_meadowlark_id};
use super::unit_of_work::ProtocolContext;
use crate::model::document::AuthorizationStrategy;
use crate::model::outcome::OwnershipResult;
use crate::model::request::{OwnershipRequest, RequestAction};
use log::{debug, warn};
use rusqlite::Connection;

/// Returns the decision without touching the store when the request is
/// exempt from ownership checks.
pub(crate) fn exemption(request: &OwnershipRequest) -> Option<OwnershipResult> {
    if request.security.authorization_strategy != AuthorizationStrategy::OwnershipBased {
        return Some(OwnershipResult::NotApplicable);
    }
    if request.resource_info.is_descriptor && request.action.is_read() {
        debug!(
            "event=ownership_check module=repo status=ok trace_id={} action={} reason=descriptor_read",
            request.trace_id,
            request.action.as_str()
        );
        return Some(OwnershipResult::NotApplicable);
    }
    None
}

pub(crate) fn reject_by_ownership_security(
    conn: &Connection,
    ctx: &ProtocolContext<'_>,
    request: &OwnershipRequest,
) -> RepoResult<OwnershipResult> {
    let created_by = if let Some(document_uuid) = request.document_uuid {
        find_created_by_document_uuid(conn, document_uuid)?
    } else {
        match (&request.action, &request.document_info) {
            (RequestAction::Upsert, Some(document_info)) => {
                let meadowlark_id = ctx.hasher.meadowlark_id(
                    &request.resource_info.project_name,
                    &request.resource_info.resource_name,
                    &document_info.document_identity,
                );
                find_created_by_meadowlark_id(conn, &meadowlark_id)?
            }
            _ => {
                warn!(
                    "event=ownership_check module=repo status=error trace_id={} action={} error_code=no_target",
                    request.trace_id,
                    request.action.as_str()
                );
                return Ok(OwnershipResult::NotApplicable);
            }
        }
    };

    let result = match created_by {
        None => OwnershipResult::NotApplicable,
        Some(created_by) if created_by.as_deref() == Some(request.security.client_id.as_str()) => {
            OwnershipResult::AccessApproved
        }
        Some(_) => OwnershipResult::AccessDenied,
    };
    Ok(result)
}
