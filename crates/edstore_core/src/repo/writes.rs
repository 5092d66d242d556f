//! Write steps shared by the upsert and update protocols.

use super::document_repo::RepoResult;
use super::statements::{
    delete_aliases_by_meadowlark_id, delete_outbound_references, find_aliases_by_alias_ids,
    find_aliases_by_document_uuid, find_blocking_documents, insert_aliases,
    insert_outbound_references,
};
use super::unit_of_work::UnitOfWork;
use crate::model::alias::AliasSet;
use crate::model::document::BlockingDocument;
use crate::model::identity::{DocumentUuid, MeadowlarkId};

/// Documents other than `own_uuid` that already hold one of `alias_ids`.
pub(crate) fn find_alias_conflicts(
    uow: &UnitOfWork<'_>,
    own_uuid: DocumentUuid,
    alias_ids: &[MeadowlarkId],
) -> RepoResult<Vec<BlockingDocument>> {
    let mut owners: Vec<MeadowlarkId> = Vec::new();
    for row in find_aliases_by_alias_ids(uow.conn(), alias_ids)? {
        if row.document_uuid != own_uuid && !owners.contains(&row.meadowlark_id) {
            owners.push(row.meadowlark_id);
        }
    }
    find_blocking_documents(uow.conn(), &owners)
}

/// Replaces the alias rows of the document previously stored as
/// `previous_id` with `aliases`.
///
/// Alias ids that disappear are evicted from the existence cache on commit.
pub(crate) fn replace_aliases(
    uow: &mut UnitOfWork<'_>,
    previous_id: &MeadowlarkId,
    aliases: &AliasSet,
) -> RepoResult<()> {
    let document_uuid = match aliases.rows().first() {
        Some(row) => row.document_uuid,
        None => return Ok(()),
    };
    let dropped: Vec<MeadowlarkId> = find_aliases_by_document_uuid(uow.conn(), document_uuid)?
        .into_iter()
        .map(|row| row.alias_meadowlark_id)
        .filter(|alias| !aliases.alias_ids().any(|kept| kept == alias))
        .collect();

    delete_aliases_by_meadowlark_id(uow.conn(), previous_id)?;
    insert_aliases(uow.conn(), aliases)?;
    uow.evict_on_commit(&dropped);
    Ok(())
}

/// Replaces every outbound reference row of the document wholesale.
pub(crate) fn replace_references(
    uow: &UnitOfWork<'_>,
    previous_id: &MeadowlarkId,
    current_id: &MeadowlarkId,
    referenced_ids: &[MeadowlarkId],
) -> RepoResult<()> {
    delete_outbound_references(uow.conn(), previous_id)?;
    insert_outbound_references(uow.conn(), current_id, referenced_ids)
}
