//! Alias rows: the identities under which a document can be referenced.
//!
//! # Responsibility
//! - Derive the full alias set of a document from its own id and optional
//!   superclass id.
//!
//! # Invariants
//! - Every set contains exactly one self alias (`alias == meadowlark_id`).
//! - A set contains at most one superclass alias, distinct from the self alias.

use super::identity::{DocumentUuid, MeadowlarkId};
use crate::db::row_locks::RowKey;

/// One `aliases` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasRow {
    pub document_uuid: DocumentUuid,
    pub meadowlark_id: MeadowlarkId,
    pub alias_meadowlark_id: MeadowlarkId,
}

impl AliasRow {
    pub fn is_self_alias(&self) -> bool {
        self.meadowlark_id == self.alias_meadowlark_id
    }

    /// Key used to lock this row.
    pub fn row_key(&self) -> RowKey {
        RowKey::new(self.meadowlark_id.clone(), self.alias_meadowlark_id.clone())
    }
}

/// The complete alias set written for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSet {
    rows: Vec<AliasRow>,
}

impl AliasSet {
    pub fn for_document(
        document_uuid: DocumentUuid,
        meadowlark_id: &MeadowlarkId,
        superclass_alias: Option<&MeadowlarkId>,
    ) -> Self {
        let mut rows = vec![AliasRow {
            document_uuid,
            meadowlark_id: meadowlark_id.clone(),
            alias_meadowlark_id: meadowlark_id.clone(),
        }];
        if let Some(alias) = superclass_alias.filter(|alias| *alias != meadowlark_id) {
            rows.push(AliasRow {
                document_uuid,
                meadowlark_id: meadowlark_id.clone(),
                alias_meadowlark_id: alias.clone(),
            });
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[AliasRow] {
        &self.rows
    }

    pub fn alias_ids(&self) -> impl Iterator<Item = &MeadowlarkId> {
        self.rows.iter().map(|row| &row.alias_meadowlark_id)
    }

    /// The superclass alias, when the document declares one.
    pub fn superclass_alias(&self) -> Option<&MeadowlarkId> {
        self.rows
            .iter()
            .find(|row| !row.is_self_alias())
            .map(|row| &row.alias_meadowlark_id)
    }
}
