//! Document store domain model.
//!
//! # Responsibility
//! - Define identities, alias sets, request records and tagged results used
//!   by the repository protocols.
//!
//! # Invariants
//! - Every stored document is addressable by both its `MeadowlarkId` and its
//!   `DocumentUuid`.
//! - Model types never touch SQL.

pub mod alias;
pub mod document;
pub mod identity;
pub mod outcome;
pub mod request;
