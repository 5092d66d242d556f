//! Document repository protocols and their persistence plumbing.
//!
//! # Responsibility
//! - Implement upsert, update, delete, get and the ownership gate over SQLite.
//! - Keep SQL, transactions, row locks and the existence cache behind the
//!   `DocumentRepository` contract.
//!
//! # Invariants
//! - Every mutating protocol runs in exactly one unit of work.
//! - Reads run without an explicit transaction.

mod delete;
pub mod document_repo;
pub mod existence_cache;
mod get;
mod ownership;
mod reference_validation;
mod statements;
mod unit_of_work;
mod update;
mod upsert;
mod writes;
